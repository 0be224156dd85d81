//! Firestore connection settings

use std::time::Duration;

use crate::credentials::Credentials;

/// Database used when none is named.
pub const DEFAULT_DATABASE: &str = "(default)";
/// Production REST endpoint.
pub const FIRESTORE_HOST: &str = "https://firestore.googleapis.com";
/// Environment variable naming a local emulator, as set by `gcloud emulators firestore env-init`.
pub const EMULATOR_HOST_ENV: &str = "FIRESTORE_EMULATOR_HOST";

/// How to reach one Firestore database.
#[derive(Debug, Clone)]
pub struct FirestoreConfig {
    /// Project id; taken from the credentials when unset
    pub project_id: Option<String>,
    /// Database id
    pub database: String,
    /// Service-account key
    pub credentials: Option<Credentials>,
    /// `host:port` of an emulator; plain HTTP, no credentials needed
    pub emulator_host: Option<String>,
    /// OAuth2 bearer token sent with every request
    pub access_token: Option<String>,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for FirestoreConfig {
    fn default() -> Self {
        Self {
            project_id: None,
            database: DEFAULT_DATABASE.to_string(),
            credentials: None,
            emulator_host: None,
            access_token: None,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(60),
        }
    }
}

impl FirestoreConfig {
    /// Production settings for `credentials`.
    pub fn with_credentials(credentials: Credentials) -> Self {
        Self { credentials: Some(credentials), ..Self::default() }
    }

    /// Settings for an emulator at `host` (`host:port`).
    pub fn emulator(host: &str, project_id: &str) -> Self {
        Self {
            project_id: Some(project_id.to_string()),
            emulator_host: Some(host.to_string()),
            ..Self::default()
        }
    }

    /// Emulator settings from `FIRESTORE_EMULATOR_HOST`, if it is set.
    pub fn emulator_from_env(project_id: &str) -> Option<Self> {
        std::env::var(EMULATOR_HOST_ENV)
            .ok()
            .filter(|host| !host.trim().is_empty())
            .map(|host| Self::emulator(host.trim(), project_id))
    }

    pub fn with_project(mut self, project_id: &str) -> Self {
        self.project_id = Some(project_id.to_string());
        self
    }

    pub fn with_access_token(mut self, token: &str) -> Self {
        self.access_token = Some(token.to_string());
        self
    }

    /// Base URL requests are sent to.
    pub fn host_url(&self) -> String {
        match &self.emulator_host {
            Some(host) if host.starts_with("http://") || host.starts_with("https://") => {
                host.clone()
            }
            Some(host) => format!("http://{}", host),
            None => FIRESTORE_HOST.to_string(),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.database.trim().is_empty() {
            return Err("database must not be empty".to_string());
        }
        if self.project_id.is_none() && self.credentials.is_none() {
            return Err("either a project id or credentials are required".to_string());
        }
        if self.emulator_host.is_none() && self.access_token.is_none() {
            return Err("an access token is required outside the emulator".to_string());
        }
        if self.connect_timeout.is_zero() || self.request_timeout.is_zero() {
            return Err("timeouts must be non-zero".to_string());
        }
        Ok(())
    }
}
