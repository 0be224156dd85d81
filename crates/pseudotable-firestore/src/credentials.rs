//! Service-account credentials.
//!
//! A key is either read from a JSON key file or supplied inline, and is
//! resolved once when the store connects. Only the identifying fields are
//! kept; the private key never leaves the file.

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::FirestoreError;

/// Identifying part of a Google service-account key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceAccountKey {
    /// Key type, `service_account` for keys issued by the console
    #[serde(rename = "type", default)]
    pub key_type: Option<String>,
    /// Project the key belongs to
    pub project_id: String,
    #[serde(default)]
    pub client_email: Option<String>,
    #[serde(default)]
    pub private_key_id: Option<String>,
}

/// Where the service-account key comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Path to a JSON key file
    File(PathBuf),
    /// Key already in memory
    Inline(ServiceAccountKey),
}

impl Credentials {
    /// Parse an inline JSON key.
    pub fn from_json(json: &str) -> Result<Self, FirestoreError> {
        parse_key(json, None).map(Credentials::Inline)
    }

    /// Load and check the key.
    pub fn resolve(&self) -> Result<ServiceAccountKey, FirestoreError> {
        match self {
            Credentials::Inline(key) => check_key(key.clone(), None),
            Credentials::File(path) => {
                let text = fs::read_to_string(path).map_err(|err| FirestoreError::Credentials {
                    path: Some(path.clone()),
                    reason: err.to_string(),
                })?;
                parse_key(&text, Some(path))
            }
        }
    }
}

fn parse_key(json: &str, path: Option<&PathBuf>) -> Result<ServiceAccountKey, FirestoreError> {
    let key: ServiceAccountKey =
        serde_json::from_str(json).map_err(|err| FirestoreError::Credentials {
            path: path.cloned(),
            reason: format!("not a service-account key: {}", err),
        })?;
    check_key(key, path)
}

fn check_key(
    key: ServiceAccountKey,
    path: Option<&PathBuf>,
) -> Result<ServiceAccountKey, FirestoreError> {
    if key.project_id.trim().is_empty() {
        return Err(FirestoreError::Credentials {
            path: path.cloned(),
            reason: "project_id is empty".to_string(),
        });
    }
    if let Some(kind) = key.key_type.as_deref() {
        if kind != "service_account" {
            return Err(FirestoreError::Credentials {
                path: path.cloned(),
                reason: format!("unsupported key type {:?}", kind),
            });
        }
    }
    Ok(key)
}
