//! Command-line arguments.

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use pseudotable_core::Config;
use pseudotable_firestore::{Credentials, FirestoreConfig, StoreConfig};

/// Project id used against an emulator when none is given.
pub const EMULATOR_PROJECT: &str = "demo-pseudotable";

#[derive(Parser, Debug)]
#[command(name = "pseudotable")]
#[command(about = "Raw value <-> pseudonymous identifier tables")]
#[command(version)]
pub struct Cli {
    #[command(flatten)]
    pub backend: BackendArgs,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Where the tables live.
#[derive(Args, Debug, Default, Clone)]
pub struct BackendArgs {
    /// Use a local commit-log store in DIR instead of Firestore
    #[arg(long, value_name = "DIR")]
    pub local: Option<PathBuf>,

    /// Firestore service-account key file
    #[arg(long, value_name = "FILE")]
    pub credentials: Option<PathBuf>,

    /// Firestore project id (defaults to the key's project)
    #[arg(long, value_name = "ID")]
    pub project: Option<String>,

    /// Firestore emulator address
    #[arg(long, value_name = "HOST:PORT", env = "FIRESTORE_EMULATOR_HOST")]
    pub emulator: Option<String>,

    /// OAuth2 access token, e.g. from `gcloud auth print-access-token`
    #[arg(long, value_name = "TOKEN", env = "FIRESTORE_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,

    /// Largest number of records per commit
    #[arg(long, value_name = "N")]
    pub max_batch_size: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Bulk-import a JSON object of datum -> identifier into a table
    Migrate {
        /// JSON file holding the mappings
        mappings: PathBuf,
        /// Target table
        table: String,
        #[arg(long, default_value = "avf-phone-uuid-")]
        prefix: String,
    },
    /// Exercise create, lookup and batch paths against a scratch table
    SmokeTest {
        #[arg(long, default_value = "phone-no-test")]
        table: String,
        #[arg(long, default_value = "phone-no-test-")]
        prefix: String,
    },
    /// List table names
    ListTables,
    /// Identifier for a datum, created if absent
    Lookup { table: String, prefix: String, datum: String },
    /// Datum for an identifier
    Reverse { table: String, prefix: String, identifier: String },
}

impl BackendArgs {
    /// Table settings for the selected backend.
    pub fn table_config(&self) -> Config {
        let config = if self.local.is_some() {
            Config::local()
        } else {
            Config::firestore()
        };
        match self.max_batch_size {
            Some(n) => config.with_max_batch_size(n),
            None => config,
        }
    }

    /// Store selection. A local directory wins over any Firestore flag.
    pub fn store_config(&self) -> anyhow::Result<StoreConfig> {
        if let Some(dir) = &self.local {
            return Ok(StoreConfig::Local(dir.clone()));
        }

        let mut firestore = match &self.emulator {
            Some(host) => {
                FirestoreConfig::emulator(host, self.project.as_deref().unwrap_or(EMULATOR_PROJECT))
            }
            None => {
                if self.credentials.is_none() && self.project.is_none() {
                    bail!("choose a backend: --local, --credentials or --emulator");
                }
                let mut config = FirestoreConfig::default();
                config.project_id = self.project.clone();
                config
            }
        };
        if let Some(path) = &self.credentials {
            let key = Credentials::File(path.clone())
                .resolve()
                .with_context(|| format!("loading credentials from {}", path.display()))?;
            firestore.credentials = Some(Credentials::Inline(key));
        }
        if let Some(token) = &self.access_token {
            firestore = firestore.with_access_token(token);
        }
        firestore.validate().map_err(anyhow::Error::msg).context("firestore settings")?;
        Ok(StoreConfig::Firestore(firestore))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_migrate_defaults() {
        let args = ["pseudotable", "--local", "/tmp/t", "migrate", "numbers.json", "phone-test"];
        let cli = Cli::try_parse_from(args).unwrap();
        match cli.command {
            Command::Migrate { prefix, table, .. } => {
                assert_eq!(prefix, "avf-phone-uuid-");
                assert_eq!(table, "phone-test");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(cli.backend.store_config().unwrap(), StoreConfig::Local(_)));
        assert_eq!(cli.backend.table_config().scan_page_size, Config::local().scan_page_size);
    }

    #[test]
    fn test_parse_smoke_defaults() {
        let cli = Cli::try_parse_from(["pseudotable", "smoke-test"]).unwrap();
        match cli.command {
            Command::SmokeTest { table, prefix } => {
                assert_eq!(table, "phone-no-test");
                assert_eq!(prefix, "phone-no-test-");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_emulator_backend() {
        let backend =
            BackendArgs { emulator: Some("localhost:8080".into()), ..BackendArgs::default() };
        match backend.store_config().unwrap() {
            StoreConfig::Firestore(config) => {
                assert_eq!(config.project_id.as_deref(), Some(EMULATOR_PROJECT));
                assert_eq!(config.emulator_host.as_deref(), Some("localhost:8080"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_backend_required() {
        assert!(BackendArgs::default().store_config().is_err());
        let no_token = BackendArgs { project: Some("avf".into()), ..BackendArgs::default() };
        assert!(no_token.store_config().is_err());
    }

    #[test]
    fn test_max_batch_override() {
        let backend = BackendArgs { max_batch_size: Some(50), ..BackendArgs::default() };
        assert_eq!(backend.table_config().max_batch_size, 50);
    }
}
