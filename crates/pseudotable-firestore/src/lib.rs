//! Pseudotable Firestore backend
//!
//! [`FirestoreStore`] implements [`DocumentStore`] over the Cloud Firestore
//! REST API, and [`open_registry`] turns a [`StoreConfig`] into a ready
//! [`TableRegistry`] for any of the supported backends.
//!
//! ```no_run
//! use pseudotable_core::Config;
//! use pseudotable_firestore::{open_registry, Credentials, FirestoreConfig, StoreConfig};
//!
//! let firestore = FirestoreConfig::with_credentials(Credentials::File("key.json".into()))
//!     .with_access_token("ya29.example");
//! let registry = open_registry(StoreConfig::Firestore(firestore), Config::firestore())?;
//! let table = registry.open_table("phone-test", "avf-phone-uuid-")?;
//! let id = table.get_or_create("+254700000000")?;
//! # Ok::<(), pseudotable_core::TableError>(())
//! ```

pub mod config;
pub mod credentials;
pub mod error;
pub mod store;
pub mod value;

use std::path::PathBuf;
use std::sync::Arc;

use pseudotable_core::{Config, DocumentStore, LocalStore, MemoryStore, TableRegistry, TableResult};

pub use config::{FirestoreConfig, DEFAULT_DATABASE, EMULATOR_HOST_ENV};
pub use credentials::{Credentials, ServiceAccountKey};
pub use error::FirestoreError;
pub use store::FirestoreStore;

/// Which backend a registry talks to.
#[derive(Debug, Clone)]
pub enum StoreConfig {
    /// Process-local, lost on exit
    Memory,
    /// Durable commit log in a directory
    Local(PathBuf),
    Firestore(FirestoreConfig),
}

/// Open the store `store` describes.
pub fn open_store(store: StoreConfig, config: &Config) -> TableResult<Arc<dyn DocumentStore>> {
    Ok(match store {
        StoreConfig::Memory => Arc::new(MemoryStore::with_max_batch_size(config.max_batch_size)),
        StoreConfig::Local(dir) => Arc::new(LocalStore::open(dir, config.clone())?),
        StoreConfig::Firestore(firestore) => Arc::new(FirestoreStore::connect(&firestore)?),
    })
}

/// Open the store and wrap it in a registry.
pub fn open_registry(store: StoreConfig, config: Config) -> TableResult<TableRegistry> {
    config.validate().map_err(pseudotable_core::TableError::invalid)?;
    let store = open_store(store, &config)?;
    TableRegistry::new(store, config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_memory_registry() {
        let registry = open_registry(StoreConfig::Memory, Config::default()).unwrap();
        let table = registry.open_table("phone-test", "avf-phone-uuid-").unwrap();
        let id = table.get_or_create("+254700000000").unwrap();
        assert!(id.starts_with("avf-phone-uuid-"));
        assert_eq!(registry.list_tables().unwrap(), vec!["phone-test".to_string()]);
    }

    #[test]
    fn test_open_local_registry_persists() {
        let dir = tempfile::tempdir().unwrap();
        let local = || StoreConfig::Local(dir.path().to_path_buf());
        let id = {
            let registry = open_registry(local(), Config::local()).unwrap();
            registry.open_table("ids", "id-").unwrap().get_or_create("alice").unwrap()
        };
        let registry = open_registry(local(), Config::local()).unwrap();
        assert_eq!(registry.open_table("ids", "id-").unwrap().lookup_datum(&id).unwrap(), "alice");
    }

    #[test]
    fn test_bad_firestore_config_is_invalid_argument() {
        let config = StoreConfig::Firestore(FirestoreConfig::default());
        let err = open_registry(config, Config::default()).unwrap_err();
        assert!(matches!(err, pseudotable_core::TableError::InvalidArgument { .. }));
    }
}
