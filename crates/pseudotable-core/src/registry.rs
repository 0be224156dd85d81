//! Table registry: the named tables under one store connection.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::warn;

use crate::config::Config;
use crate::error::{TableError, TableResult};
use crate::path::{CollectionPath, TABLE_NAME_FIELD};
use crate::store::DocumentStore;
use crate::table::{ImportReport, MappingTable};

/// Entry point for callers: lists tables and hands out table services.
///
/// Each opened table holds its own handle to the shared store and its own
/// cache.
pub struct TableRegistry {
    store: Arc<dyn DocumentStore>,
    config: Config,
}

impl TableRegistry {
    /// Registry over `store`.
    pub fn new(store: Arc<dyn DocumentStore>, config: Config) -> TableResult<Self> {
        config.validate().map_err(TableError::invalid)?;
        Ok(Self { store, config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The shared store connection.
    pub fn store(&self) -> Arc<dyn DocumentStore> {
        Arc::clone(&self.store)
    }

    /// Names of every table with a marker document, sorted.
    pub fn list_tables(&self) -> TableResult<Vec<String>> {
        let tables = CollectionPath::tables();
        let mut names = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let page = self.store.list_page(&tables, self.config.scan_page_size, token.as_deref())?;
            for doc in page.documents {
                if let Some(name) = doc.field(TABLE_NAME_FIELD) {
                    if name != doc.id {
                        warn!(
                            marker = %doc.id,
                            table_name = %name,
                            "table marker name differs from its id"
                        );
                    }
                }
                names.push(doc.id);
            }
            match page.next_page_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }
        names.sort();
        Ok(names)
    }

    /// Service for table `name`, creating its marker if absent.
    pub fn open_table(&self, name: &str, prefix: &str) -> TableResult<MappingTable> {
        let table = MappingTable::new(Arc::clone(&self.store), name, prefix, &self.config)?;
        table.client().ensure_marker()?;
        Ok(table)
    }

    /// Administrative bulk import into `table`.
    ///
    /// See [`MappingTable::import_mappings`].
    pub fn set_mappings(
        &self,
        table: &MappingTable,
        mappings: BTreeMap<String, String>,
    ) -> TableResult<ImportReport> {
        table.import_mappings(mappings)
    }
}

impl std::fmt::Debug for TableRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableRegistry").field("config", &self.config).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    fn registry() -> (TableRegistry, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (TableRegistry::new(store.clone(), Config::default()).unwrap(), store)
    }

    #[test]
    fn test_open_creates_marker_once() {
        let (registry, _store) = registry();
        assert!(registry.list_tables().unwrap().is_empty());
        registry.open_table("phone-test", "avf-phone-uuid-").unwrap();
        registry.open_table("phone-test", "avf-phone-uuid-").unwrap();
        registry.open_table("ids", "id-").unwrap();
        assert_eq!(
            registry.list_tables().unwrap(),
            vec!["ids".to_string(), "phone-test".to_string()]
        );
    }

    #[test]
    fn test_open_rejects_bad_name() {
        let (registry, store) = registry();
        assert!(matches!(registry.open_table("", "p-"), Err(TableError::InvalidArgument { .. })));
        assert!(matches!(
            registry.open_table("a/b", "p-"),
            Err(TableError::InvalidArgument { .. })
        ));
        assert_eq!(store.document_count(), 0);
    }

    #[test]
    fn test_tables_are_disjoint() {
        let (registry, _store) = registry();
        let phones = registry.open_table("phones", "phone-").unwrap();
        let ids = registry.open_table("ids", "id-").unwrap();
        let a = phones.get_or_create("shared").unwrap();
        let b = ids.get_or_create("shared").unwrap();
        assert_ne!(a, b);
        assert!(a.starts_with("phone-"));
        assert!(b.starts_with("id-"));
        assert!(matches!(ids.lookup_datum(&a), Err(TableError::NotFound { .. })));
    }

    #[test]
    fn test_set_mappings_imports() {
        let (registry, _store) = registry();
        let table = registry.open_table("phone-test", "avf-phone-uuid-").unwrap();
        let report = registry
            .set_mappings(
                &table,
                BTreeMap::from([("+254700000001".to_string(), "avf-phone-uuid-1".to_string())]),
            )
            .unwrap();
        assert_eq!(report.written, 1);
        assert_eq!(table.lookup_datum("avf-phone-uuid-1").unwrap(), "+254700000001");
    }

    #[test]
    fn test_invalid_config_rejected() {
        let store = Arc::new(MemoryStore::new());
        assert!(TableRegistry::new(store, Config::default().with_max_batch_size(0)).is_err());
    }
}
