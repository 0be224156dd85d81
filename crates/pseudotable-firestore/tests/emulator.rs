//! End-to-end tests against a running Firestore emulator.
//!
//! Skipped unless `FIRESTORE_EMULATOR_HOST` is set, e.g.
//! `gcloud emulators firestore start --host-port=localhost:8080`.

use std::collections::BTreeMap;

use pseudotable_core::{Config, TableError, TableRegistry};
use pseudotable_firestore::{open_registry, FirestoreConfig, StoreConfig};

fn emulator_registry(max_batch_size: usize) -> Option<TableRegistry> {
    let firestore = FirestoreConfig::emulator_from_env("pseudotable-test")?;
    let config = Config::firestore().with_max_batch_size(max_batch_size);
    Some(open_registry(StoreConfig::Firestore(firestore), config).unwrap())
}

fn unique_table(label: &str) -> String {
    format!("{}-{}", label, pseudotable_core::id::generate(""))
}

#[test]
fn test_emulator_round_trip() {
    let Some(registry) = emulator_registry(500) else {
        eprintln!("FIRESTORE_EMULATOR_HOST not set, skipping");
        return;
    };
    let name = unique_table("phone-test");
    let table = registry.open_table(&name, "avf-phone-uuid-").unwrap();

    let a = table.get_or_create("+254700000001").unwrap();
    assert_eq!(table.get_or_create("+254700000001").unwrap(), a);
    assert_eq!(table.lookup_datum(&a).unwrap(), "+254700000001");
    assert!(matches!(
        table.lookup_datum("avf-phone-uuid-missing"),
        Err(TableError::NotFound { .. })
    ));
    assert!(registry.list_tables().unwrap().contains(&name));
}

#[test]
fn test_emulator_batch_chunks_and_reopen() {
    let Some(registry) = emulator_registry(7) else {
        eprintln!("FIRESTORE_EMULATOR_HOST not set, skipping");
        return;
    };
    let name = unique_table("batch");
    let table = registry.open_table(&name, "b-").unwrap();
    let data: Vec<String> = (0..20).map(|i| format!("Test lookup {}", i)).collect();
    let first = table.get_or_create_batch(data.clone()).unwrap();
    assert_eq!(first.len(), 20);

    let reopened = registry.open_table(&name, "b-").unwrap();
    assert_eq!(reopened.get_or_create_batch(data).unwrap(), first);

    let ids: Vec<String> = first.values().cloned().collect();
    let reverse: BTreeMap<String, String> = reopened.lookup_data_batch(ids).unwrap();
    assert_eq!(reverse.len(), 20);
}

#[test]
fn test_emulator_import_leaves_existing() {
    let Some(registry) = emulator_registry(500) else {
        eprintln!("FIRESTORE_EMULATOR_HOST not set, skipping");
        return;
    };
    let table = registry.open_table(&unique_table("import"), "i-").unwrap();
    let existing = table.get_or_create("kept").unwrap();

    let mappings = BTreeMap::from([
        ("kept".to_string(), "i-other".to_string()),
        ("new".to_string(), "i-new".to_string()),
    ]);
    let report = registry.set_mappings(&table, mappings).unwrap();
    assert_eq!(report.written, 1);
    assert_eq!(report.conflicting.len(), 1);
    assert_eq!(table.get_or_create("kept").unwrap(), existing);
}
