//! Bulk import of an existing datum -> identifier table.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{bail, Context};
use pseudotable_core::{ImportReport, TableRegistry};
use serde_json::Value;
use tracing::info;

/// Read a mappings file.
///
/// Accepts a flat JSON object `{datum: identifier}`, or the same object
/// wrapped as `{"table": {...}}`.
pub fn read_mappings(path: &Path) -> anyhow::Result<BTreeMap<String, String>> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let value: Value =
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;

    let wrapped = |map: &serde_json::Map<String, Value>| {
        map.len() == 1 && map.get("table").map_or(false, Value::is_object)
    };
    let object = match value {
        Value::Object(mut map) if wrapped(&map) => match map.remove("table") {
            Some(Value::Object(inner)) => inner,
            _ => bail!("{}: malformed table wrapper", path.display()),
        },
        Value::Object(map) => map,
        _ => bail!("{}: expected a JSON object of datum -> identifier", path.display()),
    };

    object
        .into_iter()
        .map(|(datum, identifier)| match identifier {
            Value::String(identifier) => Ok((datum, identifier)),
            other => {
                bail!("{}: identifier for {:?} is not a string: {}", path.display(), datum, other)
            }
        })
        .collect()
}

/// Import `path` into `table`, creating the table if needed.
pub fn migrate(
    registry: &TableRegistry,
    path: &Path,
    table: &str,
    prefix: &str,
) -> anyhow::Result<ImportReport> {
    let mappings = read_mappings(path)?;
    info!(file = %path.display(), mappings = mappings.len(), "loaded mappings");

    let target = registry
        .open_table(table, prefix)
        .with_context(|| format!("opening table {}", table))?;
    let report = registry
        .set_mappings(&target, mappings)
        .with_context(|| format!("importing into {}", table))?;
    info!(table, written = report.written, "migration complete");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Arc;

    use pseudotable_core::{Config, MemoryStore};

    fn file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_read_flat_and_wrapped() {
        let flat = file(r#"{"+254700000001": "avf-phone-uuid-1"}"#);
        let wrapped = file(r#"{"table": {"+254700000001": "avf-phone-uuid-1"}}"#);
        assert_eq!(read_mappings(flat.path()).unwrap(), read_mappings(wrapped.path()).unwrap());
    }

    #[test]
    fn test_read_rejects_non_strings() {
        assert!(read_mappings(file(r#"{"a": 1}"#).path()).is_err());
        assert!(read_mappings(file("[]").path()).is_err());
        assert!(read_mappings(file("not json").path()).is_err());
    }

    #[test]
    fn test_migrate_twice_is_stable() {
        let registry = TableRegistry::new(Arc::new(MemoryStore::new()), Config::default()).unwrap();
        let input =
            file(r#"{"+254700000001": "avf-phone-uuid-1", "+254700000002": "avf-phone-uuid-2"}"#);

        let first = migrate(&registry, input.path(), "phone-test", "avf-phone-uuid-").unwrap();
        assert_eq!(first.written, 2);
        let second = migrate(&registry, input.path(), "phone-test", "avf-phone-uuid-").unwrap();
        assert_eq!(second.written, 0);
        assert_eq!(second.already_present, 2);

        let table = registry.open_table("phone-test", "avf-phone-uuid-").unwrap();
        assert_eq!(table.lookup_datum("avf-phone-uuid-2").unwrap(), "+254700000002");
    }

    #[test]
    fn test_migrate_rejects_foreign_prefix() {
        let registry = TableRegistry::new(Arc::new(MemoryStore::new()), Config::default()).unwrap();
        let input = file(r#"{"+254700000001": "other-1"}"#);
        assert!(migrate(&registry, input.path(), "phone-test", "avf-phone-uuid-").is_err());
    }
}
