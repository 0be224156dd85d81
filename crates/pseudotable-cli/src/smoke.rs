//! End-to-end smoke test against a live table.
//!
//! Creates and reads back mappings in a scratch table: single lookups,
//! a reverse miss, repeated batches mixing known and fresh data, and a
//! reverse batch with an unknown identifier.

use std::collections::BTreeMap;

use anyhow::{ensure, Context};
use pseudotable_core::{id, TableError, TableRegistry};
use tracing::info;

/// Identifier no table ever mints.
const ABSENT_IDENTIFIER: &str = "_______ Not present UUID";

/// Counts of what the smoke test touched.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SmokeReport {
    pub single_lookups: usize,
    pub batch_lookups: usize,
    pub reverse_lookups: usize,
}

pub fn run(registry: &TableRegistry, table: &str, prefix: &str) -> anyhow::Result<SmokeReport> {
    let table = registry.open_table(table, prefix).context("opening smoke-test table")?;
    let mut report = SmokeReport::default();

    info!("testing addition and lookup");
    for i in 0..10 {
        let datum = format!("Test lookup-{}", i);
        let identifier = table.get_or_create(&datum)?;
        let readback = table.lookup_datum(&identifier)?;
        ensure!(readback == datum, "readback of {} gave {:?}", identifier, readback);
        info!(datum = %datum, identifier = %identifier, "round trip ok");
        report.single_lookups += 1;
        report.reverse_lookups += 1;
    }

    info!("testing lookup failure");
    match table.lookup_datum(ABSENT_IDENTIFIER) {
        Err(TableError::NotFound { .. }) => info!("lookup failed as expected"),
        Ok(datum) => anyhow::bail!("lookup of an absent identifier returned {:?}", datum),
        Err(err) => return Err(err.into()),
    }

    info!("testing batch lookup");
    let run_1 = id::generate("");
    let run_2 = id::generate("");
    let batch = |run: &str| {
        vec![
            "Test lookup-1".to_string(),
            "Test lookup-2".to_string(),
            format!("Test lookup-{}", run),
            format!("Test lookup-2-{}", run),
        ]
    };
    let mapping_1 = table.get_or_create_batch(batch(&run_1))?;
    let mapping_2 = table.get_or_create_batch(batch(&run_2))?;
    report.batch_lookups += mapping_1.len() + mapping_2.len();

    let known = |key: &str| -> anyhow::Result<bool> {
        Ok(identifier(&mapping_1, key)? == identifier(&mapping_2, key)?)
    };
    ensure!(known("Test lookup-1")? && known("Test lookup-2")?, "known datum changed identifier");
    for pattern in ["Test lookup-", "Test lookup-2-"] {
        let first = identifier(&mapping_1, &format!("{}{}", pattern, run_1))?;
        let second = identifier(&mapping_2, &format!("{}{}", pattern, run_2))?;
        ensure!(first != second, "fresh data share identifier {}", first);
    }

    info!("testing reverse batch lookup");
    let id_1 = table.get_or_create("Test lookup-1")?;
    let id_2 = table.get_or_create("Test lookup-2")?;
    let queried = vec![id_1.clone(), id_2.clone(), "This won't be a uuid".to_string()];
    let reverse = table.lookup_data_batch(queried)?;
    ensure!(reverse.len() == 2, "expected 2 reverse matches, got {}", reverse.len());
    for (id, datum) in [(&id_1, "Test lookup-1"), (&id_2, "Test lookup-2")] {
        ensure!(reverse.get(id).map(String::as_str) == Some(datum), "reverse of {} wrong", id);
    }
    report.reverse_lookups += reverse.len();

    info!(table = %table.name(), "smoke test passed");
    Ok(report)
}

fn identifier<'a>(mapping: &'a BTreeMap<String, String>, datum: &str) -> anyhow::Result<&'a str> {
    mapping
        .get(datum)
        .map(String::as_str)
        .ok_or_else(|| anyhow::anyhow!("batch result is missing {:?}", datum))
}
