//! Pseudotable command-line tools
//!
//! Subcommands are plain functions over a [`TableRegistry`](pseudotable_core::TableRegistry)
//! so they run the same against Firestore, a local store, or memory.

pub mod cli;
pub mod migrate;
pub mod smoke;

use pseudotable_core::TableRegistry;
use pseudotable_firestore::open_registry;

use crate::cli::{Cli, Command};

/// Execute one parsed command line.
pub fn run(cli: Cli) -> anyhow::Result<()> {
    let store = cli.backend.store_config()?;
    let registry = open_registry(store, cli.backend.table_config())?;
    execute(&registry, cli.command)
}

/// Run `command` against `registry`, printing results to stdout.
pub fn execute(registry: &TableRegistry, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Migrate { mappings, table, prefix } => {
            let report = migrate::migrate(registry, &mappings, &table, &prefix)?;
            println!(
                "written: {}, already present: {}, conflicting: {}",
                report.written,
                report.already_present,
                report.conflicting.len()
            );
            for datum in &report.conflicting {
                println!("conflict: {}", datum);
            }
        }
        Command::SmokeTest { table, prefix } => {
            let report = smoke::run(registry, &table, &prefix)?;
            println!("{:?}", report);
        }
        Command::ListTables => {
            for name in registry.list_tables()? {
                println!("{}", name);
            }
        }
        Command::Lookup { table, prefix, datum } => {
            println!("{}", registry.open_table(&table, &prefix)?.get_or_create(&datum)?);
        }
        Command::Reverse { table, prefix, identifier } => {
            println!("{}", registry.open_table(&table, &prefix)?.lookup_datum(&identifier)?);
        }
    }
    Ok(())
}
