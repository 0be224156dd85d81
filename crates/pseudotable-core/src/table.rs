//! Mapping table service: forward and reverse lookups with creation.
//!
//! MappingTable combines the remote table client, the in-process cache and
//! the identifier generator.
//!
//! **Single forward**: one point read, and on a miss one conditional create.
//! The cache is not involved.
//! **Batch forward**: cache fast path, else a base snapshot (one scan when the
//! cache is empty, the cache itself otherwise), then a per-key store check
//! before every new identifier is committed.
//! **Reverse**: equality query for one identifier, reverse index or scan for
//! many.
//!
//! The cache only ever answers questions that were already resolved; a new
//! identifier is minted only after the store itself says the datum is absent.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::cache::MappingCache;
use crate::client::{TableClient, WriteOutcome};
use crate::config::Config;
use crate::error::{TableError, TableResult};
use crate::id;
use crate::path::{validate_segment, DocumentPath};
use crate::store::{CreateOutcome, DocumentStore};

/// Summary of an administrative bulk import.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportReport {
    /// Records created by the import
    pub written: usize,
    /// Data already mapped to the supplied identifier
    pub already_present: usize,
    /// Data already mapped to a different identifier, left untouched
    pub conflicting: Vec<String>,
}

/// One table's pseudonymization service.
///
/// All methods take `&self`; the cache sits behind a `RwLock` so the service
/// can be shared in an `Arc`. The lock is never held across a store call.
pub struct MappingTable {
    client: TableClient,
    prefix: String,
    cache: RwLock<MappingCache>,
}

impl MappingTable {
    /// Service for `table` minting identifiers under `prefix`.
    ///
    /// Does not touch the store; use
    /// [`TableRegistry::open_table`](crate::TableRegistry::open_table) to
    /// also create the table marker.
    pub fn new(
        store: Arc<dyn DocumentStore>,
        table: &str,
        prefix: &str,
        config: &Config,
    ) -> TableResult<Self> {
        validate_segment("table name", table)?;
        config.validate().map_err(TableError::invalid)?;
        Ok(Self {
            client: TableClient::new(store, table, config.max_batch_size, config.scan_page_size),
            prefix: prefix.to_string(),
            cache: RwLock::new(MappingCache::new()),
        })
    }

    pub fn name(&self) -> &str {
        self.client.table()
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Number of mappings currently cached.
    pub fn cached_len(&self) -> usize {
        self.cache.read().len()
    }

    pub(crate) fn client(&self) -> &TableClient {
        &self.client
    }

    /// Identifier for `datum`, minting and persisting one if none exists.
    ///
    /// Costs one point read, plus one conditional create on a miss. When a
    /// concurrent writer creates the record between the two, its identifier
    /// is read back and returned instead of ours.
    pub fn get_or_create(&self, datum: &str) -> TableResult<String> {
        validate_segment("datum", datum)?;

        if let Some(identifier) = self.client.get(datum)? {
            return Ok(identifier);
        }

        let candidate = id::generate(&self.prefix);
        match self.client.create(datum, &candidate)? {
            CreateOutcome::Created => {
                debug!(table = %self.name(), "created mapping");
                Ok(candidate)
            }
            CreateOutcome::AlreadyExists => {
                debug!(table = %self.name(), "lost creation race, adopting existing mapping");
                self.client.get(datum)?.ok_or_else(|| TableError::Conflict {
                    path: DocumentPath::mapping(self.name(), datum).to_string(),
                })
            }
        }
    }

    /// Identifiers for every datum in `data`, minting where needed.
    ///
    /// Returns exactly one entry per distinct datum. A failure while writing
    /// new records is a [`TableError::PartialWrite`]; calling again with the
    /// same data is safe.
    pub fn get_or_create_batch<I, S>(&self, data: I) -> TableResult<BTreeMap<String, String>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let requested: BTreeSet<String> = data.into_iter().map(Into::into).collect();
        for datum in &requested {
            validate_segment("datum", datum)?;
        }

        // Fast path: everything already resolved in this process.
        {
            let cache = self.cache.read();
            if cache.covers_data(&requested) {
                return Ok(select_forward(&cache, &requested));
            }
        }

        // Base snapshot: a fresh scan when nothing is cached, else the cache.
        let scanned = if self.cache.read().is_empty() {
            Some(MappingCache::from_snapshot(self.client.scan()?))
        } else {
            None
        };

        let needed: Vec<(String, String)> = {
            let cache = self.cache.read();
            let base = scanned.as_ref().unwrap_or(&*cache);
            requested
                .iter()
                .filter(|d| !base.contains_datum(d))
                .map(|d| (d.clone(), id::generate(&self.prefix)))
                .collect()
        };
        debug!(
            table = %self.name(),
            requested = requested.len(),
            needed = needed.len(),
            "batch lookup"
        );

        let outcome = if needed.is_empty() {
            WriteOutcome::default()
        } else {
            match self.client.write_if_absent(needed) {
                Ok(outcome) => outcome,
                Err(e) => {
                    if let Some(base) = scanned {
                        *self.cache.write() = base;
                    }
                    return Err(e);
                }
            }
        };
        if !outcome.existing.is_empty() {
            info!(
                table = %self.name(),
                adopted = outcome.existing.len(),
                "adopted mappings created concurrently"
            );
        }

        let mut cache = self.cache.write();
        if let Some(base) = scanned {
            *cache = base;
        }
        cache.extend(outcome.written);
        cache.extend(outcome.existing.into_iter().map(|e| (e.datum, e.identifier)));

        let result = select_forward(&cache, &requested);
        if result.len() != requested.len() {
            return Err(TableError::Corrupted {
                table: self.name().to_string(),
                reason: "batch result does not cover every requested datum".into(),
            });
        }
        Ok(result)
    }

    /// The datum whose record carries `identifier`.
    pub fn lookup_datum(&self, identifier: &str) -> TableResult<String> {
        let mut data = self.client.find_by_identifier(identifier)?;
        match data.len() {
            0 => Err(TableError::NotFound {
                table: self.name().to_string(),
                identifier: identifier.to_string(),
            }),
            1 => Ok(data.remove(0)),
            _ => Err(TableError::Corrupted {
                table: self.name().to_string(),
                reason: format!(
                    "identifier {} is mapped to {} data: {:?}",
                    identifier,
                    data.len(),
                    data
                ),
            }),
        }
    }

    /// Data for the known identifiers among `identifiers`.
    ///
    /// Unknown identifiers are left out of the result, not reported as errors.
    pub fn lookup_data_batch<I, S>(&self, identifiers: I) -> TableResult<BTreeMap<String, String>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let requested: BTreeSet<String> = identifiers.into_iter().map(Into::into).collect();

        {
            let cache = self.cache.read();
            if cache.covers_identifiers(&requested) {
                return Ok(select_reverse(&cache, &requested));
            }
        }

        let refreshed = MappingCache::from_snapshot(self.client.scan()?);
        let mut cache = self.cache.write();
        *cache = refreshed;
        let result = select_reverse(&cache, &requested);
        if result.len() < requested.len() {
            debug!(
                table = %self.name(),
                missing = requested.len() - result.len(),
                "unknown identifiers omitted"
            );
        }
        Ok(result)
    }

    /// Administrative bulk import of externally-held mappings.
    ///
    /// Every identifier must carry this table's prefix and belong to one
    /// datum only; otherwise nothing is written. Data that already have a
    /// record are never overwritten.
    pub fn import_mappings(&self, mappings: BTreeMap<String, String>) -> TableResult<ImportReport> {
        let mut owners: BTreeMap<&str, &str> = BTreeMap::new();
        for (datum, identifier) in &mappings {
            validate_segment("datum", datum)?;
            if !id::has_prefix(identifier, &self.prefix) {
                return Err(TableError::invalid(format!(
                    "identifier {:?} for {:?} does not start with the table prefix {:?}",
                    identifier, datum, self.prefix
                )));
            }
            if let Some(other) = owners.insert(identifier, datum) {
                return Err(TableError::invalid(format!(
                    "identifier {:?} is assigned to both {:?} and {:?}",
                    identifier, other, datum
                )));
            }
        }

        let outcome = self.client.write_if_absent(mappings.into_iter().collect())?;

        let mut report = ImportReport { written: outcome.written.len(), ..ImportReport::default() };
        for existing in &outcome.existing {
            if existing.identifier == existing.candidate {
                report.already_present += 1;
            } else {
                warn!(
                    table = %self.name(),
                    datum = %existing.datum,
                    "import skipped datum already mapped to a different identifier"
                );
                report.conflicting.push(existing.datum.clone());
            }
        }

        let mut cache = self.cache.write();
        if !cache.is_empty() {
            cache.extend(outcome.written);
            cache.extend(outcome.existing.into_iter().map(|e| (e.datum, e.identifier)));
        }

        info!(
            table = %self.name(),
            written = report.written,
            already_present = report.already_present,
            conflicting = report.conflicting.len(),
            "import complete"
        );
        Ok(report)
    }
}

fn select_forward(cache: &MappingCache, requested: &BTreeSet<String>) -> BTreeMap<String, String> {
    requested
        .iter()
        .filter_map(|d| cache.identifier(d).map(|id| (d.clone(), id.to_string())))
        .collect()
}

fn select_reverse(cache: &MappingCache, requested: &BTreeSet<String>) -> BTreeMap<String, String> {
    requested
        .iter()
        .filter_map(|id| cache.datum(id).map(|d| (id.clone(), d.to_string())))
        .collect()
}

impl std::fmt::Debug for MappingTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappingTable")
            .field("table", &self.name())
            .field("prefix", &self.prefix)
            .field("cached", &self.cached_len())
            .finish()
    }
}
