//! Remote table client: one named table's reads and writes against the store.
//!
//! Mapping records live at `tables/<table>/mappings/<datum>` with a single
//! `uuid` field. New records are always written with a must-not-exist
//! precondition, so the client never overwrites an existing mapping.

use std::sync::Arc;

use hashbrown::HashMap;
use tracing::{debug, info, warn};

use crate::error::{TableError, TableResult};
use crate::path::{CollectionPath, DocumentPath, TABLE_NAME_FIELD, UUID_FIELD};
use crate::store::{CreateOutcome, Document, DocumentStore, Fields, Write};

/// A record already present when the client went to create it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistingRecord {
    pub datum: String,
    /// Identifier found in the store
    pub identifier: String,
    /// Identifier the caller wanted to write
    pub candidate: String,
}

/// What a checked chunked write did.
#[derive(Debug, Default)]
pub struct WriteOutcome {
    /// Records committed by this call
    pub written: Vec<(String, String)>,
    /// Records found during the per-key check and left untouched
    pub existing: Vec<ExistingRecord>,
    /// Number of commits issued
    pub commits: usize,
}

/// Client for one table's mapping records.
pub struct TableClient {
    store: Arc<dyn DocumentStore>,
    table: String,
    mappings: CollectionPath,
    chunk_size: usize,
    page_size: usize,
}

impl TableClient {
    /// Bind to `table`. Chunks never exceed the store's own batch limit.
    pub fn new(
        store: Arc<dyn DocumentStore>,
        table: &str,
        max_batch_size: usize,
        page_size: usize,
    ) -> Self {
        let chunk_size = max_batch_size.min(store.max_batch_size()).max(1);
        Self {
            store,
            table: table.to_string(),
            mappings: CollectionPath::mappings(table),
            chunk_size,
            page_size,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Writes per commit.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Create the table's marker document if absent.
    pub fn ensure_marker(&self) -> TableResult<()> {
        let fields = Fields::from([(TABLE_NAME_FIELD.to_string(), self.table.clone())]);
        match self.store.create(&DocumentPath::table_marker(&self.table), fields)? {
            CreateOutcome::Created => info!(table = %self.table, "created table"),
            CreateOutcome::AlreadyExists => debug!(table = %self.table, "table already exists"),
        }
        Ok(())
    }

    /// Identifier stored for `datum`: one point read.
    pub fn get(&self, datum: &str) -> TableResult<Option<String>> {
        let path = self.mappings.doc(datum);
        match self.store.get(&path)? {
            Some(doc) => self.identifier_of(&doc).map(Some),
            None => Ok(None),
        }
    }

    /// Create the record for `datum` unless one exists.
    pub fn create(&self, datum: &str, identifier: &str) -> TableResult<CreateOutcome> {
        let fields = Fields::from([(UUID_FIELD.to_string(), identifier.to_string())]);
        self.store.create(&self.mappings.doc(datum), fields)
    }

    /// Every record of the table, read page by page.
    pub fn scan(&self) -> TableResult<HashMap<String, String>> {
        let mut mappings = HashMap::new();
        let mut token: Option<String> = None;
        let mut pages = 0usize;
        loop {
            let page = self.store.list_page(&self.mappings, self.page_size, token.as_deref())?;
            pages += 1;
            for doc in page.documents {
                match doc.field(UUID_FIELD) {
                    Some(id) => {
                        mappings.insert(doc.id.clone(), id.to_string());
                    }
                    None => {
                        warn!(table = %self.table, datum = %doc.id, "mapping record has no uuid")
                    }
                }
            }
            match page.next_page_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }
        debug!(table = %self.table, records = mappings.len(), pages, "scanned table");
        Ok(mappings)
    }

    /// Data whose record carries `identifier`.
    pub fn find_by_identifier(&self, identifier: &str) -> TableResult<Vec<String>> {
        let docs = self.store.query_eq(&self.mappings, UUID_FIELD, identifier)?;
        Ok(docs.into_iter().map(|doc| doc.id).collect())
    }

    /// Check each candidate against the store, then commit the absent ones in chunks.
    ///
    /// Every candidate gets a point read first; a record found there is
    /// reported in `existing` and never overwritten. Absent candidates are
    /// committed with a must-not-exist precondition, a chunk at a time as
    /// chunks fill, the remainder last.
    ///
    /// Any failure is returned as [`TableError::PartialWrite`] listing every
    /// candidate not confirmed written. Committed chunks stay committed.
    pub fn write_if_absent(&self, candidates: Vec<(String, String)>) -> TableResult<WriteOutcome> {
        let total = candidates.len();
        let mut outcome = WriteOutcome::default();
        let mut pending: Vec<(String, String)> = Vec::with_capacity(self.chunk_size.min(total));
        let mut remaining = candidates.into_iter();

        while let Some((datum, candidate)) = remaining.next() {
            let step = self.get(&datum).and_then(|found| match found {
                Some(identifier) => {
                    outcome.existing.push(ExistingRecord {
                        datum: datum.clone(),
                        identifier,
                        candidate: candidate.clone(),
                    });
                    Ok(())
                }
                None => {
                    pending.push((datum.clone(), candidate.clone()));
                    if pending.len() >= self.chunk_size {
                        self.commit_chunk(&mut pending, &mut outcome, total)
                    } else {
                        Ok(())
                    }
                }
            });

            if let Err(source) = step {
                // The failed datum is either still pending or was never checked.
                let mut unconfirmed: Vec<String> = pending.into_iter().map(|(d, _)| d).collect();
                let adopted = outcome.existing.iter().any(|e| e.datum == datum);
                if !unconfirmed.contains(&datum) && !adopted {
                    unconfirmed.push(datum);
                }
                unconfirmed.extend(remaining.map(|(d, _)| d));
                return Err(self.partial_failure(outcome.written.len(), unconfirmed, source));
            }
        }

        if !pending.is_empty() {
            if let Err(source) = self.commit_chunk(&mut pending, &mut outcome, total) {
                let unconfirmed = pending.into_iter().map(|(d, _)| d).collect();
                return Err(self.partial_failure(outcome.written.len(), unconfirmed, source));
            }
        }

        Ok(outcome)
    }

    fn commit_chunk(
        &self,
        pending: &mut Vec<(String, String)>,
        outcome: &mut WriteOutcome,
        total: usize,
    ) -> TableResult<()> {
        let writes = pending
            .iter()
            .map(|(datum, identifier)| Write::Create {
                path: self.mappings.doc(datum),
                fields: Fields::from([(UUID_FIELD.to_string(), identifier.clone())]),
            })
            .collect();
        self.store.commit(writes)?;

        let count = pending.len();
        outcome.written.append(pending);
        outcome.commits += 1;
        info!(
            table = %self.table,
            batch = count,
            progress = outcome.written.len() + outcome.existing.len(),
            total,
            "committed mapping batch"
        );
        Ok(())
    }

    fn partial_failure(
        &self,
        committed: usize,
        unconfirmed: Vec<String>,
        source: TableError,
    ) -> TableError {
        warn!(
            table = %self.table,
            committed,
            unconfirmed = unconfirmed.len(),
            error = %source,
            "batch write stopped"
        );
        TableError::PartialWrite {
            table: self.table.clone(),
            committed,
            unconfirmed,
            source: Box::new(source),
        }
    }

    fn identifier_of(&self, doc: &Document) -> TableResult<String> {
        doc.field(UUID_FIELD).map(str::to_string).ok_or_else(|| TableError::Corrupted {
            table: self.table.clone(),
            reason: format!("mapping record {:?} has no {} field", doc.id, UUID_FIELD),
        })
    }
}

impl std::fmt::Debug for TableClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableClient")
            .field("table", &self.table)
            .field("chunk_size", &self.chunk_size)
            .finish()
    }
}
