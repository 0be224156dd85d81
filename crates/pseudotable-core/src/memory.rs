//! In-process document store.
//!
//! `MemoryStore` keeps every document in RAM and counts each call it
//! serves, so callers can assert how many round trips an operation cost.
//! The same [`DocumentTree`] backs the on-disk [`LocalStore`](crate::LocalStore).

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};

use crate::config::DEFAULT_MAX_BATCH_SIZE;
use crate::error::{TableError, TableResult};
use crate::path::{CollectionPath, DocumentPath};
use crate::store::{CreateOutcome, Document, DocumentStore, Fields, Page, Write};

/// Documents grouped by collection, ordered by id.
#[derive(Debug, Default, Clone)]
pub(crate) struct DocumentTree {
    collections: BTreeMap<String, BTreeMap<String, Fields>>,
}

impl DocumentTree {
    pub(crate) fn get(&self, path: &DocumentPath) -> Option<Document> {
        self.collections
            .get(&path.parent().to_string())
            .and_then(|docs| docs.get(path.id()))
            .map(|fields| Document { id: path.id().to_string(), fields: fields.clone() })
    }

    pub(crate) fn contains(&self, path: &DocumentPath) -> bool {
        self.contains_id(&path.parent().to_string(), path.id())
    }

    pub(crate) fn contains_id(&self, collection: &str, id: &str) -> bool {
        self.collections.get(collection).is_some_and(|docs| docs.contains_key(id))
    }

    pub(crate) fn put(&mut self, collection: String, id: String, fields: Fields) {
        self.collections.entry(collection).or_default().insert(id, fields);
    }

    /// Check every `Create` precondition, including duplicates inside `writes`.
    pub(crate) fn check_preconditions(&self, writes: &[Write]) -> TableResult<()> {
        let mut created = std::collections::HashSet::new();
        for write in writes {
            if let Write::Create { path, .. } = write {
                if self.contains(path) || !created.insert(path) {
                    return Err(TableError::Conflict { path: path.to_string() });
                }
            }
        }
        Ok(())
    }

    pub(crate) fn apply(&mut self, writes: Vec<Write>) {
        for write in writes {
            let (path, fields) = match write {
                Write::Set { path, fields } | Write::Create { path, fields } => (path, fields),
            };
            self.put(path.parent().to_string(), path.id().to_string(), fields);
        }
    }

    pub(crate) fn list_page(
        &self,
        collection: &CollectionPath,
        page_size: usize,
        page_token: Option<&str>,
    ) -> Page {
        let Some(docs) = self.collections.get(&collection.to_string()) else {
            return Page::default();
        };
        let lower = match page_token {
            Some(token) => Bound::Excluded(token),
            None => Bound::Unbounded,
        };
        let documents: Vec<Document> = docs
            .range::<str, _>((lower, Bound::Unbounded))
            .take(page_size.max(1))
            .map(|(id, fields)| Document { id: id.clone(), fields: fields.clone() })
            .collect();

        let next_page_token = match documents.last() {
            Some(last) if documents.len() == page_size.max(1) => docs
                .range::<str, _>((Bound::Excluded(last.id.as_str()), Bound::Unbounded))
                .next()
                .map(|_| last.id.clone()),
            _ => None,
        };
        Page { documents, next_page_token }
    }

    pub(crate) fn query_eq(
        &self,
        collection: &CollectionPath,
        field: &str,
        value: &str,
    ) -> Vec<Document> {
        self.collections
            .get(&collection.to_string())
            .map(|docs| {
                docs.iter()
                    .filter(|(_, fields)| fields.get(field).is_some_and(|v| v == value))
                    .map(|(id, fields)| Document { id: id.clone(), fields: fields.clone() })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub(crate) fn document_count(&self) -> usize {
        self.collections.values().map(BTreeMap::len).sum()
    }
}

/// Per-call accounting for a [`MemoryStore`].
#[derive(Debug, Default)]
pub struct StoreStats {
    gets: AtomicU64,
    sets: AtomicU64,
    creates: AtomicU64,
    list_pages: AtomicU64,
    queries: AtomicU64,
    commit_sizes: Mutex<Vec<usize>>,
}

impl StoreStats {
    /// Point reads served.
    pub fn gets(&self) -> u64 {
        self.gets.load(Ordering::Relaxed)
    }

    /// Unconditional single-document writes served.
    pub fn sets(&self) -> u64 {
        self.sets.load(Ordering::Relaxed)
    }

    /// Create-if-absent writes served.
    pub fn creates(&self) -> u64 {
        self.creates.load(Ordering::Relaxed)
    }

    /// Collection pages listed.
    pub fn list_pages(&self) -> u64 {
        self.list_pages.load(Ordering::Relaxed)
    }

    /// Equality queries served.
    pub fn queries(&self) -> u64 {
        self.queries.load(Ordering::Relaxed)
    }

    /// Write count of every successful commit, in order.
    pub fn commit_sizes(&self) -> Vec<usize> {
        self.commit_sizes.lock().clone()
    }

    /// Total store calls of any kind.
    pub fn total_calls(&self) -> u64 {
        self.gets() + self.sets() + self.creates() + self.list_pages() + self.queries()
            + self.commit_sizes.lock().len() as u64
    }
}

/// Document store held entirely in RAM.
///
/// Cloning is not supported; share it behind an `Arc` so several table
/// services observe the same documents, the way separate processes share
/// one remote database.
pub struct MemoryStore {
    tree: RwLock<DocumentTree>,
    stats: StoreStats,
    max_batch_size: usize,
}

impl MemoryStore {
    /// Empty store accepting commits of up to 500 writes.
    pub fn new() -> Self {
        Self::with_max_batch_size(DEFAULT_MAX_BATCH_SIZE)
    }

    /// Empty store with a custom commit limit.
    pub fn with_max_batch_size(max_batch_size: usize) -> Self {
        Self {
            tree: RwLock::new(DocumentTree::default()),
            stats: StoreStats::default(),
            max_batch_size,
        }
    }

    /// Call accounting since construction.
    pub fn stats(&self) -> &StoreStats {
        &self.stats
    }

    /// Number of documents across all collections.
    pub fn document_count(&self) -> usize {
        self.tree.read().document_count()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentStore for MemoryStore {
    fn get(&self, path: &DocumentPath) -> TableResult<Option<Document>> {
        self.stats.gets.fetch_add(1, Ordering::Relaxed);
        Ok(self.tree.read().get(path))
    }

    fn set(&self, path: &DocumentPath, fields: Fields) -> TableResult<()> {
        self.stats.sets.fetch_add(1, Ordering::Relaxed);
        self.tree.write().put(path.parent().to_string(), path.id().to_string(), fields);
        Ok(())
    }

    fn create(&self, path: &DocumentPath, fields: Fields) -> TableResult<CreateOutcome> {
        self.stats.creates.fetch_add(1, Ordering::Relaxed);
        let mut tree = self.tree.write();
        if tree.contains(path) {
            return Ok(CreateOutcome::AlreadyExists);
        }
        tree.put(path.parent().to_string(), path.id().to_string(), fields);
        Ok(CreateOutcome::Created)
    }

    fn list_page(
        &self,
        collection: &CollectionPath,
        page_size: usize,
        page_token: Option<&str>,
    ) -> TableResult<Page> {
        self.stats.list_pages.fetch_add(1, Ordering::Relaxed);
        Ok(self.tree.read().list_page(collection, page_size, page_token))
    }

    fn query_eq(
        &self,
        collection: &CollectionPath,
        field: &str,
        value: &str,
    ) -> TableResult<Vec<Document>> {
        self.stats.queries.fetch_add(1, Ordering::Relaxed);
        Ok(self.tree.read().query_eq(collection, field, value))
    }

    fn commit(&self, writes: Vec<Write>) -> TableResult<()> {
        if writes.len() > self.max_batch_size {
            return Err(TableError::invalid(format!(
                "commit of {} writes exceeds the batch limit of {}",
                writes.len(),
                self.max_batch_size
            )));
        }
        let size = writes.len();
        {
            let mut tree = self.tree.write();
            tree.check_preconditions(&writes)?;
            tree.apply(writes);
        }
        self.stats.commit_sizes.lock().push(size);
        Ok(())
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }
}
