//! The document store boundary.
//!
//! Mapping tables only need a handful of capabilities from their backing
//! store: point reads and writes, a create-if-absent primitive, paginated
//! collection scans, a single-field equality query, and atomic batched
//! commits bounded by a maximum write count.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::DEFAULT_MAX_BATCH_SIZE;
use crate::error::TableResult;
use crate::path::{CollectionPath, DocumentPath};

/// String fields of a document.
pub type Fields = BTreeMap<String, String>;

/// A document read back from a collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Document id within its collection
    pub id: String,
    /// Field values
    pub fields: Fields,
}

impl Document {
    /// Value of a string field.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// Result of a create-if-absent write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    /// The document did not exist and now holds the supplied fields
    Created,
    /// A document was already there; it was left untouched
    AlreadyExists,
}

/// One write inside an atomic commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Write {
    /// Create or replace the document
    Set { path: DocumentPath, fields: Fields },
    /// Create the document; the whole commit fails if it already exists
    Create { path: DocumentPath, fields: Fields },
}

impl Write {
    /// Path written.
    pub fn path(&self) -> &DocumentPath {
        match self {
            Write::Set { path, .. } | Write::Create { path, .. } => path,
        }
    }

    /// Fields written.
    pub fn fields(&self) -> &Fields {
        match self {
            Write::Set { fields, .. } | Write::Create { fields, .. } => fields,
        }
    }
}

/// One page of a collection listing.
#[derive(Debug, Clone, Default)]
pub struct Page {
    /// Documents in id order
    pub documents: Vec<Document>,
    /// Token for the next page, `None` on the last page
    pub next_page_token: Option<String>,
}

/// Capabilities a backing document store must provide.
///
/// All methods block until the store answers. Implementations never retry;
/// a failure is returned to the caller as-is.
pub trait DocumentStore: Send + Sync {
    /// Read one document.
    fn get(&self, path: &DocumentPath) -> TableResult<Option<Document>>;

    /// Create or replace one document.
    fn set(&self, path: &DocumentPath, fields: Fields) -> TableResult<()>;

    /// Create one document unless it already exists.
    fn create(&self, path: &DocumentPath, fields: Fields) -> TableResult<CreateOutcome>;

    /// List up to `page_size` documents of `collection` after `page_token`.
    fn list_page(
        &self,
        collection: &CollectionPath,
        page_size: usize,
        page_token: Option<&str>,
    ) -> TableResult<Page>;

    /// All documents of `collection` whose `field` equals `value`.
    fn query_eq(&self, collection: &CollectionPath, field: &str, value: &str)
        -> TableResult<Vec<Document>>;

    /// Apply `writes` atomically: all of them or none.
    ///
    /// Fails with [`TableError::Conflict`](crate::TableError::Conflict) when a
    /// `Create` targets an existing document, in which case nothing is applied.
    fn commit(&self, writes: Vec<Write>) -> TableResult<()>;

    /// Largest number of writes accepted by one `commit`.
    fn max_batch_size(&self) -> usize {
        DEFAULT_MAX_BATCH_SIZE
    }
}
