//! Hierarchical document addressing.
//!
//! The store is a tree of collections and documents:
//! `tables/<table>` holds a table's marker document and
//! `tables/<table>/mappings/<datum>` holds one mapping record.

use std::fmt;

use crate::error::{TableError, TableResult};

/// Root collection holding one marker document per table.
pub const TABLES_COLLECTION: &str = "tables";
/// Sub-collection of a table holding its mapping records.
pub const MAPPINGS_COLLECTION: &str = "mappings";
/// Field of a mapping record holding the identifier.
pub const UUID_FIELD: &str = "uuid";
/// Field of a table marker holding the table name.
pub const TABLE_NAME_FIELD: &str = "table_name";

/// Path to a collection: alternating collection / document ids, ending on a collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionPath {
    segments: Vec<String>,
}

/// Path to a single document inside a collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentPath {
    collection: CollectionPath,
    id: String,
}

impl CollectionPath {
    /// Top-level collection.
    pub fn root(name: &str) -> Self {
        Self { segments: vec![name.to_string()] }
    }

    /// The `tables` collection.
    pub fn tables() -> Self {
        Self::root(TABLES_COLLECTION)
    }

    /// The `mappings` collection of `table`.
    pub fn mappings(table: &str) -> Self {
        Self::tables().doc(table).collection(MAPPINGS_COLLECTION)
    }

    /// Document `id` inside this collection.
    pub fn doc(&self, id: &str) -> DocumentPath {
        DocumentPath { collection: self.clone(), id: id.to_string() }
    }

    /// Path segments, starting at the root collection.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// The collection id (last segment).
    pub fn collection_id(&self) -> &str {
        // A collection path always holds at least its own id.
        self.segments.last().map(String::as_str).unwrap_or_default()
    }

    /// Segments of the parent document, empty for a root collection.
    pub fn parent_segments(&self) -> &[String] {
        &self.segments[..self.segments.len().saturating_sub(1)]
    }
}

impl DocumentPath {
    /// Marker document of `table`.
    pub fn table_marker(table: &str) -> Self {
        CollectionPath::tables().doc(table)
    }

    /// Mapping record of `datum` in `table`.
    pub fn mapping(table: &str, datum: &str) -> Self {
        CollectionPath::mappings(table).doc(datum)
    }

    /// Sub-collection `name` of this document.
    pub fn collection(&self, name: &str) -> CollectionPath {
        let mut segments = self.collection.segments.clone();
        segments.push(self.id.clone());
        segments.push(name.to_string());
        CollectionPath { segments }
    }

    /// Collection containing this document.
    pub fn parent(&self) -> &CollectionPath {
        &self.collection
    }

    /// Document id (last segment).
    pub fn id(&self) -> &str {
        &self.id
    }

    /// All segments, ending with the document id.
    pub fn segments(&self) -> Vec<String> {
        let mut segments = self.collection.segments.clone();
        segments.push(self.id.clone());
        segments
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("/"))
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

/// Check that `value` can be used as a single path segment.
///
/// Document ids must be non-empty, must not contain `/`, and must not be
/// `.` or `..`.
pub fn validate_segment(kind: &str, value: &str) -> TableResult<()> {
    if value.is_empty() {
        return Err(TableError::invalid(format!("{} must not be empty", kind)));
    }
    if value.contains('/') {
        return Err(TableError::invalid(format!("{} {:?} must not contain '/'", kind, value)));
    }
    if value == "." || value == ".." {
        return Err(TableError::invalid(format!("{} {:?} is reserved", kind, value)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapping_path_layout() {
        let path = DocumentPath::mapping("phone-test", "+254700000001");
        assert_eq!(path.to_string(), "tables/phone-test/mappings/+254700000001");
        assert_eq!(path.id(), "+254700000001");
        assert_eq!(path.parent(), &CollectionPath::mappings("phone-test"));
    }

    #[test]
    fn test_collection_parent_segments() {
        let mappings = CollectionPath::mappings("t");
        assert_eq!(mappings.parent_segments(), ["tables".to_string(), "t".to_string()]);
        assert_eq!(mappings.collection_id(), "mappings");
        assert!(CollectionPath::tables().parent_segments().is_empty());
    }

    #[test]
    fn test_marker_path() {
        assert_eq!(DocumentPath::table_marker("t").to_string(), "tables/t");
    }

    #[test]
    fn test_validate_segment() {
        assert!(validate_segment("datum", "+254700000001").is_ok());
        assert!(validate_segment("datum", "").is_err());
        assert!(validate_segment("datum", "a/b").is_err());
        assert!(validate_segment("datum", "..").is_err());
    }
}
