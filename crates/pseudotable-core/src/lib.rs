//! Pseudotable Core: collision-safe pseudonymization tables
//!
//! Maps raw identifying values (phone numbers, external record ids) to
//! opaque prefixed identifiers and back, over a transactional document
//! store, with an in-process cache in front.
//!
//! # Architecture
//!
//! - **Generator**: `<prefix><uuid-v4>` identifiers
//! - **Cache**: per-service forward map and reverse index, never trusted for minting
//! - **Client**: point reads, conditional creates, paginated scans, chunked commits
//! - **Table service**: forward/reverse, single/batch lookups with creation
//! - **Registry**: lists and opens tables, bulk import
//!
//! # Stores
//!
//! Anything implementing [`DocumentStore`]. This crate ships [`MemoryStore`]
//! and the durable [`LocalStore`]; the Firestore adapter lives in
//! `pseudotable-firestore`.

pub mod cache;
pub mod client;
pub mod commit_log;
pub mod config;
pub mod error;
pub mod format;
pub mod id;
pub mod local;
pub mod memory;
pub mod path;
pub mod registry;
pub mod store;
pub mod table;

// Re-export key types for convenience
pub use cache::MappingCache;
pub use client::TableClient;
pub use config::{Config, DEFAULT_MAX_BATCH_SIZE};
pub use error::{TableError, TableResult};
pub use local::LocalStore;
pub use memory::{MemoryStore, StoreStats};
pub use path::{CollectionPath, DocumentPath};
pub use registry::TableRegistry;
pub use store::{CreateOutcome, Document, DocumentStore, Fields, Page, Write};
pub use table::{ImportReport, MappingTable};
