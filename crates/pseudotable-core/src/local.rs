//! Durable single-process document store.
//!
//! `LocalStore` serves every read from an in-RAM [`DocumentTree`] and makes
//! writes durable through the commit log before applying them in RAM.
//! A batch commit is one log frame, so it survives a crash whole or not at all.
//!
//! The log is not shared between processes. `open` takes an exclusive lock on
//! `<dir>/LOCK` and fails with [`TableError::StoreLocked`] while another
//! store holds it; the lock is released when the store is dropped.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use parking_lot::{Mutex, RwLock};
use tracing::{info, warn};

use crate::commit_log::{CommitLogReader, CommitLogWriter};
use crate::config::Config;
use crate::error::{TableError, TableResult};
use crate::format::{CommitRecord, LoggedWrite};
use crate::memory::DocumentTree;
use crate::path::{CollectionPath, DocumentPath};
use crate::store::{CreateOutcome, Document, DocumentStore, Fields, Page, Write};

struct LogState {
    writer: CommitLogWriter,
    next_sequence: u64,
}

/// On-disk document store backed by an append-only commit log.
pub struct LocalStore {
    tree: RwLock<DocumentTree>,
    /// Serializes writers; held across precondition check, append and apply
    log: Mutex<LogState>,
    path: PathBuf,
    config: Config,
    /// Held for the store's lifetime
    _lock: File,
}

impl LocalStore {
    /// Open or create a store rooted at `path`, replaying its commit log.
    pub fn open<P: AsRef<Path>>(path: P, config: Config) -> TableResult<Self> {
        config.validate().map_err(TableError::invalid)?;
        let path = path.as_ref().to_path_buf();
        let lock = lock_directory(&path)?;
        let log_dir = path.join("log");

        let recovery = CommitLogReader::new(&log_dir).recover()?;
        let next_sequence = recovery.records.last().map(|r| r.sequence + 1).unwrap_or(0);
        let mut tree = DocumentTree::default();
        for record in recovery.records {
            replay(&mut tree, record);
        }

        let recovered = tree.document_count();
        if recovered > 0 {
            info!(
                documents = recovered,
                path = %log_dir.display(),
                "recovered documents from commit log"
            );
        }

        let writer = CommitLogWriter::open(
            &log_dir,
            recovery.tail.as_ref(),
            config.log_rotation_size_bytes,
            config.sync_commits,
        )?;

        Ok(Self {
            tree: RwLock::new(tree),
            log: Mutex::new(LogState { writer, next_sequence }),
            path,
            config,
            _lock: lock,
        })
    }

    /// Store directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of documents across all collections.
    pub fn document_count(&self) -> usize {
        self.tree.read().document_count()
    }

    fn commit_locked(&self, log: &mut LogState, writes: Vec<Write>) -> TableResult<()> {
        self.tree.read().check_preconditions(&writes)?;

        let record = CommitRecord {
            sequence: log.next_sequence,
            writes: writes
                .iter()
                .map(|w| LoggedWrite {
                    collection: w.path().parent().to_string(),
                    id: w.path().id().to_string(),
                    fields: w.fields().clone(),
                    create: matches!(w, Write::Create { .. }),
                })
                .collect(),
        };
        log.writer.append(&record)?;
        log.next_sequence += 1;

        self.tree.write().apply(writes);
        Ok(())
    }
}

fn lock_directory(dir: &Path) -> TableResult<File> {
    std::fs::create_dir_all(dir)
        .map_err(|e| TableError::io_at(dir, "failed to create store directory", e))?;
    let lock_path = dir.join("LOCK");
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)
        .map_err(|e| TableError::io_at(&lock_path, "failed to open lock file", e))?;
    match file.try_lock_exclusive() {
        Ok(()) => Ok(file),
        Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
            Err(TableError::StoreLocked { path: lock_path })
        }
        Err(e) => Err(TableError::io_at(&lock_path, "failed to lock store directory", e)),
    }
}

/// Apply one logged commit, all of its writes or none.
///
/// A commit whose `Create` targets an existing document was never valid;
/// it is skipped so the first record keeps its fields.
fn replay(tree: &mut DocumentTree, record: CommitRecord) {
    let clash = record
        .writes
        .iter()
        .find(|w| w.create && tree.contains_id(&w.collection, &w.id));
    if let Some(write) = clash {
        warn!(
            sequence = record.sequence,
            collection = %write.collection,
            id = %write.id,
            "skipping logged commit that recreates an existing document"
        );
        return;
    }
    for write in record.writes {
        tree.put(write.collection, write.id, write.fields);
    }
}

impl DocumentStore for LocalStore {
    fn get(&self, path: &DocumentPath) -> TableResult<Option<Document>> {
        Ok(self.tree.read().get(path))
    }

    fn set(&self, path: &DocumentPath, fields: Fields) -> TableResult<()> {
        let mut log = self.log.lock();
        self.commit_locked(&mut log, vec![Write::Set { path: path.clone(), fields }])
    }

    fn create(&self, path: &DocumentPath, fields: Fields) -> TableResult<CreateOutcome> {
        let mut log = self.log.lock();
        match self.commit_locked(&mut log, vec![Write::Create { path: path.clone(), fields }]) {
            Ok(()) => Ok(CreateOutcome::Created),
            Err(TableError::Conflict { .. }) => Ok(CreateOutcome::AlreadyExists),
            Err(e) => Err(e),
        }
    }

    fn list_page(
        &self,
        collection: &CollectionPath,
        page_size: usize,
        page_token: Option<&str>,
    ) -> TableResult<Page> {
        Ok(self.tree.read().list_page(collection, page_size, page_token))
    }

    fn query_eq(
        &self,
        collection: &CollectionPath,
        field: &str,
        value: &str,
    ) -> TableResult<Vec<Document>> {
        Ok(self.tree.read().query_eq(collection, field, value))
    }

    fn commit(&self, writes: Vec<Write>) -> TableResult<()> {
        if writes.len() > self.config.max_batch_size {
            return Err(TableError::invalid(format!(
                "commit of {} writes exceeds the batch limit of {}",
                writes.len(),
                self.config.max_batch_size
            )));
        }
        if writes.is_empty() {
            return Ok(());
        }
        let mut log = self.log.lock();
        self.commit_locked(&mut log, writes)
    }

    fn max_batch_size(&self) -> usize {
        self.config.max_batch_size
    }
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore")
            .field("path", &self.path)
            .field("documents", &self.document_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use tempfile::TempDir;

    use crate::format::MAGIC_ARRAY;
    use crate::table::MappingTable;

    fn uuid_fields(id: &str) -> Fields {
        Fields::from([("uuid".to_string(), id.to_string())])
    }

    fn create_write(datum: &str, id: &str) -> Write {
        Write::Create { path: DocumentPath::mapping("t", datum), fields: uuid_fields(id) }
    }

    fn test_store() -> (LocalStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::open(dir.path(), Config::local()).unwrap();
        (store, dir)
    }

    #[test]
    fn test_open_empty() {
        let (store, _dir) = test_store();
        assert_eq!(store.document_count(), 0);
        assert!(format!("{:?}", store).contains("LocalStore"));
    }

    #[test]
    fn test_crash_recovery() {
        let dir = TempDir::new().unwrap();
        {
            let store = LocalStore::open(dir.path(), Config::local()).unwrap();
            let marker = Fields::from([("table_name".into(), "t".into())]);
            store.set(&DocumentPath::table_marker("t"), marker).unwrap();
            store
                .commit(vec![
                    create_write("a", "p-a"),
                    create_write("b", "p-b"),
                ])
                .unwrap();
        }
        {
            let store = LocalStore::open(dir.path(), Config::local()).unwrap();
            assert_eq!(store.document_count(), 3);
            let doc = store.get(&DocumentPath::mapping("t", "b")).unwrap().unwrap();
            assert_eq!(doc.field("uuid"), Some("p-b"));
        }
    }

    #[test]
    fn test_failed_commit_not_logged() {
        let dir = TempDir::new().unwrap();
        {
            let store = LocalStore::open(dir.path(), Config::local()).unwrap();
            store.set(&DocumentPath::mapping("t", "b"), uuid_fields("p-b")).unwrap();
            let err = store
                .commit(vec![
                    create_write("a", "p-a"),
                    create_write("b", "p-x"),
                ])
                .unwrap_err();
            assert!(err.is_conflict());
        }
        let store = LocalStore::open(dir.path(), Config::local()).unwrap();
        assert_eq!(store.document_count(), 1);
        let doc = store.get(&DocumentPath::mapping("t", "b")).unwrap().unwrap();
        assert_eq!(doc.field("uuid"), Some("p-b"));
    }

    #[test]
    fn test_create_reports_existing() {
        let (store, _dir) = test_store();
        let path = DocumentPath::mapping("t", "a");
        assert_eq!(store.create(&path, uuid_fields("p-1")).unwrap(), CreateOutcome::Created);
        assert_eq!(store.create(&path, uuid_fields("p-2")).unwrap(), CreateOutcome::AlreadyExists);
    }

    #[test]
    fn test_commit_respects_batch_limit() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::open(dir.path(), Config::local().with_max_batch_size(2)).unwrap();
        let writes = (0..3)
            .map(|i| Write::Set {
                path: DocumentPath::mapping("t", &format!("k{}", i)),
                fields: uuid_fields("p"),
            })
            .collect();
        assert!(matches!(store.commit(writes), Err(TableError::InvalidArgument { .. })));
    }

    fn mapping_table(store: LocalStore) -> MappingTable {
        MappingTable::new(Arc::new(store), "t", "p-", &Config::local()).unwrap()
    }

    fn newest_log(dir: &Path) -> PathBuf {
        let mut logs: Vec<PathBuf> = std::fs::read_dir(dir.join("log"))
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        logs.sort();
        logs.pop().unwrap()
    }

    #[test]
    fn test_commits_after_torn_tail_survive_reopen() {
        let dir = TempDir::new().unwrap();
        mapping_table(LocalStore::open(dir.path(), Config::local()).unwrap())
            .get_or_create("a")
            .unwrap();

        // Crash mid-append: a header promising 1000 bytes, only 10 written.
        let log = newest_log(dir.path());
        let mut data = std::fs::read(&log).unwrap();
        data.extend_from_slice(&MAGIC_ARRAY);
        data.extend_from_slice(&1000u32.to_le_bytes());
        data.extend_from_slice(&[0u8; 24]);
        data.extend_from_slice(b"0123456789");
        std::fs::write(&log, data).unwrap();

        let first = mapping_table(LocalStore::open(dir.path(), Config::local()).unwrap())
            .get_or_create("b")
            .unwrap();
        let table = mapping_table(LocalStore::open(dir.path(), Config::local()).unwrap());
        assert_eq!(table.get_or_create("b").unwrap(), first);
        assert_eq!(table.lookup_datum(&first).unwrap(), "b");
    }

    #[test]
    fn test_second_open_is_rejected() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::open(dir.path(), Config::local()).unwrap();
        let err = LocalStore::open(dir.path(), Config::local()).unwrap_err();
        assert!(matches!(err, TableError::StoreLocked { .. }));

        let table = mapping_table(store);
        let id = table.get_or_create("d").unwrap();
        drop(table);

        let reopened = mapping_table(LocalStore::open(dir.path(), Config::local()).unwrap());
        assert_eq!(reopened.get_or_create("d").unwrap(), id);
    }

    #[test]
    fn test_replay_keeps_first_create() {
        let dir = TempDir::new().unwrap();
        let log_dir = dir.path().join("log");
        let mut writer = CommitLogWriter::open(&log_dir, None, 1 << 20, false).unwrap();
        for (sequence, id) in [(0, "p-first"), (1, "p-second")] {
            writer
                .append(&CommitRecord {
                    sequence,
                    writes: vec![LoggedWrite {
                        collection: "tables/t/mappings".into(),
                        id: "d".into(),
                        fields: uuid_fields(id),
                        create: true,
                    }],
                })
                .unwrap();
        }
        drop(writer);

        let store = LocalStore::open(dir.path(), Config::local()).unwrap();
        let doc = store.get(&DocumentPath::mapping("t", "d")).unwrap().unwrap();
        assert_eq!(doc.field("uuid"), Some("p-first"));
    }
}
