//! Append-only commit log behind [`LocalStore`](crate::LocalStore).
//!
//! Write ordering for one commit:
//! 1. encode the whole batch into a single CRC32C-framed record
//! 2. append the frame
//! 3. sync it to persistent storage
//! 4. only then does the store apply the writes in RAM
//!
//! Files are named `commits-<seq:016x>.log` and rotate past a size threshold.
//! Bytes past the last good frame of the newest file are cut off before the
//! writer appends to it again.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{TableError, TableResult};
use crate::format::{decode_commit, encode_commit, CommitRecord, HEADER_SIZE, MAGIC_ARRAY};

const FILE_PREFIX: &str = "commits-";
const FILE_SUFFIX: &str = ".log";

/// Newest log file and the length of its replayable prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogTail {
    pub path: PathBuf,
    /// End of the last frame that decoded cleanly
    pub valid_len: u64,
    pub file_len: u64,
}

impl LogTail {
    /// True when the file ends in bytes replay could not use.
    pub fn is_dirty(&self) -> bool {
        self.valid_len < self.file_len
    }
}

/// What replay found in a log directory.
#[derive(Debug, Default)]
pub struct Recovery {
    /// Commits in file and append order
    pub records: Vec<CommitRecord>,
    /// `None` when the directory holds no log file
    pub tail: Option<LogTail>,
}

/// Appends commit frames to the current log file.
pub struct CommitLogWriter {
    file: File,
    path: PathBuf,
    size: u64,
    dir: PathBuf,
    sequence: u64,
    rotation_size: u64,
    sync: bool,
}

impl CommitLogWriter {
    /// Open the newest log file in `dir`, creating the directory if needed.
    ///
    /// When `tail` says the newest file ends in unreplayable bytes, the file
    /// is truncated to its valid prefix first, so new frames follow the last
    /// good one directly.
    pub fn open(
        dir: &Path,
        tail: Option<&LogTail>,
        rotation_size: u64,
        sync: bool,
    ) -> TableResult<Self> {
        std::fs::create_dir_all(dir)
            .map_err(|e| TableError::io_at(dir, "failed to create commit log directory", e))?;

        let sequence = log_files(dir)?.last().map(|(seq, _)| *seq).unwrap_or(0);
        let path = dir.join(file_name(sequence));
        let file = open_append(&path)?;
        let mut writer = Self {
            file,
            size: 0,
            path,
            dir: dir.to_path_buf(),
            sequence,
            rotation_size,
            sync,
        };

        if let Some(tail) = tail.filter(|t| t.path == writer.path && t.is_dirty()) {
            writer.truncate_to(tail.valid_len)?;
        }
        writer.size = writer
            .file
            .metadata()
            .map_err(|e| TableError::io_at(&writer.path, "failed to stat commit log", e))?
            .len();
        Ok(writer)
    }

    /// Append one commit; returns once it is durable (when syncing is enabled).
    pub fn append(&mut self, record: &CommitRecord) -> TableResult<()> {
        let frame = encode_commit(record)?;

        if self.size > 0 && self.size + frame.len() as u64 > self.rotation_size {
            self.rotate()?;
        }

        self.file
            .write_all(&frame)
            .map_err(|e| TableError::io_at(&self.path, "commit log write failed", e))?;
        if self.sync {
            self.sync_to_disk()?;
        }

        self.size += frame.len() as u64;
        Ok(())
    }

    /// Flush the current file's data to persistent storage.
    pub fn sync_to_disk(&self) -> TableResult<()> {
        self.file
            .sync_data()
            .map_err(|e| TableError::io_at(&self.path, "commit log sync failed", e))
    }

    fn truncate_to(&mut self, len: u64) -> TableResult<()> {
        warn!(
            path = %self.path.display(),
            valid_len = len,
            "cutting unreplayable bytes off commit log"
        );
        self.file
            .set_len(len)
            .map_err(|e| TableError::io_at(&self.path, "failed to truncate commit log", e))?;
        self.sync_to_disk()
    }

    fn rotate(&mut self) -> TableResult<()> {
        self.sync_to_disk()?;

        self.sequence += 1;
        let path = self.dir.join(file_name(self.sequence));
        self.file = open_append(&path)?;
        debug!(path = %path.display(), "rotated commit log");
        self.path = path;
        self.size = 0;
        Ok(())
    }

    /// Current log file (for diagnostics)
    pub fn current_path(&self) -> &Path {
        &self.path
    }
}

/// Replays every commit in a log directory.
pub struct CommitLogReader {
    dir: PathBuf,
}

impl CommitLogReader {
    pub fn new(dir: &Path) -> Self {
        Self { dir: dir.to_path_buf() }
    }

    /// All recoverable commits, plus the state of the newest file.
    ///
    /// A torn or corrupt frame is skipped by scanning for the next magic.
    pub fn recover(&self) -> TableResult<Recovery> {
        let mut recovery = Recovery::default();
        if !self.dir.exists() {
            return Ok(recovery);
        }
        for (_, path) in log_files(&self.dir)? {
            let scan = recover_file(&path)?;
            recovery.records.extend(scan.records);
            recovery.tail = Some(LogTail {
                path,
                valid_len: scan.valid_len,
                file_len: scan.file_len,
            });
        }
        Ok(recovery)
    }
}

struct FileScan {
    records: Vec<CommitRecord>,
    valid_len: u64,
    file_len: u64,
}

fn recover_file(path: &Path) -> TableResult<FileScan> {
    let mut buffer = Vec::new();
    File::open(path)
        .and_then(|mut f| f.read_to_end(&mut buffer))
        .map_err(|e| TableError::io_at(path, "failed to read commit log", e))?;

    let mut records = Vec::new();
    let mut offset = 0;
    let mut valid_len = 0;

    while offset + HEADER_SIZE <= buffer.len() {
        if buffer[offset..offset + 4] != MAGIC_ARRAY {
            warn!(path = %path.display(), offset, "bad magic in commit log, resyncing");
            match find_next_magic(&buffer, offset + 1) {
                Some(next) => {
                    offset = next;
                    continue;
                }
                None => break,
            }
        }

        match decode_commit(&buffer[offset..], path, offset as u64) {
            Ok(record) => {
                let length = u32::from_le_bytes([
                    buffer[offset + 4],
                    buffer[offset + 5],
                    buffer[offset + 6],
                    buffer[offset + 7],
                ]) as usize;
                records.push(record);
                offset += HEADER_SIZE + length;
                valid_len = offset;
            }
            Err(e) => {
                if let TableError::TornWrite { expected_size, available_bytes, .. } = &e {
                    warn!(
                        path = %path.display(),
                        offset,
                        expected_size,
                        available_bytes,
                        "torn commit in log"
                    );
                } else {
                    warn!(path = %path.display(), offset, error = %e, "skipping corrupt commit");
                }
                match find_next_magic(&buffer, offset + 1) {
                    Some(next) => {
                        offset = next;
                        continue;
                    }
                    None => break,
                }
            }
        }
    }

    Ok(FileScan { records, valid_len: valid_len as u64, file_len: buffer.len() as u64 })
}

fn find_next_magic(buffer: &[u8], start: usize) -> Option<usize> {
    if start >= buffer.len() {
        return None;
    }
    buffer[start..]
        .windows(MAGIC_ARRAY.len())
        .position(|w| w == MAGIC_ARRAY)
        .map(|pos| start + pos)
}

fn file_name(sequence: u64) -> String {
    format!("{}{:016x}{}", FILE_PREFIX, sequence, FILE_SUFFIX)
}

/// Log files in `dir`, sorted by sequence.
fn log_files(dir: &Path) -> TableResult<Vec<(u64, PathBuf)>> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| TableError::io_at(dir, "failed to read commit log directory", e))?;

    let mut files = Vec::new();
    for entry in entries {
        let entry =
            entry.map_err(|e| TableError::io_at(dir, "failed to read directory entry", e))?;
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(hex) = name.strip_prefix(FILE_PREFIX).and_then(|n| n.strip_suffix(FILE_SUFFIX))
        else {
            continue;
        };
        if let Ok(seq) = u64::from_str_radix(hex, 16) {
            files.push((seq, path));
        }
    }
    files.sort();
    Ok(files)
}

fn open_append(path: &Path) -> TableResult<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| TableError::io_at(path, "failed to open commit log", e))
}
