//! Frame format of the local commit log
//!
//! Every commit is one frame:
//! FrameHeader (32 bytes) + JSON-encoded [`CommitRecord`] payload.
//! A frame is the unit of atomicity: replay applies a whole commit or none of it.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{TableError, TableResult};
use crate::store::Fields;

/// Magic bytes identifying a commit frame: "PSTB"
pub const MAGIC_ARRAY: [u8; 4] = [0x50, 0x53, 0x54, 0x42];

/// Header size in bytes
pub const HEADER_SIZE: usize = 32;

/// Maximum payload of one frame (64MB)
pub const MAX_PAYLOAD_SIZE: usize = 64 * 1024 * 1024;

/// Frame kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordType {
    /// A batch of document writes
    Commit = 1,
}

/// Fixed-size header for each frame
///
/// Layout:
///   [0..4]   magic:       [u8;4] - "PSTB"
///   [4..8]   length:      u32    - payload length in bytes
///   [8..12]  checksum:    u32    - CRC32C of payload bytes
///   [12]     record_type: u8
///   [13..32] reserved, zero
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub magic: [u8; 4],
    pub length: u32,
    pub checksum: u32,
    pub record_type: u8,
}

/// A document write as persisted in the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggedWrite {
    /// Collection path, e.g. `tables/t/mappings`
    pub collection: String,
    /// Document id
    pub id: String,
    /// Full field set after the write
    pub fields: Fields,
    /// Written with a must-not-exist precondition
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub create: bool,
}

/// One atomic commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    /// Monotonic commit number within the store
    pub sequence: u64,
    /// Writes applied together
    pub writes: Vec<LoggedWrite>,
}

impl FrameHeader {
    /// Header for a payload of `length` bytes with the given checksum.
    pub fn new(length: u32, checksum: u32, record_type: RecordType) -> Self {
        Self { magic: MAGIC_ARRAY, length, checksum, record_type: record_type as u8 }
    }

    /// Serialize header to bytes for writing
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.magic);
        buf[4..8].copy_from_slice(&self.length.to_le_bytes());
        buf[8..12].copy_from_slice(&self.checksum.to_le_bytes());
        buf[12] = self.record_type;
        buf
    }

    /// Parse header from bytes
    pub fn from_bytes(bytes: &[u8; HEADER_SIZE]) -> Self {
        Self {
            magic: [bytes[0], bytes[1], bytes[2], bytes[3]],
            length: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            checksum: u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
            record_type: bytes[12],
        }
    }
}

/// Encode a commit into a complete frame.
pub fn encode_commit(record: &CommitRecord) -> TableResult<Vec<u8>> {
    let payload = serde_json::to_vec(record)?;
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(TableError::OversizedCommit {
            size: payload.len() as u64,
            max: MAX_PAYLOAD_SIZE as u64,
        });
    }

    let checksum = crc32c::crc32c(&payload);
    let header = FrameHeader::new(payload.len() as u32, checksum, RecordType::Commit);

    let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
    frame.extend_from_slice(&header.to_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Decode one frame from the start of `data`.
///
/// `path` and `offset` only label errors.
pub fn decode_commit(
    data: &[u8],
    path: &std::path::Path,
    offset: u64,
) -> TableResult<CommitRecord> {
    let Some(header_bytes) = data.get(..HEADER_SIZE) else {
        return Err(TableError::TornWrite {
            path: path.to_path_buf(),
            expected_size: HEADER_SIZE as u32,
            available_bytes: data.len() as u64,
            offset,
        });
    };
    let mut raw = [0u8; HEADER_SIZE];
    raw.copy_from_slice(header_bytes);
    let header = FrameHeader::from_bytes(&raw);

    if header.magic != MAGIC_ARRAY {
        return Err(TableError::NoMagicFound {
            path: path.to_path_buf(),
            offset,
            found_bytes: header.magic,
        });
    }

    let payload_end = HEADER_SIZE + header.length as usize;
    if data.len() < payload_end {
        return Err(TableError::TornWrite {
            path: path.to_path_buf(),
            expected_size: header.length,
            available_bytes: (data.len() - HEADER_SIZE) as u64,
            offset: offset + HEADER_SIZE as u64,
        });
    }

    let payload = &data[HEADER_SIZE..payload_end];
    let actual = crc32c::crc32c(payload);
    if actual != header.checksum {
        return Err(TableError::ChecksumMismatch {
            path: path.to_path_buf(),
            expected: header.checksum,
            actual,
            offset: offset + HEADER_SIZE as u64,
        });
    }

    if header.record_type != RecordType::Commit as u8 {
        return Err(TableError::LogCorrupted {
            path: path.to_path_buf(),
            offset: offset + 12,
            reason: format!("unknown record type {}", header.record_type),
        });
    }

    serde_json::from_slice(payload).map_err(|e| TableError::LogCorrupted {
        path: PathBuf::from(path),
        offset: offset + HEADER_SIZE as u64,
        reason: format!("undecodable commit payload: {}", e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn sample() -> CommitRecord {
        CommitRecord {
            sequence: 7,
            writes: vec![LoggedWrite {
                collection: "tables/t/mappings".into(),
                id: "+254700000001".into(),
                fields: Fields::from([("uuid".to_string(), "p-1".to_string())]),
                create: true,
            }],
        }
    }

    #[test]
    fn test_header_layout() {
        let header = FrameHeader::new(10, 0xDEADBEEF, RecordType::Commit);
        let bytes = header.to_bytes();
        assert_eq!(&bytes[0..4], b"PSTB");
        assert_eq!(FrameHeader::from_bytes(&bytes), header);
    }

    #[test]
    fn test_decode_encoded_commit() {
        let frame = encode_commit(&sample()).unwrap();
        let decoded = decode_commit(&frame, Path::new("<buffer>"), 0).unwrap();
        assert_eq!(decoded, sample());
    }

    #[test]
    fn test_corrupted_magic_detected() {
        let mut frame = encode_commit(&sample()).unwrap();
        frame[0] = 0xFF;
        assert!(matches!(
            decode_commit(&frame, Path::new("<buffer>"), 0),
            Err(TableError::NoMagicFound { .. })
        ));
    }

    #[test]
    fn test_corrupted_payload_detected() {
        let mut frame = encode_commit(&sample()).unwrap();
        let last = frame.len() - 2;
        frame[last] ^= 0xFF;
        assert!(matches!(
            decode_commit(&frame, Path::new("<buffer>"), 0),
            Err(TableError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_truncated_frame_is_torn() {
        let frame = encode_commit(&sample()).unwrap();
        let cut = &frame[..frame.len() - 5];
        assert!(matches!(
            decode_commit(cut, Path::new("<buffer>"), 0),
            Err(TableError::TornWrite { .. })
        ));
    }
}
