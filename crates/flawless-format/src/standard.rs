//! Durable (on-disk) depot header, version 1.
//!
//! ```text
//! offset  size  field
//!      0     4  magic 0x1AF7A373
//!      4     4  CRC32 of bytes 8..64
//!      8     1  version
//!      9     1  compression type
//!     10     1  checksum confuser
//!     11     5  reserved
//!     16    16  file-map checksum
//!     32    16  depot checksum
//!     48     8  generate time (Unix ms)
//!     56     8  payload size (uncompressed)
//! ```
//!
//! All integers are little-endian. The (possibly compressed) payload follows
//! the header directly.

use chrono::{DateTime, Utc};
use flawless_crypto::{header_crc, ContentHasher};
use flawless_types::{CompressType, ContentHash};

use crate::error::{FormatError, FormatResult, Section};
use crate::time::{from_millis, to_millis};

pub const MAGIC: u32 = 0x1AF7_A373;
pub const HEADER_LEN: usize = 64;
pub const VERSION_1: u8 = 1;

/// Decoded durable header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DepotHeader {
    pub version: u8,
    pub compress_type: CompressType,
    pub confuser: u8,
    pub file_map_checksum: ContentHash,
    pub depot_checksum: ContentHash,
    pub generate_time: DateTime<Utc>,
    pub payload_size: u64,
}

impl DepotHeader {
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[0..4].copy_from_slice(&MAGIC.to_le_bytes());
        buf[8] = self.version;
        buf[9] = self.compress_type.id();
        buf[10] = self.confuser;
        buf[16..32].copy_from_slice(&self.file_map_checksum.to_le_bytes());
        buf[32..48].copy_from_slice(&self.depot_checksum.to_le_bytes());
        buf[48..56].copy_from_slice(&to_millis(&self.generate_time).to_le_bytes());
        buf[56..64].copy_from_slice(&self.payload_size.to_le_bytes());
        let crc = header_crc(&buf[8..]);
        buf[4..8].copy_from_slice(&crc.to_le_bytes());
        buf
    }

    /// Decode the header at the start of `data`.
    ///
    /// Checks run in order: length, magic, CRC, version. Reserved bytes are
    /// not interpreted.
    pub fn decode(data: &[u8]) -> FormatResult<Self> {
        if data.len() < HEADER_LEN {
            return Err(FormatError::corrupt_header(format!(
                "need {HEADER_LEN} header bytes, found {}",
                data.len()
            )));
        }
        let magic = read_u32(data, 0);
        if magic != MAGIC {
            return Err(FormatError::corrupt_header(format!(
                "bad magic {magic:#010x}"
            )));
        }
        let stored_crc = read_u32(data, 4);
        let actual_crc = header_crc(&data[8..HEADER_LEN]);
        if stored_crc != actual_crc {
            return Err(FormatError::corrupt_header(format!(
                "header crc {stored_crc:#010x} does not match {actual_crc:#010x}"
            )));
        }
        let version = data[8];
        if version != VERSION_1 {
            return Err(FormatError::UnsupportedVersion(version));
        }

        Ok(Self {
            version,
            compress_type: CompressType(data[9]),
            confuser: data[10],
            file_map_checksum: read_hash(data, 16),
            depot_checksum: read_hash(data, 32),
            generate_time: from_millis(read_u64(data, 48))?,
            payload_size: read_u64(data, 56),
        })
    }

    /// Depot checksum over the time and size fields followed by the
    /// uncompressed payload.
    pub fn compute_depot_checksum(&self, payload: &[u8]) -> ContentHash {
        let mut tail = [0u8; 16];
        tail[0..8].copy_from_slice(&to_millis(&self.generate_time).to_le_bytes());
        tail[8..16].copy_from_slice(&self.payload_size.to_le_bytes());
        ContentHasher::confused(self.confuser).hash_parts(&[&tail, payload])
    }

    pub fn compute_file_map_checksum(&self, section: &[u8]) -> ContentHash {
        ContentHasher::confused(self.confuser).hash(section)
    }

    pub fn verify_payload(&self, payload: &[u8]) -> FormatResult<()> {
        if payload.len() as u64 != self.payload_size {
            return Err(FormatError::PayloadSizeMismatch {
                expected: self.payload_size,
                actual: payload.len() as u64,
            });
        }
        let actual = self.compute_depot_checksum(payload);
        if actual != self.depot_checksum {
            return Err(FormatError::ChecksumMismatch {
                section: Section::Payload,
                expected: self.depot_checksum,
                actual,
            });
        }
        Ok(())
    }

    pub fn verify_file_map(&self, section: &[u8]) -> FormatResult<()> {
        let actual = self.compute_file_map_checksum(section);
        if actual != self.file_map_checksum {
            return Err(FormatError::ChecksumMismatch {
                section: Section::FileMap,
                expected: self.file_map_checksum,
                actual,
            });
        }
        Ok(())
    }
}

pub(crate) fn read_u32(data: &[u8], at: usize) -> u32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&data[at..at + 4]);
    u32::from_le_bytes(b)
}

pub(crate) fn read_u64(data: &[u8], at: usize) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&data[at..at + 8]);
    u64::from_le_bytes(b)
}

pub(crate) fn read_hash(data: &[u8], at: usize) -> ContentHash {
    let mut b = [0u8; 16];
    b.copy_from_slice(&data[at..at + 16]);
    ContentHash::from_le_bytes(b)
}
