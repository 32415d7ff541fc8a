//! Wire (transmission) depot header, version 1.
//!
//! ```text
//! offset  size  field
//!      0     1  version
//!      1     1  feature flags
//!      2     6  reserved
//!      8     8  file-map section size
//!     16    16  checksum
//!     32     8  generate time (Unix ms)
//!     40     8  payload size
//! ```
//!
//! The payload section (when [`WireFlags::WITH_PAYLOAD`] is set) follows the
//! header, then the file-map section (when [`WireFlags::WITH_FILE_MAP`] is
//! set). The checksum is MD5 over header bytes `0..16` and `32..48` followed
//! by every section. Wire objects carry no compression identifier for the
//! payload.

use std::fmt;

use chrono::{DateTime, Utc};
use flawless_crypto::ContentHasher;
use flawless_types::ContentHash;

use crate::error::{FormatError, FormatResult, Section};
use crate::standard::{read_hash, read_u64, VERSION_1};
use crate::time::{from_millis, to_millis};

pub const WIRE_HEADER_LEN: usize = 48;

/// Feature bits of a wire header.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct WireFlags(u8);

impl WireFlags {
    /// File map is JSON rather than binary.
    pub const FILE_MAP_IS_JSON: Self = Self(1 << 0);
    pub const WITH_FILE_MAP: Self = Self(1 << 1);
    pub const WITH_PAYLOAD: Self = Self(1 << 2);
    /// File map went through the agreed file-map codec.
    pub const COMPRESS_FILE_MAP: Self = Self(1 << 7);

    const KNOWN: u8 = 0b1000_0111;

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn bits(&self) -> u8 {
        self.0
    }

    /// Accepts only known bits.
    pub fn from_bits(bits: u8) -> Option<Self> {
        (bits & !Self::KNOWN == 0).then_some(Self(bits))
    }

    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn set(&mut self, other: Self, on: bool) {
        if on {
            self.0 |= other.0;
        } else {
            self.0 &= !other.0;
        }
    }
}

impl std::ops::BitOr for WireFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Debug for WireFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (Self::FILE_MAP_IS_JSON, "FILE_MAP_IS_JSON"),
            (Self::WITH_FILE_MAP, "WITH_FILE_MAP"),
            (Self::WITH_PAYLOAD, "WITH_PAYLOAD"),
            (Self::COMPRESS_FILE_MAP, "COMPRESS_FILE_MAP"),
        ];
        let set: Vec<&str> = names
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "WireFlags({})", set.join(" | "))
    }
}

/// Decoded wire header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WireHeader {
    pub version: u8,
    pub flags: WireFlags,
    pub file_map_size: u64,
    pub checksum: ContentHash,
    pub generate_time: DateTime<Utc>,
    pub payload_size: u64,
}

impl WireHeader {
    pub fn encode(&self) -> [u8; WIRE_HEADER_LEN] {
        let mut buf = [0u8; WIRE_HEADER_LEN];
        buf[0] = self.version;
        buf[1] = self.flags.bits();
        buf[8..16].copy_from_slice(&self.file_map_size.to_le_bytes());
        buf[16..32].copy_from_slice(&self.checksum.to_le_bytes());
        buf[32..40].copy_from_slice(&to_millis(&self.generate_time).to_le_bytes());
        buf[40..48].copy_from_slice(&self.payload_size.to_le_bytes());
        buf
    }

    /// Decode and structurally validate the header of a complete wire object.
    /// The checksum is not verified here.
    pub fn decode(data: &[u8]) -> FormatResult<Self> {
        if data.len() < WIRE_HEADER_LEN {
            return Err(FormatError::corrupt_header(format!(
                "need {WIRE_HEADER_LEN} header bytes, found {}",
                data.len()
            )));
        }
        let version = data[0];
        if version != VERSION_1 {
            return Err(FormatError::UnsupportedVersion(version));
        }
        let flags = WireFlags::from_bits(data[1]).ok_or_else(|| {
            FormatError::corrupt_header(format!("unknown wire flags {:#04x}", data[1]))
        })?;
        let header = Self {
            version,
            flags,
            file_map_size: read_u64(data, 8),
            checksum: read_hash(data, 16),
            generate_time: from_millis(read_u64(data, 32))?,
            payload_size: read_u64(data, 40),
        };
        header.check_structure(data.len())?;
        Ok(header)
    }

    fn check_structure(&self, total_len: usize) -> FormatResult<()> {
        let with_map = self.flags.contains(WireFlags::WITH_FILE_MAP);
        if !with_map {
            if self.file_map_size != 0 {
                return Err(FormatError::corrupt_header(
                    "file-map size set without a file-map section",
                ));
            }
            if self.flags.contains(WireFlags::FILE_MAP_IS_JSON)
                || self.flags.contains(WireFlags::COMPRESS_FILE_MAP)
            {
                return Err(FormatError::corrupt_header(
                    "file-map encoding flags set without a file-map section",
                ));
            }
        }

        let expected = self
            .section_len()
            .and_then(|n| n.checked_add(WIRE_HEADER_LEN as u64))
            .ok_or_else(|| FormatError::corrupt_header("section sizes overflow"))?;
        if expected != total_len as u64 {
            return Err(FormatError::corrupt_header(format!(
                "header describes {expected} bytes, object has {total_len}"
            )));
        }
        Ok(())
    }

    fn section_len(&self) -> Option<u64> {
        let payload = if self.flags.contains(WireFlags::WITH_PAYLOAD) {
            self.payload_size
        } else {
            0
        };
        payload.checked_add(self.file_map_size)
    }

    /// MD5 over the checksummed header ranges followed by `sections`.
    pub fn compute_checksum(header: &[u8; WIRE_HEADER_LEN], sections: &[u8]) -> ContentHash {
        ContentHasher::PLAIN.hash_parts(&[&header[0..16], &header[32..48], sections])
    }

    pub fn verify(&self, data: &[u8]) -> FormatResult<()> {
        let mut header = [0u8; WIRE_HEADER_LEN];
        header.copy_from_slice(&data[..WIRE_HEADER_LEN]);
        let actual = Self::compute_checksum(&header, &data[WIRE_HEADER_LEN..]);
        if actual != self.checksum {
            return Err(FormatError::ChecksumMismatch {
                section: Section::Object,
                expected: self.checksum,
                actual,
            });
        }
        Ok(())
    }
}
