use std::fmt;

use md5::{Digest, Md5};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::TypeError;

/// Content-addressed identifier for every stored object.
///
/// A `ContentHash` is the 16-byte MD5 digest of an object's bytes, folded into
/// a little-endian 128-bit integer: digest byte `i` lands at bit `8 * i`.
/// Identical content always produces the same hash. Two objects that differ but
/// share a hash are treated as corruption, never reconciled.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ContentHash(u128);

impl ContentHash {
    /// The all-zero sentinel. Represents "no object".
    pub const EMPTY: Self = Self(0);

    /// Digest size in bytes.
    pub const LEN: usize = 16;

    /// Hash an in-memory byte slice.
    pub fn of(data: &[u8]) -> Self {
        Self::from_digest(Md5::digest(data).into())
    }

    /// Fold a raw 16-byte MD5 digest into a hash value.
    pub fn from_digest(digest: [u8; 16]) -> Self {
        Self(u128::from_le_bytes(digest))
    }

    /// Create a hash from its 128-bit value.
    pub const fn from_u128(value: u128) -> Self {
        Self(value)
    }

    /// Create a hash from its two 64-bit halves.
    pub const fn from_parts(upper: u64, lower: u64) -> Self {
        Self(((upper as u128) << 64) | lower as u128)
    }

    /// The 128-bit value.
    pub const fn as_u128(&self) -> u128 {
        self.0
    }

    /// Low 64 bits.
    pub const fn lower(&self) -> u64 {
        self.0 as u64
    }

    /// High 64 bits.
    pub const fn upper(&self) -> u64 {
        (self.0 >> 64) as u64
    }

    /// Returns `true` for [`ContentHash::EMPTY`].
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Little-endian byte form, identical to the MD5 digest it came from.
    pub fn to_le_bytes(&self) -> [u8; 16] {
        self.0.to_le_bytes()
    }

    /// Inverse of [`ContentHash::to_le_bytes`].
    pub fn from_le_bytes(bytes: [u8; 16]) -> Self {
        Self(u128::from_le_bytes(bytes))
    }

    /// Parse from a little-endian byte slice of exactly 16 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, TypeError> {
        let arr: [u8; 16] = bytes.try_into().map_err(|_| TypeError::InvalidLength {
            expected: Self::LEN,
            actual: bytes.len(),
        })?;
        Ok(Self::from_le_bytes(arr))
    }

    /// Hex-encoded digest (32 characters, digest byte order).
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_le_bytes())
    }

    /// Short hex representation (first 8 characters).
    pub fn short_hex(&self) -> String {
        hex::encode(&self.to_le_bytes()[..4])
    }

    /// Parse from a hex string produced by [`ContentHash::to_hex`].
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        Self::from_slice(&bytes)
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.short_hex())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl std::str::FromStr for ContentHash {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl From<u128> for ContentHash {
    fn from(value: u128) -> Self {
        Self(value)
    }
}

impl From<ContentHash> for u128 {
    fn from(hash: ContentHash) -> Self {
        hash.0
    }
}

impl Serialize for ContentHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_hex())
        } else {
            serializer.serialize_u128(self.0)
        }
    }
}

impl<'de> Deserialize<'de> for ContentHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            Self::from_hex(&s).map_err(serde::de::Error::custom)
        } else {
            u128::deserialize(deserializer).map(Self)
        }
    }
}
