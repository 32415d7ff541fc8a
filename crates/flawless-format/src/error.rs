use std::fmt;

use flawless_path::{PathError, WorkPath};
use flawless_types::{CompressType, ContentHash};
use thiserror::Error;

/// Which part of a binary object a checksum covers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Section {
    /// The durable payload, hashed uncompressed.
    Payload,
    /// The file-map section.
    FileMap,
    /// A whole wire object.
    Object,
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Section::Payload => write!(f, "payload"),
            Section::FileMap => write!(f, "file map"),
            Section::Object => write!(f, "object"),
        }
    }
}

#[derive(Debug, Error)]
pub enum FormatError {
    /// Magic, CRC or structural fields of a header are wrong. Nothing after
    /// the header was trusted.
    #[error("corrupt header: {reason}")]
    CorruptHeader { reason: String },

    #[error("unsupported format version: {0}")]
    UnsupportedVersion(u8),

    /// The header was sound but a section does not hash to the recorded value.
    #[error("{section} checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch {
        section: Section,
        expected: ContentHash,
        actual: ContentHash,
    },

    #[error("payload size mismatch: header says {expected} bytes, found {actual}")]
    PayloadSizeMismatch { expected: u64, actual: u64 },

    #[error("no codec registered for compression type {0}")]
    UnknownCompression(CompressType),

    #[error("compression failed: {0}")]
    CompressionFailed(String),

    #[error("decompression failed: {0}")]
    DecompressionFailed(String),

    #[error("corrupt file map at byte {offset}: {reason}")]
    CorruptFileMap { offset: usize, reason: String },

    #[error("duplicate path in file map: {0}")]
    DuplicatePath(WorkPath),

    #[error("invalid path in file map: {0}")]
    InvalidPath(#[from] PathError),

    #[error("file {path} points outside the payload")]
    FileOutOfBounds { path: WorkPath },

    #[error("wire object has no {0} section")]
    MissingSection(Section),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl FormatError {
    pub(crate) fn corrupt_header(reason: impl Into<String>) -> Self {
        FormatError::CorruptHeader {
            reason: reason.into(),
        }
    }

    /// Returns `true` for errors that mean stored bytes are damaged.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            FormatError::CorruptHeader { .. }
                | FormatError::ChecksumMismatch { .. }
                | FormatError::PayloadSizeMismatch { .. }
                | FormatError::CorruptFileMap { .. }
                | FormatError::FileOutOfBounds { .. }
                | FormatError::DecompressionFailed(_)
        )
    }
}

impl From<serde_json::Error> for FormatError {
    fn from(e: serde_json::Error) -> Self {
        FormatError::Serialization(e.to_string())
    }
}

pub type FormatResult<T> = Result<T, FormatError>;
