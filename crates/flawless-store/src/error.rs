use flawless_format::FormatError;
use flawless_types::ContentHash;

/// Errors from depot store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No object with this hash is stored.
    #[error("object not found: {0}")]
    ObjectNotFound(ContentHash),

    /// The stored bytes decode to a different depot than the one requested.
    #[error("hash mismatch: requested {expected}, stored object hashes to {actual}")]
    HashMismatch {
        expected: ContentHash,
        actual: ContentHash,
    },

    /// The stored bytes could not be decoded.
    #[error("depot {hash}: {source}")]
    Format {
        hash: ContentHash,
        #[source]
        source: FormatError,
    },

    /// Attempted to store the empty hash.
    #[error("cannot store an object under the empty hash")]
    EmptyHash,

    /// A lock guarding in-memory state was poisoned by a panicking writer.
    #[error("store lock poisoned")]
    LockPoisoned,

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Returns `true` if the object exists but its bytes are damaged.
    pub fn is_corruption(&self) -> bool {
        match self {
            StoreError::HashMismatch { .. } => true,
            StoreError::Format { source, .. } => source.is_corruption(),
            _ => false,
        }
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
