use std::path::PathBuf;

use flawless_format::FormatError;
use flawless_path::PathError;
use flawless_store::StoreError;
use flawless_types::{CommitId, ContentHash};
use thiserror::Error;

/// Errors produced by repository operations.
#[derive(Debug, Error)]
pub enum RepoError {
    /// The workspace holds nothing that would change the latest snapshot.
    #[error("nothing to submit: the workspace has no changes")]
    NoChanges,

    /// Another submission is in flight. Retry the whole submission.
    #[error("another submission is in progress")]
    ConcurrentSubmission,

    #[error("repository is read-only")]
    ReadOnly,

    #[error("commit not found: {0}")]
    CommitNotFound(CommitId),

    #[error("file {path} not found in commit {commit}")]
    FileNotFound { commit: CommitId, path: String },

    /// A referenced object is absent from storage.
    #[error("object not found: {0}")]
    ObjectNotFound(ContentHash),

    /// A referenced depot does not contain the requested file content.
    #[error("depot {depot} does not contain content {content}")]
    MissingContent {
        depot: ContentHash,
        content: ContentHash,
    },

    #[error("corrupt commit record {id}: {reason}")]
    CorruptRecord { id: CommitId, reason: String },

    #[error("commit chain is broken at {id}: {reason}")]
    BrokenChain { id: CommitId, reason: String },

    #[error("store error: {0}")]
    Store(StoreError),

    #[error("format error: {0}")]
    Format(#[from] FormatError),

    #[error("invalid path: {0}")]
    InvalidPath(#[from] PathError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("no repository at {0}")]
    NotInitialized(PathBuf),

    #[error("repository already exists at {0}")]
    AlreadyInitialized(PathBuf),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("repository lock poisoned")]
    LockPoisoned,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RepoError {
    /// Returns `true` for conditions a caller may retry unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RepoError::ConcurrentSubmission)
    }

    /// Returns `true` if stored data is damaged.
    pub fn is_corruption(&self) -> bool {
        match self {
            RepoError::Store(e) => e.is_corruption(),
            RepoError::Format(e) => e.is_corruption(),
            RepoError::MissingContent { .. }
            | RepoError::CorruptRecord { .. }
            | RepoError::BrokenChain { .. } => true,
            _ => false,
        }
    }
}

impl From<StoreError> for RepoError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::ObjectNotFound(hash) => RepoError::ObjectNotFound(hash),
            other => RepoError::Store(other),
        }
    }
}

impl From<bincode::Error> for RepoError {
    fn from(e: bincode::Error) -> Self {
        RepoError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for RepoError {
    fn from(e: serde_json::Error) -> Self {
        RepoError::Serialization(e.to_string())
    }
}

pub type RepoResult<T> = Result<T, RepoError>;
