use chrono::{DateTime, Utc};
use flawless_types::{Author, CommitId, ContentHash, DepotLabel};
use serde::{Deserialize, Serialize};

/// An immutable entry in a repository's history, pinning one depot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryCommit {
    pub id: CommitId,
    pub parent: Option<CommitId>,
    pub author: Author,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub time: DateTime<Utc>,
    pub message: String,
    pub label: DepotLabel,
}

impl RepositoryCommit {
    pub fn parent_id(&self) -> Option<CommitId> {
        self.parent
    }

    /// Hash of the depot this commit pins.
    pub fn depot(&self) -> ContentHash {
        self.label.id
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// First line of the message.
    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or("")
    }
}
