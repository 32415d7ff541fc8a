//! The staging area whose contents become the next commit.
//!
//! Staged file contents live in memory only. Every change carries a
//! generation number so a submission clears exactly the entries it captured;
//! anything staged while it ran stays staged.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock};

use flawless_format::FileMap;
use flawless_path::WorkPath;
use flawless_types::ContentHash;

use crate::error::{RepoError, RepoResult};

/// One staged modification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StagedChange {
    /// New or replaced content.
    Put { data: Arc<[u8]>, hash: ContentHash },
    /// The path is dropped from the next snapshot.
    Remove,
}

impl StagedChange {
    pub fn hash(&self) -> Option<ContentHash> {
        match self {
            StagedChange::Put { hash, .. } => Some(*hash),
            StagedChange::Remove => None,
        }
    }
}

#[derive(Clone, Debug)]
struct StagedEntry {
    generation: u64,
    change: StagedChange,
}

#[derive(Debug, Default)]
struct WorkspaceState {
    entries: BTreeMap<WorkPath, StagedEntry>,
    message: String,
    message_generation: u64,
    next_generation: u64,
}

impl WorkspaceState {
    fn bump(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }
}

/// Point-in-time copy of the workspace taken by a submission.
#[derive(Clone, Debug)]
pub struct WorkspaceSnapshot {
    entries: BTreeMap<WorkPath, StagedEntry>,
    message: String,
    message_generation: u64,
}

impl WorkspaceSnapshot {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn get(&self, path: &str) -> Option<&StagedChange> {
        self.entries.get(path).map(|e| &e.change)
    }

    /// Staged changes in path order.
    pub fn changes(&self) -> impl Iterator<Item = (&WorkPath, &StagedChange)> {
        self.entries.iter().map(|(p, e)| (p, &e.change))
    }
}

/// How the workspace differs from a base snapshot.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WorkspaceStatus {
    pub added: Vec<WorkPath>,
    pub modified: Vec<WorkPath>,
    pub removed: Vec<WorkPath>,
    /// Staged with content identical to the base.
    pub unchanged: Vec<WorkPath>,
}

impl WorkspaceStatus {
    /// Returns `true` if submitting would not change the snapshot.
    pub fn is_clean(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }
}

/// The single mutable staging area of a repository.
#[derive(Debug, Default)]
pub struct Workspace {
    state: RwLock<WorkspaceState>,
}

impl Workspace {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RepoResult<std::sync::RwLockReadGuard<'_, WorkspaceState>> {
        self.state.read().map_err(|_| RepoError::LockPoisoned)
    }

    fn write(&self) -> RepoResult<std::sync::RwLockWriteGuard<'_, WorkspaceState>> {
        self.state.write().map_err(|_| RepoError::LockPoisoned)
    }

    /// Stage `data` as the new content of `path`.
    pub fn stage(&self, path: &str, data: impl Into<Vec<u8>>) -> RepoResult<ContentHash> {
        let path = WorkPath::new(path)?;
        let data: Arc<[u8]> = Arc::from(data.into());
        let hash = ContentHash::of(&data);
        let mut state = self.write()?;
        let generation = state.bump();
        state.entries.insert(
            path,
            StagedEntry {
                generation,
                change: StagedChange::Put { data, hash },
            },
        );
        Ok(hash)
    }

    /// Stage the removal of `path`.
    pub fn remove(&self, path: &str) -> RepoResult<()> {
        let path = WorkPath::new(path)?;
        let mut state = self.write()?;
        let generation = state.bump();
        state.entries.insert(
            path,
            StagedEntry {
                generation,
                change: StagedChange::Remove,
            },
        );
        Ok(())
    }

    /// Drop whatever is staged for `path`. Returns `true` if something was.
    pub fn unstage(&self, path: &str) -> RepoResult<bool> {
        let mut state = self.write()?;
        Ok(state.entries.remove(path).is_some())
    }

    pub fn set_message(&self, message: impl Into<String>) -> RepoResult<()> {
        let mut state = self.write()?;
        state.message = message.into();
        state.message_generation = state.bump();
        Ok(())
    }

    pub fn message(&self) -> RepoResult<String> {
        Ok(self.read()?.message.clone())
    }

    pub fn staged_paths(&self) -> RepoResult<Vec<WorkPath>> {
        Ok(self.read()?.entries.keys().cloned().collect())
    }

    pub fn staged(&self, path: &str) -> RepoResult<Option<StagedChange>> {
        Ok(self.read()?.entries.get(path).map(|e| e.change.clone()))
    }

    /// Content hashes of every staged file.
    pub fn pending_hashes(&self) -> RepoResult<BTreeSet<ContentHash>> {
        Ok(self
            .read()?
            .entries
            .values()
            .filter_map(|e| e.change.hash())
            .collect())
    }

    pub fn is_empty(&self) -> RepoResult<bool> {
        Ok(self.read()?.entries.is_empty())
    }

    /// Compare staged changes with `base`, the file map of the snapshot the
    /// workspace builds on.
    pub fn status(&self, base: Option<&FileMap>) -> RepoResult<WorkspaceStatus> {
        let state = self.read()?;
        let mut status = WorkspaceStatus::default();
        for (path, entry) in &state.entries {
            let existing = base.and_then(|b| b.get(path.as_str()));
            match (&entry.change, existing) {
                (StagedChange::Put { .. }, None) => status.added.push(path.clone()),
                (StagedChange::Put { hash, .. }, Some(info)) if *hash == info.hash => {
                    status.unchanged.push(path.clone())
                }
                (StagedChange::Put { .. }, Some(_)) => status.modified.push(path.clone()),
                (StagedChange::Remove, Some(_)) => status.removed.push(path.clone()),
                (StagedChange::Remove, None) => {}
            }
        }
        Ok(status)
    }

    pub(crate) fn snapshot(&self) -> RepoResult<WorkspaceSnapshot> {
        let state = self.read()?;
        Ok(WorkspaceSnapshot {
            entries: state.entries.clone(),
            message: state.message.clone(),
            message_generation: state.message_generation,
        })
    }

    /// Remove the entries a submission captured, keeping newer ones.
    pub(crate) fn clear_submitted(&self, snapshot: &WorkspaceSnapshot) -> RepoResult<()> {
        let mut state = self.write()?;
        for (path, captured) in &snapshot.entries {
            let unchanged = state
                .entries
                .get(path)
                .is_some_and(|e| e.generation == captured.generation);
            if unchanged {
                state.entries.remove(path);
            }
        }
        if state.message_generation == snapshot.message_generation {
            state.message.clear();
        }
        Ok(())
    }

    pub(crate) fn restore_message(&self, message: String) -> RepoResult<()> {
        self.write()?.message = message;
        Ok(())
    }
}
