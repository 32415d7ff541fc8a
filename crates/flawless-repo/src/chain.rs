//! The append-only commit history.
//!
//! Readers take an `Arc` snapshot and never wait on a submission beyond the
//! pointer swap in [`CommitChain::publish`].

use std::sync::{Arc, RwLock};

use flawless_types::{CommitId, DepotLabel};

use crate::commit::RepositoryCommit;
use crate::error::{RepoError, RepoResult};

/// Commits per sealed segment.
const SEGMENT_LEN: usize = 256;

/// An immutable view of the chain.
///
/// Full segments are sealed behind an `Arc` and shared between snapshots, so
/// copying a snapshot costs one pointer per segment plus the open tail.
#[derive(Debug, Default, Clone)]
pub struct ChainSnapshot {
    sealed: Vec<Arc<[Arc<RepositoryCommit>]>>,
    tail: Vec<Arc<RepositoryCommit>>,
}

impl ChainSnapshot {
    /// Build a snapshot from records ordered by id, checking continuity.
    pub fn from_commits(commits: Vec<RepositoryCommit>) -> RepoResult<Self> {
        let mut snapshot = Self::default();
        for commit in commits {
            snapshot.push(Arc::new(commit))?;
        }
        Ok(snapshot)
    }

    fn push(&mut self, commit: Arc<RepositoryCommit>) -> RepoResult<()> {
        let expected = self.latest_id() + 1;
        if commit.id != expected {
            return Err(RepoError::BrokenChain {
                id: commit.id,
                reason: format!("expected commit {expected}"),
            });
        }
        let parent = Some(self.latest_id()).filter(|id| *id > 0);
        if commit.parent != parent {
            return Err(RepoError::BrokenChain {
                id: commit.id,
                reason: format!("parent is {:?}, expected {:?}", commit.parent, parent),
            });
        }
        self.tail.push(commit);
        if self.tail.len() == SEGMENT_LEN {
            self.sealed.push(Arc::from(std::mem::take(&mut self.tail)));
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.sealed.len() * SEGMENT_LEN + self.tail.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Id of the newest commit, `0` if there is none.
    pub fn latest_id(&self) -> CommitId {
        self.latest().map(|c| c.id).unwrap_or(0)
    }

    pub fn latest(&self) -> Option<&Arc<RepositoryCommit>> {
        self.tail
            .last()
            .or_else(|| self.sealed.last().and_then(|s| s.last()))
    }

    pub fn get(&self, id: CommitId) -> Option<&Arc<RepositoryCommit>> {
        let index = usize::try_from(id).ok()?.checked_sub(1)?;
        self.at(index)
    }

    fn at(&self, index: usize) -> Option<&Arc<RepositoryCommit>> {
        let (segment, offset) = (index / SEGMENT_LEN, index % SEGMENT_LEN);
        match self.sealed.get(segment) {
            Some(sealed) => sealed.get(offset),
            None if segment == self.sealed.len() => self.tail.get(offset),
            None => None,
        }
    }

    /// The commit whose parent is `id`, if any.
    pub fn child(&self, id: CommitId) -> Option<&Arc<RepositoryCommit>> {
        self.get(id.checked_add(1)?)
            .filter(|c| c.parent == Some(id))
    }

    /// Commits oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<RepositoryCommit>> {
        self.sealed
            .iter()
            .flat_map(|s| s.iter())
            .chain(self.tail.iter())
    }

    /// Labels of every commit, oldest first.
    pub fn labels(&self) -> impl Iterator<Item = &DepotLabel> {
        self.iter().map(|c| &c.label)
    }
}

/// Shared, copy-on-write commit chain.
#[derive(Debug, Default)]
pub struct CommitChain {
    current: RwLock<Arc<ChainSnapshot>>,
}

impl CommitChain {
    pub fn new(snapshot: ChainSnapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    pub fn snapshot(&self) -> RepoResult<Arc<ChainSnapshot>> {
        let current = self.current.read().map_err(|_| RepoError::LockPoisoned)?;
        Ok(Arc::clone(&current))
    }

    /// Make `commit` visible to readers. It must extend the latest commit.
    ///
    /// The snapshot is copied only while a reader still holds it.
    pub fn publish(&self, commit: Arc<RepositoryCommit>) -> RepoResult<()> {
        let mut current = self.current.write().map_err(|_| RepoError::LockPoisoned)?;
        Arc::make_mut(&mut *current).push(commit)
    }
}

/// Lazy iterator over a chain snapshot, oldest first.
///
/// Later submissions are not observed. Cloning or [`Commits::rewind`]
/// restarts from the first commit.
#[derive(Clone, Debug)]
pub struct Commits {
    snapshot: Arc<ChainSnapshot>,
    next: usize,
}

impl Commits {
    pub fn new(snapshot: Arc<ChainSnapshot>) -> Self {
        Self { snapshot, next: 0 }
    }

    pub fn rewind(&mut self) {
        self.next = 0;
    }
}

impl Iterator for Commits {
    type Item = Arc<RepositoryCommit>;

    fn next(&mut self) -> Option<Self::Item> {
        let commit = self.snapshot.at(self.next)?;
        self.next += 1;
        Some(Arc::clone(commit))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.snapshot.len().saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Commits {}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use flawless_types::{Author, ContentHash};

    use super::*;

    fn commit(id: CommitId, parent: Option<CommitId>) -> RepositoryCommit {
        RepositoryCommit {
            id,
            parent,
            author: Author::new("Ada", "ada@example.com"),
            time: Utc::now(),
            message: format!("commit {id}"),
            label: DepotLabel::standalone(ContentHash::of(&id.to_le_bytes())),
        }
    }

    fn chain_of(n: CommitId) -> Vec<RepositoryCommit> {
        (1..=n)
            .map(|id| commit(id, Some(id - 1).filter(|p| *p > 0)))
            .collect()
    }

    #[test]
    fn continuity_is_checked() {
        assert!(ChainSnapshot::from_commits(chain_of(3)).is_ok());
        assert!(matches!(
            ChainSnapshot::from_commits(vec![commit(2, Some(1))]),
            Err(RepoError::BrokenChain { id: 2, .. })
        ));
        assert!(matches!(
            ChainSnapshot::from_commits(vec![commit(1, None), commit(2, None)]),
            Err(RepoError::BrokenChain { id: 2, .. })
        ));
    }

    #[test]
    fn lookup_and_child() {
        let snapshot = ChainSnapshot::from_commits(chain_of(3)).unwrap();
        assert_eq!(snapshot.latest_id(), 3);
        assert_eq!(snapshot.get(2).unwrap().id, 2);
        assert!(snapshot.get(0).is_none());
        assert!(snapshot.get(4).is_none());
        assert_eq!(snapshot.child(1).map(|c| c.id), Some(2));
        assert!(snapshot.child(3).is_none());
        assert!(snapshot.child(CommitId::MAX).is_none());
        assert_eq!(snapshot.labels().count(), 3);
    }

    #[test]
    fn empty_chain() {
        let snapshot = ChainSnapshot::default();
        assert_eq!(snapshot.latest_id(), 0);
        assert!(snapshot.latest().is_none());
        assert_eq!(Commits::new(Arc::new(snapshot)).count(), 0);
    }

    #[test]
    fn publish_is_invisible_to_old_snapshots() {
        let chain = CommitChain::new(ChainSnapshot::from_commits(chain_of(1)).unwrap());
        let before = chain.snapshot().unwrap();
        chain.publish(Arc::new(commit(2, Some(1)))).unwrap();
        assert_eq!(before.len(), 1);
        assert_eq!(chain.snapshot().unwrap().len(), 2);
        assert!(chain.publish(Arc::new(commit(2, Some(1)))).is_err());
    }

    #[test]
    fn publish_across_segment_boundaries() {
        let chain = CommitChain::default();
        let count = (SEGMENT_LEN * 2 + 3) as CommitId;
        let mut held = Vec::new();
        for c in chain_of(count) {
            chain.publish(Arc::new(c)).unwrap();
            held.push(chain.snapshot().unwrap());
        }

        let last = chain.snapshot().unwrap();
        assert_eq!(last.len(), count as usize);
        assert_eq!(last.latest_id(), count);
        let boundary = SEGMENT_LEN as CommitId;
        assert_eq!(last.get(boundary).unwrap().id, boundary);
        assert_eq!(last.child(boundary).map(|c| c.id), Some(boundary + 1));
        assert!(last.iter().map(|c| c.id).eq(1..=count));

        for (i, snapshot) in held.iter().enumerate() {
            assert_eq!(snapshot.len(), i + 1);
            assert_eq!(snapshot.latest_id(), i as CommitId + 1);
        }
        assert!(Arc::ptr_eq(&held[SEGMENT_LEN].sealed[0], &last.sealed[0]));
        assert_eq!(Commits::new(last).count(), count as usize);
    }

    #[test]
    fn failed_publish_keeps_chain() {
        let chain = CommitChain::new(ChainSnapshot::from_commits(chain_of(2)).unwrap());
        assert!(matches!(
            chain.publish(Arc::new(commit(5, Some(2)))),
            Err(RepoError::BrokenChain { id: 5, .. })
        ));
        assert_eq!(chain.snapshot().unwrap().latest_id(), 2);
    }

    #[test]
    fn commits_iterator_restarts() {
        let snapshot = Arc::new(ChainSnapshot::from_commits(chain_of(3)).unwrap());
        let mut commits = Commits::new(snapshot);
        assert_eq!(commits.len(), 3);
        let ids: Vec<_> = commits.by_ref().map(|c| c.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(commits.next(), None);
        commits.rewind();
        assert_eq!(commits.next().map(|c| c.id), Some(1));
    }
}
