use std::sync::Arc;

use async_trait::async_trait;
use flawless_format::FileMap;
use flawless_types::CommitId;

use crate::chain::Commits;
use crate::commit::RepositoryCommit;
use crate::error::{RepoError, RepoResult};
use crate::occupation::{GcReport, OccupationChart, SyncReport};
use crate::workspace::{Workspace, WorkspaceStatus};

/// Read boundary of a repository.
///
/// The async forms suspend at I/O boundaries. Dropping the future cancels
/// the read and leaves the repository unchanged.
#[async_trait]
pub trait ReadonlyRepository: Send + Sync {
    fn is_readonly(&self) -> bool;

    /// Every commit, oldest first, as of the time of the call.
    fn commits(&self) -> RepoResult<Commits>;

    fn commit_by_id(&self, id: CommitId) -> RepoResult<Option<Arc<RepositoryCommit>>>;

    /// Id of the newest commit, `0` for an empty repository.
    fn latest_commit_id(&self) -> RepoResult<CommitId>;

    /// Parent of commit `id`; `None` for the root commit.
    fn parent_commit(&self, id: CommitId) -> RepoResult<Option<Arc<RepositoryCommit>>>;

    /// Child of commit `id`; `None` for the newest commit.
    fn child_commit(&self, id: CommitId) -> RepoResult<Option<Arc<RepositoryCommit>>>;

    /// File map of the depot pinned by commit `id`.
    fn read_manifest(&self, id: CommitId) -> RepoResult<FileMap>;

    /// Contents of `path` as of commit `id`, resolved through dependencies.
    fn read_file(&self, id: CommitId, path: &str) -> RepoResult<Vec<u8>>;

    async fn commits_async(&self) -> RepoResult<Commits> {
        self.commits()
    }

    async fn commit_by_id_async(&self, id: CommitId) -> RepoResult<Option<Arc<RepositoryCommit>>> {
        self.commit_by_id(id)
    }

    async fn latest_commit_id_async(&self) -> RepoResult<CommitId> {
        self.latest_commit_id()
    }

    async fn read_manifest_async(&self, id: CommitId) -> RepoResult<FileMap> {
        self.read_manifest(id)
    }

    async fn read_file_async(&self, id: CommitId, path: &str) -> RepoResult<Vec<u8>> {
        self.read_file(id, path)
    }

    /// Like [`commit_by_id`](Self::commit_by_id) but a missing commit is an error.
    fn require_commit(&self, id: CommitId) -> RepoResult<Arc<RepositoryCommit>> {
        self.commit_by_id(id)?.ok_or(RepoError::CommitNotFound(id))
    }
}

/// Write boundary of a repository.
///
/// All methods fail with [`RepoError::ReadOnly`] on a read-only repository.
#[async_trait]
pub trait Repository: ReadonlyRepository {
    fn workspace(&self) -> RepoResult<&Workspace>;

    fn occupation_chart(&self) -> RepoResult<&OccupationChart>;

    /// Commit the workspace is based on.
    fn active_commit_id(&self) -> RepoResult<CommitId>;

    /// Turn the workspace into a new commit.
    ///
    /// Fails with [`RepoError::NoChanges`] if the result would equal the
    /// latest snapshot and with [`RepoError::ConcurrentSubmission`] if
    /// another submission is in flight.
    fn submit_workspace(&self) -> RepoResult<Arc<RepositoryCommit>>;

    /// Cancellable form of [`submit_workspace`](Self::submit_workspace).
    ///
    /// A submission dropped before completion publishes nothing and leaves
    /// the workspace as it was.
    async fn submit_workspace_async(&self) -> RepoResult<Arc<RepositoryCommit>>;

    /// Recompute the occupation chart.
    fn sync_occupation_chart(&self) -> RepoResult<SyncReport>;

    /// Recompute the chart, then delete every collectable object.
    fn collect_garbage(&self) -> RepoResult<GcReport>;

    /// Staged changes relative to the latest commit.
    fn status(&self) -> RepoResult<WorkspaceStatus>;
}
