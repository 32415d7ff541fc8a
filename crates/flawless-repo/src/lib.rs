//! Repositories for Flawless.
//!
//! A repository is an append-only chain of [`RepositoryCommit`]s, each
//! pinning one depot, plus a single [`Workspace`] whose contents become the
//! next commit and an [`OccupationChart`] deciding which stored depots may be
//! reclaimed.
//!
//! [`LocalRepository`] implements both [`ReadonlyRepository`] and
//! [`Repository`] over any [`DepotStore`](flawless_store::DepotStore) and
//! [`CommitLog`].

pub mod chain;
pub mod commit;
pub mod commit_log;
pub mod config;
pub mod error;
pub mod occupation;
pub mod repository;
pub mod traits;
pub mod workspace;

pub use chain::{ChainSnapshot, CommitChain, Commits};
pub use commit::RepositoryCommit;
pub use commit_log::{CommitLog, FsCommitLog, InMemoryCommitLog, TrackerState};
pub use config::{AuthConfig, FlawlessConfig, GcConfig, RepositoryConfig, MIN_GRACE_SYNCS};
pub use error::{RepoError, RepoResult};
pub use occupation::{GcReport, LiveSources, Occupancy, OccupationChart, PinGuard, SyncReport};
pub use repository::{LocalRepository, VerifyProblem, VerifyReport};
pub use traits::{ReadonlyRepository, Repository};
pub use workspace::{StagedChange, Workspace, WorkspaceSnapshot, WorkspaceStatus};

pub use flawless_format::{FileMap, FileMapEncoding};
pub use flawless_store::RepositoryLayout;
pub use flawless_types::{Author, CommitId, ContentHash, DepotLabel};
