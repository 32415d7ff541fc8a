use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use flawless_format::{
    now_millis, CompressorRegistry, Depot, DepotBuilder, DepotFileInfo, FileMap,
};
use flawless_path::WorkPath;
use flawless_store::{DepotStore, FsDepotStore, InMemoryDepotStore, RepositoryLayout, StoreError};
use flawless_types::{CommitId, ContentHash};
use tracing::{debug, info, warn};

use crate::chain::{ChainSnapshot, CommitChain, Commits};
use crate::commit::RepositoryCommit;
use crate::commit_log::{CommitLog, FsCommitLog, InMemoryCommitLog, TrackerState};
use crate::config::FlawlessConfig;
use crate::error::{RepoError, RepoResult};
use crate::occupation::{GcReport, LiveSources, OccupationChart, SyncReport};
use crate::traits::{ReadonlyRepository, Repository};
use crate::workspace::{StagedChange, Workspace, WorkspaceSnapshot, WorkspaceStatus};

/// One problem found by [`LocalRepository::verify`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifyProblem {
    pub commit: CommitId,
    pub depot: ContentHash,
    pub message: String,
}

/// Result of [`LocalRepository::verify`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VerifyReport {
    pub commits_checked: usize,
    pub depots_checked: usize,
    pub problems: Vec<VerifyProblem>,
}

impl VerifyReport {
    pub fn is_ok(&self) -> bool {
        self.problems.is_empty()
    }
}

/// A repository over a depot store and a commit log.
pub struct LocalRepository {
    store: Arc<dyn DepotStore>,
    log: Arc<dyn CommitLog>,
    registry: CompressorRegistry,
    config: FlawlessConfig,
    readonly: bool,
    layout: Option<RepositoryLayout>,
    chain: CommitChain,
    workspace: Workspace,
    chart: OccupationChart,
    submit_lock: tokio::sync::Mutex<()>,
}

impl LocalRepository {
    /// Assemble a repository from explicit backends and replay the commit log.
    pub fn with_backends(
        store: Arc<dyn DepotStore>,
        log: Arc<dyn CommitLog>,
        config: FlawlessConfig,
        readonly: bool,
    ) -> RepoResult<Self> {
        config.validate()?;
        let snapshot = ChainSnapshot::from_commits(log.load()?)?;
        let latest = snapshot.latest_id();

        let workspace = Workspace::new();
        if let Some(tracker) = log.load_tracker()? {
            if tracker.head > latest {
                return Err(RepoError::BrokenChain {
                    id: tracker.head,
                    reason: format!("tracker head is past the latest commit {latest}"),
                });
            }
            if tracker.head < latest {
                warn!(tracker = tracker.head, latest, "tracker lags the commit log");
            }
            workspace.restore_message(tracker.message)?;
        }

        debug!(commits = snapshot.len(), readonly, "opened repository");
        Ok(Self {
            store,
            log,
            registry: CompressorRegistry::new(),
            chart: OccupationChart::new(config.gc.grace_syncs),
            config,
            readonly,
            layout: None,
            chain: CommitChain::new(snapshot),
            workspace,
            submit_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// A fresh repository held entirely in memory.
    pub fn in_memory(config: FlawlessConfig) -> RepoResult<Self> {
        Self::with_backends(
            Arc::new(InMemoryDepotStore::new()),
            Arc::new(InMemoryCommitLog::new()),
            config,
            false,
        )
    }

    /// Create the marker directory under `layout` and open the new repository.
    pub fn init(layout: RepositoryLayout, config: FlawlessConfig) -> RepoResult<Self> {
        if layout.is_initialized() {
            return Err(RepoError::AlreadyInitialized(layout.root().to_path_buf()));
        }
        config.validate()?;
        layout.create()?;
        config.save(&layout.config_file())?;
        info!(root = %layout.root().display(), "initialized repository");
        Self::open_layout(layout, config, false)
    }

    pub fn open(layout: RepositoryLayout, config: FlawlessConfig) -> RepoResult<Self> {
        Self::open_layout(layout, config, false)
    }

    pub fn open_readonly(layout: RepositoryLayout, config: FlawlessConfig) -> RepoResult<Self> {
        Self::open_layout(layout, config, true)
    }

    fn open_layout(
        layout: RepositoryLayout,
        config: FlawlessConfig,
        readonly: bool,
    ) -> RepoResult<Self> {
        if !layout.is_initialized() {
            return Err(RepoError::NotInitialized(layout.root().to_path_buf()));
        }
        let store = FsDepotStore::open(layout.depot_dir())?;
        let log = FsCommitLog::open(layout.commit_dir(), layout.tracker_file())?;
        let mut repo = Self::with_backends(Arc::new(store), Arc::new(log), config, readonly)?;
        repo.layout = Some(layout);
        Ok(repo)
    }

    /// Replace the codec registry used to encode and decode depots.
    pub fn with_registry(mut self, registry: CompressorRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn config(&self) -> &FlawlessConfig {
        &self.config
    }

    pub fn layout(&self) -> Option<&RepositoryLayout> {
        self.layout.as_ref()
    }

    pub fn store(&self) -> &dyn DepotStore {
        self.store.as_ref()
    }

    pub fn registry(&self) -> &CompressorRegistry {
        &self.registry
    }

    fn ensure_writable(&self) -> RepoResult<()> {
        if self.readonly {
            Err(RepoError::ReadOnly)
        } else {
            Ok(())
        }
    }

    fn load_depot(&self, hash: &ContentHash) -> RepoResult<Depot> {
        Ok(self.store.load(hash, &self.registry)?)
    }

    async fn load_depot_async(&self, hash: &ContentHash) -> RepoResult<Depot> {
        Ok(self.store.load_async(hash, &self.registry).await?)
    }

    fn head_depot(&self, chain: &ChainSnapshot) -> RepoResult<Option<Depot>> {
        chain
            .latest()
            .map(|commit| self.load_depot(&commit.depot()))
            .transpose()
    }

    /// Build the next depot on top of `base`.
    ///
    /// Files already present in `base` are referenced in the depot that
    /// physically holds their bytes; only new content is stored inline.
    fn build_depot(&self, base: Option<&Depot>, snapshot: &WorkspaceSnapshot) -> RepoResult<Depot> {
        let mut builder =
            DepotBuilder::new().compress_type(self.config.repository.compress_type);

        let mut origins: HashMap<ContentHash, ContentHash> = HashMap::new();
        if let Some(base) = base {
            for info in base.files() {
                origins
                    .entry(info.hash)
                    .or_insert_with(|| info.origin(base.hash()));
            }
        }

        for (path, change) in snapshot.changes() {
            let StagedChange::Put { data, hash } = change else {
                continue;
            };
            let existing = base.and_then(|b| b.files().get(path.as_str()).map(|i| (b, i)));
            match (existing, origins.get(hash)) {
                (Some((base, info)), _) if info.hash == *hash => {
                    builder.add_reference(path.clone(), *hash, info.size, info.origin(base.hash()))?;
                }
                (_, Some(origin)) => {
                    builder.add_reference(path.clone(), *hash, data.len() as u64, *origin)?;
                }
                _ => {
                    builder.add_file(path.clone(), data)?;
                }
            }
        }

        if let Some(base) = base {
            for info in base.files() {
                if snapshot.get(info.path.as_str()).is_none() {
                    builder.add_reference(
                        info.path.clone(),
                        info.hash,
                        info.size,
                        info.origin(base.hash()),
                    )?;
                }
            }
        }

        let unchanged = match base {
            Some(base) => builder.snapshot_hash() == base.hash(),
            None => builder.is_empty(),
        };
        if unchanged {
            return Err(RepoError::NoChanges);
        }
        Ok(builder.build())
    }

    /// Append and publish a commit for `depot`. Contains no suspension point,
    /// so a cancelled async submission either publishes fully or not at all.
    fn publish(
        &self,
        chain: &ChainSnapshot,
        depot: &Depot,
        snapshot: &WorkspaceSnapshot,
    ) -> RepoResult<Arc<RepositoryCommit>> {
        let commit = Arc::new(RepositoryCommit {
            id: chain.latest_id() + 1,
            parent: chain.latest().map(|c| c.id),
            author: self.config.repository.author.clone(),
            time: now_millis(),
            message: snapshot.message().to_string(),
            label: depot.label(),
        });
        self.log.append(&commit)?;
        self.chain.publish(Arc::clone(&commit))?;
        info!(
            commit = commit.id,
            depot = %commit.depot(),
            files = depot.file_count(),
            dependencies = commit.label.dependencies.len(),
            "published commit"
        );

        self.workspace.clear_submitted(snapshot)?;
        if let Err(e) = self.save_tracker() {
            warn!(commit = commit.id, error = %e, "failed to save tracker");
        }
        Ok(commit)
    }

    /// Persist the latest commit id and the pending workspace message.
    pub fn save_tracker(&self) -> RepoResult<()> {
        self.ensure_writable()?;
        let tracker = TrackerState {
            head: self.latest_commit_id()?,
            message: self.workspace.message()?,
        };
        self.log.save_tracker(&tracker)
    }

    fn begin_submit(&self) -> RepoResult<tokio::sync::MutexGuard<'_, ()>> {
        self.ensure_writable()?;
        self.submit_lock
            .try_lock()
            .map_err(|_| RepoError::ConcurrentSubmission)
    }

    fn locate(&self, id: CommitId, depot: &Depot, path: &str) -> RepoResult<DepotFileInfo> {
        let path = WorkPath::new(path)?;
        depot
            .files()
            .get(path.as_str())
            .cloned()
            .ok_or_else(|| RepoError::FileNotFound {
                commit: id,
                path: path.into_string(),
            })
    }

    /// Re-read every commit's depot and its dependencies, collecting problems.
    pub fn verify(&self) -> RepoResult<VerifyReport> {
        let chain = self.chain.snapshot()?;
        let mut report = VerifyReport::default();
        let mut depots: HashMap<ContentHash, Option<Arc<Depot>>> = HashMap::new();

        for commit in Commits::new(Arc::clone(&chain)) {
            report.commits_checked += 1;
            let mut problem = |depot: ContentHash, message: String| {
                warn!(commit = commit.id, depot = %depot, %message, "verify problem");
                report.problems.push(VerifyProblem {
                    commit: commit.id,
                    depot,
                    message,
                });
            };

            let Some(depot) = self.checked_depot(&mut depots, &commit.depot(), &mut problem) else {
                continue;
            };
            if depot.label() != commit.label {
                problem(depot.hash(), "depot dependencies differ from commit label".into());
            }
            for info in depot.files() {
                let origin = info.origin(depot.hash());
                if origin == depot.hash() {
                    continue;
                }
                let Some(dependency) = self.checked_depot(&mut depots, &origin, &mut problem) else {
                    continue;
                };
                match dependency.read_inline_by_hash(&info.hash) {
                    Some(bytes) if ContentHash::of(bytes) == info.hash => {}
                    Some(_) => problem(origin, format!("content of {} does not match", info.path)),
                    None => problem(origin, format!("missing content for {}", info.path)),
                }
            }
        }
        report.depots_checked = depots.len();
        info!(
            commits = report.commits_checked,
            depots = report.depots_checked,
            problems = report.problems.len(),
            "verified repository"
        );
        Ok(report)
    }

    fn checked_depot<F>(
        &self,
        cache: &mut HashMap<ContentHash, Option<Arc<Depot>>>,
        hash: &ContentHash,
        problem: &mut F,
    ) -> Option<Arc<Depot>>
    where
        F: FnMut(ContentHash, String),
    {
        if let Some(cached) = cache.get(hash) {
            return cached.clone();
        }
        let loaded = match self.load_depot(hash) {
            Ok(depot) => Some(Arc::new(depot)),
            Err(e) => {
                problem(*hash, e.to_string());
                None
            }
        };
        cache.insert(*hash, loaded.clone());
        loaded
    }
}

/// Bytes of `info` from `origin`, the depot that stores them inline.
fn extract(info: &DepotFileInfo, origin: &Depot) -> RepoResult<Vec<u8>> {
    let bytes = origin
        .read_inline_by_hash(&info.hash)
        .ok_or(RepoError::MissingContent {
            depot: origin.hash(),
            content: info.hash,
        })?;
    let actual = ContentHash::of(bytes);
    if actual != info.hash {
        return Err(StoreError::HashMismatch {
            expected: info.hash,
            actual,
        }
        .into());
    }
    Ok(bytes.to_vec())
}

impl std::fmt::Debug for LocalRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalRepository")
            .field("layout", &self.layout)
            .field("readonly", &self.readonly)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ReadonlyRepository for LocalRepository {
    fn is_readonly(&self) -> bool {
        self.readonly
    }

    fn commits(&self) -> RepoResult<Commits> {
        Ok(Commits::new(self.chain.snapshot()?))
    }

    fn commit_by_id(&self, id: CommitId) -> RepoResult<Option<Arc<RepositoryCommit>>> {
        Ok(self.chain.snapshot()?.get(id).cloned())
    }

    fn latest_commit_id(&self) -> RepoResult<CommitId> {
        Ok(self.chain.snapshot()?.latest_id())
    }

    fn parent_commit(&self, id: CommitId) -> RepoResult<Option<Arc<RepositoryCommit>>> {
        let chain = self.chain.snapshot()?;
        let commit = chain.get(id).ok_or(RepoError::CommitNotFound(id))?;
        Ok(commit.parent.and_then(|p| chain.get(p).cloned()))
    }

    fn child_commit(&self, id: CommitId) -> RepoResult<Option<Arc<RepositoryCommit>>> {
        let chain = self.chain.snapshot()?;
        if chain.get(id).is_none() {
            return Err(RepoError::CommitNotFound(id));
        }
        Ok(chain.child(id).cloned())
    }

    fn read_manifest(&self, id: CommitId) -> RepoResult<FileMap> {
        let commit = self.require_commit(id)?;
        Ok(self.load_depot(&commit.depot())?.files().clone())
    }

    fn read_file(&self, id: CommitId, path: &str) -> RepoResult<Vec<u8>> {
        let commit = self.require_commit(id)?;
        let depot = self.load_depot(&commit.depot())?;
        let info = self.locate(id, &depot, path)?;
        let origin = info.origin(depot.hash());
        if origin == depot.hash() {
            extract(&info, &depot)
        } else {
            extract(&info, &self.load_depot(&origin)?)
        }
    }

    async fn read_manifest_async(&self, id: CommitId) -> RepoResult<FileMap> {
        let commit = self.require_commit(id)?;
        Ok(self.load_depot_async(&commit.depot()).await?.files().clone())
    }

    async fn read_file_async(&self, id: CommitId, path: &str) -> RepoResult<Vec<u8>> {
        let commit = self.require_commit(id)?;
        let depot = self.load_depot_async(&commit.depot()).await?;
        let info = self.locate(id, &depot, path)?;
        let origin = info.origin(depot.hash());
        if origin == depot.hash() {
            extract(&info, &depot)
        } else {
            extract(&info, &self.load_depot_async(&origin).await?)
        }
    }
}

#[async_trait]
impl Repository for LocalRepository {
    fn workspace(&self) -> RepoResult<&Workspace> {
        self.ensure_writable()?;
        Ok(&self.workspace)
    }

    fn occupation_chart(&self) -> RepoResult<&OccupationChart> {
        self.ensure_writable()?;
        Ok(&self.chart)
    }

    fn active_commit_id(&self) -> RepoResult<CommitId> {
        self.ensure_writable()?;
        self.latest_commit_id()
    }

    fn submit_workspace(&self) -> RepoResult<Arc<RepositoryCommit>> {
        let _submitting = self.begin_submit()?;
        let snapshot = self.workspace.snapshot()?;
        if snapshot.is_empty() {
            return Err(RepoError::NoChanges);
        }
        let chain = self.chain.snapshot()?;
        let base = self.head_depot(&chain)?;
        let depot = self.build_depot(base.as_ref(), &snapshot)?;

        let _pin = self.chart.pin(depot.hash())?;
        let encoded = depot.encode(&self.registry, self.config.repository.file_map_encoding)?;
        self.store.write(&depot.hash(), &encoded)?;
        self.publish(&chain, &depot, &snapshot)
    }

    async fn submit_workspace_async(&self) -> RepoResult<Arc<RepositoryCommit>> {
        let _submitting = self.begin_submit()?;
        let snapshot = self.workspace.snapshot()?;
        if snapshot.is_empty() {
            return Err(RepoError::NoChanges);
        }
        let chain = self.chain.snapshot()?;
        let base = match chain.latest() {
            Some(head) => Some(self.load_depot_async(&head.depot()).await?),
            None => None,
        };
        let depot = self.build_depot(base.as_ref(), &snapshot)?;

        let _pin = self.chart.pin(depot.hash())?;
        let encoded = depot.encode(&self.registry, self.config.repository.file_map_encoding)?;
        self.store.write_async(&depot.hash(), &encoded).await?;
        self.publish(&chain, &depot, &snapshot)
    }

    fn sync_occupation_chart(&self) -> RepoResult<SyncReport> {
        self.ensure_writable()?;
        self.chart.sync(|| {
            let chain = self.chain.snapshot()?;
            Ok(LiveSources {
                labels: chain.labels().cloned().collect(),
                pending: self.workspace.pending_hashes()?,
                stored: self.store.list()?,
            })
        })
    }

    fn collect_garbage(&self) -> RepoResult<GcReport> {
        let synced = self.sync_occupation_chart()?;
        let mut report = GcReport::default();
        for hash in self.chart.collectable()? {
            if let Some(bytes) = self.chart.delete_if_unpinned(self.store.as_ref(), &hash)? {
                report.objects_removed += 1;
                report.bytes_freed += bytes;
            }
        }
        report.objects_retained = synced.stored - report.objects_removed;
        info!(
            removed = report.objects_removed,
            retained = report.objects_retained,
            bytes = report.bytes_freed,
            "garbage collected"
        );
        Ok(report)
    }

    fn status(&self) -> RepoResult<WorkspaceStatus> {
        self.ensure_writable()?;
        let chain = self.chain.snapshot()?;
        let base = self.head_depot(&chain)?;
        self.workspace.status(base.as_ref().map(Depot::files))
    }
}
