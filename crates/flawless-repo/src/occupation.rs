//! Liveness index over stored depots.
//!
//! The chart is derived state: every [`OccupationChart::sync`] rebuilds the
//! live set from the commit chain, the workspace and the pin set. An object
//! is deleted only after it has been absent from `grace_syncs` consecutive
//! recomputations, and never while it is pinned.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, RwLock};

use flawless_store::DepotStore;
use flawless_types::{ContentHash, DepotLabel};
use tracing::{debug, info};

use crate::config::MIN_GRACE_SYNCS;
use crate::error::{RepoError, RepoResult};

/// Liveness marker of one hash.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Occupancy {
    /// Reachable at the last recomputation.
    Live,
    /// Held by an in-flight submission.
    Pinned,
    /// Stored but unreachable for `streak` consecutive recomputations.
    Absent { streak: u32 },
    /// Never seen by a recomputation.
    Unknown,
}

/// What a recomputation walks.
#[derive(Clone, Debug, Default)]
pub struct LiveSources {
    /// Labels of every published commit.
    pub labels: Vec<DepotLabel>,
    /// Content hashes staged in the workspace.
    pub pending: BTreeSet<ContentHash>,
    /// Every hash currently in the store.
    pub stored: Vec<ContentHash>,
}

/// Outcome of one recomputation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncReport {
    /// Sequence number of this recomputation, starting at 1.
    pub generation: u64,
    pub live: usize,
    pub stored: usize,
    /// Stored hashes that were not live.
    pub absent: usize,
    /// Hashes the next sweep may delete.
    pub collectable: Vec<ContentHash>,
}

/// Result of garbage collection.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GcReport {
    pub objects_removed: usize,
    pub objects_retained: usize,
    pub bytes_freed: u64,
}

#[derive(Debug, Default)]
struct ChartState {
    generation: u64,
    live: BTreeSet<ContentHash>,
    absent: BTreeMap<ContentHash, u32>,
}

/// The occupation chart of one repository.
#[derive(Debug)]
pub struct OccupationChart {
    state: RwLock<ChartState>,
    pins: Mutex<HashMap<ContentHash, usize>>,
    sync_lock: Mutex<()>,
    grace_syncs: u32,
}

/// Keeps a hash pinned until dropped.
#[must_use = "the hash is unpinned when the guard is dropped"]
#[derive(Debug)]
pub struct PinGuard<'a> {
    chart: &'a OccupationChart,
    hash: ContentHash,
}

impl PinGuard<'_> {
    pub fn hash(&self) -> ContentHash {
        self.hash
    }
}

impl Drop for PinGuard<'_> {
    fn drop(&mut self) {
        let mut pins = match self.chart.pins.lock() {
            Ok(pins) => pins,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(count) = pins.get_mut(&self.hash) {
            *count -= 1;
            if *count == 0 {
                pins.remove(&self.hash);
            }
        }
    }
}

impl OccupationChart {
    /// `grace_syncs` is raised to [`MIN_GRACE_SYNCS`] if lower.
    pub fn new(grace_syncs: u32) -> Self {
        Self {
            state: RwLock::new(ChartState::default()),
            pins: Mutex::new(HashMap::new()),
            sync_lock: Mutex::new(()),
            grace_syncs: grace_syncs.max(MIN_GRACE_SYNCS),
        }
    }

    pub fn grace_syncs(&self) -> u32 {
        self.grace_syncs
    }

    fn pins(&self) -> RepoResult<MutexGuard<'_, HashMap<ContentHash, usize>>> {
        self.pins.lock().map_err(|_| RepoError::LockPoisoned)
    }

    /// Mark `hash` live until the guard is dropped.
    ///
    /// Pinning also restarts the absence streak of `hash`, so an object that
    /// becomes reachable again is not swept on the strength of old syncs.
    pub fn pin(&self, hash: ContentHash) -> RepoResult<PinGuard<'_>> {
        let mut pins = self.pins()?;
        *pins.entry(hash).or_insert(0) += 1;
        self.state
            .write()
            .map_err(|_| RepoError::LockPoisoned)?
            .absent
            .remove(&hash);
        Ok(PinGuard { chart: self, hash })
    }

    pub fn is_pinned(&self, hash: &ContentHash) -> RepoResult<bool> {
        Ok(self.pins()?.contains_key(hash))
    }

    pub fn pinned(&self) -> RepoResult<BTreeSet<ContentHash>> {
        Ok(self.pins()?.keys().copied().collect())
    }

    pub fn occupancy(&self, hash: &ContentHash) -> RepoResult<Occupancy> {
        if self.is_pinned(hash)? {
            return Ok(Occupancy::Pinned);
        }
        let state = self.state.read().map_err(|_| RepoError::LockPoisoned)?;
        Ok(if state.live.contains(hash) {
            Occupancy::Live
        } else if let Some(streak) = state.absent.get(hash) {
            Occupancy::Absent { streak: *streak }
        } else {
            Occupancy::Unknown
        })
    }

    /// Returns `true` if `hash` was live at the last recomputation or is pinned.
    pub fn is_live(&self, hash: &ContentHash) -> RepoResult<bool> {
        Ok(matches!(
            self.occupancy(hash)?,
            Occupancy::Live | Occupancy::Pinned
        ))
    }

    pub fn live_hashes(&self) -> RepoResult<BTreeSet<ContentHash>> {
        let state = self.state.read().map_err(|_| RepoError::LockPoisoned)?;
        Ok(state.live.clone())
    }

    /// Number of completed recomputations.
    pub fn generation(&self) -> RepoResult<u64> {
        Ok(self.state.read().map_err(|_| RepoError::LockPoisoned)?.generation)
    }

    /// Rebuild the chart.
    ///
    /// The pin set is read before `gather` runs. A submission pins its depot
    /// before publishing it and unpins after, so every recomputation sees a
    /// concurrent submission through the pins, the chain, or both.
    pub fn sync<F>(&self, gather: F) -> RepoResult<SyncReport>
    where
        F: FnOnce() -> RepoResult<LiveSources>,
    {
        let _sync = self.sync_lock.lock().map_err(|_| RepoError::LockPoisoned)?;
        let pinned = self.pinned()?;
        let sources = gather()?;

        let mut live = reachable(&sources.labels);
        live.extend(sources.pending.iter().copied());
        live.extend(pinned.iter().copied());

        let mut state = self.state.write().map_err(|_| RepoError::LockPoisoned)?;
        let mut absent = BTreeMap::new();
        for hash in &sources.stored {
            if live.contains(hash) {
                continue;
            }
            let streak = state.absent.get(hash).copied().unwrap_or(0) + 1;
            absent.insert(*hash, streak);
        }
        state.generation += 1;
        state.live = live;
        state.absent = absent;

        let collectable: Vec<ContentHash> = state
            .absent
            .iter()
            .filter(|(_, streak)| **streak >= self.grace_syncs)
            .map(|(hash, _)| *hash)
            .collect();
        let report = SyncReport {
            generation: state.generation,
            live: state.live.len(),
            stored: sources.stored.len(),
            absent: state.absent.len(),
            collectable,
        };
        debug!(
            generation = report.generation,
            live = report.live,
            stored = report.stored,
            absent = report.absent,
            collectable = report.collectable.len(),
            "occupation chart synced"
        );
        Ok(report)
    }

    /// Hashes absent for at least `grace_syncs` recomputations and not pinned.
    pub fn collectable(&self) -> RepoResult<Vec<ContentHash>> {
        let pins = self.pins()?;
        let state = self.state.read().map_err(|_| RepoError::LockPoisoned)?;
        Ok(state
            .absent
            .iter()
            .filter(|(hash, streak)| **streak >= self.grace_syncs && !pins.contains_key(*hash))
            .map(|(hash, _)| *hash)
            .collect())
    }

    /// Delete `hash` from `store` if it is still collectable.
    ///
    /// Holds the pin set for the whole check-and-delete, so a submission
    /// cannot pin the hash in between. Returns the bytes freed, or `None` if
    /// the object was kept.
    pub fn delete_if_unpinned(
        &self,
        store: &dyn DepotStore,
        hash: &ContentHash,
    ) -> RepoResult<Option<u64>> {
        let pins = self.pins()?;
        if pins.contains_key(hash) {
            return Ok(None);
        }
        let mut state = self.state.write().map_err(|_| RepoError::LockPoisoned)?;
        match state.absent.get(hash) {
            Some(streak) if *streak >= self.grace_syncs => {}
            _ => return Ok(None),
        }
        let size = store
            .read(hash)?
            .map(|d| (d.object.len() + d.file_map.len()) as u64)
            .unwrap_or(0);
        let existed = store.delete(hash)?;
        state.absent.remove(hash);
        if existed {
            info!(depot = %hash, bytes = size, "swept unreachable depot");
            Ok(Some(size))
        } else {
            Ok(None)
        }
    }
}

impl Default for OccupationChart {
    fn default() -> Self {
        Self::new(MIN_GRACE_SYNCS)
    }
}

/// Every label id plus the transitive closure of their dependencies.
fn reachable(labels: &[DepotLabel]) -> BTreeSet<ContentHash> {
    let by_id: HashMap<ContentHash, &DepotLabel> = labels.iter().map(|l| (l.id, l)).collect();
    let mut live = BTreeSet::new();
    let mut stack: Vec<ContentHash> = labels.iter().map(|l| l.id).collect();
    while let Some(hash) = stack.pop() {
        if !live.insert(hash) {
            continue;
        }
        if let Some(label) = by_id.get(&hash) {
            stack.extend(label.dependencies.iter().copied());
        }
    }
    live
}
