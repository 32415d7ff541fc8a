//! Durable storage of commit records and the workspace tracker.
//!
//! Each commit is one record file framed like a log entry:
//!
//! ```text
//! [4 bytes: payload length (little-endian u32)]
//! [4 bytes: CRC32 of payload (little-endian u32)]
//! [N bytes: payload (bincode-serialized RepositoryCommit)]
//! ```

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use flawless_store::write_atomic;
use flawless_types::CommitId;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::commit::RepositoryCommit;
use crate::error::{RepoError, RepoResult};

const FRAME_HEADER: usize = 8;
const RECORD_EXT: &str = "rec";

/// Workspace state persisted between sessions.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerState {
    /// Commit the workspace is based on. `0` before the first commit.
    pub head: CommitId,
    /// Pending commit message.
    pub message: String,
}

/// Append-only storage of commit records.
pub trait CommitLog: Send + Sync {
    /// Every record, ordered by id.
    fn load(&self) -> RepoResult<Vec<RepositoryCommit>>;

    /// Persist a new record. Returns once the record is complete.
    fn append(&self, commit: &RepositoryCommit) -> RepoResult<()>;

    fn load_tracker(&self) -> RepoResult<Option<TrackerState>>;

    fn save_tracker(&self, state: &TrackerState) -> RepoResult<()>;
}

pub fn encode_record(commit: &RepositoryCommit) -> RepoResult<Vec<u8>> {
    let payload = bincode::serialize(commit)?;
    let mut out = Vec::with_capacity(FRAME_HEADER + payload.len());
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Decode a record expected to hold commit `id`.
pub fn decode_record(id: CommitId, data: &[u8]) -> RepoResult<RepositoryCommit> {
    let corrupt = |reason: String| RepoError::CorruptRecord { id, reason };
    if data.len() < FRAME_HEADER {
        return Err(corrupt(format!("record is only {} bytes", data.len())));
    }
    let length = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
    let expected_crc = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
    let payload = &data[FRAME_HEADER..];
    if payload.len() != length {
        return Err(corrupt(format!(
            "frame says {length} bytes, found {}",
            payload.len()
        )));
    }
    let actual_crc = crc32fast::hash(payload);
    if actual_crc != expected_crc {
        return Err(corrupt(format!(
            "crc {actual_crc:#010x} does not match {expected_crc:#010x}"
        )));
    }
    let commit: RepositoryCommit =
        bincode::deserialize(payload).map_err(|e| corrupt(e.to_string()))?;
    if commit.id != id {
        return Err(corrupt(format!("record holds commit {}", commit.id)));
    }
    Ok(commit)
}

/// Commit log held in memory.
#[derive(Debug, Default)]
pub struct InMemoryCommitLog {
    records: RwLock<Vec<RepositoryCommit>>,
    tracker: RwLock<Option<TrackerState>>,
}

impl InMemoryCommitLog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CommitLog for InMemoryCommitLog {
    fn load(&self) -> RepoResult<Vec<RepositoryCommit>> {
        let records = self.records.read().map_err(|_| RepoError::LockPoisoned)?;
        Ok(records.clone())
    }

    fn append(&self, commit: &RepositoryCommit) -> RepoResult<()> {
        let mut records = self.records.write().map_err(|_| RepoError::LockPoisoned)?;
        if records.iter().any(|c| c.id == commit.id) {
            return Err(RepoError::BrokenChain {
                id: commit.id,
                reason: "record already exists".into(),
            });
        }
        records.push(commit.clone());
        Ok(())
    }

    fn load_tracker(&self) -> RepoResult<Option<TrackerState>> {
        let tracker = self.tracker.read().map_err(|_| RepoError::LockPoisoned)?;
        Ok(tracker.clone())
    }

    fn save_tracker(&self, state: &TrackerState) -> RepoResult<()> {
        let mut tracker = self.tracker.write().map_err(|_| RepoError::LockPoisoned)?;
        *tracker = Some(state.clone());
        Ok(())
    }
}

/// Commit log keeping one `<id>.rec` file per commit and a JSON tracker file.
#[derive(Debug, Clone)]
pub struct FsCommitLog {
    dir: PathBuf,
    tracker: PathBuf,
}

impl FsCommitLog {
    pub fn open(dir: impl Into<PathBuf>, tracker: impl Into<PathBuf>) -> RepoResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            tracker: tracker.into(),
        })
    }

    fn record_path(&self, id: CommitId) -> PathBuf {
        self.dir.join(format!("{id}.{RECORD_EXT}"))
    }

    fn record_ids(&self) -> RepoResult<Vec<CommitId>> {
        let mut ids = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if let Some(id) = record_id(&path) {
                ids.push(id);
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }
}

fn record_id(path: &Path) -> Option<CommitId> {
    if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXT) {
        return None;
    }
    path.file_stem()?.to_str()?.parse().ok()
}

impl CommitLog for FsCommitLog {
    fn load(&self) -> RepoResult<Vec<RepositoryCommit>> {
        self.record_ids()?
            .into_iter()
            .map(|id| {
                let data = std::fs::read(self.record_path(id))?;
                decode_record(id, &data)
            })
            .collect()
    }

    fn append(&self, commit: &RepositoryCommit) -> RepoResult<()> {
        let path = self.record_path(commit.id);
        if path.exists() {
            return Err(RepoError::BrokenChain {
                id: commit.id,
                reason: "record already exists".into(),
            });
        }
        write_atomic(&path, &encode_record(commit)?)?;
        debug!(commit = commit.id, path = %path.display(), "wrote commit record");
        Ok(())
    }

    fn load_tracker(&self) -> RepoResult<Option<TrackerState>> {
        match std::fs::read(&self.tracker) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save_tracker(&self, state: &TrackerState) -> RepoResult<()> {
        write_atomic(&self.tracker, &serde_json::to_vec_pretty(state)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use flawless_types::{Author, ContentHash, DepotLabel};

    use super::*;

    fn commit(id: CommitId) -> RepositoryCommit {
        RepositoryCommit {
            id,
            parent: id.checked_sub(1).filter(|p| *p > 0),
            author: Author::new("Ada", "ada@example.com"),
            time: Utc::now(),
            message: format!("commit {id}"),
            label: DepotLabel::new(ContentHash::of(&id.to_le_bytes()), [ContentHash::of(b"base")]),
        }
    }

    #[test]
    fn record_round_trip() {
        let c = commit(3);
        let bytes = encode_record(&c).unwrap();
        let back = decode_record(3, &bytes).unwrap();
        assert_eq!(back.id, c.id);
        assert_eq!(back.label, c.label);
        assert_eq!(back.time.timestamp_millis(), c.time.timestamp_millis());
    }

    #[test]
    fn record_crc_mismatch() {
        let mut bytes = encode_record(&commit(1)).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        assert!(matches!(
            decode_record(1, &bytes),
            Err(RepoError::CorruptRecord { id: 1, .. })
        ));
    }

    #[test]
    fn record_id_must_match() {
        let bytes = encode_record(&commit(2)).unwrap();
        assert!(decode_record(5, &bytes).is_err());
        assert!(decode_record(2, &bytes[..4]).is_err());
    }

    #[test]
    fn fs_log_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let log = FsCommitLog::open(dir.path().join("commit"), dir.path().join("tracker")).unwrap();
        for id in [1, 2, 10] {
            log.append(&commit(id)).unwrap();
        }
        let ids: Vec<_> = log.load().unwrap().iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![1, 2, 10]);
        assert!(matches!(
            log.append(&commit(2)),
            Err(RepoError::BrokenChain { id: 2, .. })
        ));
    }

    #[test]
    fn tracker_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let log = FsCommitLog::open(dir.path().join("commit"), dir.path().join("tracker")).unwrap();
        assert_eq!(log.load_tracker().unwrap(), None);
        let state = TrackerState {
            head: 4,
            message: "wip".into(),
        };
        log.save_tracker(&state).unwrap();
        assert_eq!(log.load_tracker().unwrap(), Some(state));
    }

    #[test]
    fn memory_log_rejects_duplicates() {
        let log = InMemoryCommitLog::new();
        log.append(&commit(1)).unwrap();
        assert!(log.append(&commit(1)).is_err());
        assert_eq!(log.load().unwrap().len(), 1);
    }
}
