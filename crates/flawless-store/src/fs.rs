use std::io::{self, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use flawless_format::EncodedDepot;
use flawless_types::ContentHash;
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::traits::DepotStore;

const OBJECT_EXT: &str = "depot";
const MAP_EXT: &str = "map";

/// Write `bytes` to `path` through a temporary file in the same directory, so
/// the file appears complete or not at all.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Depot store keeping each object as `<hex>.depot` with its file map in
/// `<hex>.map`.
///
/// The map is written before the object and removed after it, so a visible
/// `.depot` file always has its map.
#[derive(Debug, Clone)]
pub struct FsDepotStore {
    dir: PathBuf,
}

impl FsDepotStore {
    /// Open a store in `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn object_path(&self, hash: &ContentHash) -> PathBuf {
        self.dir.join(format!("{}.{OBJECT_EXT}", hash.to_hex()))
    }

    fn map_path(&self, hash: &ContentHash) -> PathBuf {
        self.dir.join(format!("{}.{MAP_EXT}", hash.to_hex()))
    }
}

fn read_optional(path: &Path) -> io::Result<Option<Vec<u8>>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

async fn read_optional_async(path: &Path) -> io::Result<Option<Vec<u8>>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

fn remove_optional(path: &Path) -> io::Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

#[async_trait]
impl DepotStore for FsDepotStore {
    fn read(&self, hash: &ContentHash) -> StoreResult<Option<EncodedDepot>> {
        let Some(object) = read_optional(&self.object_path(hash))? else {
            return Ok(None);
        };
        let file_map = read_optional(&self.map_path(hash))?.unwrap_or_default();
        Ok(Some(EncodedDepot { object, file_map }))
    }

    fn write(&self, hash: &ContentHash, depot: &EncodedDepot) -> StoreResult<()> {
        if hash.is_empty() {
            return Err(StoreError::EmptyHash);
        }
        let object_path = self.object_path(hash);
        if object_path.exists() {
            return Ok(());
        }
        write_atomic(&self.map_path(hash), &depot.file_map)?;
        write_atomic(&object_path, &depot.object)?;
        debug!(depot = %hash, bytes = depot.object.len(), "wrote depot");
        Ok(())
    }

    fn exists(&self, hash: &ContentHash) -> StoreResult<bool> {
        Ok(self.object_path(hash).is_file())
    }

    fn delete(&self, hash: &ContentHash) -> StoreResult<bool> {
        let existed = remove_optional(&self.object_path(hash))?;
        remove_optional(&self.map_path(hash))?;
        if existed {
            debug!(depot = %hash, "deleted depot");
        }
        Ok(existed)
    }

    fn list(&self) -> StoreResult<Vec<ContentHash>> {
        let mut hashes = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(OBJECT_EXT) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match ContentHash::from_hex(stem) {
                Ok(hash) => hashes.push(hash),
                Err(_) => warn!(path = %path.display(), "ignoring unrecognized file in depot directory"),
            }
        }
        hashes.sort();
        Ok(hashes)
    }

    async fn read_async(&self, hash: &ContentHash) -> StoreResult<Option<EncodedDepot>> {
        let Some(object) = read_optional_async(&self.object_path(hash)).await? else {
            return Ok(None);
        };
        let file_map = read_optional_async(&self.map_path(hash))
            .await?
            .unwrap_or_default();
        Ok(Some(EncodedDepot { object, file_map }))
    }

    async fn write_async(&self, hash: &ContentHash, depot: &EncodedDepot) -> StoreResult<()> {
        let store = self.clone();
        let hash = *hash;
        let depot = depot.clone();
        tokio::task::spawn_blocking(move || store.write(&hash, &depot))
            .await
            .map_err(|e| StoreError::Io(io::Error::other(e)))?
    }
}
