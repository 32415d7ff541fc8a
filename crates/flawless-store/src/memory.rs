use std::collections::HashMap;
use std::sync::RwLock;

use flawless_format::EncodedDepot;
use flawless_types::ContentHash;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::traits::DepotStore;

/// In-memory depot store for tests and embedding.
pub struct InMemoryDepotStore {
    objects: RwLock<HashMap<ContentHash, EncodedDepot>>,
}

impl InMemoryDepotStore {
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.objects.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total stored bytes, objects plus file maps.
    pub fn total_bytes(&self) -> u64 {
        self.objects
            .read()
            .map(|m| {
                m.values()
                    .map(|d| (d.object.len() + d.file_map.len()) as u64)
                    .sum()
            })
            .unwrap_or(0)
    }

    /// Overwrite stored bytes in place. Test hook for corruption scenarios.
    pub fn tamper<F>(&self, hash: &ContentHash, f: F) -> StoreResult<bool>
    where
        F: FnOnce(&mut EncodedDepot),
    {
        let mut map = self.objects.write().map_err(|_| StoreError::LockPoisoned)?;
        Ok(map.get_mut(hash).map(f).is_some())
    }
}

impl Default for InMemoryDepotStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DepotStore for InMemoryDepotStore {
    fn read(&self, hash: &ContentHash) -> StoreResult<Option<EncodedDepot>> {
        let map = self.objects.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(map.get(hash).cloned())
    }

    fn write(&self, hash: &ContentHash, depot: &EncodedDepot) -> StoreResult<()> {
        if hash.is_empty() {
            return Err(StoreError::EmptyHash);
        }
        let mut map = self.objects.write().map_err(|_| StoreError::LockPoisoned)?;
        map.entry(*hash).or_insert_with(|| {
            debug!(depot = %hash, bytes = depot.object.len(), "stored depot in memory");
            depot.clone()
        });
        Ok(())
    }

    fn exists(&self, hash: &ContentHash) -> StoreResult<bool> {
        let map = self.objects.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(map.contains_key(hash))
    }

    fn delete(&self, hash: &ContentHash) -> StoreResult<bool> {
        let mut map = self.objects.write().map_err(|_| StoreError::LockPoisoned)?;
        Ok(map.remove(hash).is_some())
    }

    fn list(&self) -> StoreResult<Vec<ContentHash>> {
        let map = self.objects.read().map_err(|_| StoreError::LockPoisoned)?;
        let mut hashes: Vec<ContentHash> = map.keys().copied().collect();
        hashes.sort();
        Ok(hashes)
    }
}

impl std::fmt::Debug for InMemoryDepotStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryDepotStore")
            .field("object_count", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use flawless_format::{CompressorRegistry, DepotBuilder, FileMapEncoding};
    use flawless_path::WorkPath;

    use super::*;

    fn encoded(content: &[u8]) -> (ContentHash, EncodedDepot) {
        let mut builder = DepotBuilder::new();
        builder
            .add_file(WorkPath::new("file.txt").unwrap(), content)
            .unwrap();
        let depot = builder.build();
        let enc = depot
            .encode(&CompressorRegistry::new(), FileMapEncoding::Binary)
            .unwrap();
        (depot.hash(), enc)
    }

    #[test]
    fn write_read_delete() {
        let store = InMemoryDepotStore::new();
        let (hash, enc) = encoded(b"hello");
        store.write(&hash, &enc).unwrap();
        assert!(store.exists(&hash).unwrap());
        assert_eq!(store.read(&hash).unwrap(), Some(enc));
        assert!(store.delete(&hash).unwrap());
        assert!(!store.delete(&hash).unwrap());
        assert!(store.read(&hash).unwrap().is_none());
    }

    #[test]
    fn write_is_idempotent() {
        let store = InMemoryDepotStore::new();
        let (hash, enc) = encoded(b"same");
        store.write(&hash, &enc).unwrap();
        store.write(&hash, &enc).unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn empty_hash_rejected() {
        let store = InMemoryDepotStore::new();
        let (_, enc) = encoded(b"x");
        assert!(matches!(
            store.write(&ContentHash::EMPTY, &enc),
            Err(StoreError::EmptyHash)
        ));
    }

    #[test]
    fn load_verifies_and_reports_missing() {
        let store = InMemoryDepotStore::new();
        let registry = CompressorRegistry::new();
        let (hash, enc) = encoded(b"payload");
        store.write(&hash, &enc).unwrap();
        assert_eq!(store.load(&hash, &registry).unwrap().hash(), hash);

        let missing = ContentHash::of(b"missing");
        assert!(matches!(
            store.load(&missing, &registry),
            Err(StoreError::ObjectNotFound(h)) if h == missing
        ));
    }

    #[test]
    fn load_detects_wrong_key() {
        let store = InMemoryDepotStore::new();
        let registry = CompressorRegistry::new();
        let (_, enc) = encoded(b"real");
        let wrong = ContentHash::of(b"other");
        store.write(&wrong, &enc).unwrap();
        let err = store.load(&wrong, &registry).unwrap_err();
        assert!(matches!(err, StoreError::HashMismatch { .. }));
        assert!(err.is_corruption());
    }

    #[test]
    fn load_reports_tampering_as_corruption() {
        let store = InMemoryDepotStore::new();
        let registry = CompressorRegistry::new();
        let (hash, enc) = encoded(b"payload bytes");
        store.write(&hash, &enc).unwrap();
        assert!(store
            .tamper(&hash, |d| {
                let last = d.object.len() - 1;
                d.object[last] ^= 0xFF;
            })
            .unwrap());
        let err = store.load(&hash, &registry).unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn list_is_sorted() {
        let store = InMemoryDepotStore::new();
        for content in [&b"a"[..], b"b", b"c"] {
            let (hash, enc) = encoded(content);
            store.write(&hash, &enc).unwrap();
        }
        let list = store.list().unwrap();
        assert_eq!(list.len(), 3);
        assert!(list.windows(2).all(|w| w[0] < w[1]));
    }
}
