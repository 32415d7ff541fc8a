use async_trait::async_trait;
use flawless_format::{CompressorRegistry, Depot, EncodedDepot};
use flawless_types::ContentHash;

use crate::error::{StoreError, StoreResult};

/// Hash-keyed storage for encoded depots.
///
/// Every implementation must satisfy:
/// - An object is immutable once written. Writing an existing hash is a no-op.
/// - An object becomes visible to `read`/`exists` only once fully written.
/// - The store never interprets object bytes; [`DepotStore::load`] does that
///   on top of `read`.
/// - All I/O errors are propagated.
///
/// The async forms default to the blocking ones. Backends doing real I/O
/// override them so that callers can cancel by dropping the future.
#[async_trait]
pub trait DepotStore: Send + Sync {
    /// Read the encoded object. `Ok(None)` if it is absent.
    fn read(&self, hash: &ContentHash) -> StoreResult<Option<EncodedDepot>>;

    /// Store an encoded object under `hash`.
    fn write(&self, hash: &ContentHash, depot: &EncodedDepot) -> StoreResult<()>;

    fn exists(&self, hash: &ContentHash) -> StoreResult<bool>;

    /// Delete an object. Returns `true` if it existed.
    ///
    /// Only the occupation sweep should call this.
    fn delete(&self, hash: &ContentHash) -> StoreResult<bool>;

    /// Every stored hash, sorted.
    fn list(&self) -> StoreResult<Vec<ContentHash>>;

    async fn read_async(&self, hash: &ContentHash) -> StoreResult<Option<EncodedDepot>> {
        self.read(hash)
    }

    async fn write_async(&self, hash: &ContentHash, depot: &EncodedDepot) -> StoreResult<()> {
        self.write(hash, depot)
    }

    /// Read, decode and verify a depot.
    ///
    /// A missing object is [`StoreError::ObjectNotFound`], never `None`: the
    /// caller asked for a hash it expects to exist.
    fn load(&self, hash: &ContentHash, registry: &CompressorRegistry) -> StoreResult<Depot> {
        let encoded = self.read(hash)?.ok_or(StoreError::ObjectNotFound(*hash))?;
        decode_checked(hash, &encoded, registry)
    }

    async fn load_async(
        &self,
        hash: &ContentHash,
        registry: &CompressorRegistry,
    ) -> StoreResult<Depot> {
        let encoded = self
            .read_async(hash)
            .await?
            .ok_or(StoreError::ObjectNotFound(*hash))?;
        decode_checked(hash, &encoded, registry)
    }
}

fn decode_checked(
    hash: &ContentHash,
    encoded: &EncodedDepot,
    registry: &CompressorRegistry,
) -> StoreResult<Depot> {
    let depot = Depot::decode(&encoded.object, &encoded.file_map, registry).map_err(|source| {
        StoreError::Format {
            hash: *hash,
            source,
        }
    })?;
    if depot.hash() != *hash {
        return Err(StoreError::HashMismatch {
            expected: *hash,
            actual: depot.hash(),
        });
    }
    Ok(depot)
}
