//! Depot object storage for Flawless.
//!
//! Depots are stored by [`ContentHash`](flawless_types::ContentHash) as an
//! encoded object plus its file-map section. The store is a pure key-value
//! layer; decoding and verification happen in [`DepotStore::load`].
//!
//! # Backends
//!
//! - [`InMemoryDepotStore`]: `HashMap` behind a `RwLock`, for tests and embedding
//! - [`FsDepotStore`]: one file pair per depot under `.flawless/depot/`

pub mod error;
pub mod fs;
pub mod layout;
pub mod memory;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use fs::{write_atomic, FsDepotStore};
pub use layout::{RepositoryLayout, MARKER_DIR};
pub use memory::InMemoryDepotStore;
pub use traits::DepotStore;
