//! Foundation types for Flawless.
//!
//! Every other Flawless crate depends on `flawless-types`.
//!
//! # Key Types
//!
//! - [`ContentHash`]: 128-bit MD5-derived content address
//! - [`DepotLabel`]: a depot hash plus the hashes of the depots it builds on
//! - [`Author`]: name and e-mail of whoever submitted a commit
//! - [`CompressType`]: identifier of the codec a depot payload is stored with
//! - [`CommitId`]: monotonically increasing commit number within a repository

pub mod author;
pub mod compress;
pub mod error;
pub mod hash;
pub mod label;

pub use author::Author;
pub use compress::CompressType;
pub use error::TypeError;
pub use hash::ContentHash;
pub use label::DepotLabel;

/// Commit number within one repository. The first commit is `1`; `0` means
/// "no commit yet".
pub type CommitId = u64;
