//! Checksums for Flawless.
//!
//! Provides MD5 content hashing over slices, blocking readers and async
//! readers, confuser-salted checksums for stored depots, and the CRC32 used to
//! guard fixed-size headers.
//!
//! All primitives wrap established libraries; nothing here is custom
//! cryptography.

pub mod checksum;
pub mod hasher;

pub use checksum::{header_crc, random_confuser};
pub use hasher::{ContentHasher, StreamingHasher};
