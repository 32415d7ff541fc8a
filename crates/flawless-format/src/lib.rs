//! Binary formats for Flawless depots.
//!
//! A depot has two encodings:
//!
//! - **durable**: a 64-byte [`DepotHeader`] (magic, CRC, version, codec,
//!   confuser, checksums) followed by the payload, plus a companion file-map
//!   section. See [`standard`].
//! - **wire**: a 48-byte [`WireHeader`] with feature flags, followed by
//!   optional payload and file-map sections. See [`network`].
//!
//! Decoding always validates the fixed header before any size field is
//! trusted. A damaged header is [`FormatError::CorruptHeader`]; a damaged
//! section behind a sound header is [`FormatError::ChecksumMismatch`].

pub mod compression;
pub mod depot;
pub mod error;
pub mod file_map;
pub mod network;
pub mod standard;
mod time;
mod varint;

pub use compression::{Compressor, CompressorRegistry, Identity};
pub use depot::{decode_wire, Depot, DepotBuilder, EncodedDepot, NetworkDepot, WireOptions};
pub use error::{FormatError, FormatResult, Section};
pub use file_map::{DepotFileInfo, FileMap, FileMapEncoding, FileStorage};
pub use network::{WireFlags, WireHeader, WIRE_HEADER_LEN};
pub use standard::{DepotHeader, HEADER_LEN, MAGIC, VERSION_1};
pub use time::now_millis;
