//! Pluggable payload compression.
//!
//! The format only records a [`CompressType`] byte. Codecs are registered at
//! runtime; the identity codec for [`CompressType::NONE`] is always present.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use flawless_types::CompressType;

use crate::error::{FormatError, FormatResult};

/// A payload codec identified by its [`CompressType`].
pub trait Compressor: Send + Sync {
    fn compress_type(&self) -> CompressType;

    fn compress(&self, data: &[u8]) -> FormatResult<Vec<u8>>;

    fn decompress(&self, data: &[u8]) -> FormatResult<Vec<u8>>;
}

/// Stores bytes unchanged.
#[derive(Clone, Copy, Debug, Default)]
pub struct Identity;

impl Compressor for Identity {
    fn compress_type(&self) -> CompressType {
        CompressType::NONE
    }

    fn compress(&self, data: &[u8]) -> FormatResult<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn decompress(&self, data: &[u8]) -> FormatResult<Vec<u8>> {
        Ok(data.to_vec())
    }
}

/// Codecs available to a reader or writer.
#[derive(Clone)]
pub struct CompressorRegistry {
    codecs: HashMap<CompressType, Arc<dyn Compressor>>,
}

impl CompressorRegistry {
    /// A registry holding only the identity codec.
    pub fn new() -> Self {
        let mut codecs: HashMap<CompressType, Arc<dyn Compressor>> = HashMap::new();
        codecs.insert(CompressType::NONE, Arc::new(Identity));
        Self { codecs }
    }

    /// Add or replace a codec.
    pub fn register(&mut self, codec: Arc<dyn Compressor>) {
        self.codecs.insert(codec.compress_type(), codec);
    }

    pub fn with(mut self, codec: Arc<dyn Compressor>) -> Self {
        self.register(codec);
        self
    }

    pub fn get(&self, compress_type: CompressType) -> FormatResult<&Arc<dyn Compressor>> {
        self.codecs
            .get(&compress_type)
            .ok_or(FormatError::UnknownCompression(compress_type))
    }

    pub fn contains(&self, compress_type: CompressType) -> bool {
        self.codecs.contains_key(&compress_type)
    }
}

impl Default for CompressorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CompressorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<_> = self.codecs.keys().copied().collect();
        types.sort();
        f.debug_struct("CompressorRegistry")
            .field("codecs", &types)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Toy codec: XOR every byte and append a marker so a wrong codec fails.
    #[derive(Debug)]
    pub struct XorCodec;

    pub const XOR: CompressType = CompressType(7);
    const MARKER: u8 = 0xC7;

    impl Compressor for XorCodec {
        fn compress_type(&self) -> CompressType {
            XOR
        }

        fn compress(&self, data: &[u8]) -> FormatResult<Vec<u8>> {
            let mut out: Vec<u8> = data.iter().map(|b| b ^ 0x5A).collect();
            out.push(MARKER);
            Ok(out)
        }

        fn decompress(&self, data: &[u8]) -> FormatResult<Vec<u8>> {
            match data.split_last() {
                Some((&MARKER, body)) => Ok(body.iter().map(|b| b ^ 0x5A).collect()),
                _ => Err(FormatError::DecompressionFailed("missing xor marker".into())),
            }
        }
    }
}
