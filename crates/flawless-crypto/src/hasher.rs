use std::io::{self, Read};

use flawless_types::ContentHash;
use md5::{Digest, Md5};
use tokio::io::{AsyncRead, AsyncReadExt};

const CHUNK_SIZE: usize = 64 * 1024;

/// MD5 content hasher with an optional confuser byte.
///
/// A plain hasher computes the content address of a byte stream. A confused
/// hasher prepends a per-object salt byte before hashing, so two depots with
/// the same payload carry different stored checksums.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContentHasher {
    confuser: Option<u8>,
}

impl ContentHasher {
    /// Hasher for content addresses.
    pub const PLAIN: Self = Self { confuser: None };

    /// Hasher for stored checksums salted with `confuser`.
    pub const fn confused(confuser: u8) -> Self {
        Self {
            confuser: Some(confuser),
        }
    }

    /// The salt byte, if any.
    pub fn confuser(&self) -> Option<u8> {
        self.confuser
    }

    /// Start an incremental hash.
    pub fn start(&self) -> StreamingHasher {
        let mut inner = Md5::new();
        if let Some(c) = self.confuser {
            inner.update([c]);
        }
        StreamingHasher { inner }
    }

    /// Hash raw bytes.
    pub fn hash(&self, data: &[u8]) -> ContentHash {
        let mut h = self.start();
        h.update(data);
        h.finish()
    }

    /// Hash several byte sections as if they were concatenated.
    pub fn hash_parts(&self, parts: &[&[u8]]) -> ContentHash {
        let mut h = self.start();
        for part in parts {
            h.update(part);
        }
        h.finish()
    }

    /// Hash everything a blocking reader yields.
    pub fn hash_reader<R: Read>(&self, mut reader: R) -> io::Result<ContentHash> {
        let mut h = self.start();
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            let n = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            h.update(&buf[..n]);
        }
        Ok(h.finish())
    }

    /// Hash everything an async reader yields.
    ///
    /// Suspends at every read. Dropping the future abandons the hash without
    /// side effects.
    pub async fn hash_async_reader<R: AsyncRead + Unpin>(
        &self,
        mut reader: R,
    ) -> io::Result<ContentHash> {
        let mut h = self.start();
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            h.update(&buf[..n]);
        }
        Ok(h.finish())
    }

    /// Verify that data produces the expected hash.
    pub fn verify(&self, data: &[u8], expected: &ContentHash) -> bool {
        self.hash(data) == *expected
    }
}

impl Default for ContentHasher {
    fn default() -> Self {
        Self::PLAIN
    }
}

/// An in-progress hash started by [`ContentHasher::start`].
#[derive(Clone)]
pub struct StreamingHasher {
    inner: Md5,
}

impl StreamingHasher {
    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    pub fn finish(self) -> ContentHash {
        ContentHash::from_digest(self.inner.finalize().into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_matches_content_hash() {
        let data = b"hello world";
        assert_eq!(ContentHasher::PLAIN.hash(data), ContentHash::of(data));
    }

    #[test]
    fn confuser_changes_checksum() {
        let data = b"same payload";
        let a = ContentHasher::confused(1).hash(data);
        let b = ContentHasher::confused(2).hash(data);
        assert_ne!(a, b);
        assert_ne!(a, ContentHasher::PLAIN.hash(data));
    }

    #[test]
    fn confused_hash_is_salt_prefix() {
        let data = b"payload";
        let expected = ContentHash::of(&[&[9u8][..], &data[..]].concat());
        assert_eq!(ContentHasher::confused(9).hash(data), expected);
    }

    #[test]
    fn parts_equal_concatenation() {
        let h = ContentHasher::confused(42);
        assert_eq!(h.hash_parts(&[b"abc", b"def"]), h.hash(b"abcdef"));
    }

    #[test]
    fn reader_matches_slice() {
        let data = vec![7u8; CHUNK_SIZE * 2 + 13];
        let from_reader = ContentHasher::PLAIN.hash_reader(&data[..]).unwrap();
        assert_eq!(from_reader, ContentHash::of(&data));
    }

    #[tokio::test]
    async fn async_reader_matches_slice() {
        let data = vec![3u8; CHUNK_SIZE + 1];
        let from_reader = ContentHasher::PLAIN
            .hash_async_reader(&data[..])
            .await
            .unwrap();
        assert_eq!(from_reader, ContentHash::of(&data));
    }

    #[test]
    fn verify_detects_tampering() {
        let id = ContentHasher::PLAIN.hash(b"original");
        assert!(ContentHasher::PLAIN.verify(b"original", &id));
        assert!(!ContentHasher::PLAIN.verify(b"tampered", &id));
    }
}
