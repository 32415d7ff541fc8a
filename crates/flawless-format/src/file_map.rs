//! The file map: which Work Paths a depot contains and where their bytes are.
//!
//! Binary form, little-endian:
//!
//! ```text
//! u32 count
//! count x {
//!     varint path length, path bytes (UTF-8)
//!     16 bytes content hash
//!     varint size
//!     u8 storage tag
//!         0: varint offset into this depot's payload
//!         1: 16 bytes hash of the depot holding the bytes
//! }
//! ```
//!
//! Entries are written in path order, so equal maps always encode to equal
//! bytes.

use std::collections::{BTreeMap, BTreeSet};

use flawless_path::WorkPath;
use flawless_types::ContentHash;
use serde::{Deserialize, Serialize};

use crate::error::{FormatError, FormatResult};
use crate::standard::{read_hash, read_u32};
use crate::varint::{decode_varint, encode_varint};

const TAG_INLINE: u8 = 0;
const TAG_DEPENDENCY: u8 = 1;

/// Where the bytes of one file live.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FileStorage {
    /// In this depot's payload, starting at `offset`.
    Inline { offset: u64 },
    /// In the payload of the depot with hash `depot`.
    Dependency { depot: ContentHash },
}

/// One entry of a depot's file map.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DepotFileInfo {
    pub path: WorkPath,
    pub hash: ContentHash,
    pub size: u64,
    pub storage: FileStorage,
}

impl DepotFileInfo {
    pub fn is_inline(&self) -> bool {
        matches!(self.storage, FileStorage::Inline { .. })
    }

    /// The depot that physically holds this file, given the hash of the
    /// depot the entry was read from.
    pub fn origin(&self, this_depot: ContentHash) -> ContentHash {
        match self.storage {
            FileStorage::Inline { .. } => this_depot,
            FileStorage::Dependency { depot } => depot,
        }
    }
}

/// How a file-map section is encoded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileMapEncoding {
    #[default]
    Binary,
    Json,
}

impl FileMapEncoding {
    pub(crate) fn tag(&self) -> u8 {
        match self {
            FileMapEncoding::Binary => 0,
            FileMapEncoding::Json => 1,
        }
    }

    pub(crate) fn from_tag(tag: u8) -> FormatResult<Self> {
        match tag {
            0 => Ok(FileMapEncoding::Binary),
            1 => Ok(FileMapEncoding::Json),
            other => Err(FormatError::CorruptFileMap {
                offset: 0,
                reason: format!("unknown file map encoding {other}"),
            }),
        }
    }
}

/// A depot's files keyed by Work Path.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FileMap {
    entries: BTreeMap<WorkPath, DepotFileInfo>,
}

#[derive(Serialize, Deserialize)]
struct JsonFileMap {
    file_count: usize,
    files: Vec<DepotFileInfo>,
}

impl FileMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry. A path may appear only once.
    pub fn insert(&mut self, info: DepotFileInfo) -> FormatResult<()> {
        if self.entries.contains_key(&info.path) {
            return Err(FormatError::DuplicatePath(info.path));
        }
        self.entries.insert(info.path.clone(), info);
        Ok(())
    }

    pub fn get(&self, path: &str) -> Option<&DepotFileInfo> {
        self.entries.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in path order.
    pub fn iter(&self) -> impl Iterator<Item = &DepotFileInfo> {
        self.entries.values()
    }

    pub fn paths(&self) -> impl Iterator<Item = &WorkPath> {
        self.entries.keys()
    }

    /// First inline entry holding content `hash`.
    pub fn find_inline(&self, hash: &ContentHash) -> Option<&DepotFileInfo> {
        self.iter().find(|f| f.is_inline() && f.hash == *hash)
    }

    /// Depots referenced by dependency entries.
    pub fn dependencies(&self) -> BTreeSet<ContentHash> {
        self.iter()
            .filter_map(|f| match f.storage {
                FileStorage::Dependency { depot } => Some(depot),
                FileStorage::Inline { .. } => None,
            })
            .collect()
    }

    /// Total size of all files, wherever they are stored.
    pub fn total_size(&self) -> u64 {
        self.iter().map(|f| f.size).sum()
    }

    pub fn to_binary(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(4 + self.len() * 40);
        buf.extend_from_slice(&(self.len() as u32).to_le_bytes());
        for info in self.iter() {
            let path = info.path.as_str().as_bytes();
            encode_varint(&mut buf, path.len() as u64);
            buf.extend_from_slice(path);
            buf.extend_from_slice(&info.hash.to_le_bytes());
            encode_varint(&mut buf, info.size);
            match info.storage {
                FileStorage::Inline { offset } => {
                    buf.push(TAG_INLINE);
                    encode_varint(&mut buf, offset);
                }
                FileStorage::Dependency { depot } => {
                    buf.push(TAG_DEPENDENCY);
                    buf.extend_from_slice(&depot.to_le_bytes());
                }
            }
        }
        buf
    }

    pub fn from_binary(data: &[u8]) -> FormatResult<Self> {
        let mut cursor = Cursor { data, pos: 0 };
        let count = cursor.u32()?;
        let mut map = FileMap::new();
        for _ in 0..count {
            let path_len = cursor.varint()? as usize;
            let path_bytes = cursor.take(path_len)?;
            let path = std::str::from_utf8(path_bytes).map_err(|_| FormatError::CorruptFileMap {
                offset: cursor.pos - path_len,
                reason: "path is not UTF-8".into(),
            })?;
            let path = WorkPath::new(path)?;
            let hash = cursor.hash()?;
            let size = cursor.varint()?;
            let storage = match cursor.byte()? {
                TAG_INLINE => FileStorage::Inline {
                    offset: cursor.varint()?,
                },
                TAG_DEPENDENCY => FileStorage::Dependency {
                    depot: cursor.hash()?,
                },
                other => {
                    return Err(FormatError::CorruptFileMap {
                        offset: cursor.pos - 1,
                        reason: format!("unknown storage tag {other}"),
                    })
                }
            };
            map.insert(DepotFileInfo {
                path,
                hash,
                size,
                storage,
            })?;
        }
        if cursor.pos != data.len() {
            return Err(FormatError::CorruptFileMap {
                offset: cursor.pos,
                reason: format!("{} trailing bytes", data.len() - cursor.pos),
            });
        }
        Ok(map)
    }

    pub fn to_json(&self) -> FormatResult<Vec<u8>> {
        let doc = JsonFileMap {
            file_count: self.len(),
            files: self.iter().cloned().collect(),
        };
        Ok(serde_json::to_vec(&doc)?)
    }

    pub fn from_json(data: &[u8]) -> FormatResult<Self> {
        let doc: JsonFileMap = serde_json::from_slice(data)?;
        if doc.file_count != doc.files.len() {
            return Err(FormatError::CorruptFileMap {
                offset: 0,
                reason: format!(
                    "file_count is {} but {} files are listed",
                    doc.file_count,
                    doc.files.len()
                ),
            });
        }
        let mut map = FileMap::new();
        for info in doc.files {
            map.insert(info)?;
        }
        Ok(map)
    }

    pub fn encode(&self, encoding: FileMapEncoding) -> FormatResult<Vec<u8>> {
        match encoding {
            FileMapEncoding::Binary => Ok(self.to_binary()),
            FileMapEncoding::Json => self.to_json(),
        }
    }

    pub fn decode(data: &[u8], encoding: FileMapEncoding) -> FormatResult<Self> {
        match encoding {
            FileMapEncoding::Binary => Self::from_binary(data),
            FileMapEncoding::Json => Self::from_json(data),
        }
    }

    /// Check that every inline entry lies within a payload of `payload_len`
    /// bytes.
    pub fn check_bounds(&self, payload_len: u64) -> FormatResult<()> {
        for info in self.iter() {
            if let FileStorage::Inline { offset } = info.storage {
                let end = offset.checked_add(info.size);
                if end.map_or(true, |end| end > payload_len) {
                    return Err(FormatError::FileOutOfBounds {
                        path: info.path.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a FileMap {
    type Item = &'a DepotFileInfo;
    type IntoIter = std::collections::btree_map::Values<'a, WorkPath, DepotFileInfo>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.values()
    }
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> FormatResult<&'a [u8]> {
        let end = self.pos.checked_add(n).filter(|end| *end <= self.data.len());
        match end {
            Some(end) => {
                let slice = &self.data[self.pos..end];
                self.pos = end;
                Ok(slice)
            }
            None => Err(FormatError::CorruptFileMap {
                offset: self.pos,
                reason: format!("need {n} bytes, {} left", self.data.len() - self.pos),
            }),
        }
    }

    fn byte(&mut self) -> FormatResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> FormatResult<u32> {
        let at = self.pos;
        self.take(4)?;
        Ok(read_u32(self.data, at))
    }

    fn hash(&mut self) -> FormatResult<ContentHash> {
        let at = self.pos;
        self.take(ContentHash::LEN)?;
        Ok(read_hash(self.data, at))
    }

    fn varint(&mut self) -> FormatResult<u64> {
        let (value, used) = decode_varint(self.data, self.pos)?;
        self.pos += used;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(path: &str, data: &[u8], storage: FileStorage) -> DepotFileInfo {
        DepotFileInfo {
            path: WorkPath::new(path).unwrap(),
            hash: ContentHash::of(data),
            size: data.len() as u64,
            storage,
        }
    }

    fn sample() -> FileMap {
        let mut map = FileMap::new();
        map.insert(info("src/main.rs", b"fn main() {}", FileStorage::Inline { offset: 0 }))
            .unwrap();
        map.insert(info(
            "README.md",
            b"# readme",
            FileStorage::Dependency {
                depot: ContentHash::of(b"base"),
            },
        ))
        .unwrap();
        map
    }

    #[test]
    fn binary_round_trip() {
        let map = sample();
        let bytes = map.to_binary();
        assert_eq!(&bytes[0..4], &2u32.to_le_bytes());
        assert_eq!(FileMap::from_binary(&bytes).unwrap(), map);
    }

    #[test]
    fn json_round_trip() {
        let map = sample();
        let json = map.to_json().unwrap();
        let text = String::from_utf8(json.clone()).unwrap();
        assert!(text.contains("\"file_count\":2"));
        assert!(text.contains("\"kind\":\"dependency\""));
        assert_eq!(FileMap::from_json(&json).unwrap(), map);
    }

    #[test]
    fn duplicate_paths_rejected() {
        let mut map = sample();
        let err = map
            .insert(info("README.md", b"x", FileStorage::Inline { offset: 0 }))
            .unwrap_err();
        assert!(matches!(err, FormatError::DuplicatePath(_)));

        let dup = r#"{"file_count":2,"files":[
            {"path":"a","hash":"d41d8cd98f00b204e9800998ecf8427e","size":0,"storage":{"kind":"inline","offset":0}},
            {"path":"a","hash":"d41d8cd98f00b204e9800998ecf8427e","size":0,"storage":{"kind":"inline","offset":0}}
        ]}"#;
        assert!(matches!(
            FileMap::from_json(dup.as_bytes()),
            Err(FormatError::DuplicatePath(_))
        ));
    }

    #[test]
    fn invalid_paths_rejected() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.push(4);
        bytes.extend_from_slice(b"/abs");
        bytes.extend_from_slice(&[0u8; 16]);
        bytes.push(0);
        bytes.push(TAG_INLINE);
        bytes.push(0);
        assert!(matches!(
            FileMap::from_binary(&bytes),
            Err(FormatError::InvalidPath(_))
        ));
    }

    #[test]
    fn json_count_must_match() {
        let bad = br#"{"file_count":3,"files":[]}"#;
        assert!(matches!(
            FileMap::from_json(bad),
            Err(FormatError::CorruptFileMap { .. })
        ));
    }

    #[test]
    fn truncated_and_trailing_bytes() {
        let bytes = sample().to_binary();
        assert!(FileMap::from_binary(&bytes[..bytes.len() - 3]).is_err());
        let mut longer = bytes.clone();
        longer.push(0);
        assert!(matches!(
            FileMap::from_binary(&longer),
            Err(FormatError::CorruptFileMap { .. })
        ));
    }

    #[test]
    fn unknown_storage_tag() {
        let mut map = FileMap::new();
        map.insert(info("a", b"", FileStorage::Inline { offset: 0 })).unwrap();
        let mut bytes = map.to_binary();
        let tag_at = bytes.len() - 2;
        bytes[tag_at] = 9;
        assert!(matches!(
            FileMap::from_binary(&bytes),
            Err(FormatError::CorruptFileMap { .. })
        ));
    }

    #[test]
    fn dependencies_and_bounds() {
        let map = sample();
        assert_eq!(
            map.dependencies().into_iter().collect::<Vec<_>>(),
            vec![ContentHash::of(b"base")]
        );
        assert!(map.check_bounds(12).is_ok());
        assert!(matches!(
            map.check_bounds(11),
            Err(FormatError::FileOutOfBounds { .. })
        ));
    }

    #[test]
    fn empty_map_encodes_count_only() {
        let map = FileMap::new();
        assert_eq!(map.to_binary(), 0u32.to_le_bytes().to_vec());
        assert!(FileMap::from_binary(&map.to_binary()).unwrap().is_empty());
    }
}
