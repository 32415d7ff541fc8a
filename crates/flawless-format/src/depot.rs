//! The in-memory depot model and its two encodings.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use flawless_crypto::{random_confuser, ContentHasher};
use flawless_path::WorkPath;
use flawless_types::{CompressType, ContentHash, DepotLabel};
use tracing::debug;

use crate::compression::{Compressor, CompressorRegistry};
use crate::error::{FormatError, FormatResult, Section};
use crate::file_map::{DepotFileInfo, FileMap, FileMapEncoding, FileStorage};
use crate::network::{WireFlags, WireHeader, WIRE_HEADER_LEN};
use crate::standard::{DepotHeader, HEADER_LEN, VERSION_1};
use crate::time::now_millis;

/// One immutable stored object: a file map plus the payload holding the
/// bytes of every inline file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Depot {
    hash: ContentHash,
    version: u8,
    confuser: u8,
    generate_time: DateTime<Utc>,
    compress_type: CompressType,
    files: FileMap,
    payload: Vec<u8>,
}

/// A depot encoded for durable storage: the object (header + payload) and its
/// companion file-map section.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedDepot {
    pub object: Vec<u8>,
    pub file_map: Vec<u8>,
}

impl Depot {
    /// Content address of a snapshot: MD5 of the binary file map followed by
    /// the uncompressed payload.
    pub fn compute_hash(files: &FileMap, payload: &[u8]) -> ContentHash {
        ContentHasher::PLAIN.hash_parts(&[&files.to_binary(), payload])
    }

    pub fn hash(&self) -> ContentHash {
        self.hash
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn confuser(&self) -> u8 {
        self.confuser
    }

    pub fn generate_time(&self) -> DateTime<Utc> {
        self.generate_time
    }

    pub fn compress_type(&self) -> CompressType {
        self.compress_type
    }

    pub fn payload_size(&self) -> u64 {
        self.payload.len() as u64
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn files(&self) -> &FileMap {
        &self.files
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Label naming this depot and the depots its dependency entries point at.
    pub fn label(&self) -> DepotLabel {
        DepotLabel::new(self.hash, self.files.dependencies())
    }

    /// Use a different codec the next time this depot is encoded.
    pub fn with_compress_type(mut self, compress_type: CompressType) -> Self {
        self.compress_type = compress_type;
        self
    }

    pub fn with_confuser(mut self, confuser: u8) -> Self {
        self.confuser = confuser;
        self
    }

    /// Bytes of an inline entry. `None` for dependency entries.
    pub fn inline_bytes(&self, info: &DepotFileInfo) -> Option<&[u8]> {
        match info.storage {
            FileStorage::Inline { offset } => {
                let start = usize::try_from(offset).ok()?;
                let end = start.checked_add(usize::try_from(info.size).ok()?)?;
                self.payload.get(start..end)
            }
            FileStorage::Dependency { .. } => None,
        }
    }

    /// Bytes of `path` if it is stored in this depot.
    pub fn read_inline(&self, path: &str) -> Option<&[u8]> {
        self.files.get(path).and_then(|info| self.inline_bytes(info))
    }

    /// Bytes with content `hash`, if this depot stores them inline under
    /// any path.
    pub fn read_inline_by_hash(&self, hash: &ContentHash) -> Option<&[u8]> {
        self.files
            .find_inline(hash)
            .and_then(|info| self.inline_bytes(info))
    }

    fn header(&self) -> DepotHeader {
        DepotHeader {
            version: self.version,
            compress_type: self.compress_type,
            confuser: self.confuser,
            file_map_checksum: ContentHash::EMPTY,
            depot_checksum: ContentHash::EMPTY,
            generate_time: self.generate_time,
            payload_size: self.payload_size(),
        }
    }

    /// Encode for durable storage.
    pub fn encode(
        &self,
        registry: &CompressorRegistry,
        encoding: FileMapEncoding,
    ) -> FormatResult<EncodedDepot> {
        let codec = registry.get(self.compress_type)?;

        let mut file_map = vec![encoding.tag()];
        file_map.extend_from_slice(&self.files.encode(encoding)?);

        let mut header = self.header();
        header.file_map_checksum = header.compute_file_map_checksum(&file_map);
        header.depot_checksum = header.compute_depot_checksum(&self.payload);

        let compressed = codec.compress(&self.payload)?;
        let mut object = Vec::with_capacity(HEADER_LEN + compressed.len());
        object.extend_from_slice(&header.encode());
        object.extend_from_slice(&compressed);

        debug!(
            depot = %self.hash,
            files = self.files.len(),
            payload = self.payload.len(),
            stored = compressed.len(),
            "encoded depot"
        );
        Ok(EncodedDepot { object, file_map })
    }

    /// Decode and fully verify a durable depot.
    ///
    /// The header is checked first; section checksums are only compared once
    /// the header is known to be sound.
    pub fn decode(
        object: &[u8],
        file_map: &[u8],
        registry: &CompressorRegistry,
    ) -> FormatResult<Self> {
        let header = DepotHeader::decode(object)?;
        header.verify_file_map(file_map)?;

        let (tag, body) = file_map
            .split_first()
            .ok_or_else(|| FormatError::CorruptFileMap {
                offset: 0,
                reason: "empty file-map section".into(),
            })?;
        let files = FileMap::decode(body, FileMapEncoding::from_tag(*tag)?)?;

        let codec = registry.get(header.compress_type)?;
        let payload = codec.decompress(&object[HEADER_LEN..])?;
        header.verify_payload(&payload)?;
        files.check_bounds(payload.len() as u64)?;

        Ok(Self {
            hash: Self::compute_hash(&files, &payload),
            version: header.version,
            confuser: header.confuser,
            generate_time: header.generate_time,
            compress_type: header.compress_type,
            files,
            payload,
        })
    }

    /// Encode for transmission.
    pub fn encode_wire(&self, options: &WireOptions<'_>) -> FormatResult<Vec<u8>> {
        let mut flags = WireFlags::empty();
        let mut sections = Vec::new();

        if options.include_payload {
            flags.insert(WireFlags::WITH_PAYLOAD);
            sections.extend_from_slice(&self.payload);
        }

        let mut file_map_size = 0u64;
        if options.include_file_map {
            flags.insert(WireFlags::WITH_FILE_MAP);
            flags.set(
                WireFlags::FILE_MAP_IS_JSON,
                options.file_map_encoding == FileMapEncoding::Json,
            );
            let mut map = self.files.encode(options.file_map_encoding)?;
            if let Some(codec) = options.file_map_codec {
                flags.insert(WireFlags::COMPRESS_FILE_MAP);
                map = codec.compress(&map)?;
            }
            file_map_size = map.len() as u64;
            sections.extend_from_slice(&map);
        }

        let mut header = WireHeader {
            version: VERSION_1,
            flags,
            file_map_size,
            checksum: ContentHash::EMPTY,
            generate_time: self.generate_time,
            payload_size: self.payload_size(),
        };
        header.checksum = WireHeader::compute_checksum(&header.encode(), &sections);

        let mut out = Vec::with_capacity(WIRE_HEADER_LEN + sections.len());
        out.extend_from_slice(&header.encode());
        out.extend_from_slice(&sections);
        Ok(out)
    }
}

/// What goes into a wire object.
#[derive(Clone, Copy)]
pub struct WireOptions<'a> {
    pub include_payload: bool,
    pub include_file_map: bool,
    pub file_map_encoding: FileMapEncoding,
    /// Codec applied to the file-map section. Both sides must agree on it.
    pub file_map_codec: Option<&'a dyn Compressor>,
}

impl Default for WireOptions<'_> {
    fn default() -> Self {
        Self {
            include_payload: true,
            include_file_map: true,
            file_map_encoding: FileMapEncoding::Binary,
            file_map_codec: None,
        }
    }
}

/// A decoded wire object. Sections the sender left out are `None`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetworkDepot {
    pub header: WireHeader,
    pub payload: Option<Vec<u8>>,
    pub files: Option<FileMap>,
}

/// Decode and verify a wire object.
pub fn decode_wire(data: &[u8], file_map_codec: Option<&dyn Compressor>) -> FormatResult<NetworkDepot> {
    let header = WireHeader::decode(data)?;
    header.verify(data)?;

    let mut rest = &data[WIRE_HEADER_LEN..];
    let payload = if header.flags.contains(WireFlags::WITH_PAYLOAD) {
        let size = usize::try_from(header.payload_size)
            .map_err(|_| FormatError::corrupt_header("payload size exceeds address space"))?;
        if size > rest.len() {
            return Err(FormatError::corrupt_header("payload size exceeds object length"));
        }
        let (payload, tail) = rest.split_at(size);
        rest = tail;
        Some(payload.to_vec())
    } else {
        None
    };

    let files = if header.flags.contains(WireFlags::WITH_FILE_MAP) {
        let raw = if header.flags.contains(WireFlags::COMPRESS_FILE_MAP) {
            let codec = file_map_codec.ok_or_else(|| {
                FormatError::DecompressionFailed(
                    "file map is compressed but no codec was supplied".into(),
                )
            })?;
            codec.decompress(rest)?
        } else {
            rest.to_vec()
        };
        let encoding = if header.flags.contains(WireFlags::FILE_MAP_IS_JSON) {
            FileMapEncoding::Json
        } else {
            FileMapEncoding::Binary
        };
        Some(FileMap::decode(&raw, encoding)?)
    } else {
        None
    };

    Ok(NetworkDepot {
        header,
        payload,
        files,
    })
}

impl NetworkDepot {
    /// Content address, when both sections were sent.
    pub fn hash(&self) -> Option<ContentHash> {
        match (&self.files, &self.payload) {
            (Some(files), Some(payload)) => Some(Depot::compute_hash(files, payload)),
            _ => None,
        }
    }

    /// Materialize a depot. Both sections must be present. The depot gets a
    /// fresh confuser and is stored uncompressed unless changed afterwards.
    pub fn into_depot(self) -> FormatResult<Depot> {
        let payload = self.payload.ok_or(FormatError::MissingSection(Section::Payload))?;
        let files = self.files.ok_or(FormatError::MissingSection(Section::FileMap))?;
        files.check_bounds(payload.len() as u64)?;
        Ok(Depot {
            hash: Depot::compute_hash(&files, &payload),
            version: VERSION_1,
            confuser: random_confuser(),
            generate_time: self.header.generate_time,
            compress_type: CompressType::NONE,
            files,
            payload,
        })
    }
}

/// Assembles a [`Depot`] from file contents and references.
///
/// Inline files with identical content share one copy in the payload.
#[derive(Debug, Default)]
pub struct DepotBuilder {
    files: FileMap,
    payload: Vec<u8>,
    inline_offsets: HashMap<ContentHash, u64>,
    compress_type: CompressType,
    confuser: Option<u8>,
    generate_time: Option<DateTime<Utc>>,
}

impl DepotBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compress_type(mut self, compress_type: CompressType) -> Self {
        self.compress_type = compress_type;
        self
    }

    pub fn confuser(mut self, confuser: u8) -> Self {
        self.confuser = Some(confuser);
        self
    }

    pub fn generate_time(mut self, time: DateTime<Utc>) -> Self {
        self.generate_time = Some(time);
        self
    }

    /// Store `data` in this depot under `path`.
    pub fn add_file(&mut self, path: WorkPath, data: &[u8]) -> FormatResult<ContentHash> {
        let hash = ContentHash::of(data);
        let offset = match self.inline_offsets.get(&hash) {
            Some(offset) => *offset,
            None => {
                let offset = self.payload.len() as u64;
                self.payload.extend_from_slice(data);
                self.inline_offsets.insert(hash, offset);
                offset
            }
        };
        self.files.insert(DepotFileInfo {
            path,
            hash,
            size: data.len() as u64,
            storage: FileStorage::Inline { offset },
        })?;
        Ok(hash)
    }

    /// Record `path` as stored in another depot.
    pub fn add_reference(
        &mut self,
        path: WorkPath,
        hash: ContentHash,
        size: u64,
        depot: ContentHash,
    ) -> FormatResult<()> {
        self.files.insert(DepotFileInfo {
            path,
            hash,
            size,
            storage: FileStorage::Dependency { depot },
        })
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains(path)
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Hash the snapshot assembled so far without building it.
    pub fn snapshot_hash(&self) -> ContentHash {
        Depot::compute_hash(&self.files, &self.payload)
    }

    pub fn build(self) -> Depot {
        Depot {
            hash: Depot::compute_hash(&self.files, &self.payload),
            version: VERSION_1,
            confuser: self.confuser.unwrap_or_else(random_confuser),
            generate_time: self.generate_time.unwrap_or_else(now_millis),
            compress_type: self.compress_type,
            files: self.files,
            payload: self.payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::compression::testing::{XorCodec, XOR};

    fn wp(s: &str) -> WorkPath {
        WorkPath::new(s).unwrap()
    }

    fn sample() -> Depot {
        let mut builder = DepotBuilder::new().confuser(0x11);
        builder.add_file(wp("a.txt"), b"alpha").unwrap();
        builder.add_file(wp("dir/b.txt"), b"bravo").unwrap();
        builder.add_file(wp("dir/copy.txt"), b"alpha").unwrap();
        builder
            .add_reference(wp("old.txt"), ContentHash::of(b"old"), 3, ContentHash::of(b"base"))
            .unwrap();
        builder.build()
    }

    #[test]
    fn builder_dedupes_inline_content() {
        let depot = sample();
        assert_eq!(depot.payload(), b"alphabravo");
        assert_eq!(depot.file_count(), 4);
        assert_eq!(depot.read_inline("dir/copy.txt"), Some(&b"alpha"[..]));
        assert_eq!(depot.read_inline("dir/b.txt"), Some(&b"bravo"[..]));
        assert_eq!(depot.read_inline("old.txt"), None);
        assert_eq!(depot.read_inline("missing"), None);
        assert_eq!(
            depot.read_inline_by_hash(&ContentHash::of(b"bravo")),
            Some(&b"bravo"[..])
        );
        assert_eq!(depot.read_inline_by_hash(&ContentHash::of(b"old")), None);
    }

    #[test]
    fn label_lists_dependencies() {
        let depot = sample();
        let label = depot.label();
        assert_eq!(label.id, depot.hash());
        assert!(label.dependencies.contains(&ContentHash::of(b"base")));
        assert_eq!(label.dependencies.len(), 1);
    }

    #[test]
    fn hash_ignores_confuser_and_time() {
        let mut a = DepotBuilder::new().confuser(1);
        a.add_file(wp("f"), b"same").unwrap();
        let mut b = DepotBuilder::new().confuser(2);
        b.add_file(wp("f"), b"same").unwrap();
        assert_eq!(a.build().hash(), b.build().hash());
    }

    #[test]
    fn durable_round_trip_with_codec() {
        let registry = CompressorRegistry::new().with(Arc::new(XorCodec));
        let depot = sample().with_compress_type(XOR);
        let encoded = depot.encode(&registry, FileMapEncoding::Json).unwrap();
        assert_ne!(&encoded.object[HEADER_LEN..], depot.payload());
        let decoded = Depot::decode(&encoded.object, &encoded.file_map, &registry).unwrap();
        assert_eq!(decoded, depot);
    }

    #[test]
    fn decode_needs_registered_codec() {
        let registry = CompressorRegistry::new().with(Arc::new(XorCodec));
        let encoded = sample()
            .with_compress_type(XOR)
            .encode(&registry, FileMapEncoding::Binary)
            .unwrap();
        assert!(matches!(
            Depot::decode(&encoded.object, &encoded.file_map, &CompressorRegistry::new()),
            Err(FormatError::UnknownCompression(_))
        ));
    }

    #[test]
    fn file_map_tamper_is_checksum_mismatch() {
        let registry = CompressorRegistry::new();
        let mut encoded = sample().encode(&registry, FileMapEncoding::Binary).unwrap();
        let last = encoded.file_map.len() - 1;
        encoded.file_map[last] ^= 0x01;
        assert!(matches!(
            Depot::decode(&encoded.object, &encoded.file_map, &registry),
            Err(FormatError::ChecksumMismatch {
                section: Section::FileMap,
                ..
            })
        ));
    }

    #[test]
    fn wire_round_trip() {
        let depot = sample();
        let bytes = depot.encode_wire(&WireOptions::default()).unwrap();
        let net = decode_wire(&bytes, None).unwrap();
        assert_eq!(net.hash(), Some(depot.hash()));
        let back = net.into_depot().unwrap();
        assert_eq!(back.files(), depot.files());
        assert_eq!(back.payload(), depot.payload());
        assert_eq!(back.generate_time(), depot.generate_time());
    }

    #[test]
    fn wire_json_compressed_map() {
        let depot = sample();
        let options = WireOptions {
            file_map_encoding: FileMapEncoding::Json,
            file_map_codec: Some(&XorCodec),
            ..WireOptions::default()
        };
        let bytes = depot.encode_wire(&options).unwrap();
        let header = WireHeader::decode(&bytes).unwrap();
        assert!(header.flags.contains(WireFlags::FILE_MAP_IS_JSON));
        assert!(header.flags.contains(WireFlags::COMPRESS_FILE_MAP));

        let net = decode_wire(&bytes, Some(&XorCodec)).unwrap();
        assert_eq!(net.files.as_ref(), Some(depot.files()));
        assert!(decode_wire(&bytes, None).is_err());
    }

    #[test]
    fn wire_payload_size_beyond_object_is_corrupt() {
        let bytes = sample().encode_wire(&WireOptions::default()).unwrap();
        for size in [u64::MAX, bytes.len() as u64, u64::from(u32::MAX) + 1] {
            let mut patched = bytes.clone();
            patched[40..48].copy_from_slice(&size.to_le_bytes());
            assert!(
                matches!(
                    decode_wire(&patched, None),
                    Err(FormatError::CorruptHeader { .. })
                ),
                "payload size {size}"
            );
        }
    }

    #[test]
    fn wire_without_payload_cannot_become_depot() {
        let depot = sample();
        let options = WireOptions {
            include_payload: false,
            ..WireOptions::default()
        };
        let net = decode_wire(&depot.encode_wire(&options).unwrap(), None).unwrap();
        assert_eq!(net.header.payload_size, depot.payload_size());
        assert!(net.payload.is_none());
        assert_eq!(net.hash(), None);
        assert!(matches!(
            net.into_depot(),
            Err(FormatError::MissingSection(Section::Payload))
        ));
    }
}
