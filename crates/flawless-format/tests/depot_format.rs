//! End-to-end tests of the durable depot encoding.

use flawless_format::{
    CompressorRegistry, Depot, DepotBuilder, DepotHeader, FileMapEncoding, FormatError, Section,
    HEADER_LEN,
};
use flawless_path::WorkPath;

fn depot_with(files: &[(&str, &[u8])]) -> Depot {
    let mut builder = DepotBuilder::new();
    for (path, data) in files {
        builder.add_file(WorkPath::new(*path).unwrap(), data).unwrap();
    }
    builder.build()
}

#[test]
fn header_fields_survive_round_trip() {
    let registry = CompressorRegistry::new();
    let depot = depot_with(&[("readme.md", b"hello"), ("src/lib.rs", b"pub fn f() {}")]);
    let encoded = depot.encode(&registry, FileMapEncoding::Binary).unwrap();

    let decoded = Depot::decode(&encoded.object, &encoded.file_map, &registry).unwrap();
    assert_eq!(decoded.version(), depot.version());
    assert_eq!(decoded.compress_type(), depot.compress_type());
    assert_eq!(decoded.generate_time(), depot.generate_time());
    assert_eq!(decoded.payload_size(), depot.payload_size());
    assert_eq!(decoded.hash(), depot.hash());

    let again = decoded.encode(&registry, FileMapEncoding::Binary).unwrap();
    let first = DepotHeader::decode(&encoded.object).unwrap();
    let second = DepotHeader::decode(&again.object).unwrap();
    assert_eq!(first.depot_checksum, second.depot_checksum);
    assert_eq!(first.file_map_checksum, second.file_map_checksum);
    assert_eq!(encoded, again);
}

#[test]
fn flipped_payload_byte_is_checksum_mismatch_not_corrupt_header() {
    let registry = CompressorRegistry::new();
    let depot = depot_with(&[("data.bin", &[1, 2, 3, 4, 5, 6, 7, 8])]);
    let mut encoded = depot.encode(&registry, FileMapEncoding::Binary).unwrap();

    encoded.object[HEADER_LEN + 3] ^= 0x40;
    let err = Depot::decode(&encoded.object, &encoded.file_map, &registry).unwrap_err();
    match err {
        FormatError::ChecksumMismatch {
            section,
            expected,
            actual,
        } => {
            assert_eq!(section, Section::Payload);
            assert_ne!(expected, actual);
        }
        other => panic!("expected checksum mismatch, got {other:?}"),
    }
}

#[test]
fn truncated_payload_is_size_mismatch() {
    let registry = CompressorRegistry::new();
    let depot = depot_with(&[("data.bin", b"0123456789")]);
    let encoded = depot.encode(&registry, FileMapEncoding::Binary).unwrap();
    let short = &encoded.object[..encoded.object.len() - 2];
    assert!(matches!(
        Depot::decode(short, &encoded.file_map, &registry),
        Err(FormatError::PayloadSizeMismatch {
            expected: 10,
            actual: 8
        })
    ));
}

#[test]
fn corrupted_header_is_reported_before_sections() {
    let registry = CompressorRegistry::new();
    let depot = depot_with(&[("a", b"a")]);
    let mut encoded = depot.encode(&registry, FileMapEncoding::Binary).unwrap();
    encoded.object[20] ^= 0xFF;
    encoded.file_map.clear();
    let err = Depot::decode(&encoded.object, &encoded.file_map, &registry).unwrap_err();
    assert!(matches!(err, FormatError::CorruptHeader { .. }));
    assert!(err.is_corruption());
}

#[test]
fn empty_depot_round_trips() {
    let registry = CompressorRegistry::new();
    let depot = DepotBuilder::new().build();
    let encoded = depot.encode(&registry, FileMapEncoding::Json).unwrap();
    assert_eq!(encoded.object.len(), HEADER_LEN);
    let decoded = Depot::decode(&encoded.object, &encoded.file_map, &registry).unwrap();
    assert_eq!(decoded.file_count(), 0);
    assert_eq!(decoded.hash(), depot.hash());
}

#[test]
fn identical_snapshots_share_hash_but_not_checksums() {
    let registry = CompressorRegistry::new();
    let mut a = DepotBuilder::new().confuser(1);
    a.add_file(WorkPath::new("f").unwrap(), b"same").unwrap();
    let mut b = DepotBuilder::new().confuser(2);
    b.add_file(WorkPath::new("f").unwrap(), b"same").unwrap();
    let (a, b) = (a.build(), b.build());
    assert_eq!(a.hash(), b.hash());

    let ha = DepotHeader::decode(&a.encode(&registry, FileMapEncoding::Binary).unwrap().object)
        .unwrap();
    let hb = DepotHeader::decode(&b.encode(&registry, FileMapEncoding::Binary).unwrap().object)
        .unwrap();
    assert_ne!(ha.depot_checksum, hb.depot_checksum);
}
