use flawless_format::{
    DepotFileInfo, DepotHeader, FileMap, FileStorage, FormatError, HEADER_LEN,
};
use flawless_path::WorkPath;
use flawless_types::ContentHash;
use proptest::prelude::*;

fn sample_map() -> FileMap {
    let mut map = FileMap::new();
    for (i, path) in ["a.txt", "dir/b.bin", "dir/sub/c"].iter().enumerate() {
        let data = path.as_bytes();
        map.insert(DepotFileInfo {
            path: WorkPath::new(*path).unwrap(),
            hash: ContentHash::of(data),
            size: data.len() as u64,
            storage: if i == 1 {
                FileStorage::Dependency {
                    depot: ContentHash::of(b"base"),
                }
            } else {
                FileStorage::Inline { offset: i as u64 * 16 }
            },
        })
        .unwrap();
    }
    map
}

proptest! {
    #[test]
    fn file_map_decoder_never_panics(data in proptest::collection::vec(any::<u8>(), 0..256)) {
        let _ = FileMap::from_binary(&data);
    }

    #[test]
    fn truncated_file_map_is_rejected(cut in 0usize..64) {
        let encoded = sample_map().to_binary();
        let cut = cut % encoded.len();
        prop_assert!(FileMap::from_binary(&encoded[..cut]).is_err());
    }

    #[test]
    fn random_header_is_corrupt(data in proptest::collection::vec(any::<u8>(), HEADER_LEN..HEADER_LEN + 32)) {
        // A random header almost never carries the magic number and a matching CRC.
        let result = DepotHeader::decode(&data);
        let is_corrupt_header = matches!(result, Err(FormatError::CorruptHeader { .. }));
        prop_assert!(is_corrupt_header);
    }
}

#[test]
fn sample_map_round_trips() {
    let map = sample_map();
    assert_eq!(FileMap::from_binary(&map.to_binary()).unwrap(), map);
}
