/// CRC32 guarding the fixed part of a durable header.
pub fn header_crc(bytes: &[u8]) -> u32 {
    crc32fast::hash(bytes)
}

/// A fresh per-depot confuser byte.
pub fn random_confuser() -> u8 {
    rand::random()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc_detects_single_bit_flip() {
        let mut data = vec![0u8; 56];
        data[10] = 0x55;
        let before = header_crc(&data);
        data[10] ^= 0x01;
        assert_ne!(before, header_crc(&data));
    }
}
