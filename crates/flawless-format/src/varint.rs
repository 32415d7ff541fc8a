use crate::error::{FormatError, FormatResult};

/// Encode a u64 as a LEB128 variable-length integer.
pub(crate) fn encode_varint(buf: &mut Vec<u8>, mut value: u64) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value > 0 {
            byte |= 0x80;
        }
        buf.push(byte);
        if value == 0 {
            break;
        }
    }
}

/// Decode a variable-length integer starting at `offset`. Returns
/// (value, bytes_consumed).
pub(crate) fn decode_varint(data: &[u8], offset: usize) -> FormatResult<(u64, usize)> {
    let mut value: u64 = 0;
    let mut shift = 0;
    for (i, &byte) in data.get(offset..).unwrap_or_default().iter().enumerate() {
        if shift >= 64 {
            return Err(FormatError::CorruptFileMap {
                offset: offset + i,
                reason: "varint overflow".into(),
            });
        }
        if shift == 63 && byte > 1 {
            return Err(FormatError::CorruptFileMap {
                offset: offset + i,
                reason: "varint overflow".into(),
            });
        }
        value |= ((byte & 0x7F) as u64) << shift;
        shift += 7;
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    Err(FormatError::CorruptFileMap {
        offset,
        reason: "truncated varint".into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn varint_small() {
        let mut buf = Vec::new();
        encode_varint(&mut buf, 42);
        assert_eq!(buf, vec![42]);
        assert_eq!(decode_varint(&buf, 0).unwrap(), (42, 1));
    }

    #[test]
    fn varint_large_at_offset() {
        let mut buf = vec![0xAA, 0xBB];
        encode_varint(&mut buf, 1_000_000);
        let (val, used) = decode_varint(&buf, 2).unwrap();
        assert_eq!(val, 1_000_000);
        assert_eq!(used, buf.len() - 2);
    }

    #[test]
    fn varint_max() {
        let mut buf = Vec::new();
        encode_varint(&mut buf, u64::MAX);
        assert_eq!(decode_varint(&buf, 0).unwrap().0, u64::MAX);
    }

    #[test]
    fn varint_truncated() {
        assert!(decode_varint(&[0x80, 0x80], 0).is_err());
        assert!(decode_varint(&[], 0).is_err());
        assert!(decode_varint(&[1], 5).is_err());
    }

    #[test]
    fn varint_overflow() {
        assert!(decode_varint(&[0xFF; 11], 0).is_err());
    }

    #[test]
    fn varint_tenth_byte_carries_one_bit() {
        let mut max = vec![0xFF; 9];
        max.push(0x01);
        assert_eq!(decode_varint(&max, 0).unwrap(), (u64::MAX, 10));

        let mut wide = vec![0xFF; 9];
        wide.push(0x03);
        assert!(matches!(
            decode_varint(&wide, 0),
            Err(FormatError::CorruptFileMap { offset: 9, .. })
        ));

        let mut aliased = vec![0x80; 9];
        aliased.push(0x02);
        assert!(decode_varint(&aliased, 0).is_err());
    }
}
