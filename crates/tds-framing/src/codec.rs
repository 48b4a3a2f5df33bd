//! Low-level encoding utilities shared across the framing layer.

use bytes::BufMut;

/// Write a UTF-16LE string without a length prefix.
pub fn write_utf16_string(dst: &mut impl BufMut, s: &str) {
    for c in s.encode_utf16() {
        dst.put_u16_le(c);
    }
}

/// Decode UTF-16LE bytes, two bytes per code unit in little-endian order.
///
/// Unpaired surrogates become replacement characters; a trailing odd byte
/// is dropped.
#[must_use]
pub fn decode_utf16le_lossy(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16_lossy(&units)
}

/// Calculate the byte length of a string once UTF-16 encoded.
#[must_use]
pub fn utf16_byte_len(s: &str) -> usize {
    s.encode_utf16().count() * 2
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn test_utf16_roundtrip() {
        let original = "Hello, 世界!";
        let mut buf = BytesMut::new();
        write_utf16_string(&mut buf, original);

        assert_eq!(buf.len(), utf16_byte_len(original));
        assert_eq!(decode_utf16le_lossy(&buf), original);
    }

    #[test]
    fn test_decode_drops_trailing_odd_byte() {
        // 'h' followed by half a code unit.
        assert_eq!(decode_utf16le_lossy(&[0x68, 0x00, 0x69]), "h");
    }

    #[test]
    fn test_utf16_byte_len() {
        assert_eq!(utf16_byte_len("Hello"), 10);
        assert_eq!(utf16_byte_len("世界"), 4);
    }
}
