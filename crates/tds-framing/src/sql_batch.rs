//! SQL batch payload handling.
//!
//! Per MS-TDS, a SQL batch payload (packet type 0x01) begins with an
//! ALL_HEADERS block whose first 4 bytes give the total size of the block,
//! including those 4 bytes, as a little-endian unsigned 32-bit integer.
//! Everything after the block is the batch text, encoded as UTF-16LE.
//!
//! Note the endianness split: the packet header length is big-endian on
//! the wire, while the ALL_HEADERS length and the batch text inside the
//! payload are little-endian. The two decoders are kept separate.

use bytes::{BufMut, Bytes, BytesMut};

use crate::codec::{decode_utf16le_lossy, write_utf16_string};

/// Total size of the ALL_HEADERS block, read from its leading length
/// field. Returns 0 when fewer than four bytes are present.
#[must_use]
pub fn all_headers_length(payload: &[u8]) -> usize {
    match payload.first_chunk::<4>() {
        Some(len) => u32::from_le_bytes(*len) as usize,
        None => 0,
    }
}

/// Extract the batch text from an assembled SQL batch payload.
///
/// Returns the empty string when the payload does not extend past the
/// ALL_HEADERS block; an oversized declared block length therefore yields
/// an empty text rather than an error.
#[must_use]
pub fn batch_text(payload: &[u8]) -> String {
    let header_len = all_headers_length(payload);
    if payload.len() > header_len {
        decode_utf16le_lossy(&payload[header_len..])
    } else {
        String::new()
    }
}

/// Encode a SQL batch payload: the 22-byte ALL_HEADERS block (a single
/// transaction-descriptor header in auto-commit mode) followed by the SQL
/// text as UTF-16LE.
///
/// This is the payload only; the caller frames it into packets.
#[must_use]
pub fn encode_sql_batch(sql: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(22 + sql.len() * 2);

    buf.put_u32_le(22); // ALL_HEADERS total length, including this field
    buf.put_u32_le(18); // header length
    buf.put_u16_le(0x0002); // header type: transaction descriptor
    buf.put_u64_le(0); // transaction descriptor, 0 = auto-commit
    buf.put_u32_le(1); // outstanding request count

    write_utf16_string(&mut buf, sql);
    buf.freeze()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_sql_batch_layout() {
        let payload = encode_sql_batch("SELECT 1");

        // ALL_HEADERS (22 bytes) + UTF-16LE text (8 chars * 2 bytes)
        assert_eq!(payload.len(), 38);
        assert_eq!(&payload[0..4], &[22, 0, 0, 0]);
        assert_eq!(&payload[4..8], &[18, 0, 0, 0]);
        assert_eq!(&payload[8..10], &[0x02, 0x00]);

        // Text starts right after the block, little-endian code units.
        assert_eq!(payload[22], b'S');
        assert_eq!(payload[23], 0);
    }

    #[test]
    fn test_batch_text_roundtrip() {
        for sql in ["SELECT 1", "hi", "SELECT N'数据' AS c"] {
            assert_eq!(batch_text(&encode_sql_batch(sql)), sql);
        }
    }

    #[test]
    fn test_empty_batch() {
        // Even empty SQL carries the ALL_HEADERS block, and a payload that
        // ends exactly at the block boundary has no text.
        let payload = encode_sql_batch("");
        assert_eq!(payload.len(), 22);
        assert_eq!(batch_text(&payload), "");
    }

    #[test]
    fn test_oversized_header_length_yields_empty_text() {
        // Declared block length beyond the payload end.
        let payload = [0xFF, 0x00, 0x00, 0x00, 0x68, 0x00, 0x69, 0x00];
        assert_eq!(batch_text(&payload), "");
    }

    #[test]
    fn test_short_payload_has_no_header() {
        assert_eq!(all_headers_length(&[0x08, 0x00]), 0);
        // With no decodable block length the whole payload is treated as
        // text, mirroring the reference bridge.
        assert_eq!(batch_text(&[0x68, 0x00]), "h");
    }

    #[test]
    fn test_minimal_custom_header() {
        // An 8-byte block followed by "hi" in UTF-16LE.
        let payload = [
            0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x68, 0x00, 0x69, 0x00,
        ];
        assert_eq!(all_headers_length(&payload), 8);
        assert_eq!(batch_text(&payload), "hi");
    }
}
