//! SSH wire encoding primitives (RFC 4251 Section 5).
//!
//! Every message in the engine is assembled and parsed with these helpers.
//! Parsers take the input slice plus a read offset and return the decoded
//! value together with the offset of the next field, so a message is read as
//! a chain of shadowed `offset` bindings:
//!
//! ```rust
//! use picoware_proto::ssh::wire::{encode_string, parse_string, parse_uint32};
//!
//! let mut data = 7u32.to_be_bytes().to_vec();
//! data.extend_from_slice(&encode_string(b"exec"));
//!
//! let (channel, offset) = parse_uint32(&data, 0).unwrap();
//! let (request, offset) = parse_string(&data, offset).unwrap();
//! assert_eq!(channel, 7);
//! assert_eq!(request, b"exec");
//! assert_eq!(offset, data.len());
//! ```

use bytes::{BufMut, BytesMut};
use num_bigint::{BigInt, BigUint, Sign};
use picoware_platform::{PicoError, PicoResult};

/// Encodes `bytes` as an SSH `string` (uint32 length + raw bytes).
pub fn encode_string(bytes: &[u8]) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(4 + bytes.len());
    write_string(&mut buf, bytes);
    buf.to_vec()
}

/// Encodes a signed integer as an SSH `mpint`.
///
/// Zero encodes as an empty string. Positive values whose leading byte has
/// the high bit set get a 0x00 prefix so they are not read back as negative.
pub fn encode_mpint(value: &BigInt) -> Vec<u8> {
    if value.sign() == Sign::NoSign {
        return vec![0, 0, 0, 0];
    }
    encode_string(&value.to_signed_bytes_be())
}

/// Encodes an unsigned big-endian magnitude as an SSH `mpint`.
///
/// Used for shared secrets, which are kept as raw bytes so they can be
/// zeroized; leading zero bytes are stripped first.
pub fn encode_mpint_bytes(magnitude: &[u8]) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(5 + magnitude.len());
    write_mpint_bytes(&mut buf, magnitude);
    buf.to_vec()
}

/// Appends an SSH `string`.
pub fn write_string(buf: &mut BytesMut, bytes: &[u8]) {
    buf.put_u32(bytes.len() as u32);
    buf.put_slice(bytes);
}

/// Appends an unsigned magnitude as an SSH `mpint`.
pub fn write_mpint_bytes(buf: &mut BytesMut, magnitude: &[u8]) {
    let start = magnitude
        .iter()
        .position(|&b| b != 0)
        .unwrap_or(magnitude.len());
    let trimmed = &magnitude[start..];

    if trimmed.is_empty() {
        buf.put_u32(0);
    } else if trimmed[0] & 0x80 != 0 {
        buf.put_u32(trimmed.len() as u32 + 1);
        buf.put_u8(0);
        buf.put_slice(trimmed);
    } else {
        buf.put_u32(trimmed.len() as u32);
        buf.put_slice(trimmed);
    }
}

/// Appends a non-negative big integer as an SSH `mpint`.
pub fn write_mpint(buf: &mut BytesMut, value: &BigUint) {
    write_mpint_bytes(buf, &value.to_bytes_be());
}

/// Appends an SSH `name-list` (comma-separated ASCII names).
pub fn write_name_list(buf: &mut BytesMut, names: &[String]) {
    write_string(buf, names.join(",").as_bytes());
}

/// Appends an SSH `boolean`.
pub fn write_bool(buf: &mut BytesMut, value: bool) {
    buf.put_u8(u8::from(value));
}

/// Reads a single byte.
pub fn parse_byte(data: &[u8], offset: usize) -> PicoResult<(u8, usize)> {
    match data.get(offset) {
        Some(&b) => Ok((b, offset + 1)),
        None => Err(PicoError::Protocol(format!(
            "Cannot read byte at offset {}",
            offset
        ))),
    }
}

/// Reads an SSH `boolean` (any non-zero byte is true).
pub fn parse_bool(data: &[u8], offset: usize) -> PicoResult<(bool, usize)> {
    let (b, offset) = parse_byte(data, offset)?;
    Ok((b != 0, offset))
}

/// Reads a big-endian `uint32`.
pub fn parse_uint32(data: &[u8], offset: usize) -> PicoResult<(u32, usize)> {
    let end = offset
        .checked_add(4)
        .filter(|&end| end <= data.len())
        .ok_or_else(|| PicoError::Protocol(format!("Cannot read u32 at offset {}", offset)))?;

    let mut word = [0u8; 4];
    word.copy_from_slice(&data[offset..end]);
    Ok((u32::from_be_bytes(word), end))
}

/// Reads an SSH `string` as raw bytes.
pub fn parse_string(data: &[u8], offset: usize) -> PicoResult<(Vec<u8>, usize)> {
    let (length, offset) = parse_uint32(data, offset)?;
    let end = offset
        .checked_add(length as usize)
        .filter(|&end| end <= data.len())
        .ok_or_else(|| {
            PicoError::Protocol(format!(
                "Data truncated: expected {} bytes at offset {}",
                length, offset
            ))
        })?;

    Ok((data[offset..end].to_vec(), end))
}

/// Reads an SSH `string` that must be valid UTF-8.
pub fn parse_utf8(data: &[u8], offset: usize) -> PicoResult<(String, usize)> {
    let (bytes, offset) = parse_string(data, offset)?;
    let text = String::from_utf8(bytes)
        .map_err(|_| PicoError::Protocol("String contains invalid UTF-8".to_string()))?;
    Ok((text, offset))
}

/// Reads a signed SSH `mpint`.
pub fn parse_mpint(data: &[u8], offset: usize) -> PicoResult<(BigInt, usize)> {
    let (bytes, offset) = parse_string(data, offset)?;
    if bytes.is_empty() {
        return Ok((BigInt::from(0u8), offset));
    }
    Ok((BigInt::from_signed_bytes_be(&bytes), offset))
}

/// Reads an SSH `mpint` that must not be negative.
pub fn parse_mpint_unsigned(data: &[u8], offset: usize) -> PicoResult<(BigUint, usize)> {
    let (value, offset) = parse_mpint(data, offset)?;
    let unsigned = value
        .to_biguint()
        .ok_or_else(|| PicoError::Protocol("Negative mpint where positive required".into()))?;
    Ok((unsigned, offset))
}

/// Reads an SSH `name-list`. An empty string yields an empty list.
pub fn parse_name_list(data: &[u8], offset: usize) -> PicoResult<(Vec<String>, usize)> {
    let (bytes, offset) = parse_string(data, offset)?;
    let list = std::str::from_utf8(&bytes)
        .map_err(|_| PicoError::Protocol("Name-list contains invalid UTF-8".to_string()))?;

    if list.is_empty() {
        Ok((vec![], offset))
    } else {
        Ok((list.split(',').map(String::from).collect(), offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn mpint_hex(value: i64) -> String {
        hex::encode(encode_mpint(&BigInt::from(value)))
    }

    #[test]
    fn test_encode_mpint_rfc4251_examples() {
        assert_eq!(mpint_hex(0), "00000000");
        assert_eq!(mpint_hex(0x80), "000000020080");
        assert_eq!(mpint_hex(-1234), "00000002edcc");
        assert_eq!(mpint_hex(-0xdeadbeef), "00000005ff21524111");

        let big = BigInt::parse_bytes(b"9a378f9b2e332a7", 16).unwrap();
        assert_eq!(hex::encode(encode_mpint(&big)), "0000000809a378f9b2e332a7");
    }

    #[test]
    fn test_encode_mpint_bytes_strips_and_pads() {
        assert_eq!(encode_mpint_bytes(&[]), vec![0, 0, 0, 0]);
        assert_eq!(encode_mpint_bytes(&[0, 0, 0]), vec![0, 0, 0, 0]);
        assert_eq!(encode_mpint_bytes(&[0, 0, 0x7f]), vec![0, 0, 0, 1, 0x7f]);
        assert_eq!(
            encode_mpint_bytes(&[0x80, 0x00]),
            vec![0, 0, 0, 3, 0, 0x80, 0x00]
        );
    }

    #[test]
    fn test_mpint_round_trip_representative() {
        for value in [
            BigInt::from(0),
            BigInt::from(-1),
            BigInt::from(-128),
            BigInt::from(127),
            BigInt::from(128),
            BigInt::from(0xff00_0000u32),
        ] {
            let encoded = encode_mpint(&value);
            let (decoded, offset) = parse_mpint(&encoded, 0).unwrap();
            assert_eq!(decoded, value);
            assert_eq!(offset, encoded.len());
        }
    }

    #[test]
    fn test_parse_mpint_unsigned_rejects_negative() {
        let encoded = encode_mpint(&BigInt::from(-5));
        let result = parse_mpint_unsigned(&encoded, 0);
        assert!(matches!(result, Err(PicoError::Protocol(_))));
    }

    #[test]
    fn test_parse_string_truncated() {
        let data = [0, 0, 0, 10, b'a', b'b'];
        assert!(matches!(
            parse_string(&data, 0),
            Err(PicoError::Protocol(_))
        ));
    }

    #[test]
    fn test_parse_uint32_out_of_range() {
        assert!(parse_uint32(&[0, 0, 1], 0).is_err());
        assert!(parse_uint32(&[0, 0, 0, 1], usize::MAX).is_err());
    }

    #[test]
    fn test_name_list() {
        let mut buf = BytesMut::new();
        write_name_list(
            &mut buf,
            &["aes128-ctr".to_string(), "aes256-ctr".to_string()],
        );
        let (names, offset) = parse_name_list(&buf, 0).unwrap();
        assert_eq!(names, vec!["aes128-ctr", "aes256-ctr"]);
        assert_eq!(offset, buf.len());

        let (empty, _) = parse_name_list(&[0, 0, 0, 0], 0).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_bool() {
        let mut buf = BytesMut::new();
        write_bool(&mut buf, true);
        write_bool(&mut buf, false);
        assert_eq!(parse_bool(&buf, 0).unwrap(), (true, 1));
        assert_eq!(parse_bool(&buf, 1).unwrap(), (false, 2));
        assert!(parse_bool(&buf, 2).is_err());
    }

    proptest! {
        #[test]
        fn prop_string_round_trip(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
            let encoded = encode_string(&bytes);
            let (decoded, offset) = parse_string(&encoded, 0).unwrap();
            prop_assert_eq!(decoded, bytes);
            prop_assert_eq!(offset, encoded.len());
        }

        #[test]
        fn prop_mpint_round_trip(value in any::<i128>()) {
            let value = BigInt::from(value);
            let (decoded, _) = parse_mpint(&encode_mpint(&value), 0).unwrap();
            prop_assert_eq!(decoded, value);
        }

        #[test]
        fn prop_unsigned_mpint_matches_signed(magnitude in proptest::collection::vec(any::<u8>(), 0..64)) {
            let expected = BigInt::from(BigUint::from_bytes_be(&magnitude));
            prop_assert_eq!(encode_mpint_bytes(&magnitude), encode_mpint(&expected));
        }
    }
}
