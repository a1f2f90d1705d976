//! Varint-prefix ("vp") framing: a tiny codec for composite database keys
//! and the node codec's extended-format trailer. Integers are written as
//! LEB128-style unsigned varints; strings are a varint length followed by
//! the raw bytes.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum VpError {
    #[error("truncated varint-prefixed input")]
    Truncated,
    #[error("uvarint overflows u32")]
    Overflow,
}

/// Appends `x` to `buf` as an unsigned LEB128 varint.
pub fn append_uint32(buf: &mut Vec<u8>, mut x: u32) {
    loop {
        let byte = (x & 0x7f) as u8;
        x >>= 7;
        if x != 0 {
            buf.push(byte | 0x80);
        } else {
            buf.push(byte);
            break;
        }
    }
}

/// Appends `s` to `buf` as `append_uint32(len(s))` followed by `s` itself.
pub fn append_string(buf: &mut Vec<u8>, s: &[u8]) {
    append_uint32(buf, s.len() as u32);
    buf.extend_from_slice(s);
}

/// Reads a varint-encoded `u32` off the front of `buf`, returning the value
/// and the unconsumed remainder.
pub fn split_uint32(buf: &[u8]) -> Result<(u32, &[u8]), VpError> {
    let mut result: u32 = 0;
    for i in 0..5 {
        let byte = *buf.get(i).ok_or(VpError::Truncated)?;
        let payload = (byte & 0x7f) as u32;
        if i == 4 && payload > 0x0f {
            // A 5th continuation byte can only contribute 4 more bits to a u32.
            return Err(VpError::Overflow);
        }
        result |= payload << (7 * i);
        if byte & 0x80 == 0 {
            return Ok((result, &buf[i + 1..]));
        }
    }
    Err(VpError::Overflow)
}

/// Reads a varint-prefixed string off the front of `buf`, returning the
/// string bytes and the unconsumed remainder.
pub fn split_string(buf: &[u8]) -> Result<(&[u8], &[u8]), VpError> {
    let (len, rest) = split_uint32(buf)?;
    let len = len as usize;
    if rest.len() < len {
        return Err(VpError::Truncated);
    }
    Ok((&rest[..len], &rest[len..]))
}

/// Cursor-style variant of [`split_uint32`] that advances `cursor` in place.
pub fn take_uint32(cursor: &mut &[u8]) -> Result<u32, VpError> {
    let (value, rest) = split_uint32(cursor)?;
    *cursor = rest;
    Ok(value)
}

/// Cursor-style variant of [`split_string`] that advances `cursor` in place.
pub fn take_string(cursor: &mut &[u8]) -> Result<Vec<u8>, VpError> {
    let (value, rest) = split_string(cursor)?;
    let value = value.to_vec();
    *cursor = rest;
    Ok(value)
}

/// Appends `x` as its minimal big-endian byte representation, itself
/// varint-length-prefixed like [`append_string`] (zero encodes as the empty
/// string). Shared by the node codec's per-ref version trailer and by
/// `DerivableList`'s index keys, so that both "shrink" small integers the
/// same way.
pub fn append_minimal_uint(buf: &mut Vec<u8>, x: u64) {
    let be = x.to_be_bytes();
    let start = be.iter().position(|&b| b != 0).unwrap_or(be.len());
    append_string(buf, &be[start..]);
}

/// Inverse of [`append_minimal_uint`].
pub fn take_minimal_uint(cursor: &mut &[u8]) -> Result<u64, VpError> {
    let bytes = take_string(cursor)?;
    if bytes.len() > 8 {
        return Err(VpError::Overflow);
    }
    let mut padded = [0u8; 8];
    padded[8 - bytes.len()..].copy_from_slice(&bytes);
    Ok(u64::from_be_bytes(padded))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uint32_roundtrip() {
        for x in [0u32, 1, 127, 128, 300, 16384, u32::MAX] {
            let mut buf = Vec::new();
            append_uint32(&mut buf, x);
            let (decoded, rest) = split_uint32(&buf).unwrap();
            assert_eq!(decoded, x);
            assert!(rest.is_empty());
        }
    }

    #[test]
    fn string_roundtrip() {
        for s in [&b""[..], b"a", b"hello world", &[0u8; 300]] {
            let mut buf = Vec::new();
            append_string(&mut buf, s);
            let (decoded, rest) = split_string(&buf).unwrap();
            assert_eq!(decoded, s);
            assert!(rest.is_empty());
        }
    }

    #[test]
    fn split_uint32_truncated() {
        assert_eq!(split_uint32(&[0x80]), Err(VpError::Truncated));
        assert_eq!(split_uint32(&[]), Err(VpError::Truncated));
    }

    #[test]
    fn split_string_truncated() {
        let mut buf = Vec::new();
        append_uint32(&mut buf, 10);
        assert_eq!(split_string(&buf), Err(VpError::Truncated));
    }

    #[test]
    fn minimal_uint_roundtrip() {
        for x in [0u64, 1, 255, 256, u32::MAX as u64, u64::MAX] {
            let mut buf = Vec::new();
            append_minimal_uint(&mut buf, x);
            let mut cursor = &buf[..];
            assert_eq!(take_minimal_uint(&mut cursor).unwrap(), x);
            assert!(cursor.is_empty());
        }
    }

    #[test]
    fn minimal_uint_zero_is_empty_string() {
        let mut buf = Vec::new();
        append_minimal_uint(&mut buf, 0);
        assert_eq!(buf, vec![0x00]); // length-prefix 0, no payload
    }

    #[test]
    fn take_helpers_advance_cursor() {
        let mut buf = Vec::new();
        append_uint32(&mut buf, 42);
        append_string(&mut buf, b"meta");
        let mut cursor = &buf[..];
        assert_eq!(take_uint32(&mut cursor).unwrap(), 42);
        assert_eq!(take_string(&mut cursor).unwrap(), b"meta".to_vec());
        assert!(cursor.is_empty());
    }
}
