//! Panic-free primitive readers/writers for item payloads.
//!
//! Parsing rules:
//! - Never index (`buf[0]`); always go through `Buf` with `remaining()`
//!   checks.
//! - Never `unwrap()` / `expect()` / `panic!()` in production paths.
//! - Length prefixes are validated against the remaining buffer before
//!   any allocation happens.
//!
//! All multi-byte integers are big-endian.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{PalaverError, Result};

/// Hard cap for any single length-prefixed field. A declared length above
/// this is malformed regardless of how many bytes follow.
pub const MAX_FIELD_LEN: usize = 1 << 20;

pub fn get_u8(buf: &mut Bytes, what: &str) -> Result<u8> {
    if buf.remaining() < 1 {
        return Err(PalaverError::Truncated(what.into()));
    }
    Ok(buf.get_u8())
}

pub fn get_u16(buf: &mut Bytes, what: &str) -> Result<u16> {
    if buf.remaining() < 2 {
        return Err(PalaverError::Truncated(what.into()));
    }
    Ok(buf.get_u16())
}

pub fn get_u32(buf: &mut Bytes, what: &str) -> Result<u32> {
    if buf.remaining() < 4 {
        return Err(PalaverError::Truncated(what.into()));
    }
    Ok(buf.get_u32())
}

pub fn get_u64(buf: &mut Bytes, what: &str) -> Result<u64> {
    if buf.remaining() < 8 {
        return Err(PalaverError::Truncated(what.into()));
    }
    Ok(buf.get_u64())
}

/// Fixed-size byte array (ids, raw keys).
pub fn get_array<const N: usize>(buf: &mut Bytes, what: &str) -> Result<[u8; N]> {
    if buf.remaining() < N {
        return Err(PalaverError::Truncated(what.into()));
    }
    let mut out = [0u8; N];
    buf.copy_to_slice(&mut out);
    Ok(out)
}

/// u32-length-prefixed raw bytes.
pub fn get_bytes(buf: &mut Bytes, what: &str) -> Result<Bytes> {
    let len = get_u32(buf, what)? as usize;
    if len > MAX_FIELD_LEN {
        return Err(PalaverError::MalformedField(format!(
            "{what}: declared length {len} exceeds cap"
        )));
    }
    if buf.remaining() < len {
        return Err(PalaverError::Truncated(what.into()));
    }
    Ok(buf.copy_to_bytes(len))
}

/// u32-length-prefixed UTF-8 string.
pub fn get_string(buf: &mut Bytes, what: &str) -> Result<String> {
    let raw = get_bytes(buf, what)?;
    String::from_utf8(raw.to_vec())
        .map_err(|_| PalaverError::MalformedField(format!("{what}: invalid utf-8")))
}

pub fn put_bytes(buf: &mut BytesMut, bytes: &[u8], what: &str) -> Result<()> {
    if bytes.len() > MAX_FIELD_LEN {
        return Err(PalaverError::MalformedField(format!(
            "{what}: length {} exceeds cap",
            bytes.len()
        )));
    }
    buf.put_u32(bytes.len() as u32);
    buf.put_slice(bytes);
    Ok(())
}

pub fn put_string(buf: &mut BytesMut, s: &str, what: &str) -> Result<()> {
    put_bytes(buf, s.as_bytes(), what)
}

/// Encoded size of a u32-length-prefixed field.
pub fn prefixed_len(payload_len: usize) -> usize {
    4 + payload_len
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn string_roundtrip() {
        let mut buf = BytesMut::new();
        put_string(&mut buf, "héllo", "s").unwrap();
        let mut bytes = buf.freeze();
        assert_eq!(get_string(&mut bytes, "s").unwrap(), "héllo");
        assert_eq!(bytes.remaining(), 0);
    }

    #[test]
    fn empty_string_roundtrip() {
        let mut buf = BytesMut::new();
        put_string(&mut buf, "", "s").unwrap();
        let mut bytes = buf.freeze();
        assert_eq!(get_string(&mut bytes, "s").unwrap(), "");
    }

    #[test]
    fn truncated_prefix_is_reported() {
        let mut bytes = Bytes::from_static(&[0x00, 0x00]);
        assert!(matches!(
            get_string(&mut bytes, "s"),
            Err(PalaverError::Truncated(_))
        ));
    }

    #[test]
    fn prefix_longer_than_buffer_is_truncated() {
        // declares 16 bytes, supplies 2
        let mut bytes = Bytes::from_static(&[0x00, 0x00, 0x00, 0x10, 0xAA, 0xBB]);
        assert!(matches!(
            get_bytes(&mut bytes, "b"),
            Err(PalaverError::Truncated(_))
        ));
    }

    #[test]
    fn absurd_declared_length_is_malformed() {
        let mut bytes = Bytes::from_static(&[0xFF, 0xFF, 0xFF, 0xFF]);
        assert!(matches!(
            get_bytes(&mut bytes, "b"),
            Err(PalaverError::MalformedField(_))
        ));
    }

    #[test]
    fn invalid_utf8_is_malformed() {
        let mut bytes = Bytes::from_static(&[0x00, 0x00, 0x00, 0x02, 0xC3, 0x28]);
        assert!(matches!(
            get_string(&mut bytes, "s"),
            Err(PalaverError::MalformedField(_))
        ));
    }
}
