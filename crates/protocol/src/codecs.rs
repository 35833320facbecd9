//! Binary reader/writer primitives used inside every packet body
//!
//! Fixed-width integers are big-endian. Variable-length integers use 7 data
//! bits per byte, least-significant group first, with the high bit set on
//! every byte except the last. Signed variable-length integers are zig-zag
//! mapped onto the unsigned form before encoding.
//!
//! Every read checks the remaining length first, so a short or hostile buffer
//! produces [`ProtocolError::Truncated`] instead of a panic. Every length or
//! count read from the wire is checked against a caller-supplied maximum
//! before anything is allocated.

use bytes::{Buf, BufMut, Bytes};
use cobble_core::{ProtocolError, Result};
use uuid::Uuid;

/// Data bits of a varint byte.
const SEGMENT_BITS: u8 = 0x7F;

/// Continuation bit of a varint byte.
const CONTINUE_BIT: u8 = 0x80;

/// Maximum encoded size of a 32-bit varint.
pub const MAX_VAR_U32_LEN: usize = 5;

/// Maximum encoded size of a 64-bit varint.
pub const MAX_VAR_U64_LEN: usize = 10;

#[inline]
fn ensure<B: Buf>(buf: &B, needed: usize, what: &'static str) -> Result<()> {
    let remaining = buf.remaining();
    if remaining < needed {
        return Err(ProtocolError::Truncated {
            what,
            needed,
            remaining,
        });
    }
    Ok(())
}

//=== Fixed-width primitives ===//

#[inline]
pub fn read_u8<B: Buf>(buf: &mut B) -> Result<u8> {
    ensure(buf, 1, "u8")?;
    Ok(buf.get_u8())
}

#[inline]
pub fn read_i8<B: Buf>(buf: &mut B) -> Result<i8> {
    ensure(buf, 1, "i8")?;
    Ok(buf.get_i8())
}

/// Read a boolean byte. Any non-zero value is `true`.
#[inline]
pub fn read_bool<B: Buf>(buf: &mut B) -> Result<bool> {
    ensure(buf, 1, "bool")?;
    Ok(buf.get_u8() != 0)
}

#[inline]
pub fn write_bool<B: BufMut>(buf: &mut B, val: bool) {
    buf.put_u8(u8::from(val));
}

#[inline]
pub fn read_u16<B: Buf>(buf: &mut B) -> Result<u16> {
    ensure(buf, 2, "u16")?;
    Ok(buf.get_u16())
}

#[inline]
pub fn read_i16<B: Buf>(buf: &mut B) -> Result<i16> {
    ensure(buf, 2, "i16")?;
    Ok(buf.get_i16())
}

#[inline]
pub fn read_i32<B: Buf>(buf: &mut B) -> Result<i32> {
    ensure(buf, 4, "i32")?;
    Ok(buf.get_i32())
}

#[inline]
pub fn read_i64<B: Buf>(buf: &mut B) -> Result<i64> {
    ensure(buf, 8, "i64")?;
    Ok(buf.get_i64())
}

#[inline]
pub fn read_u64<B: Buf>(buf: &mut B) -> Result<u64> {
    ensure(buf, 8, "u64")?;
    Ok(buf.get_u64())
}

#[inline]
pub fn read_f32<B: Buf>(buf: &mut B) -> Result<f32> {
    ensure(buf, 4, "f32")?;
    Ok(buf.get_f32())
}

#[inline]
pub fn read_f64<B: Buf>(buf: &mut B) -> Result<f64> {
    ensure(buf, 8, "f64")?;
    Ok(buf.get_f64())
}

//=== Variable-length integers ===//

/// Read an unsigned 32-bit varint (at most 5 bytes).
///
/// # Errors
/// - `SizeExceeded` if the 5th byte still has its continuation bit set
/// - `Truncated` if the buffer ends mid-varint
pub fn read_var_u32<B: Buf>(buf: &mut B) -> Result<u32> {
    let mut value: u32 = 0;

    for i in 0..MAX_VAR_U32_LEN {
        ensure(buf, 1, "varint")?;
        let byte = buf.get_u8();
        value |= u32::from(byte & SEGMENT_BITS) << (7 * i);

        if byte & CONTINUE_BIT == 0 {
            return Ok(value);
        }
    }

    Err(ProtocolError::SizeExceeded {
        what: "varint",
        len: MAX_VAR_U32_LEN + 1,
        max: MAX_VAR_U32_LEN,
    })
}

/// Write an unsigned 32-bit varint. Returns the number of bytes written.
pub fn write_var_u32<B: BufMut>(buf: &mut B, mut value: u32) -> usize {
    let mut written = 0;

    loop {
        let mut byte = (value & u32::from(SEGMENT_BITS)) as u8;
        value >>= 7;

        if value != 0 {
            byte |= CONTINUE_BIT;
        }

        buf.put_u8(byte);
        written += 1;

        if value == 0 {
            return written;
        }
    }
}

/// Read an unsigned 64-bit varint (at most 10 bytes).
pub fn read_var_u64<B: Buf>(buf: &mut B) -> Result<u64> {
    let mut value: u64 = 0;

    for i in 0..MAX_VAR_U64_LEN {
        ensure(buf, 1, "varlong")?;
        let byte = buf.get_u8();
        value |= u64::from(byte & SEGMENT_BITS) << (7 * i);

        if byte & CONTINUE_BIT == 0 {
            return Ok(value);
        }
    }

    Err(ProtocolError::SizeExceeded {
        what: "varlong",
        len: MAX_VAR_U64_LEN + 1,
        max: MAX_VAR_U64_LEN,
    })
}

/// Write an unsigned 64-bit varint. Returns the number of bytes written.
pub fn write_var_u64<B: BufMut>(buf: &mut B, mut value: u64) -> usize {
    let mut written = 0;

    loop {
        let mut byte = (value & u64::from(SEGMENT_BITS)) as u8;
        value >>= 7;

        if value != 0 {
            byte |= CONTINUE_BIT;
        }

        buf.put_u8(byte);
        written += 1;

        if value == 0 {
            return written;
        }
    }
}

/// Read a zig-zag encoded signed 32-bit varint.
pub fn read_var_i32<B: Buf>(buf: &mut B) -> Result<i32> {
    let raw = read_var_u32(buf)?;
    Ok((raw >> 1) as i32 ^ -((raw & 1) as i32))
}

/// Write a zig-zag encoded signed 32-bit varint.
pub fn write_var_i32<B: BufMut>(buf: &mut B, value: i32) -> usize {
    write_var_u32(buf, ((value << 1) ^ (value >> 31)) as u32)
}

/// Read a zig-zag encoded signed 64-bit varint.
pub fn read_var_i64<B: Buf>(buf: &mut B) -> Result<i64> {
    let raw = read_var_u64(buf)?;
    Ok((raw >> 1) as i64 ^ -((raw & 1) as i64))
}

/// Write a zig-zag encoded signed 64-bit varint.
pub fn write_var_i64<B: BufMut>(buf: &mut B, value: i64) -> usize {
    write_var_u64(buf, ((value << 1) ^ (value >> 63)) as u64)
}

/// Number of bytes needed to encode `value` as an unsigned varint.
#[inline]
pub const fn var_u32_len(value: u32) -> usize {
    if value == 0 {
        return 1;
    }
    let bits = 32 - value.leading_zeros() as usize;
    bits.div_ceil(7)
}

//=== Length-prefixed data ===//

fn read_length<B: Buf>(buf: &mut B, what: &'static str, max: usize) -> Result<usize> {
    let len = read_var_u32(buf)? as usize;
    if len > max {
        return Err(ProtocolError::SizeExceeded { what, len, max });
    }
    Ok(len)
}

/// Read a varint-prefixed UTF-8 string of at most `max_len` characters.
///
/// The byte length is checked against `max_len * 4` before the bytes are
/// copied, so a hostile prefix cannot force a large allocation.
pub fn read_string<B: Buf>(buf: &mut B, max_len: usize) -> Result<String> {
    let len = read_length(buf, "string", max_len.saturating_mul(4))?;
    ensure(buf, len, "string")?;

    let bytes = buf.copy_to_bytes(len);
    let text = String::from_utf8(bytes.to_vec())
        .map_err(|e| ProtocolError::InvalidData(format!("Invalid UTF-8: {}", e)))?;

    let chars = text.chars().count();
    if chars > max_len {
        return Err(ProtocolError::SizeExceeded {
            what: "string",
            len: chars,
            max: max_len,
        });
    }

    Ok(text)
}

/// Write a varint-prefixed UTF-8 string.
pub fn write_string<B: BufMut>(buf: &mut B, val: &str) {
    write_byte_array(buf, val.as_bytes());
}

/// Read a varint-prefixed byte array of at most `max_len` bytes.
pub fn read_byte_array<B: Buf>(buf: &mut B, max_len: usize) -> Result<Bytes> {
    let len = read_length(buf, "byte array", max_len)?;
    ensure(buf, len, "byte array")?;
    Ok(buf.copy_to_bytes(len))
}

/// Write a varint-prefixed byte array.
pub fn write_byte_array<B: BufMut>(buf: &mut B, val: &[u8]) {
    write_var_u32(buf, val.len() as u32);
    buf.put_slice(val);
}

/// Read a varint-prefixed collection of at most `max_count` elements.
///
/// # Arguments
/// * `max_count` - Upper bound on the element count claimed by the peer
/// * `read_element` - Reads one element from the buffer
pub fn read_collection<B, T, F>(
    buf: &mut B,
    max_count: usize,
    mut read_element: F,
) -> Result<Vec<T>>
where
    B: Buf,
    F: FnMut(&mut B) -> Result<T>,
{
    let count = read_length(buf, "collection", max_count)?;
    // Every element needs at least one byte, so this caps the reservation
    let mut items = Vec::with_capacity(count.min(buf.remaining()));
    for _ in 0..count {
        items.push(read_element(buf)?);
    }
    Ok(items)
}

/// Write a varint-prefixed collection.
pub fn write_collection<B, T, F>(buf: &mut B, items: &[T], mut write_element: F)
where
    B: BufMut,
    F: FnMut(&mut B, &T),
{
    write_var_u32(buf, items.len() as u32);
    for item in items {
        write_element(buf, item);
    }
}

/// Read a nullable field: a boolean presence byte, then the value if present.
pub fn read_option<B, T, F>(buf: &mut B, read_value: F) -> Result<Option<T>>
where
    B: Buf,
    F: FnOnce(&mut B) -> Result<T>,
{
    if read_bool(buf)? {
        Ok(Some(read_value(buf)?))
    } else {
        Ok(None)
    }
}

/// Write a nullable field.
pub fn write_option<B, T, F>(buf: &mut B, val: Option<&T>, write_value: F)
where
    B: BufMut,
    F: FnOnce(&mut B, &T),
{
    match val {
        Some(v) => {
            write_bool(buf, true);
            write_value(buf, v);
        }
        None => write_bool(buf, false),
    }
}

/// Read a UUID as a 128-bit big-endian integer.
pub fn read_uuid<B: Buf>(buf: &mut B) -> Result<Uuid> {
    ensure(buf, 16, "uuid")?;
    Ok(Uuid::from_u128(buf.get_u128()))
}

/// Write a UUID as a 128-bit big-endian integer.
pub fn write_uuid<B: BufMut>(buf: &mut B, val: &Uuid) {
    buf.put_u128(val.as_u128());
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn test_var_u32_known_values() {
        let test_cases: Vec<(u32, Vec<u8>)> = vec![
            (0, vec![0x00]),
            (1, vec![0x01]),
            (127, vec![0x7f]),
            (128, vec![0x80, 0x01]),
            (300, vec![0xac, 0x02]),
            (25565, vec![0xdd, 0xc7, 0x01]),
            (2_097_151, vec![0xff, 0xff, 0x7f]),
            (u32::MAX, vec![0xff, 0xff, 0xff, 0xff, 0x0f]),
        ];

        for (value, expected) in test_cases {
            let mut buf = BytesMut::new();
            let written = write_var_u32(&mut buf, value);
            assert_eq!(&buf[..], &expected[..], "write failed for {}", value);
            assert_eq!(written, expected.len());
            assert_eq!(var_u32_len(value), expected.len());

            let decoded = read_var_u32(&mut buf.freeze()).unwrap();
            assert_eq!(decoded, value, "read failed for {}", value);
        }
    }

    #[test]
    fn test_var_u32_length_boundaries() {
        assert_eq!(var_u32_len(127), 1);
        assert_eq!(var_u32_len(128), 2);
        assert_eq!(var_u32_len(16_383), 2);
        assert_eq!(var_u32_len(16_384), 3);
        assert_eq!(var_u32_len(2_097_151), 3);
        assert_eq!(var_u32_len(2_097_152), 4);
    }

    #[test]
    fn test_var_u32_too_long() {
        let mut buf = Bytes::from_static(&[0x80, 0x80, 0x80, 0x80, 0x80, 0x01]);
        let result = read_var_u32(&mut buf);
        assert!(matches!(result, Err(ProtocolError::SizeExceeded { what: "varint", .. })));
    }

    #[test]
    fn test_var_u32_truncated() {
        let mut buf = Bytes::from_static(&[0x80, 0x80]);
        let result = read_var_u32(&mut buf);
        assert!(matches!(result, Err(ProtocolError::Truncated { .. })));
    }

    #[test]
    fn test_var_u64_extremes() {
        for value in [0u64, 1, 128, u64::from(u32::MAX) + 1, u64::MAX] {
            let mut buf = BytesMut::new();
            write_var_u64(&mut buf, value);
            assert!(buf.len() <= MAX_VAR_U64_LEN);
            assert_eq!(read_var_u64(&mut buf.freeze()).unwrap(), value);
        }

        let mut overlong = Bytes::from(vec![0xff; 11]);
        assert!(matches!(
            read_var_u64(&mut overlong),
            Err(ProtocolError::SizeExceeded { what: "varlong", .. })
        ));
    }

    #[test]
    fn test_zigzag_mapping() {
        // -1 maps to 1, 1 maps to 2, so small magnitudes stay one byte
        let mut buf = BytesMut::new();
        write_var_i32(&mut buf, -1);
        write_var_i32(&mut buf, 1);
        write_var_i32(&mut buf, i32::MIN);
        assert_eq!(&buf[..2], &[0x01, 0x02]);

        let mut buf = buf.freeze();
        assert_eq!(read_var_i32(&mut buf).unwrap(), -1);
        assert_eq!(read_var_i32(&mut buf).unwrap(), 1);
        assert_eq!(read_var_i32(&mut buf).unwrap(), i32::MIN);

        let mut buf = BytesMut::new();
        write_var_i64(&mut buf, i64::MIN);
        write_var_i64(&mut buf, -300);
        let mut buf = buf.freeze();
        assert_eq!(read_var_i64(&mut buf).unwrap(), i64::MIN);
        assert_eq!(read_var_i64(&mut buf).unwrap(), -300);
    }

    #[test]
    fn test_string_limits() {
        let mut buf = BytesMut::new();
        write_string(&mut buf, "Notch");
        assert_eq!(read_string(&mut buf.clone().freeze(), 16).unwrap(), "Notch");
        assert!(matches!(
            read_string(&mut buf.freeze(), 4),
            Err(ProtocolError::SizeExceeded { what: "string", len: 5, max: 4 })
        ));

        // A prefix claiming a huge length is rejected before any copy
        let mut buf = BytesMut::new();
        write_var_u32(&mut buf, 10_000);
        assert!(matches!(
            read_string(&mut buf.freeze(), 16),
            Err(ProtocolError::SizeExceeded { .. })
        ));
    }

    #[test]
    fn test_string_multibyte_counts_chars() {
        let mut buf = BytesMut::new();
        write_string(&mut buf, "§§§§");
        assert_eq!(read_string(&mut buf.freeze(), 4).unwrap(), "§§§§");
    }

    #[test]
    fn test_string_invalid_utf8() {
        let mut buf = BytesMut::new();
        write_byte_array(&mut buf, &[0xff, 0xfe]);
        assert!(matches!(
            read_string(&mut buf.freeze(), 16),
            Err(ProtocolError::InvalidData(_))
        ));
    }

    #[test]
    fn test_byte_array_bounds() {
        let mut buf = BytesMut::new();
        write_byte_array(&mut buf, &[1, 2, 3, 4]);
        let bytes = read_byte_array(&mut buf.clone().freeze(), 4).unwrap();
        assert_eq!(&bytes[..], &[1, 2, 3, 4]);
        assert!(read_byte_array(&mut buf.freeze(), 3).is_err());

        // Claimed length larger than what arrived
        let mut short = Bytes::from_static(&[0x05, 0x01]);
        assert!(matches!(
            read_byte_array(&mut short, 16),
            Err(ProtocolError::Truncated { .. })
        ));
    }

    #[test]
    fn test_collection_count_limit() {
        let mut buf = BytesMut::new();
        write_collection(&mut buf, &[10u32, 20, 30], |b, v| {
            write_var_u32(b, *v);
        });

        let items = read_collection(&mut buf.clone().freeze(), 3, |b| read_var_u32(b)).unwrap();
        assert_eq!(items, vec![10, 20, 30]);

        let result = read_collection(&mut buf.freeze(), 2, |b| read_var_u32(b));
        assert!(matches!(
            result,
            Err(ProtocolError::SizeExceeded { what: "collection", len: 3, max: 2 })
        ));
    }

    #[test]
    fn test_collection_huge_count_does_not_allocate() {
        let mut buf = BytesMut::new();
        write_var_u32(&mut buf, 1_000_000);
        buf.put_u8(0x01);
        let result = read_collection(&mut buf.freeze(), usize::MAX, |b| read_u8(b));
        assert!(matches!(result, Err(ProtocolError::Truncated { .. })));
    }

    #[test]
    fn test_option_and_uuid() {
        let id = Uuid::from_u128(0x0123_4567_89ab_cdef_0123_4567_89ab_cdef);
        let mut buf = BytesMut::new();
        write_option(&mut buf, Some(&id), |b, v| write_uuid(b, v));
        write_option::<_, Uuid, _>(&mut buf, None, |b, v| write_uuid(b, v));
        assert_eq!(buf.len(), 1 + 16 + 1);

        let mut buf = buf.freeze();
        assert_eq!(read_option(&mut buf, |b| read_uuid(b)).unwrap(), Some(id));
        assert_eq!(read_option(&mut buf, |b| read_uuid(b)).unwrap(), None);
        assert!(!buf.has_remaining());
    }

    #[test]
    fn test_fixed_width_underflow() {
        let mut buf = Bytes::from_static(&[0x00, 0x01, 0x02]);
        assert!(matches!(
            read_i32(&mut buf),
            Err(ProtocolError::Truncated { what: "i32", needed: 4, remaining: 3 })
        ));
        assert_eq!(read_u16(&mut buf).unwrap(), 1);
        assert!(read_bool(&mut buf).unwrap());
        assert!(read_u8(&mut buf).is_err());
    }
}
