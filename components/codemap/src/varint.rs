//! Variable-length integer encoding for merge-point payloads
//!
//! Unsigned values use 7 bits per byte with the high bit as a continuation
//! flag. Signed values are zigzag-mapped first so small negative numbers stay
//! short. Decoding works on borrowed slices and never allocates.

/// Longest encoding of a `u64` (ceil(64 / 7)).
pub const MAX_VARINT_LEN: usize = 10;

/// Append an unsigned varint to `buf`.
pub fn encode_u64(buf: &mut Vec<u8>, mut n: u64) {
    while n >= 0x80 {
        buf.push((n as u8) | 0x80);
        n >>= 7;
    }
    buf.push(n as u8);
}

/// Decode an unsigned varint, returning `(value, bytes_consumed)`.
///
/// Returns `None` for truncated input or an encoding that does not fit in
/// 64 bits.
pub fn decode_u64(bytes: &[u8]) -> Option<(u64, usize)> {
    let mut result: u64 = 0;
    let mut shift = 0u32;

    for (i, &byte) in bytes.iter().take(MAX_VARINT_LEN).enumerate() {
        let chunk = (byte & 0x7F) as u64;
        if shift == 63 && chunk > 1 {
            return None;
        }
        result |= chunk << shift;
        if byte & 0x80 == 0 {
            return Some((result, i + 1));
        }
        shift += 7;
    }
    None
}

/// Append a zigzag-encoded signed varint to `buf`.
pub fn encode_i64(buf: &mut Vec<u8>, n: i64) {
    encode_u64(buf, zigzag(n));
}

/// Decode a zigzag-encoded signed varint.
pub fn decode_i64(bytes: &[u8]) -> Option<(i64, usize)> {
    decode_u64(bytes).map(|(raw, used)| (unzigzag(raw), used))
}

#[inline]
fn zigzag(n: i64) -> u64 {
    ((n << 1) ^ (n >> 63)) as u64
}

#[inline]
fn unzigzag(n: u64) -> i64 {
    ((n >> 1) as i64) ^ -((n & 1) as i64)
}
