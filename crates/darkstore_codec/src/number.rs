//! Fixed-width integer encoding.
//!
//! Integers are encoded big-endian with the sign bit flipped, so that the
//! unsigned byte-lexicographic order of the encodings equals the numeric
//! order of the values:
//!
//! ```text
//! i64::MIN -> 00 00 00 00 00 00 00 00
//!       -1 -> 7f ff ff ff ff ff ff ff
//!        0 -> 80 00 00 00 00 00 00 00
//! i64::MAX -> ff ff ff ff ff ff ff ff
//! ```

use crate::error::{CodecError, CodecResult};

/// Encoded size of a long.
pub const LONG_SIZE: usize = 8;
/// Encoded size of an int.
pub const INT_SIZE: usize = 4;
/// Encoded size of a short.
pub const SHORT_SIZE: usize = 2;

/// Encodes a 64-bit signed integer.
#[must_use]
pub fn encode_long(value: i64) -> [u8; LONG_SIZE] {
    ((value as u64) ^ (1 << 63)).to_be_bytes()
}

/// Decodes a 64-bit signed integer.
///
/// # Errors
///
/// Returns [`CodecError::WrongLength`] unless `bytes` is exactly 8 bytes.
pub fn decode_long(bytes: &[u8]) -> CodecResult<i64> {
    let raw: [u8; LONG_SIZE] = bytes.try_into().map_err(|_| CodecError::WrongLength {
        expected: LONG_SIZE,
        actual: bytes.len(),
    })?;
    Ok((u64::from_be_bytes(raw) ^ (1 << 63)) as i64)
}

/// Encodes a 32-bit signed integer.
#[must_use]
pub fn encode_int(value: i32) -> [u8; INT_SIZE] {
    ((value as u32) ^ (1 << 31)).to_be_bytes()
}

/// Decodes a 32-bit signed integer.
///
/// # Errors
///
/// Returns [`CodecError::WrongLength`] unless `bytes` is exactly 4 bytes.
pub fn decode_int(bytes: &[u8]) -> CodecResult<i32> {
    let raw: [u8; INT_SIZE] = bytes.try_into().map_err(|_| CodecError::WrongLength {
        expected: INT_SIZE,
        actual: bytes.len(),
    })?;
    Ok((u32::from_be_bytes(raw) ^ (1 << 31)) as i32)
}

/// Encodes a 16-bit signed integer.
#[must_use]
pub fn encode_short(value: i16) -> [u8; SHORT_SIZE] {
    ((value as u16) ^ (1 << 15)).to_be_bytes()
}

/// Decodes a 16-bit signed integer.
///
/// # Errors
///
/// Returns [`CodecError::WrongLength`] unless `bytes` is exactly 2 bytes.
pub fn decode_short(bytes: &[u8]) -> CodecResult<i16> {
    let raw: [u8; SHORT_SIZE] = bytes.try_into().map_err(|_| CodecError::WrongLength {
        expected: SHORT_SIZE,
        actual: bytes.len(),
    })?;
    Ok((u16::from_be_bytes(raw) ^ (1 << 15)) as i16)
}
