//! String encoding.
//!
//! Strings are encoded as modified UTF-8 followed by a single `0` terminator:
//!
//! - the NUL character is written as the two bytes `C0 80`
//! - characters outside the Basic Multilingual Plane are written as two
//!   three-byte surrogate encodings
//!
//! The encoded form therefore never contains a `0` byte before the
//! terminator, and a string that is a prefix of another sorts first.

use crate::error::{CodecError, CodecResult};

/// Maximum encoded length of a string, excluding the terminator.
pub const MAX_STRING_LENGTH: usize = 65535;

/// Returns the number of bytes the modified UTF-8 form of `s` occupies,
/// excluding the terminator.
#[must_use]
pub fn encoded_string_len(s: &str) -> usize {
    s.encode_utf16().map(unit_len).sum()
}

fn unit_len(unit: u16) -> usize {
    match unit {
        0x0001..=0x007f => 1,
        0x0000 | 0x0080..=0x07ff => 2,
        _ => 3,
    }
}

/// Encodes a string.
///
/// # Errors
///
/// Returns [`CodecError::StringTooLong`] if the encoded form would exceed
/// [`MAX_STRING_LENGTH`] bytes.
pub fn encode_string(s: &str) -> CodecResult<Vec<u8>> {
    let len = encoded_string_len(s);
    if len > MAX_STRING_LENGTH {
        return Err(CodecError::StringTooLong {
            len,
            max: MAX_STRING_LENGTH,
        });
    }
    let mut buf = Vec::with_capacity(len + 1);
    for unit in s.encode_utf16() {
        match unit_len(unit) {
            1 => buf.push(unit as u8),
            2 => {
                buf.push(0xc0 | ((unit >> 6) & 0x1f) as u8);
                buf.push(0x80 | (unit & 0x3f) as u8);
            }
            _ => {
                buf.push(0xe0 | ((unit >> 12) & 0x0f) as u8);
                buf.push(0x80 | ((unit >> 6) & 0x3f) as u8);
                buf.push(0x80 | (unit & 0x3f) as u8);
            }
        }
    }
    buf.push(0);
    Ok(buf)
}

/// Decodes a string produced by [`encode_string`].
///
/// The input must be exactly one encoded string including its terminator.
///
/// # Errors
///
/// Returns [`CodecError::MalformedString`] if the terminator is missing,
/// a byte sequence is invalid, or the surrogates do not pair up.
pub fn decode_string(bytes: &[u8]) -> CodecResult<String> {
    let Some((&0, body)) = bytes.split_last() else {
        return Err(CodecError::malformed_string("missing terminator"));
    };
    if body.len() > MAX_STRING_LENGTH {
        return Err(CodecError::StringTooLong {
            len: body.len(),
            max: MAX_STRING_LENGTH,
        });
    }

    let continuation = |index: usize| -> CodecResult<u16> {
        match body.get(index) {
            Some(&b) if b & 0xc0 == 0x80 => Ok(u16::from(b & 0x3f)),
            Some(_) => Err(CodecError::malformed_string(format!(
                "bad continuation byte at offset {index}"
            ))),
            None => Err(CodecError::malformed_string("truncated sequence")),
        }
    };

    let mut units = Vec::with_capacity(body.len());
    let mut i = 0;
    while i < body.len() {
        let b = body[i];
        match b {
            0 => {
                return Err(CodecError::malformed_string(format!(
                    "embedded terminator at offset {i}"
                )))
            }
            0x01..=0x7f => {
                units.push(u16::from(b));
                i += 1;
            }
            _ if b & 0xe0 == 0xc0 => {
                units.push((u16::from(b & 0x1f) << 6) | continuation(i + 1)?);
                i += 2;
            }
            _ if b & 0xf0 == 0xe0 => {
                units.push(
                    (u16::from(b & 0x0f) << 12) | (continuation(i + 1)? << 6) | continuation(i + 2)?,
                );
                i += 3;
            }
            _ => {
                return Err(CodecError::malformed_string(format!(
                    "invalid lead byte {b:#04x} at offset {i}"
                )))
            }
        }
    }

    String::from_utf16(&units).map_err(|_| CodecError::malformed_string("unpaired surrogate"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn ascii_is_terminated() {
        assert_eq!(encode_string("ab").unwrap(), vec![b'a', b'b', 0]);
        assert_eq!(encode_string("").unwrap(), vec![0]);
    }

    #[test]
    fn nul_uses_two_bytes() {
        assert_eq!(encode_string("a\0").unwrap(), vec![b'a', 0xc0, 0x80, 0]);
        assert_eq!(decode_string(&[b'a', 0xc0, 0x80, 0]).unwrap(), "a\0");
    }

    #[test]
    fn supplementary_characters_use_surrogates() {
        let encoded = encode_string("\u{1f600}").unwrap();
        assert_eq!(encoded.len(), 7);
        assert_eq!(encoded[0], 0xed);
        assert_eq!(decode_string(&encoded).unwrap(), "\u{1f600}");
    }

    #[test]
    fn prefix_sorts_first() {
        let a = encode_string("a").unwrap();
        let ab = encode_string("ab").unwrap();
        assert!(a < ab);
    }

    #[test]
    fn length_limit() {
        let max = "x".repeat(MAX_STRING_LENGTH);
        assert_eq!(encode_string(&max).unwrap().len(), MAX_STRING_LENGTH + 1);

        let over = "x".repeat(MAX_STRING_LENGTH + 1);
        assert!(matches!(
            encode_string(&over),
            Err(CodecError::StringTooLong { len, .. }) if len == MAX_STRING_LENGTH + 1
        ));

        // Three-byte characters count by encoded length, not by char count.
        let wide = "\u{4e00}".repeat(MAX_STRING_LENGTH / 3 + 1);
        assert!(encode_string(&wide).is_err());
    }

    #[test]
    fn decode_rejects_malformed_input() {
        assert!(decode_string(&[]).is_err());
        assert!(decode_string(b"abc").is_err());
        assert!(decode_string(&[b'a', 0, b'b', 0]).is_err());
        assert!(decode_string(&[0xc3, 0]).is_err());
        assert!(decode_string(&[0xf0, 0x80, 0x80, 0x80, 0]).is_err());
        // Lone high surrogate.
        assert!(decode_string(&[0xed, 0xa0, 0x80, 0]).is_err());
    }

    proptest! {
        #[test]
        fn decode_inverts_encode(s in "\\PC{0,40}") {
            let encoded = encode_string(&s).unwrap();
            prop_assert_eq!(decode_string(&encoded).unwrap(), s);
        }

        #[test]
        fn bmp_order_matches_byte_order(
            a in "[a-z\u{e9}\u{3b1}-\u{3c9}\u{4e00}-\u{4e10}]{0,12}",
            b in "[a-z\u{e9}\u{3b1}-\u{3c9}\u{4e00}-\u{4e10}]{0,12}",
        ) {
            let ea = encode_string(&a).unwrap();
            let eb = encode_string(&b).unwrap();
            prop_assert_eq!(a.cmp(&b), ea.cmp(&eb));
        }
    }
}
