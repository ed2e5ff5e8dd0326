//! Record keys and value framing.
//!
//! | Table     | Key                          | Value                 |
//! |-----------|------------------------------|-----------------------|
//! | `Info`    | `encode_long(field)`         | field value           |
//! | `Oids`    | `encode_long(oid)`           | framed object bytes   |
//! | `Names`   | `encode_string(name)`        | `encode_long(oid)`    |
//! | `Classes` | `[1] ++ sha256(blob)`        | `encode_int(id)`      |
//! | `Classes` | `[2] ++ encode_int(id)`      | blob                  |
//!
//! Object values whose first byte is [`PLACEHOLDER`] are placeholders.
//! Application values starting with [`PLACEHOLDER`] or [`QUOTE`] are stored
//! with an extra [`QUOTE`] byte in front.

use crate::error::{StoreError, StoreResult};
use crate::types::{ClassId, ObjectId};
use darkstore_codec::{decode_int, decode_long, decode_string, encode_int, encode_long, encode_string};
use sha2::{Digest, Sha256};

/// First byte of a placeholder record.
pub(crate) const PLACEHOLDER: u8 = 3;

/// Prefix added to values that would otherwise look framed.
pub(crate) const QUOTE: u8 = 4;

/// Class table key prefix for hash to id entries.
pub(crate) const CLASS_HASH_PREFIX: u8 = 1;

/// Class table key prefix for id to blob entries.
pub(crate) const CLASS_INFO_PREFIX: u8 = 2;

pub(crate) fn placeholder_value() -> [u8; 1] {
    [PLACEHOLDER]
}

pub(crate) fn is_placeholder(value: &[u8]) -> bool {
    value.first() == Some(&PLACEHOLDER)
}

pub(crate) fn encode_value(data: &[u8]) -> Vec<u8> {
    match data.first() {
        Some(&(PLACEHOLDER | QUOTE)) => {
            let mut framed = Vec::with_capacity(data.len() + 1);
            framed.push(QUOTE);
            framed.extend_from_slice(data);
            framed
        }
        _ => data.to_vec(),
    }
}

pub(crate) fn decode_value(mut stored: Vec<u8>) -> Vec<u8> {
    if stored.first() == Some(&QUOTE) {
        stored.remove(0);
    }
    stored
}

pub(crate) fn oid_key(oid: ObjectId) -> [u8; 8] {
    encode_long(oid.as_i64())
}

pub(crate) fn raw_oid_key(oid: u64) -> [u8; 8] {
    encode_long(oid as i64)
}

pub(crate) fn decode_oid(bytes: &[u8]) -> StoreResult<ObjectId> {
    let raw = decode_long(bytes)?;
    ObjectId::from_i64(raw).map_err(|_| StoreError::invalid_format(format!("stored object id {raw} is negative")))
}

pub(crate) fn name_key(name: &str) -> StoreResult<Vec<u8>> {
    encode_string(name).map_err(|e| StoreError::invalid_argument(format!("name rejected: {e}")))
}

pub(crate) fn decode_name(key: &[u8]) -> StoreResult<String> {
    Ok(decode_string(key)?)
}

pub(crate) fn class_hash_key(blob: &[u8]) -> Vec<u8> {
    let digest = Sha256::digest(blob);
    let mut key = Vec::with_capacity(1 + digest.len());
    key.push(CLASS_HASH_PREFIX);
    key.extend_from_slice(&digest);
    key
}

pub(crate) fn class_info_key(id: ClassId) -> [u8; 5] {
    let mut key = [CLASS_INFO_PREFIX; 5];
    key[1..].copy_from_slice(&encode_int(id.as_u32() as i32));
    key
}

pub(crate) fn encode_class_id(id: ClassId) -> [u8; 4] {
    encode_int(id.as_u32() as i32)
}

pub(crate) fn decode_class_id(bytes: &[u8]) -> StoreResult<ClassId> {
    let raw = decode_int(bytes)?;
    u32::try_from(raw)
        .map(ClassId::new)
        .map_err(|_| StoreError::invalid_format(format!("stored class id {raw} is negative")))
}
