//! Log record format used by [`crate::FileBackend`].
//!
//! Each committed batch is written as one record:
//!
//! ```text
//! | magic "DSLG" (4) | type (1) | payload_len u32 LE (4) | payload | crc32 u32 LE (4) |
//! ```
//!
//! The checksum covers the type byte, the length and the payload. A batch
//! payload is an op count followed by the ops:
//!
//! ```text
//! put:    | 1 | table (1) | key_len u32 | key | value_len u32 | value |
//! delete: | 2 | table (1) | key_len u32 | key |
//! ```

use crate::error::{StorageError, StorageResult};
use crate::table::{BatchOp, Table, WriteBatch};

/// Magic bytes identifying a log record.
pub const LOG_MAGIC: [u8; 4] = *b"DSLG";

/// Size of the fixed record header (magic, type, length).
pub const HEADER_SIZE: usize = 9;

/// Size of the trailing checksum.
pub const TRAILER_SIZE: usize = 4;

/// Type byte of a batch record.
const RECORD_BATCH: u8 = 1;

const OP_PUT: u8 = 1;
const OP_DELETE: u8 = 2;

/// Outcome of reading one record from a byte buffer.
#[derive(Debug, PartialEq, Eq)]
pub enum ReadOutcome {
    /// A complete, valid record and the number of bytes it occupied.
    Record(WriteBatch, usize),
    /// The buffer ends inside a record.
    Truncated,
    /// The record is complete but invalid.
    Invalid(String),
}

/// Serializes a batch into a framed log record.
///
/// # Errors
///
/// Returns an error if a key, value or the payload exceeds `u32::MAX` bytes.
pub fn encode_batch(batch: &WriteBatch) -> StorageResult<Vec<u8>> {
    let too_large = || StorageError::Io(std::io::Error::new(
        std::io::ErrorKind::InvalidInput,
        "batch component exceeds 4 GiB",
    ));
    let len32 = |n: usize| u32::try_from(n).map_err(|_| too_large());

    let mut payload = Vec::new();
    payload.extend_from_slice(&len32(batch.len())?.to_le_bytes());
    for op in batch.ops() {
        match op {
            BatchOp::Put { table, key, value } => {
                payload.push(OP_PUT);
                payload.push(table.as_byte());
                payload.extend_from_slice(&len32(key.len())?.to_le_bytes());
                payload.extend_from_slice(key);
                payload.extend_from_slice(&len32(value.len())?.to_le_bytes());
                payload.extend_from_slice(value);
            }
            BatchOp::Delete { table, key } => {
                payload.push(OP_DELETE);
                payload.push(table.as_byte());
                payload.extend_from_slice(&len32(key.len())?.to_le_bytes());
                payload.extend_from_slice(key);
            }
        }
    }

    let mut record = Vec::with_capacity(HEADER_SIZE + payload.len() + TRAILER_SIZE);
    record.extend_from_slice(&LOG_MAGIC);
    record.push(RECORD_BATCH);
    record.extend_from_slice(&len32(payload.len())?.to_le_bytes());
    record.extend_from_slice(&payload);
    let crc = compute_crc32(&record[LOG_MAGIC.len()..]);
    record.extend_from_slice(&crc.to_le_bytes());
    Ok(record)
}

/// Reads the record at the start of `data`.
#[must_use]
pub fn read_record(data: &[u8]) -> ReadOutcome {
    if data.len() < HEADER_SIZE {
        return ReadOutcome::Truncated;
    }
    if data[..4] != LOG_MAGIC {
        return ReadOutcome::Invalid("bad magic".into());
    }
    if data[4] != RECORD_BATCH {
        return ReadOutcome::Invalid(format!("unknown record type {}", data[4]));
    }
    let payload_len = u32::from_le_bytes([data[5], data[6], data[7], data[8]]) as usize;
    let total = HEADER_SIZE + payload_len + TRAILER_SIZE;
    if data.len() < total {
        return ReadOutcome::Truncated;
    }

    let body_end = HEADER_SIZE + payload_len;
    let stored = u32::from_le_bytes([
        data[body_end],
        data[body_end + 1],
        data[body_end + 2],
        data[body_end + 3],
    ]);
    let actual = compute_crc32(&data[4..body_end]);
    if stored != actual {
        return ReadOutcome::Invalid(format!(
            "checksum mismatch: expected {stored:08x}, got {actual:08x}"
        ));
    }

    match decode_payload(&data[HEADER_SIZE..body_end]) {
        Ok(batch) => ReadOutcome::Record(batch, total),
        Err(message) => ReadOutcome::Invalid(message),
    }
}

fn decode_payload(payload: &[u8]) -> Result<WriteBatch, String> {
    let mut cursor = 0;

    let read_u8 = |cursor: &mut usize| -> Result<u8, String> {
        let b = *payload.get(*cursor).ok_or("unexpected end of payload")?;
        *cursor += 1;
        Ok(b)
    };
    let read_u32 = |cursor: &mut usize| -> Result<u32, String> {
        let bytes: [u8; 4] = payload
            .get(*cursor..*cursor + 4)
            .and_then(|s| s.try_into().ok())
            .ok_or("unexpected end of payload")?;
        *cursor += 4;
        Ok(u32::from_le_bytes(bytes))
    };
    let read_bytes = |cursor: &mut usize, len: usize| -> Result<Vec<u8>, String> {
        let bytes = payload
            .get(*cursor..*cursor + len)
            .ok_or("unexpected end of payload")?
            .to_vec();
        *cursor += len;
        Ok(bytes)
    };

    let count = read_u32(&mut cursor)?;
    let mut batch = WriteBatch::new();
    for _ in 0..count {
        let kind = read_u8(&mut cursor)?;
        let table_byte = read_u8(&mut cursor)?;
        let table =
            Table::from_byte(table_byte).ok_or_else(|| format!("unknown table {table_byte}"))?;
        let key_len = read_u32(&mut cursor)? as usize;
        let key = read_bytes(&mut cursor, key_len)?;
        match kind {
            OP_PUT => {
                let value_len = read_u32(&mut cursor)? as usize;
                let value = read_bytes(&mut cursor, value_len)?;
                batch.put(table, key, value);
            }
            OP_DELETE => batch.delete(table, key),
            other => return Err(format!("unknown op {other}")),
        }
    }
    if cursor != payload.len() {
        return Err(format!(
            "trailing bytes in batch: expected {} bytes, got {}",
            cursor,
            payload.len()
        ));
    }
    Ok(batch)
}

/// Reflected CRC-32 lookup table for the IEEE polynomial.
static CRC_TABLE: [u32; 256] = crc_table(0xEDB8_8320);

const fn crc_table(poly: u32) -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut n = 0;
    while n < table.len() {
        let mut value = n as u32;
        let mut bit = 0;
        while bit < 8 {
            let carry = value & 1;
            value >>= 1;
            if carry == 1 {
                value ^= poly;
            }
            bit += 1;
        }
        table[n] = value;
        n += 1;
    }
    table
}

/// Returns the CRC-32 (IEEE) of `data`, as stored in a record trailer.
#[must_use]
pub fn compute_crc32(data: &[u8]) -> u32 {
    !data.iter().fold(u32::MAX, |crc, &byte| {
        CRC_TABLE[usize::from(crc as u8 ^ byte)] ^ (crc >> 8)
    })
}
