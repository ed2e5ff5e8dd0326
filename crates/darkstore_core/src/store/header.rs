//! Store header kept in the `Info` table.

use crate::error::{StoreError, StoreResult};
use darkstore_codec::{decode_int, decode_long, encode_int, encode_long};
use darkstore_storage::{BackendTransaction, Table};
use tracing::{debug, warn};

/// Identifies a darkstore header.
pub(crate) const MAGIC: i64 = 0x4461_526b_5374_4172;

/// Header layout version understood by this build.
pub(crate) const MAJOR_VERSION: i32 = 1;
pub(crate) const MINOR_VERSION: i32 = 0;

/// Object ID handed out first in a fresh store.
pub(crate) const INITIAL_NEXT_OID: u64 = 1;

#[derive(Debug, Clone, Copy)]
#[repr(i64)]
pub(crate) enum Field {
    Magic = 0,
    MajorVersion = 1,
    MinorVersion = 2,
    NextObjectId = 3,
    FirstPlaceholder = 5,
    BlockSize = 7,
}

impl Field {
    fn key(self) -> [u8; 8] {
        encode_long(self as i64)
    }
}

fn get_long(txn: &BackendTransaction, field: Field) -> StoreResult<Option<i64>> {
    txn.get(Table::Info, &field.key())?
        .map(|v| decode_long(&v))
        .transpose()
        .map_err(Into::into)
}

fn require_long(txn: &BackendTransaction, field: Field) -> StoreResult<i64> {
    get_long(txn, field)?
        .ok_or_else(|| StoreError::invalid_format(format!("header field {field:?} is missing")))
}

fn put_long(txn: &mut BackendTransaction, field: Field, value: i64) {
    txn.put(Table::Info, &field.key(), &encode_long(value));
}

fn get_int(txn: &BackendTransaction, field: Field) -> StoreResult<i32> {
    let value = txn
        .get(Table::Info, &field.key())?
        .ok_or_else(|| StoreError::invalid_format(format!("header field {field:?} is missing")))?;
    Ok(decode_int(&value)?)
}

fn non_negative(field: Field, value: i64) -> StoreResult<u64> {
    u64::try_from(value)
        .map_err(|_| StoreError::invalid_format(format!("header field {field:?} is negative: {value}")))
}

/// Reads the header, writing a fresh one if the store is empty. Returns
/// the allocation block size in force.
pub(crate) fn load_or_init(txn: &mut BackendTransaction, block_size: u64) -> StoreResult<u64> {
    let Some(magic) = get_long(txn, Field::Magic)? else {
        debug!(block_size, "writing new store header");
        put_long(txn, Field::Magic, MAGIC);
        txn.put(Table::Info, &Field::MajorVersion.key(), &encode_int(MAJOR_VERSION));
        txn.put(Table::Info, &Field::MinorVersion.key(), &encode_int(MINOR_VERSION));
        put_long(txn, Field::NextObjectId, INITIAL_NEXT_OID as i64);
        put_long(txn, Field::BlockSize, block_size as i64);
        return Ok(block_size);
    };

    if magic != MAGIC {
        return Err(StoreError::invalid_format(format!(
            "bad header magic {magic:#x}"
        )));
    }
    let major = get_int(txn, Field::MajorVersion)?;
    let minor = get_int(txn, Field::MinorVersion)?;
    if major != MAJOR_VERSION {
        return Err(StoreError::invalid_format(format!(
            "unsupported store version {major}.{minor}"
        )));
    }
    non_negative(Field::NextObjectId, require_long(txn, Field::NextObjectId)?)?;

    let stored = non_negative(Field::BlockSize, require_long(txn, Field::BlockSize)?)?;
    if stored == 0 {
        return Err(StoreError::invalid_format("stored block size is 0"));
    }
    if stored != block_size {
        warn!(
            configured = block_size,
            stored, "keeping the allocation block size the store was created with"
        );
    }
    debug!(major, minor, block_size = stored, "loaded store header");
    Ok(stored)
}

pub(crate) fn next_object_id(txn: &BackendTransaction) -> StoreResult<u64> {
    non_negative(Field::NextObjectId, require_long(txn, Field::NextObjectId)?)
}

pub(crate) fn set_next_object_id(txn: &mut BackendTransaction, next: u64) {
    put_long(txn, Field::NextObjectId, next as i64);
}

pub(crate) fn first_placeholder(txn: &BackendTransaction) -> StoreResult<Option<u64>> {
    get_long(txn, Field::FirstPlaceholder)?
        .map(|v| non_negative(Field::FirstPlaceholder, v))
        .transpose()
}

pub(crate) fn set_first_placeholder(txn: &mut BackendTransaction, oid: Option<u64>) {
    match oid {
        Some(oid) => put_long(txn, Field::FirstPlaceholder, oid as i64),
        None => txn.delete(Table::Info, &Field::FirstPlaceholder.key()),
    }
}
