//! Orphan placeholder cleanup at open.
//!
//! A transaction that reserved a block and then vanished before using it
//! up leaves a placeholder at the block's last ID. The header names the
//! last ID of the oldest block that may still have one; every later block
//! ends a whole number of block sizes after it.

use super::header;
use super::keys::{is_placeholder, raw_oid_key};
use crate::error::StoreResult;
use darkstore_storage::{BackendTransaction, Table};
use std::ops::Bound;
use tracing::debug;

/// Deletes orphan placeholders and clears the header's first placeholder
/// field. Returns the number of placeholders deleted.
pub(crate) fn remove_orphan_placeholders(txn: &mut BackendTransaction, block_size: u64) -> StoreResult<u64> {
    let Some(start) = header::first_placeholder(txn)? else {
        return Ok(0);
    };
    let mut candidate = start;
    let mut removed = 0;
    loop {
        let key = raw_oid_key(candidate);
        let Some((found, value)) = txn.next_entry(Table::Oids, Bound::Included(&key[..]))? else {
            break;
        };
        if found == key && is_placeholder(&value) {
            txn.delete(Table::Oids, &key);
            removed += 1;
        }
        match candidate.checked_add(block_size) {
            Some(next) => candidate = next,
            None => break,
        }
    }
    header::set_first_placeholder(txn, None);
    debug!(start, removed, "removed orphan placeholders");
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::keys::placeholder_value;
    use darkstore_storage::{InMemoryBackend, StorageBackend};
    use std::sync::Arc;

    fn setup(first: Option<u64>, records: &[(u64, &[u8])]) -> BackendTransaction {
        let backend: Arc<dyn StorageBackend> = Arc::new(InMemoryBackend::new());
        let mut txn = BackendTransaction::begin(backend);
        header::load_or_init(&mut txn, 10).unwrap();
        header::set_first_placeholder(&mut txn, first);
        for (oid, value) in records {
            txn.put(Table::Oids, &raw_oid_key(*oid), value);
        }
        txn
    }

    #[test]
    fn nothing_to_do_without_marker() {
        let p = placeholder_value();
        let mut txn = setup(None, &[(10, &p[..])]);
        assert_eq!(remove_orphan_placeholders(&mut txn, 10).unwrap(), 0);
        assert!(txn.get(Table::Oids, &raw_oid_key(10)).unwrap().is_some());
    }

    #[test]
    fn steps_through_later_blocks() {
        let p = placeholder_value();
        let mut txn = setup(
            Some(10),
            &[
                (3, &b"data"[..]),
                (10, &p[..]),
                (20, &b"live"[..]),
                (25, &b"x"[..]),
                (30, &p[..]),
                (40, &p[..]),
            ],
        );
        assert_eq!(remove_orphan_placeholders(&mut txn, 10).unwrap(), 3);
        for oid in [10, 30, 40] {
            assert!(txn.get(Table::Oids, &raw_oid_key(oid)).unwrap().is_none());
        }
        for oid in [3, 20, 25] {
            assert!(txn.get(Table::Oids, &raw_oid_key(oid)).unwrap().is_some());
        }
        assert_eq!(header::first_placeholder(&txn).unwrap(), None);
    }

    #[test]
    fn stops_after_last_object() {
        let p = placeholder_value();
        let mut txn = setup(Some(10), &[(10, &p[..])]);
        assert_eq!(remove_orphan_placeholders(&mut txn, 10).unwrap(), 1);
    }
}
