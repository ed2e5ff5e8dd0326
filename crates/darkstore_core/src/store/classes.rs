//! Class descriptor interning.
//!
//! IDs are assigned in their own committed backend transaction so that a
//! descriptor keeps its ID even if the transaction that first saw it
//! aborts, and concurrent first sightings agree.

use super::keys::{class_hash_key, class_info_key, decode_class_id, encode_class_id, CLASS_INFO_PREFIX};
use super::DataStore;
use crate::error::{StoreError, StoreResult};
use crate::transaction::Transaction;
use crate::types::ClassId;
use darkstore_codec::decode_int;
use darkstore_storage::{BackendTransaction, Table};
use std::ops::Bound;
use tracing::debug;

impl DataStore {
    /// Returns the ID for a class descriptor, assigning the next free one
    /// the first time `blob` is seen.
    ///
    /// # Errors
    ///
    /// Returns a transaction state or backend error.
    pub fn get_class_id(&self, txn: &Transaction, blob: &[u8]) -> StoreResult<ClassId> {
        self.txn_info(txn)?;
        let hash_key = class_hash_key(blob);
        if let Some(id) = self.backend.get(Table::Classes, &hash_key)? {
            return decode_class_id(&id);
        }

        let _guard = self.class_lock.lock();
        let mut autonomous = BackendTransaction::begin(self.backend.clone());
        if let Some(id) = autonomous.get(Table::Classes, &hash_key)? {
            return decode_class_id(&id);
        }
        let id = Self::next_class_id(&autonomous)?;
        autonomous.put(Table::Classes, &hash_key, &encode_class_id(id));
        autonomous.put(Table::Classes, &class_info_key(id), blob);
        autonomous.commit(self.config.sync_on_commit)?;
        debug!(txn = %txn.id(), %id, len = blob.len(), "interned class descriptor");
        Ok(id)
    }

    fn next_class_id(txn: &BackendTransaction) -> StoreResult<ClassId> {
        let last = txn.prev_entry(Table::Classes, Bound::Excluded(&[CLASS_INFO_PREFIX + 1][..]))?;
        let Some((key, _)) = last.filter(|(k, _)| k.first() == Some(&CLASS_INFO_PREFIX)) else {
            return Ok(ClassId::new(1));
        };
        let raw = decode_int(&key[1..])?;
        raw.checked_add(1)
            .and_then(|n| u32::try_from(n).ok())
            .map(ClassId::new)
            .ok_or_else(|| StoreError::invalid_format(format!("bad last class id {raw}")))
    }

    /// Returns the descriptor with the given ID.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidArgument`] for ID 0,
    /// [`StoreError::ClassInfoNotFound`] for an unassigned ID, or a
    /// transaction state error.
    pub fn get_class_info(&self, txn: &Transaction, id: ClassId) -> StoreResult<Vec<u8>> {
        if id.as_u32() < 1 {
            return Err(StoreError::invalid_argument(format!(
                "class id must be positive: {id}"
            )));
        }
        self.txn_info(txn)?;
        self.backend
            .get(Table::Classes, &class_info_key(id))?
            .ok_or(StoreError::ClassInfoNotFound { id })
    }
}

#[cfg(test)]
mod tests {
    use crate::{ClassId, DataStore, StoreConfig, StoreError};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn store() -> Arc<DataStore> {
        DataStore::open(StoreConfig::new().txn_timeout(Duration::from_secs(10))).unwrap()
    }

    #[test]
    fn ids_start_at_one_and_are_stable() {
        let store = store();
        let txn = store.begin().unwrap();
        let a = store.get_class_id(&txn, b"class a").unwrap();
        let b = store.get_class_id(&txn, b"class b").unwrap();
        assert_eq!(a, ClassId::new(1));
        assert_eq!(b, ClassId::new(2));
        assert_eq!(store.get_class_id(&txn, b"class a").unwrap(), a);
        assert_eq!(store.get_class_info(&txn, b).unwrap(), b"class b");
        store.commit(&txn).unwrap();
    }

    #[test]
    fn ids_survive_abort() {
        let store = store();
        let txn = store.begin().unwrap();
        let id = store.get_class_id(&txn, b"kept").unwrap();
        store.abort(&txn).unwrap();

        let txn = store.begin().unwrap();
        assert_eq!(store.get_class_info(&txn, id).unwrap(), b"kept");
        assert_eq!(store.get_class_id(&txn, b"kept").unwrap(), id);
        store.commit(&txn).unwrap();
    }

    #[test]
    fn bad_ids() {
        let store = store();
        let txn = store.begin().unwrap();
        assert!(store
            .get_class_info(&txn, ClassId::new(0))
            .unwrap_err()
            .is_invalid_argument());
        assert!(matches!(
            store.get_class_info(&txn, ClassId::new(5)),
            Err(StoreError::ClassInfoNotFound { .. })
        ));
        store.abort(&txn).unwrap();
    }

    #[test]
    fn concurrent_first_sightings_agree() {
        let store = store();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                thread::spawn(move || {
                    store
                        .transaction(|txn| store.get_class_id(txn, b"shared"))
                        .unwrap()
                })
            })
            .collect();
        let ids: Vec<ClassId> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(ids.iter().all(|&id| id == ClassId::new(1)));
    }
}
