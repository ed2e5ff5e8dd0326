//! Raw access for tests. Bypasses locking and transactions.

use super::keys::{is_placeholder, oid_key, placeholder_value, raw_oid_key};
use super::{header, DataStore};
use crate::error::StoreResult;
use crate::types::ObjectId;
use darkstore_storage::{BackendTransaction, StorageBackend, Table};
use std::sync::Arc;

impl DataStore {
    /// Returns the committed record stored for `oid`, placeholders included.
    ///
    /// # Errors
    ///
    /// Returns a backend error.
    pub fn raw_object(&self, oid: ObjectId) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.backend.get(Table::Oids, &oid_key(oid))?)
    }

    /// Returns true if the committed record for `oid` is a placeholder.
    ///
    /// # Errors
    ///
    /// Returns a backend error.
    pub fn is_placeholder_committed(&self, oid: ObjectId) -> StoreResult<bool> {
        Ok(self
            .raw_object(oid)?
            .is_some_and(|v| is_placeholder(&v)))
    }

    /// Returns the header's next unallocated object ID.
    ///
    /// # Errors
    ///
    /// Returns a backend error.
    pub fn header_next_object_id(&self) -> StoreResult<u64> {
        header::next_object_id(&BackendTransaction::begin(self.backend.clone()))
    }

    /// Returns the header's first placeholder ID.
    ///
    /// # Errors
    ///
    /// Returns a backend error.
    pub fn header_first_placeholder(&self) -> StoreResult<Option<u64>> {
        header::first_placeholder(&BackendTransaction::begin(self.backend.clone()))
    }

    /// Returns the backend the store runs on.
    #[must_use]
    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    /// Returns the number of blocks waiting in the free pool.
    #[must_use]
    pub fn pooled_blocks(&self) -> usize {
        self.free_oids.lock().pooled()
    }
}

/// Writes a placeholder at `oid` and points the header's first placeholder
/// field at it, as a crash after reserving a block would leave them.
///
/// # Errors
///
/// Returns a backend error.
pub fn plant_orphan_placeholder(backend: &Arc<dyn StorageBackend>, oid: u64) -> StoreResult<()> {
    let mut txn = BackendTransaction::begin(backend.clone());
    txn.put(Table::Oids, &raw_oid_key(oid), &placeholder_value());
    if header::first_placeholder(&txn)?.map_or(true, |first| oid < first) {
        header::set_first_placeholder(&mut txn, Some(oid));
    }
    txn.commit(true)?;
    Ok(())
}
