//! Name bindings with next-key locking.
//!
//! Names are stored in encoded order, so the bound name following any
//! position is a single ordered lookup. Operations that depend on the
//! absence of names, or change which name follows another, also lock the
//! following name (or [`AccessKey::NameEnd`]). Since that name can change
//! while the lock is being waited for, the lookup is repeated after every
//! grant until the name locked is still the one that follows.
//!
//! | Operation              | Locks                                   |
//! |------------------------|-----------------------------------------|
//! | `get_binding`, bound   | read name                               |
//! | `get_binding`, unbound | read name, read next                    |
//! | `set_binding`, bound   | write name                              |
//! | `set_binding`, new     | write name, write next                  |
//! | `remove_binding`       | write name, then write next if it was bound, read next if not |
//! | `next_bound_name`      | read next                               |

use super::keys::{decode_name, decode_oid, name_key, oid_key};
use super::txn_info::SharedTxnInfo;
use super::DataStore;
use crate::access::AccessKey;
use crate::error::{StoreError, StoreResult};
use crate::lock::LockMode;
use crate::transaction::Transaction;
use crate::types::ObjectId;
use darkstore_storage::Table;
use std::ops::Bound;
use tracing::trace;

impl DataStore {
    /// Returns the object bound to `name`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NameNotBound`] if the name is not bound, or a
    /// lock or transaction state error.
    pub fn get_binding(&self, txn: &Transaction, name: &str) -> StoreResult<ObjectId> {
        let key = name_key(name)?;
        let info = self.txn_info(txn)?;
        self.lock(txn, &AccessKey::Name(name.to_owned()), LockMode::Read)?;
        self.stats.record_binding_read();
        let value = info.lock().backend.get(Table::Names, &key)?;
        match value {
            Some(value) => decode_oid(&value),
            None => {
                self.lock_next(txn, &info, Some(name), LockMode::Read)?;
                Err(StoreError::name_not_bound(name))
            }
        }
    }

    /// Binds `name` to `oid`, replacing any existing binding.
    ///
    /// # Errors
    ///
    /// Returns a lock or transaction state error.
    pub fn set_binding(&self, txn: &Transaction, name: &str, oid: ObjectId) -> StoreResult<()> {
        let key = name_key(name)?;
        let info = self.txn_info(txn)?;
        self.lock(txn, &AccessKey::Name(name.to_owned()), LockMode::Write)?;
        let existed = {
            let mut info = info.lock();
            let existed = info.backend.get(Table::Names, &key)?.is_some();
            info.backend.put(Table::Names, &key, &oid_key(oid));
            info.modified = true;
            existed
        };
        self.stats.record_binding_written();
        trace!(txn = %txn.id(), name, %oid, existed, "set binding");
        if !existed {
            self.lock_next(txn, &info, Some(name), LockMode::Write)?;
        }
        Ok(())
    }

    /// Removes the binding for `name`. Returns false if it was not bound.
    ///
    /// # Errors
    ///
    /// Returns a lock or transaction state error.
    pub fn remove_binding(&self, txn: &Transaction, name: &str) -> StoreResult<bool> {
        let key = name_key(name)?;
        let info = self.txn_info(txn)?;
        self.lock(txn, &AccessKey::Name(name.to_owned()), LockMode::Write)?;
        let bound = {
            let mut info = info.lock();
            let bound = info.backend.get(Table::Names, &key)?.is_some();
            if bound {
                info.backend.delete(Table::Names, &key);
                info.modified = true;
            }
            bound
        };
        trace!(txn = %txn.id(), name, bound, "remove binding");
        if bound {
            self.stats.record_binding_removed();
            self.lock_next(txn, &info, Some(name), LockMode::Write)?;
        } else {
            self.lock_next(txn, &info, Some(name), LockMode::Read)?;
        }
        Ok(bound)
    }

    /// Returns the first bound name after `name`, or the first bound name
    /// of all for `None`. Returns `None` past the last name.
    ///
    /// # Errors
    ///
    /// Returns a lock or transaction state error.
    pub fn next_bound_name(&self, txn: &Transaction, name: Option<&str>) -> StoreResult<Option<String>> {
        if let Some(name) = name {
            name_key(name)?;
        }
        let info = self.txn_info(txn)?;
        self.lock_next(txn, &info, name, LockMode::Read)
    }

    /// Locks the name following `name` and returns it, repeating until the
    /// locked name is still the one that follows.
    fn lock_next(
        &self,
        txn: &Transaction,
        info: &SharedTxnInfo,
        name: Option<&str>,
        mode: LockMode,
    ) -> StoreResult<Option<String>> {
        let mut next = Self::next_name(info, name)?;
        loop {
            self.lock(txn, &AccessKey::name_or_end(next.as_deref()), mode)?;
            let check = Self::next_name(info, name)?;
            if check == next {
                return Ok(next);
            }
            trace!(txn = %txn.id(), ?name, locked = ?next, now = ?check, "next name changed, resampling");
            next = check;
        }
    }

    fn next_name(info: &SharedTxnInfo, after: Option<&str>) -> StoreResult<Option<String>> {
        let after = after.map(name_key).transpose()?;
        let bound = match &after {
            Some(key) => Bound::Excluded(key.as_slice()),
            None => Bound::Unbounded,
        };
        info.lock()
            .backend
            .next_entry(Table::Names, bound)?
            .map(|(key, _)| decode_name(&key))
            .transpose()
    }
}
