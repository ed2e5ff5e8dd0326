//! Object operations.

use super::alloc::ObjectIdBlock;
use super::keys::{decode_oid, decode_value, encode_value, is_placeholder, oid_key, placeholder_value, raw_oid_key};
use super::txn_info::{SharedTxnInfo, TxnInfo};
use super::{header, DataStore};
use crate::access::AccessKey;
use crate::error::{StoreError, StoreResult};
use crate::lock::LockMode;
use crate::transaction::Transaction;
use crate::types::ObjectId;
use darkstore_storage::{BackendTransaction, Table};
use std::ops::Bound;
use tracing::{debug, trace};

impl DataStore {
    /// Allocates a new object ID.
    ///
    /// No lock is taken and nothing is stored under the ID until the
    /// transaction writes it; until then reads see it as not found.
    ///
    /// # Errors
    ///
    /// Returns transaction state errors, or a backend error if a new block
    /// of IDs cannot be reserved.
    pub fn create_object(&self, txn: &Transaction) -> StoreResult<ObjectId> {
        let info = self.txn_info(txn)?;
        let mut info = info.lock();
        if info.current_block().is_none() {
            let pooled = self.free_oids.lock().take();
            let mut block = match pooled {
                Some(block) => block,
                None => self.reserve_block()?,
            };
            block.init_txn();
            info.blocks.push(block);
        }
        let Some((oid, first)) = info.current_block().and_then(ObjectIdBlock::take) else {
            return Err(StoreError::illegal_state("allocated block has no IDs"));
        };
        if first {
            let last = info.blocks.last().map_or(oid, ObjectIdBlock::last);
            info.backend
                .put(Table::Oids, &raw_oid_key(last), &placeholder_value());
        }
        self.stats.record_object_created();
        trace!(txn = %txn.id(), oid, "created object");
        ObjectId::new(oid)
    }

    /// Reserves the next block of IDs in its own committed backend
    /// transaction.
    fn reserve_block(&self) -> StoreResult<ObjectIdBlock> {
        let _guard = self.header_lock.lock();
        let mut autonomous = BackendTransaction::begin(self.backend.clone());
        let first = header::next_object_id(&autonomous)?;
        let next = first
            .checked_add(self.block_size)
            .filter(|&n| n <= ObjectId::MAX.as_u64())
            .ok_or_else(|| StoreError::illegal_state("object IDs exhausted"))?;
        let block = ObjectIdBlock::new(first, self.block_size);
        let first_placeholder = self.free_oids.lock().add_new_block(&block);
        header::set_next_object_id(&mut autonomous, next);
        header::set_first_placeholder(&mut autonomous, Some(first_placeholder));
        autonomous.commit(self.config.sync_on_commit)?;
        self.stats.record_block_allocated();
        debug!(first, last = block.last(), first_placeholder, "reserved object ID block");
        Ok(block)
    }

    /// Reads an object's stored value, treating placeholders as absent.
    fn read_object(info: &TxnInfo, oid: ObjectId) -> StoreResult<Option<Vec<u8>>> {
        Ok(info
            .backend
            .get(Table::Oids, &oid_key(oid))?
            .filter(|v| !is_placeholder(v)))
    }

    fn write_locked(&self, txn: &Transaction, oid: ObjectId) -> StoreResult<()> {
        self.lock(txn, &AccessKey::Object(oid), LockMode::Write)
    }

    /// Locks an object for writing without reading or changing it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ObjectNotFound`] if the object does not exist,
    /// or a lock or transaction state error.
    pub fn mark_for_update(&self, txn: &Transaction, oid: ObjectId) -> StoreResult<()> {
        let info = self.txn_info(txn)?;
        self.write_locked(txn, oid)?;
        if Self::read_object(&info.lock(), oid)?.is_none() {
            return Err(StoreError::ObjectNotFound { oid });
        }
        Ok(())
    }

    /// Reads an object, locking it for reading, or for writing when
    /// `for_update` is set.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ObjectNotFound`] if the object does not exist,
    /// or a lock or transaction state error.
    pub fn get_object(&self, txn: &Transaction, oid: ObjectId, for_update: bool) -> StoreResult<Vec<u8>> {
        let info = self.txn_info(txn)?;
        let mode = if for_update { LockMode::Write } else { LockMode::Read };
        self.lock(txn, &AccessKey::Object(oid), mode)?;
        self.stats.record_read();
        let value = Self::read_object(&info.lock(), oid)?;
        value
            .map(decode_value)
            .ok_or(StoreError::ObjectNotFound { oid })
    }

    /// Writes an object.
    ///
    /// # Errors
    ///
    /// Returns a lock or transaction state error.
    pub fn set_object(&self, txn: &Transaction, oid: ObjectId, data: &[u8]) -> StoreResult<()> {
        let info = self.txn_info(txn)?;
        self.write_locked(txn, oid)?;
        Self::put_object(&mut info.lock(), oid, data);
        self.stats.record_write();
        Ok(())
    }

    /// Writes several objects. Every lock is acquired before anything is
    /// written.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidArgument`] if the slices differ in
    /// length, or a lock or transaction state error.
    pub fn set_objects<V: AsRef<[u8]>>(
        &self,
        txn: &Transaction,
        oids: &[ObjectId],
        data: &[V],
    ) -> StoreResult<()> {
        if oids.len() != data.len() {
            return Err(StoreError::invalid_argument(format!(
                "{} object IDs but {} values",
                oids.len(),
                data.len()
            )));
        }
        let info = self.txn_info(txn)?;
        for &oid in oids {
            self.write_locked(txn, oid)?;
        }
        let mut info = info.lock();
        for (&oid, value) in oids.iter().zip(data) {
            Self::put_object(&mut info, oid, value.as_ref());
            self.stats.record_write();
        }
        Ok(())
    }

    fn put_object(info: &mut TxnInfo, oid: ObjectId, data: &[u8]) {
        info.backend.put(Table::Oids, &oid_key(oid), &encode_value(data));
        info.modified = true;
    }

    /// Removes an object.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ObjectNotFound`] if the object does not exist,
    /// or a lock or transaction state error.
    pub fn remove_object(&self, txn: &Transaction, oid: ObjectId) -> StoreResult<()> {
        let info = self.txn_info(txn)?;
        self.write_locked(txn, oid)?;
        let mut info = info.lock();
        if Self::read_object(&info, oid)?.is_none() {
            return Err(StoreError::ObjectNotFound { oid });
        }
        info.backend.delete(Table::Oids, &oid_key(oid));
        info.modified = true;
        self.stats.record_remove();
        Ok(())
    }

    /// Returns the lowest existing object ID greater than `oid`, or the
    /// lowest of all for `None`. The returned object is locked for reading.
    ///
    /// # Errors
    ///
    /// Returns a lock or transaction state error.
    pub fn next_object_id(&self, txn: &Transaction, oid: Option<ObjectId>) -> StoreResult<Option<ObjectId>> {
        let info = self.txn_info(txn)?;
        let mut next = Self::next_live_oid(&info, oid)?;
        loop {
            let Some(candidate) = next else {
                return Ok(None);
            };
            self.lock(txn, &AccessKey::Object(candidate), LockMode::Read)?;
            let check = Self::next_live_oid(&info, oid)?;
            if check == next {
                return Ok(next);
            }
            next = check;
        }
    }

    fn next_live_oid(info: &SharedTxnInfo, after: Option<ObjectId>) -> StoreResult<Option<ObjectId>> {
        let info = info.lock();
        let mut from_key = after.map(oid_key);
        loop {
            let bound = match &from_key {
                Some(key) => Bound::Excluded(key.as_slice()),
                None => Bound::Unbounded,
            };
            let Some((key, value)) = info.backend.next_entry(Table::Oids, bound)? else {
                return Ok(None);
            };
            if !is_placeholder(&value) {
                return decode_oid(&key).map(Some);
            }
            from_key = Some(decode_oid(&key).map(oid_key)?);
        }
    }
}
