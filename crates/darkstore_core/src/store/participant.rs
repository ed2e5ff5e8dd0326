//! The store's side of two-phase commit.

use super::keys::{is_placeholder, raw_oid_key};
use super::txn_info::{SharedTxnInfo, TxnInfo};
use super::DataStore;
use crate::error::{StoreError, StoreResult};
use crate::transaction::{Transaction, TransactionParticipant};
use darkstore_storage::{BackendTransaction, Table};
use std::mem;
use tracing::{debug, trace};

impl DataStore {
    fn joined_info(&self, txn: &Transaction) -> StoreResult<SharedTxnInfo> {
        self.table
            .lock()
            .get(txn.id())
            .ok_or_else(|| not_joined(txn))
    }

    /// Deletes placeholders of used up blocks and returns the rest of the
    /// transaction's blocks to the pool.
    fn release_blocks(&self, info: &mut TxnInfo) -> StoreResult<()> {
        let blocks = mem::take(&mut info.blocks);
        for block in blocks {
            if block.has_next() {
                self.free_oids.lock().put_back(block);
                continue;
            }
            let key = raw_oid_key(block.last());
            if info.backend.get(Table::Oids, &key)?.is_some_and(|v| is_placeholder(&v)) {
                info.backend.delete(Table::Oids, &key);
                self.stats.record_placeholder_removed();
            }
            self.free_oids.lock().placeholder_removed(block.last());
        }
        Ok(())
    }

    /// Removes `txn` from the table and returns its state. The caller ends
    /// the backend transaction and then calls `finish`.
    fn finish_info(&self, txn: &Transaction) -> StoreResult<TxnInfo> {
        let shared = self.take_info(txn).ok_or_else(|| not_joined(txn))?;
        let empty = TxnInfo::new(BackendTransaction::begin(self.backend.clone()));
        let info = mem::replace(&mut *shared.lock(), empty);
        Ok(info)
    }
}

fn not_joined(txn: &Transaction) -> StoreError {
    StoreError::illegal_state(format!("{} is not active in the data store", txn.id()))
}

impl TransactionParticipant for DataStore {
    fn prepare(&self, txn: &Transaction) -> StoreResult<bool> {
        let shared = self.joined_info(txn)?;
        txn.check_timeout()?;
        let read_only = {
            let mut info = shared.lock();
            info.check_not_prepared(txn.id())?;
            self.release_blocks(&mut info)?;
            if info.modified {
                info.prepared = true;
            }
            !info.modified
        };
        if !read_only {
            trace!(txn = %txn.id(), "prepared");
            return Ok(false);
        }
        let info = self.finish_info(txn)?;
        let committed = info.backend.commit(self.config.sync_on_commit);
        self.finish();
        committed?;
        self.stats.record_transaction_read_only();
        debug!(txn = %txn.id(), "prepared read-only");
        Ok(true)
    }

    fn commit(&self, txn: &Transaction) -> StoreResult<()> {
        let shared = self.joined_info(txn)?;
        if !shared.lock().prepared {
            return Err(StoreError::illegal_state(format!(
                "{} has not been prepared",
                txn.id()
            )));
        }
        let info = self.finish_info(txn)?;
        let committed = info.backend.commit(self.config.sync_on_commit);
        self.finish();
        committed?;
        self.stats.record_transaction_committed();
        debug!(txn = %txn.id(), "committed");
        Ok(())
    }

    fn prepare_and_commit(&self, txn: &Transaction) -> StoreResult<()> {
        if !self.prepare(txn)? {
            TransactionParticipant::commit(self, txn)?;
        }
        Ok(())
    }

    fn abort(&self, txn: &Transaction) -> StoreResult<()> {
        let mut info = self.finish_info(txn)?;
        if !info.prepared {
            let mut free = self.free_oids.lock();
            for mut block in mem::take(&mut info.blocks) {
                block.reset();
                if block.has_next() {
                    free.put_back(block);
                }
            }
        }
        info.backend.abort();
        self.finish();
        self.stats.record_transaction_aborted();
        debug!(txn = %txn.id(), "aborted");
        Ok(())
    }

    fn type_name(&self) -> &'static str {
        "DataStore"
    }
}
