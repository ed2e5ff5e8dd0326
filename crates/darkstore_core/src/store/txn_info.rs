//! Per-transaction store state.

use super::alloc::ObjectIdBlock;
use crate::error::{StoreError, StoreResult};
use crate::types::TransactionId;
use darkstore_storage::BackendTransaction;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::ThreadId;

/// What the store tracks for a transaction it has joined.
#[derive(Debug)]
pub(crate) struct TxnInfo {
    pub(crate) backend: BackendTransaction,
    /// Set by writes, removals and binding changes; not by ID allocation.
    pub(crate) modified: bool,
    pub(crate) prepared: bool,
    /// Blocks taken by this transaction, current block last.
    pub(crate) blocks: Vec<ObjectIdBlock>,
}

impl TxnInfo {
    pub(crate) fn new(backend: BackendTransaction) -> Self {
        Self {
            backend,
            modified: false,
            prepared: false,
            blocks: Vec::new(),
        }
    }

    pub(crate) fn check_not_prepared(&self, txn: TransactionId) -> StoreResult<()> {
        if self.prepared {
            return Err(StoreError::illegal_state(format!(
                "{txn} has already been prepared"
            )));
        }
        Ok(())
    }

    pub(crate) fn current_block(&mut self) -> Option<&mut ObjectIdBlock> {
        self.blocks.last_mut().filter(|b| b.has_next())
    }
}

pub(crate) type SharedTxnInfo = Arc<Mutex<TxnInfo>>;

/// Joined transactions, by ID and by owning thread.
#[derive(Debug, Default)]
pub(crate) struct TxnTable {
    by_id: HashMap<TransactionId, SharedTxnInfo>,
    by_thread: HashMap<ThreadId, TransactionId>,
}

impl TxnTable {
    pub(crate) fn get(&self, txn: TransactionId) -> Option<SharedTxnInfo> {
        self.by_id.get(&txn).cloned()
    }

    /// Returns the other transaction this thread is already using, if any.
    pub(crate) fn serving(&self, thread: ThreadId) -> Option<TransactionId> {
        self.by_thread.get(&thread).copied()
    }

    pub(crate) fn insert(&mut self, txn: TransactionId, thread: ThreadId, info: TxnInfo) -> SharedTxnInfo {
        let info = Arc::new(Mutex::new(info));
        self.by_id.insert(txn, info.clone());
        self.by_thread.insert(thread, txn);
        info
    }

    pub(crate) fn remove(&mut self, txn: TransactionId, thread: ThreadId) -> Option<SharedTxnInfo> {
        let info = self.by_id.remove(&txn)?;
        if self.by_thread.get(&thread) == Some(&txn) {
            self.by_thread.remove(&thread);
        }
        Some(info)
    }

    pub(crate) fn len(&self) -> usize {
        self.by_id.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use darkstore_storage::InMemoryBackend;
    use std::thread;

    fn info() -> TxnInfo {
        TxnInfo::new(BackendTransaction::begin(Arc::new(InMemoryBackend::new())))
    }

    #[test]
    fn table_tracks_thread() {
        let mut table = TxnTable::default();
        let me = thread::current().id();
        let t1 = TransactionId::new(1);
        table.insert(t1, me, info());
        assert_eq!(table.serving(me), Some(t1));
        assert!(table.get(t1).is_some());
        assert_eq!(table.len(), 1);

        assert!(table.remove(t1, me).is_some());
        assert_eq!(table.serving(me), None);
        assert!(table.remove(t1, me).is_none());
    }

    #[test]
    fn prepared_info_rejects_work() {
        let mut info = info();
        info.check_not_prepared(TransactionId::new(1)).unwrap();
        info.prepared = true;
        assert!(matches!(
            info.check_not_prepared(TransactionId::new(1)),
            Err(StoreError::IllegalState { .. })
        ));
    }

    #[test]
    fn current_block_skips_used_up_blocks() {
        let mut info = info();
        assert!(info.current_block().is_none());
        info.blocks.push(ObjectIdBlock::new(1, 1));
        info.current_block().unwrap().take();
        assert!(info.current_block().is_none());
    }
}
