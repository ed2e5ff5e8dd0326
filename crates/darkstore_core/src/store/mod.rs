//! The data store.
//!
//! [`DataStore`] keeps objects, name bindings and class descriptors in a
//! [`StorageBackend`] and takes part in [`Transaction`]s as their durable
//! participant. Every operation first asks the access coordinator for the
//! object or name it touches, then reads or writes through the
//! transaction's private [`BackendTransaction`], which is applied to the
//! backend when the transaction commits.

mod alloc;
mod bindings;
mod classes;
mod header;
mod keys;
mod objects;
mod participant;
mod recovery;
#[cfg(any(test, feature = "testing"))]
mod testing;
mod txn_info;

#[cfg(any(test, feature = "testing"))]
pub use testing::plant_orphan_placeholder;

use crate::access::{AccessCoordinator, AccessKey, LockingAccessCoordinator, NullAccessCoordinator};
use crate::config::{CoordinatorKind, StoreConfig};
use crate::dir::StoreDir;
use crate::error::{AbortCause, StoreError, StoreResult};
use crate::lock::LockMode;
use crate::stats::StoreStats;
use crate::transaction::{Transaction, TransactionCoordinator};
use alloc::FreeObjectIds;
use darkstore_storage::{BackendTransaction, FileBackend, InMemoryBackend, StorageBackend};
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::{Arc, Weak};
use std::thread;
use tracing::{debug, info};
use txn_info::{SharedTxnInfo, TxnInfo, TxnTable};

#[derive(Debug, Default)]
struct Lifecycle {
    active: usize,
    shutting_down: bool,
    closed: bool,
}

/// A transactional object store with an ordered name namespace.
///
/// # Example
///
/// ```rust
/// use darkstore_core::{DataStore, StoreConfig};
///
/// let store = DataStore::open(StoreConfig::default()).unwrap();
/// let txn = store.begin().unwrap();
/// let oid = store.create_object(&txn).unwrap();
/// store.set_object(&txn, oid, b"hello").unwrap();
/// store.set_binding(&txn, "greeting", oid).unwrap();
/// store.commit(&txn).unwrap();
///
/// let txn = store.begin().unwrap();
/// let oid = store.get_binding(&txn, "greeting").unwrap();
/// assert_eq!(store.get_object(&txn, oid, false).unwrap(), b"hello");
/// store.commit(&txn).unwrap();
/// store.shutdown().unwrap();
/// ```
pub struct DataStore {
    config: StoreConfig,
    _dir: Option<StoreDir>,
    backend: Arc<dyn StorageBackend>,
    access: Arc<dyn AccessCoordinator>,
    txns: TransactionCoordinator,
    stats: Arc<StoreStats>,
    block_size: u64,
    table: Mutex<TxnTable>,
    free_oids: Mutex<FreeObjectIds>,
    /// Serializes header updates made outside caller transactions.
    header_lock: Mutex<()>,
    /// Serializes class ID allocation.
    class_lock: Mutex<()>,
    lifecycle: Mutex<Lifecycle>,
    idle: Condvar,
    this: Weak<Self>,
}

impl DataStore {
    /// Opens a store as described by `config`: file backed in
    /// `config.directory`, or in memory when no directory is set.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidArgument`] for a bad configuration,
    /// [`StoreError::StoreLocked`] if another process has the directory
    /// open, or a backend error if the log or header is unreadable.
    pub fn open(config: StoreConfig) -> StoreResult<Arc<Self>> {
        config.validate()?;
        match config.directory.clone() {
            Some(path) => {
                let dir = StoreDir::open(&path)?;
                let backend = FileBackend::open(&dir.log_path(), config.isolation)?;
                if backend.truncated_bytes() > 0 {
                    info!(
                        path = %path.display(),
                        bytes = backend.truncated_bytes(),
                        "discarded torn tail of store log"
                    );
                }
                Self::build(config, Some(dir), Arc::new(backend))
            }
            None => {
                let backend = InMemoryBackend::with_isolation(config.isolation);
                Self::build(config, None, Arc::new(backend))
            }
        }
    }

    /// Opens a store over an existing backend, ignoring `config.directory`.
    ///
    /// Reopening the same backend after dropping a store runs recovery
    /// again, as a restart would.
    ///
    /// # Errors
    ///
    /// See [`Self::open`].
    pub fn open_with_backend(
        config: StoreConfig,
        backend: Arc<dyn StorageBackend>,
    ) -> StoreResult<Arc<Self>> {
        config.validate()?;
        Self::build(config, None, backend)
    }

    fn build(
        config: StoreConfig,
        dir: Option<StoreDir>,
        backend: Arc<dyn StorageBackend>,
    ) -> StoreResult<Arc<Self>> {
        let mut setup = BackendTransaction::begin(backend.clone());
        let block_size = header::load_or_init(&mut setup, config.allocation_block_size)?;
        let stats = Arc::new(StoreStats::new());
        let removed = recovery::remove_orphan_placeholders(&mut setup, block_size)?;
        setup.commit(true)?;
        for _ in 0..removed {
            stats.record_placeholder_removed();
        }

        let access: Arc<dyn AccessCoordinator> = match config.coordinator {
            CoordinatorKind::Locking => LockingAccessCoordinator::new(
                config.effective_lock_timeout(),
                config.num_key_maps,
                stats.clone(),
            ),
            CoordinatorKind::Null => Arc::new(NullAccessCoordinator::new()),
        };
        let txns = TransactionCoordinator::new(config.txn_timeout, access.clone());
        debug!(
            directory = ?config.directory,
            coordinator = ?config.coordinator,
            block_size,
            lock_timeout = ?config.effective_lock_timeout(),
            "data store opened"
        );

        Ok(Arc::new_cyclic(|this| Self {
            config,
            _dir: dir,
            backend,
            access,
            txns,
            stats,
            block_size,
            table: Mutex::new(TxnTable::default()),
            free_oids: Mutex::new(FreeObjectIds::default()),
            header_lock: Mutex::new(()),
            class_lock: Mutex::new(()),
            lifecycle: Mutex::new(Lifecycle::default()),
            idle: Condvar::new(),
            this: this.clone(),
        }))
    }

    /// Returns the configuration the store was opened with.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Returns the allocation block size in force.
    #[must_use]
    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    /// Returns the store's statistics.
    #[must_use]
    pub fn stats(&self) -> &StoreStats {
        &self.stats
    }

    /// Returns the transaction coordinator.
    #[must_use]
    pub fn transactions(&self) -> &TransactionCoordinator {
        &self.txns
    }

    /// Returns the access coordinator.
    #[must_use]
    pub fn access(&self) -> &Arc<dyn AccessCoordinator> {
        &self.access
    }

    /// Begins a transaction with the default timeout.
    ///
    /// # Errors
    ///
    /// See [`TransactionCoordinator::begin`].
    pub fn begin(&self) -> StoreResult<Transaction> {
        self.txns.begin()
    }

    /// Commits a transaction.
    ///
    /// # Errors
    ///
    /// See [`TransactionCoordinator::commit`].
    pub fn commit(&self, txn: &Transaction) -> StoreResult<()> {
        self.txns.commit(txn)
    }

    /// Aborts a transaction.
    ///
    /// # Errors
    ///
    /// See [`TransactionCoordinator::abort`].
    pub fn abort(&self, txn: &Transaction) -> StoreResult<()> {
        self.txns.abort(txn)
    }

    /// Runs `f` in a new transaction, committing if it returns `Ok` and
    /// aborting otherwise.
    ///
    /// # Errors
    ///
    /// Returns the error from `f`, or from beginning or committing.
    pub fn transaction<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Transaction) -> StoreResult<T>,
    {
        let txn = self.begin()?;
        match f(&txn) {
            Ok(value) => {
                self.commit(&txn)?;
                Ok(value)
            }
            Err(e) => {
                if txn.is_active() {
                    let _ = self.txns.abort_with(&txn, AbortCause::from(&e));
                }
                Err(e)
            }
        }
    }

    /// Returns the number of transactions the store is part of.
    #[must_use]
    pub fn active_transactions(&self) -> usize {
        self.lifecycle.lock().active
    }

    /// Shuts the store down.
    ///
    /// New transactions are refused at once. The call waits until every
    /// transaction the store has joined has committed or aborted, then
    /// flushes and closes the backend. Repeated and concurrent calls wait
    /// for the same shutdown.
    ///
    /// # Errors
    ///
    /// Returns a backend error if flushing or closing fails.
    pub fn shutdown(&self) -> StoreResult<()> {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.closed {
            return Ok(());
        }
        if !lifecycle.shutting_down {
            debug!(active = lifecycle.active, "shutdown requested");
            lifecycle.shutting_down = true;
        }
        while lifecycle.active > 0 {
            self.idle.wait(&mut lifecycle);
        }
        if lifecycle.closed {
            return Ok(());
        }
        lifecycle.closed = true;
        let result = self.backend.flush().and_then(|()| self.backend.close());
        debug!(ok = result.is_ok(), "shutdown complete");
        result.map_err(Into::into)
    }

    /// Returns true once shutdown has started.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.lifecycle.lock().shutting_down
    }

    /// Returns the store's state for `txn`, joining it on first use.
    fn txn_info(&self, txn: &Transaction) -> StoreResult<SharedTxnInfo> {
        txn.check_timeout()?;
        let existing = {
            let table = self.table.lock();
            match table.get(txn.id()) {
                Some(info) => Some(info),
                None => match table.serving(txn.owner()) {
                    Some(other) if other != txn.id() => {
                        return Err(StoreError::illegal_state(format!(
                            "wrong transaction: {} while {other} is active on this thread",
                            txn.id()
                        )))
                    }
                    _ => None,
                },
            }
        };
        if let Some(info) = existing {
            info.lock().check_not_prepared(txn.id())?;
            return Ok(info);
        }
        self.join(txn)
    }

    fn join(&self, txn: &Transaction) -> StoreResult<SharedTxnInfo> {
        {
            let mut lifecycle = self.lifecycle.lock();
            if lifecycle.shutting_down {
                return Err(StoreError::illegal_state("data store is shutting down"));
            }
            lifecycle.active += 1;
        }
        let this = self
            .this
            .upgrade()
            .ok_or_else(|| StoreError::illegal_state("data store dropped"));
        let joined = this.and_then(|this| txn.join(this));
        match joined {
            Ok(true) => {}
            Ok(false) => {
                self.finish();
                return Err(StoreError::TransactionNotActive { txn: txn.id() });
            }
            Err(e) => {
                self.finish();
                return Err(e);
            }
        }
        let info = TxnInfo::new(BackendTransaction::begin(self.backend.clone()));
        let info = self.table.lock().insert(txn.id(), txn.owner(), info);
        self.stats.record_transaction_joined();
        debug!(txn = %txn.id(), "joined transaction");
        Ok(info)
    }

    /// Forgets `txn`, returning its state.
    fn take_info(&self, txn: &Transaction) -> Option<SharedTxnInfo> {
        self.table.lock().remove(txn.id(), txn.owner())
    }

    /// Records that a joined transaction has ended.
    fn finish(&self) {
        let mut lifecycle = self.lifecycle.lock();
        lifecycle.active = lifecycle.active.saturating_sub(1);
        if lifecycle.active == 0 {
            self.idle.notify_all();
        }
    }

    /// Acquires access to `key`, aborting the transaction if the wait
    /// times out or loses a deadlock.
    fn lock(&self, txn: &Transaction, key: &AccessKey, mode: LockMode) -> StoreResult<()> {
        match self.access.acquire(txn, key, mode) {
            Err(e) if e.is_retryable() => {
                if !txn.is_aborted() {
                    let _ = txn.abort(AbortCause::from(&e));
                }
                Err(e)
            }
            result => result,
        }
    }
}

impl fmt::Debug for DataStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataStore")
            .field("directory", &self.config.directory)
            .field("coordinator", &self.access.kind())
            .field("block_size", &self.block_size)
            .field("active", &self.active_transactions())
            .finish_non_exhaustive()
    }
}

impl Drop for DataStore {
    fn drop(&mut self) {
        if !self.lifecycle.get_mut().closed {
            let _ = self.backend.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ObjectId;
    use std::time::Duration;

    fn store() -> Arc<DataStore> {
        DataStore::open(StoreConfig::new().txn_timeout(Duration::from_secs(10))).unwrap()
    }

    #[test]
    fn invalid_config_rejected() {
        let err = DataStore::open(StoreConfig::new().allocation_block_size(0)).unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn join_is_lazy() {
        let store = store();
        let txn = store.begin().unwrap();
        assert_eq!(store.active_transactions(), 0);
        store.create_object(&txn).unwrap();
        assert_eq!(store.active_transactions(), 1);
        store.commit(&txn).unwrap();
        assert_eq!(store.active_transactions(), 0);
        assert_eq!(store.stats().transactions_joined(), 1);
    }

    #[test]
    fn wrong_transaction_on_thread() {
        let store = store();
        let t1 = store.begin().unwrap();
        let t2 = store.begin().unwrap();
        store.create_object(&t1).unwrap();
        let err = store.create_object(&t2).unwrap_err();
        assert!(matches!(err, StoreError::IllegalState { .. }));
        store.commit(&t1).unwrap();
        store.create_object(&t2).unwrap();
        store.abort(&t2).unwrap();
    }

    #[test]
    fn operations_after_end_are_not_active() {
        let store = store();
        let txn = store.begin().unwrap();
        let oid = store.create_object(&txn).unwrap();
        store.set_object(&txn, oid, &[1]).unwrap();
        store.commit(&txn).unwrap();
        assert!(matches!(
            store.get_object(&txn, oid, false),
            Err(StoreError::TransactionNotActive { .. })
        ));

        let txn = store.begin().unwrap();
        store.abort(&txn).unwrap();
        assert!(matches!(
            store.create_object(&txn),
            Err(StoreError::TransactionNotActive { .. })
        ));
    }

    #[test]
    fn other_thread_is_illegal_state() {
        let store = store();
        let txn = store.begin().unwrap();
        let (s, t) = (store.clone(), txn.clone());
        let err = thread::spawn(move || s.get_object(&t, ObjectId::new(1).unwrap(), false))
            .join()
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, StoreError::IllegalState { .. }));
        store.abort(&txn).unwrap();
    }

    #[test]
    fn transaction_helper_commits_or_aborts() {
        let store = store();
        let oid = store
            .transaction(|txn| {
                let oid = store.create_object(txn)?;
                store.set_object(txn, oid, b"x")?;
                Ok(oid)
            })
            .unwrap();

        let err = store
            .transaction(|txn| {
                store.set_object(txn, oid, b"y")?;
                store.get_binding(txn, "missing")
            })
            .unwrap_err();
        assert!(err.is_not_found());

        let value = store.transaction(|txn| store.get_object(txn, oid, false)).unwrap();
        assert_eq!(value, b"x");
    }

    #[test]
    fn shutdown_refuses_new_work() {
        let store = store();
        store.shutdown().unwrap();
        store.shutdown().unwrap();
        let txn = store.begin().unwrap();
        assert!(matches!(
            store.create_object(&txn),
            Err(StoreError::IllegalState { .. })
        ));
    }
}
