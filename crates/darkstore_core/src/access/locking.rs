use super::{AccessCoordinator, AccessKey};
use crate::config::CoordinatorKind;
use crate::error::{StoreError, StoreResult};
use crate::lock::{LockError, LockManager, LockMode, Locker};
use crate::stats::StoreStats;
use crate::transaction::{Transaction, TransactionParticipant};
use crate::types::TransactionId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tracing::{trace, warn};

/// An access coordinator backed by a [`LockManager`].
///
/// Joins every transaction as a non-durable participant and releases the
/// transaction's locks once the durable participant has committed or the
/// transaction has aborted.
pub struct LockingAccessCoordinator {
    manager: LockManager<AccessKey>,
    lockers: Mutex<HashMap<TransactionId, Arc<Locker<AccessKey>>>>,
    stats: Arc<StoreStats>,
    this: Weak<Self>,
}

impl LockingAccessCoordinator {
    /// Creates a coordinator.
    #[must_use]
    pub fn new(lock_timeout: Duration, num_key_maps: usize, stats: Arc<StoreStats>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            manager: LockManager::new(lock_timeout, num_key_maps, true),
            lockers: Mutex::new(HashMap::new()),
            stats,
            this: this.clone(),
        })
    }

    /// Returns the number of transactions currently tracked.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.lockers.lock().len()
    }

    fn locker(&self, txn: &Transaction) -> StoreResult<Arc<Locker<AccessKey>>> {
        self.lockers
            .lock()
            .get(&txn.id())
            .cloned()
            .ok_or(StoreError::TransactionNotActive { txn: txn.id() })
    }

    fn end(&self, txn: &Transaction) {
        let locker = self.lockers.lock().remove(&txn.id());
        if let Some(locker) = locker {
            trace!(txn = %txn.id(), held = locker.held_count(), "releasing locks");
            self.manager.release_all(&locker);
        }
    }

    fn failed(&self, txn: &Transaction, key: &AccessKey, mode: LockMode, error: LockError) -> StoreError {
        match &error {
            LockError::Timeout { conflicting } | LockError::Blocked { conflicting } => {
                self.stats.record_lock_timeout();
                warn!(txn = %txn.id(), %key, %mode, blocker = %conflicting, "lock timed out");
            }
            LockError::Deadlock { conflicting } => {
                self.stats.record_deadlock();
                warn!(txn = %txn.id(), %key, %mode, other = %conflicting, "deadlock victim");
            }
            LockError::IllegalState(_) => {}
        }
        StoreError::from_lock(txn.id(), error)
    }
}

impl AccessCoordinator for LockingAccessCoordinator {
    fn notify_new_transaction(
        &self,
        txn: &Transaction,
        requested_start: Instant,
        try_count: u32,
    ) -> StoreResult<()> {
        {
            let mut lockers = self.lockers.lock();
            if lockers.contains_key(&txn.id()) {
                return Err(StoreError::illegal_state(format!(
                    "{} is already known",
                    txn.id()
                )));
            }
            let locker = Locker::new(txn.id(), requested_start, txn.deadline());
            lockers.insert(txn.id(), Arc::new(locker));
        }
        trace!(txn = %txn.id(), try_count, "tracking transaction");
        let this = self
            .this
            .upgrade()
            .ok_or_else(|| StoreError::illegal_state("access coordinator dropped"))?;
        if let Err(e) = txn.join(this) {
            self.lockers.lock().remove(&txn.id());
            return Err(e);
        }
        Ok(())
    }

    fn acquire(&self, txn: &Transaction, key: &AccessKey, mode: LockMode) -> StoreResult<()> {
        let locker = self.locker(txn)?;
        match self.manager.lock_no_wait(&locker, key, mode) {
            Ok(()) => Ok(()),
            Err(LockError::Blocked { .. } | LockError::Deadlock { .. })
                if locker.waiting_for().is_some() =>
            {
                self.stats.record_lock_wait();
                self.manager
                    .wait_for_lock(&locker)
                    .map_err(|e| self.failed(txn, key, mode, e))
            }
            Err(e) => Err(self.failed(txn, key, mode, e)),
        }
    }

    fn release_all(&self, txn: &Transaction) {
        self.end(txn);
    }

    fn kind(&self) -> CoordinatorKind {
        CoordinatorKind::Locking
    }

    fn lock_manager(&self) -> Option<&LockManager<AccessKey>> {
        Some(&self.manager)
    }
}

impl TransactionParticipant for LockingAccessCoordinator {
    fn prepare(&self, _txn: &Transaction) -> StoreResult<bool> {
        Ok(false)
    }

    fn commit(&self, txn: &Transaction) -> StoreResult<()> {
        self.end(txn);
        Ok(())
    }

    fn prepare_and_commit(&self, txn: &Transaction) -> StoreResult<()> {
        self.end(txn);
        Ok(())
    }

    fn abort(&self, txn: &Transaction) -> StoreResult<()> {
        self.end(txn);
        Ok(())
    }

    fn is_durable(&self) -> bool {
        false
    }

    fn type_name(&self) -> &'static str {
        "LockingAccessCoordinator"
    }
}

impl fmt::Debug for LockingAccessCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockingAccessCoordinator")
            .field("manager", &self.manager)
            .field("active", &self.active_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::TransactionCoordinator;
    use crate::types::ObjectId;
    use std::sync::mpsc;
    use std::thread;

    fn setup(lock_timeout_ms: u64) -> (Arc<LockingAccessCoordinator>, Arc<TransactionCoordinator>) {
        let access = LockingAccessCoordinator::new(
            Duration::from_millis(lock_timeout_ms),
            4,
            Arc::new(StoreStats::new()),
        );
        let txns = TransactionCoordinator::new(Duration::from_secs(10), access.clone());
        (access, Arc::new(txns))
    }

    fn obj(id: u64) -> AccessKey {
        AccessKey::Object(ObjectId::new(id).unwrap())
    }

    #[test]
    fn locks_released_on_commit() {
        let (access, txns) = setup(1000);
        let t = txns.begin().unwrap();
        access.acquire_write(&t, &obj(1)).unwrap();
        assert_eq!(access.manager.owners(&obj(1)).len(), 1);

        txns.commit(&t).unwrap();
        assert!(access.manager.owners(&obj(1)).is_empty());
        assert_eq!(access.active_count(), 0);
        assert!(matches!(
            access.acquire_read(&t, &obj(1)),
            Err(StoreError::TransactionNotActive { .. })
        ));
    }

    #[test]
    fn locks_released_on_abort() {
        let (access, txns) = setup(1000);
        let t = txns.begin().unwrap();
        access.acquire_read(&t, &AccessKey::NameEnd).unwrap();
        txns.abort(&t).unwrap();
        assert!(access.manager.owners(&AccessKey::NameEnd).is_empty());
    }

    #[test]
    fn duplicate_notify_rejected() {
        let (access, txns) = setup(1000);
        let t = txns.begin().unwrap();
        let err = access
            .notify_new_transaction(&t, Instant::now(), 1)
            .unwrap_err();
        assert!(matches!(err, StoreError::IllegalState { .. }));
    }

    #[test]
    fn conflicting_write_times_out() {
        let (access, txns) = setup(20);
        let t1 = txns.begin().unwrap();
        access.acquire_write(&t1, &obj(7)).unwrap();

        let (tx, rx) = mpsc::channel();
        let (access2, txns2) = (access.clone(), txns.clone());
        thread::spawn(move || {
            let t2 = txns2.begin().unwrap();
            let result = access2.acquire_read(&t2, &obj(7));
            tx.send((t2.id(), result)).unwrap();
        });
        let (t2, result) = rx.recv().unwrap();
        match result {
            Err(StoreError::Timeout { txn, conflicting }) => {
                assert_eq!(txn, t2);
                assert_eq!(conflicting, Some(t1.id()));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert_eq!(access.stats.lock_timeouts(), 1);
        assert_eq!(access.stats.lock_waits(), 1);
    }

    #[test]
    fn waiter_granted_after_commit() {
        let (access, txns) = setup(5000);
        let t1 = txns.begin().unwrap();
        access.acquire_write(&t1, &obj(2)).unwrap();

        let (tx, rx) = mpsc::channel();
        let (access2, txns2) = (access.clone(), txns.clone());
        let handle = thread::spawn(move || {
            let t2 = txns2.begin().unwrap();
            tx.send(()).unwrap();
            access2.acquire_write(&t2, &obj(2)).unwrap();
            txns2.commit(&t2).unwrap();
        });
        rx.recv().unwrap();
        let until = Instant::now() + Duration::from_secs(5);
        while access.manager.waiters(&obj(2)).is_empty() {
            assert!(Instant::now() < until);
            thread::sleep(Duration::from_millis(2));
        }
        txns.commit(&t1).unwrap();
        handle.join().unwrap();
        assert!(access.manager.owners(&obj(2)).is_empty());
    }
}
