//! Per-transaction lock state.

use super::{LockError, LockMode};
use crate::types::TransactionId;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;
use std::time::Instant;

/// The request a locker is blocked on.
#[derive(Debug, Clone)]
pub(crate) struct Waiting<K> {
    pub(crate) key: K,
    pub(crate) mode: LockMode,
    pub(crate) conflicting: TransactionId,
}

#[derive(Debug)]
pub(crate) struct LockerState<K> {
    pub(crate) waiting: Option<Waiting<K>>,
    pub(crate) conflict: Option<LockError>,
    pub(crate) held: HashSet<K>,
}

/// A transaction as seen by the lock manager.
///
/// A locker is created once per transaction and shared by reference
/// counting between the transaction's thread, the lock queues it appears in
/// and the deadlock checker.
pub struct Locker<K> {
    txn: TransactionId,
    requested_start: Instant,
    deadline: Instant,
    state: Mutex<LockerState<K>>,
    cond: Condvar,
}

impl<K> Locker<K> {
    /// Returns the transaction this locker acts for.
    #[must_use]
    pub fn txn(&self) -> TransactionId {
        self.txn
    }

    /// Returns the requested start time.
    #[must_use]
    pub fn requested_start(&self) -> Instant {
        self.requested_start
    }

    /// Returns the deadline.
    #[must_use]
    pub fn deadline(&self) -> Instant {
        self.deadline
    }
}

impl<K: Clone + Eq + Hash> Locker<K> {
    /// Creates a locker.
    ///
    /// `requested_start` is when the work the transaction performs was first
    /// requested; a retried transaction keeps the start of its first try so
    /// that it ages instead of always losing deadlocks. `deadline` bounds
    /// every lock wait.
    #[must_use]
    pub fn new(txn: TransactionId, requested_start: Instant, deadline: Instant) -> Self {
        Self {
            txn,
            requested_start,
            deadline,
            state: Mutex::new(LockerState {
                waiting: None,
                conflict: None,
                held: HashSet::new(),
            }),
            cond: Condvar::new(),
        }
    }

    /// Returns the failure recorded for this locker, if any.
    #[must_use]
    pub fn conflict(&self) -> Option<LockError> {
        self.state.lock().conflict.clone()
    }

    /// Returns the key and mode this locker is blocked on, if any.
    #[must_use]
    pub fn waiting_for(&self) -> Option<(K, LockMode)> {
        self.state
            .lock()
            .waiting
            .as_ref()
            .map(|w| (w.key.clone(), w.mode))
    }

    /// Returns the number of distinct keys this locker holds.
    #[must_use]
    pub fn held_count(&self) -> usize {
        self.state.lock().held.len()
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, LockerState<K>> {
        self.state.lock()
    }

    /// Waits on the condition variable until notified or `until` passes.
    pub(crate) fn wait_until(&self, guard: &mut MutexGuard<'_, LockerState<K>>, until: Instant) {
        let _ = self.cond.wait_until(guard, until);
    }

    /// Records that `key` is owned and wakes the locker's thread.
    pub(crate) fn notify_granted(&self, key: K) {
        let mut state = self.state.lock();
        state.held.insert(key);
        self.cond.notify_all();
    }

    /// Records a deadlock against this locker and wakes its thread.
    pub(crate) fn notify_victim(&self, error: LockError) {
        let mut state = self.state.lock();
        if state.conflict.is_none() {
            state.conflict = Some(error);
        }
        self.cond.notify_all();
    }

    /// Orders lockers for victim selection: later start, then higher id, is younger.
    pub(crate) fn younger_than(&self, other: &Self) -> bool {
        (self.requested_start, self.txn) > (other.requested_start, other.txn)
    }
}

impl<K> fmt::Debug for Locker<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Locker")
            .field("txn", &self.txn)
            .field("requested_start", &self.requested_start)
            .finish_non_exhaustive()
    }
}

impl<K> fmt::Display for Locker<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Locker[{}]", self.txn)
    }
}
