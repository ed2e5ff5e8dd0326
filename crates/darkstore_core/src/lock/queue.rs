//! The owner and waiter lists for a single key.

use super::locker::Locker;
use super::LockMode;
use crate::types::TransactionId;
use std::sync::Arc;

#[derive(Debug)]
pub(crate) struct LockRequest<K> {
    pub(crate) locker: Arc<Locker<K>>,
    pub(crate) mode: LockMode,
    pub(crate) upgrade: bool,
}

impl<K> LockRequest<K> {
    fn txn(&self) -> TransactionId {
        self.locker.txn()
    }

    /// True if this request cannot be granted while `other` owns the key.
    fn conflicts_with(&self, other: &LockRequest<K>) -> bool {
        self.txn() != other.txn() && (self.mode.is_write() || other.mode.is_write())
    }
}

/// Outcome of a lock attempt on one queue.
pub(crate) enum Attempt<K> {
    /// The locker already owns the key in a sufficient mode.
    AlreadyHeld,
    /// The lock was granted.
    Granted,
    /// The request was queued behind the given locker.
    Blocked(Arc<Locker<K>>),
}

#[derive(Debug)]
pub(crate) struct LockQueue<K> {
    owners: Vec<LockRequest<K>>,
    waiters: Vec<LockRequest<K>>,
}

impl<K> Default for LockQueue<K> {
    fn default() -> Self {
        Self {
            owners: Vec::new(),
            waiters: Vec::new(),
        }
    }
}

impl<K> LockQueue<K> {
    /// Attempts a new request, queueing it if it conflicts.
    pub(crate) fn lock(&mut self, locker: &Arc<Locker<K>>, mode: LockMode) -> Attempt<K> {
        let upgrade = match self.owners.iter().find(|o| o.txn() == locker.txn()) {
            Some(owned) if mode.is_write() && !owned.mode.is_write() => true,
            Some(_) => return Attempt::AlreadyHeld,
            None => false,
        };
        let mut blocker = self
            .owners
            .iter()
            .find(|o| o.txn() != locker.txn() && (mode.is_write() || o.mode.is_write()))
            .map(|o| o.locker.clone());
        // Reads queue behind requests that are already waiting.
        if blocker.is_none() && !upgrade && !mode.is_write() {
            blocker = self.waiters.first().map(|w| w.locker.clone());
        }

        let request = LockRequest {
            locker: locker.clone(),
            mode,
            upgrade,
        };
        match blocker {
            Some(blocker) => {
                self.add_waiter(request);
                Attempt::Blocked(blocker)
            }
            None => {
                if upgrade {
                    self.owners.retain(|o| o.txn() != locker.txn());
                }
                self.owners.push(request);
                Attempt::Granted
            }
        }
    }

    fn add_waiter(&mut self, request: LockRequest<K>) {
        if request.upgrade {
            let at = self
                .waiters
                .iter()
                .position(|w| !w.upgrade)
                .unwrap_or(self.waiters.len());
            self.waiters.insert(at, request);
        } else {
            self.waiters.push(request);
        }
    }

    /// Grants waiters in order until one still conflicts with an owner.
    fn grant_waiters(&mut self) -> Vec<Arc<Locker<K>>> {
        let mut granted = Vec::new();
        while let Some(first) = self.waiters.first() {
            if self.owners.iter().any(|o| first.conflicts_with(o)) {
                break;
            }
            let request = self.waiters.remove(0);
            // A granted write replaces any read the same transaction holds.
            self.owners.retain(|o| o.txn() != request.txn());
            granted.push(request.locker.clone());
            self.owners.push(request);
        }
        granted
    }

    /// Drops the ownership held by `txn` and returns the lockers granted as
    /// a result. Returns `None` if `txn` did not own the key.
    pub(crate) fn release(&mut self, txn: TransactionId) -> Option<Vec<Arc<Locker<K>>>> {
        let before = self.owners.len();
        self.owners.retain(|o| o.txn() != txn);
        if self.owners.len() == before {
            return None;
        }
        Some(self.grant_waiters())
    }

    /// Removes the waiting request of `txn` and returns the lockers granted
    /// because it no longer holds them up.
    pub(crate) fn flush_waiter(&mut self, txn: TransactionId) -> Vec<Arc<Locker<K>>> {
        match self.waiters.iter().position(|w| w.txn() == txn) {
            Some(index) => {
                self.waiters.remove(index);
                self.grant_waiters()
            }
            None => Vec::new(),
        }
    }

    /// Returns true if `txn` owns the key in a mode that satisfies `mode`.
    pub(crate) fn is_owner(&self, txn: TransactionId, mode: LockMode) -> bool {
        self.owners
            .iter()
            .any(|o| o.txn() == txn && (o.mode.is_write() || !mode.is_write()))
    }

    /// Returns the lockers the waiting request of `txn` is queued behind:
    /// the other owners plus every waiter ahead of it.
    pub(crate) fn blockers_of(&self, txn: TransactionId) -> Vec<Arc<Locker<K>>> {
        let mut result: Vec<Arc<Locker<K>>> = self
            .owners
            .iter()
            .filter(|o| o.txn() != txn)
            .map(|o| o.locker.clone())
            .collect();
        for waiter in &self.waiters {
            if waiter.txn() == txn {
                break;
            }
            result.push(waiter.locker.clone());
        }
        result
    }

    pub(crate) fn owners(&self) -> &[LockRequest<K>] {
        &self.owners
    }

    pub(crate) fn waiters(&self) -> &[LockRequest<K>] {
        &self.waiters
    }

    pub(crate) fn in_use(&self) -> bool {
        !self.owners.is_empty() || !self.waiters.is_empty()
    }

    /// Checks the queue's structural invariants.
    pub(crate) fn validate(&self) -> Result<(), String> {
        let writers = self.owners.iter().filter(|o| o.mode.is_write()).count();
        if writers > 1 || (writers == 1 && self.owners.len() > 1) {
            return Err(format!(
                "conflicting owners: {:?}",
                self.owners
                    .iter()
                    .map(|o| (o.txn(), o.mode))
                    .collect::<Vec<_>>()
            ));
        }
        let mut seen_plain = false;
        for waiter in &self.waiters {
            if !waiter.upgrade {
                seen_plain = true;
            } else if seen_plain {
                return Err(format!("upgrade waiter {} follows plain waiter", waiter.txn()));
            }
        }
        Ok(())
    }
}
