//! The lock table.

use super::deadlock::DeadlockChecker;
use super::locker::{Locker, Waiting};
use super::queue::{Attempt, LockQueue};
use super::{LockError, LockMode, LockResult};
use crate::types::TransactionId;
use parking_lot::Mutex;
use std::collections::hash_map::RandomState;
use std::collections::HashMap;
use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, trace};

/// A snapshot of one owner or waiter of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockHolder {
    /// The transaction.
    pub txn: TransactionId,
    /// The requested or granted mode.
    pub mode: LockMode,
    /// True if this is a waiting upgrade from `Read` to `Write`.
    pub upgrade: bool,
}

type KeyMap<K> = Mutex<HashMap<K, LockQueue<K>>>;

/// Manages read and write locks on keys of type `K`.
///
/// The table is striped across several independently locked maps so that
/// requests on unrelated keys rarely contend.
///
/// # Example
///
/// ```rust
/// use darkstore_core::lock::{LockError, LockManager, LockMode, Locker};
/// use darkstore_core::TransactionId;
/// use std::sync::Arc;
/// use std::time::{Duration, Instant};
///
/// let manager = LockManager::new(Duration::from_millis(10), 4, true);
/// let deadline = Instant::now() + Duration::from_secs(1);
/// let t1 = Arc::new(Locker::new(TransactionId::new(1), Instant::now(), deadline));
/// let t2 = Arc::new(Locker::new(TransactionId::new(2), Instant::now(), deadline));
///
/// manager.lock(&t1, &"k", LockMode::Write).unwrap();
/// assert!(matches!(
///     manager.lock(&t2, &"k", LockMode::Read),
///     Err(LockError::Timeout { .. })
/// ));
/// ```
pub struct LockManager<K> {
    lock_timeout: Duration,
    detect_deadlocks: bool,
    key_maps: Vec<KeyMap<K>>,
    hasher: RandomState,
}

impl<K> LockManager<K>
where
    K: Clone + Eq + Hash + fmt::Debug + Send + Sync,
{
    /// Creates a lock manager.
    ///
    /// `lock_timeout` bounds each individual wait (raised to 1 ms if
    /// smaller); `num_key_maps` is the number of stripes (at least 1).
    #[must_use]
    pub fn new(lock_timeout: Duration, num_key_maps: usize, detect_deadlocks: bool) -> Self {
        let key_maps = (0..num_key_maps.max(1))
            .map(|_| Mutex::new(HashMap::new()))
            .collect();
        Self {
            lock_timeout: lock_timeout.max(Duration::from_millis(1)),
            detect_deadlocks,
            key_maps,
            hasher: RandomState::new(),
        }
    }

    /// Returns the per-wait lock timeout.
    #[must_use]
    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    fn key_map(&self, key: &K) -> &KeyMap<K> {
        let index = (self.hasher.hash_one(key) % self.key_maps.len() as u64) as usize;
        &self.key_maps[index]
    }

    /// Acquires a lock, waiting if necessary.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Timeout`] or [`LockError::Deadlock`] if the
    /// lock could not be granted, and repeats that error for every later
    /// request by the same locker. Returns [`LockError::IllegalState`] if
    /// the locker is already waiting for another lock.
    pub fn lock(&self, locker: &Arc<Locker<K>>, key: &K, mode: LockMode) -> LockResult<()> {
        match self.lock_no_wait(locker, key, mode) {
            Err(LockError::Blocked { .. } | LockError::Deadlock { .. })
                if locker.state().waiting.is_some() =>
            {
                self.wait_for_lock(locker)
            }
            result => result,
        }
    }

    /// Attempts to acquire a lock without waiting.
    ///
    /// On conflict the request stays queued and this returns
    /// [`LockError::Blocked`], or [`LockError::Deadlock`] if queueing it
    /// closed a cycle with this locker as victim. Either way the caller
    /// must then call [`Self::wait_for_lock`].
    ///
    /// # Errors
    ///
    /// See above; also fails with the locker's recorded conflict, or with
    /// [`LockError::IllegalState`] if the locker is already waiting.
    pub fn lock_no_wait(&self, locker: &Arc<Locker<K>>, key: &K, mode: LockMode) -> LockResult<()> {
        {
            let state = locker.state();
            if let Some(conflict) = &state.conflict {
                return Err(conflict.clone());
            }
            if let Some(waiting) = &state.waiting {
                return Err(LockError::IllegalState(format!(
                    "{} requested {key:?} while waiting for {:?}",
                    locker.txn(),
                    waiting.key
                )));
            }
        }

        let attempt = {
            let mut map = self.key_map(key).lock();
            map.entry(key.clone()).or_default().lock(locker, mode)
        };

        match attempt {
            Attempt::AlreadyHeld => {
                trace!(txn = %locker.txn(), ?key, %mode, "lock already held");
                Ok(())
            }
            Attempt::Granted => {
                locker.state().held.insert(key.clone());
                trace!(txn = %locker.txn(), ?key, %mode, "lock granted");
                Ok(())
            }
            Attempt::Blocked(blocker) => {
                let conflicting = blocker.txn();
                locker.state().waiting = Some(Waiting {
                    key: key.clone(),
                    mode,
                    conflicting,
                });
                trace!(txn = %locker.txn(), ?key, %mode, blocker = %conflicting, "lock blocked");
                if self.detect_deadlocks {
                    if let Some(deadlock) = DeadlockChecker::new(self, locker.clone()).check() {
                        return Err(deadlock);
                    }
                }
                Err(LockError::Blocked { conflicting })
            }
        }
    }

    /// Waits for the lock requested by the last blocked
    /// [`Self::lock_no_wait`] call. Returns at once if the locker is not
    /// waiting.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Timeout`] or [`LockError::Deadlock`] if the
    /// wait fails; the request is then withdrawn from the queue.
    pub fn wait_for_lock(&self, locker: &Arc<Locker<K>>) -> LockResult<()> {
        let mut state = locker.state();
        let Some(waiting) = state.waiting.clone() else {
            return Ok(());
        };
        let txn = locker.txn();
        let key_map = self.key_map(&waiting.key);
        let stop = (Instant::now() + self.lock_timeout).min(locker.deadline());

        let failure = loop {
            if let Some(conflict) = &state.conflict {
                break conflict.clone();
            }
            let owner = key_map
                .lock()
                .get(&waiting.key)
                .is_some_and(|q| q.is_owner(txn, waiting.mode));
            if owner {
                state.waiting = None;
                state.held.insert(waiting.key.clone());
                trace!(%txn, key = ?waiting.key, mode = %waiting.mode, "lock granted after wait");
                return Ok(());
            }
            let now = Instant::now();
            if now >= stop {
                let timeout = LockError::Timeout {
                    conflicting: waiting.conflicting,
                };
                state.conflict = Some(timeout.clone());
                break timeout;
            }
            trace!(%txn, key = ?waiting.key, wait = ?(stop - now), "waiting for lock");
            locker.wait_until(&mut state, stop);
        };

        let granted = {
            let mut map = key_map.lock();
            let mut granted = Vec::new();
            if let Some(queue) = map.get_mut(&waiting.key) {
                if queue.is_owner(txn, waiting.mode) {
                    // Granted at the same moment the wait failed; keep the
                    // lock so that release_all returns it.
                    state.held.insert(waiting.key.clone());
                } else {
                    granted = queue.flush_waiter(txn);
                }
                if !queue.in_use() {
                    map.remove(&waiting.key);
                }
            }
            granted
        };
        state.waiting = None;
        drop(state);

        for locker in granted {
            locker.notify_granted(waiting.key.clone());
        }
        debug!(%txn, key = ?waiting.key, mode = %waiting.mode, error = %failure, "lock wait failed");
        Err(failure)
    }

    /// Releases every lock held by `locker` and withdraws any request it
    /// is waiting on, waking the lockers that are granted as a result.
    pub fn release_all(&self, locker: &Arc<Locker<K>>) {
        let txn = locker.txn();
        let (keys, waiting) = {
            let mut state = locker.state();
            let keys: Vec<K> = state.held.drain().collect();
            (keys, state.waiting.take())
        };

        if let Some(waiting) = waiting {
            let granted = {
                let mut map = self.key_map(&waiting.key).lock();
                let granted = match map.get_mut(&waiting.key) {
                    Some(queue) => queue.flush_waiter(txn),
                    None => Vec::new(),
                };
                Self::remove_if_unused(&mut map, &waiting.key);
                granted
            };
            for other in granted {
                other.notify_granted(waiting.key.clone());
            }
        }

        let count = keys.len();
        for key in keys {
            let granted = {
                let mut map = self.key_map(&key).lock();
                let released = map.get_mut(&key).and_then(|queue| queue.release(txn));
                Self::remove_if_unused(&mut map, &key);
                match released {
                    Some(granted) => granted,
                    None => {
                        error!(%txn, ?key, "released a lock that was not held");
                        Vec::new()
                    }
                }
            };
            for other in granted {
                trace!(%txn, new_owner = %other.txn(), ?key, "lock handed over");
                other.notify_granted(key.clone());
            }
        }
        trace!(%txn, count, "released all locks");
    }

    fn remove_if_unused(map: &mut HashMap<K, LockQueue<K>>, key: &K) {
        if map.get(key).is_some_and(|q| !q.in_use()) {
            map.remove(key);
        }
    }

    /// Returns the current owners of `key`.
    #[must_use]
    pub fn owners(&self, key: &K) -> Vec<LockHolder> {
        self.snapshot(key, |q| q.owners())
    }

    /// Returns the current waiters for `key`, in grant order.
    #[must_use]
    pub fn waiters(&self, key: &K) -> Vec<LockHolder> {
        self.snapshot(key, |q| q.waiters())
    }

    fn snapshot<F>(&self, key: &K, select: F) -> Vec<LockHolder>
    where
        F: Fn(&LockQueue<K>) -> &[super::queue::LockRequest<K>],
    {
        let map = self.key_map(key).lock();
        map.get(key)
            .map(|q| {
                select(q)
                    .iter()
                    .map(|r| LockHolder {
                        txn: r.locker.txn(),
                        mode: r.mode,
                        upgrade: r.upgrade,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Checks the structural invariants of the queue for `key`.
    ///
    /// # Errors
    ///
    /// Returns a description of the first violation found.
    pub fn validate(&self, key: &K) -> Result<(), String> {
        let map = self.key_map(key).lock();
        map.get(key).map_or(Ok(()), |q| {
            q.validate().inspect_err(|problem| error!(?key, %problem, "lock queue invariant broken"))
        })
    }

    /// Returns the lockers `locker` is waiting behind, or `None` if it is
    /// not waiting or its wait has already failed.
    pub(crate) fn blockers(&self, locker: &Arc<Locker<K>>) -> Option<Vec<Arc<Locker<K>>>> {
        let key = {
            let state = locker.state();
            if state.conflict.is_some() {
                return None;
            }
            state.waiting.as_ref()?.key.clone()
        };
        let map = self.key_map(&key).lock();
        map.get(&key).map(|q| q.blockers_of(locker.txn()))
    }
}

impl<K> fmt::Debug for LockManager<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockManager")
            .field("lock_timeout", &self.lock_timeout)
            .field("num_key_maps", &self.key_maps.len())
            .field("detect_deadlocks", &self.detect_deadlocks)
            .finish_non_exhaustive()
    }
}
