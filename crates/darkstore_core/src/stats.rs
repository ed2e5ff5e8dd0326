//! Store statistics.
//!
//! Counters are updated with relaxed atomics and can be read while
//! transactions are running.
//!
//! ```rust
//! use darkstore_core::{DataStore, StoreConfig};
//!
//! let store = DataStore::open(StoreConfig::default()).unwrap();
//! let snap = store.stats().snapshot();
//! assert_eq!(snap.transactions_committed, 0);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

macro_rules! store_counters {
    ($($(#[$doc:meta])* $name:ident => $record:ident;)*) => {
        /// Store statistics.
        ///
        /// All counters only ever increase.
        #[derive(Debug, Default)]
        pub struct StoreStats {
            $($name: AtomicU64,)*
        }

        impl StoreStats {
            /// Creates a new stats instance.
            #[must_use]
            pub fn new() -> Self {
                Self::default()
            }

            $(
                pub(crate) fn $record(&self) {
                    self.$name.fetch_add(1, Ordering::Relaxed);
                }

                $(#[$doc])*
                #[must_use]
                pub fn $name(&self) -> u64 {
                    self.$name.load(Ordering::Relaxed)
                }
            )*

            /// Returns a snapshot of all counters.
            #[must_use]
            pub fn snapshot(&self) -> StatsSnapshot {
                StatsSnapshot {
                    $($name: self.$name(),)*
                }
            }
        }

        /// A point-in-time copy of [`StoreStats`].
        #[derive(Debug, Clone, PartialEq, Eq, Default)]
        pub struct StatsSnapshot {
            $($(#[$doc])* pub $name: u64,)*
        }
    };
}

store_counters! {
    /// Objects read.
    reads => record_read;
    /// Objects written.
    writes => record_write;
    /// Objects removed.
    removes => record_remove;
    /// Object IDs handed out.
    objects_created => record_object_created;
    /// ID blocks reserved.
    blocks_allocated => record_block_allocated;
    /// Placeholders deleted at prepare or by recovery.
    placeholders_removed => record_placeholder_removed;
    /// Bindings looked up.
    bindings_read => record_binding_read;
    /// Bindings set.
    bindings_written => record_binding_written;
    /// Bindings removed.
    bindings_removed => record_binding_removed;
    /// Transactions the store joined.
    transactions_joined => record_transaction_joined;
    /// Transactions committed with changes.
    transactions_committed => record_transaction_committed;
    /// Transactions that prepared read-only.
    transactions_read_only => record_transaction_read_only;
    /// Transactions aborted.
    transactions_aborted => record_transaction_aborted;
    /// Lock requests that had to wait.
    lock_waits => record_lock_wait;
    /// Lock waits that timed out.
    lock_timeouts => record_lock_timeout;
    /// Deadlock victims.
    deadlocks => record_deadlock;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn default_stats_are_zero() {
        assert_eq!(StoreStats::new().snapshot(), StatsSnapshot::default());
    }

    #[test]
    fn record_and_snapshot() {
        let stats = StoreStats::new();
        stats.record_read();
        stats.record_read();
        stats.record_lock_wait();
        stats.record_transaction_read_only();

        let snap = stats.snapshot();
        assert_eq!(snap.reads, 2);
        assert_eq!(snap.lock_waits, 1);
        assert_eq!(snap.transactions_read_only, 1);
        assert_eq!(snap.writes, 0);
    }

    #[test]
    fn concurrent_updates() {
        let stats = Arc::new(StoreStats::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let s = Arc::clone(&stats);
                thread::spawn(move || {
                    for _ in 0..100 {
                        s.record_write();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(stats.writes(), 800);
    }
}
