//! Test fixtures and store helpers.
//!
//! Provides convenience functions for opening test stores, reopening them
//! as a restart would, and routing store logs into test output.

use darkstore_core::{AccessKey, DataStore, LockMode, StoreConfig, TransactionId};
use std::ops::Deref;
use std::path::Path;
use std::sync::{Arc, Once};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

/// Transaction timeout used by fixtures. Long enough that tests never
/// time out by accident.
pub const TEST_TXN_TIMEOUT: Duration = Duration::from_secs(10);

/// Lock timeout used by fixtures.
pub const TEST_LOCK_TIMEOUT: Duration = Duration::from_secs(2);

/// Routes `tracing` output to the test harness.
///
/// Honors `RUST_LOG`, falling back to warnings only. Safe to call from
/// every test.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Configuration used by fixtures unless the test supplies its own.
#[must_use]
pub fn test_config() -> StoreConfig {
    StoreConfig::new()
        .txn_timeout(TEST_TXN_TIMEOUT)
        .lock_timeout(TEST_LOCK_TIMEOUT)
}

/// A test store with automatic cleanup.
pub struct TestStore {
    /// The store instance.
    pub store: Arc<DataStore>,
    config: StoreConfig,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: Option<TempDir>,
}

impl TestStore {
    /// Creates a new in-memory test store.
    pub fn memory() -> Self {
        Self::memory_with(test_config())
    }

    /// Creates a new in-memory test store with the given configuration.
    pub fn memory_with(config: StoreConfig) -> Self {
        init_tracing();
        let store = DataStore::open(config.clone()).expect("Failed to open in-memory store");
        Self {
            store,
            config,
            _temp_dir: None,
        }
    }

    /// Creates a new store in a temporary directory.
    pub fn file() -> Self {
        Self::file_with(test_config())
    }

    /// Creates a new store in a temporary directory with the given
    /// configuration. `config.directory` is replaced.
    pub fn file_with(config: StoreConfig) -> Self {
        init_tracing();
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config = config.directory(temp_dir.path().join("store"));
        let store = DataStore::open(config.clone()).expect("Failed to open file store");
        Self {
            store,
            config,
            _temp_dir: Some(temp_dir),
        }
    }

    /// Returns the store directory if file-based, None if in-memory.
    pub fn path(&self) -> Option<&Path> {
        self.config.directory.as_deref()
    }

    /// Returns the configuration the store was opened with.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Drops the store without shutting it down and opens it again over the
    /// same data, running recovery as after a crash.
    pub fn reopen(self) -> Self {
        let Self {
            store,
            config,
            _temp_dir,
        } = self;
        let store = if config.directory.is_some() {
            drop(store);
            DataStore::open(config.clone()).expect("Failed to reopen file store")
        } else {
            let backend = store.backend().clone();
            drop(store);
            DataStore::open_with_backend(config.clone(), backend)
                .expect("Failed to reopen in-memory store")
        };
        Self {
            store,
            config,
            _temp_dir,
        }
    }
}

impl Deref for TestStore {
    type Target = Arc<DataStore>;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

/// Runs a test with a temporary in-memory store.
///
/// # Example
///
/// ```rust,ignore
/// use darkstore_testkit::with_temp_store;
///
/// #[test]
/// fn my_test() {
///     with_temp_store(|store| {
///         let txn = store.begin().unwrap();
///         // ... test operations
///     });
/// }
/// ```
pub fn with_temp_store<F, R>(f: F) -> R
where
    F: FnOnce(&DataStore) -> R,
{
    let store = TestStore::memory();
    f(&store)
}

/// Runs a test with a store in a temporary directory.
pub fn with_file_store<F, R>(f: F) -> R
where
    F: FnOnce(&DataStore) -> R,
{
    let store = TestStore::file();
    f(&store)
}

/// Waits until `txn` is queued for `key` in `mode`.
///
/// # Panics
///
/// Panics if the store does not use locking, or if the transaction is not
/// seen waiting within five seconds.
pub fn wait_for_waiter(store: &DataStore, key: &AccessKey, txn: TransactionId, mode: LockMode) {
    let manager = store
        .access()
        .lock_manager()
        .expect("store does not use a locking coordinator");
    let deadline = Instant::now() + Duration::from_secs(5);
    while !manager
        .waiters(key)
        .iter()
        .any(|w| w.txn == txn && w.mode == mode)
    {
        assert!(
            Instant::now() < deadline,
            "{txn} never waited for {mode:?} on {key}"
        );
        thread::sleep(Duration::from_millis(1));
    }
}

/// Returns the modes in which `key` is currently held, by transaction.
///
/// # Panics
///
/// Panics if the store does not use locking.
pub fn lock_owners(store: &DataStore, key: &AccessKey) -> Vec<(TransactionId, LockMode)> {
    let manager = store
        .access()
        .lock_manager()
        .expect("store does not use a locking coordinator");
    let mut owners: Vec<_> = manager.owners(key).into_iter().map(|o| (o.txn, o.mode)).collect();
    owners.sort_by_key(|(txn, _)| *txn);
    owners
}
