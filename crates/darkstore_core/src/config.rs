//! Store configuration.

use crate::error::{StoreError, StoreResult};
use darkstore_storage::IsolationLevel;
use std::path::PathBuf;
use std::time::Duration;

/// Lock timeout used when no transaction timeout is configured.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(100);

/// Fraction of the transaction timeout used as the default lock timeout.
const LOCK_TIMEOUT_PROPORTION: f64 = 0.1;

/// Which access coordinator guards objects and bindings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CoordinatorKind {
    /// Read/write locks with timeout and deadlock detection.
    #[default]
    Locking,
    /// Grants every request at once. Only correct when something else
    /// already serializes conflicting transactions.
    Null,
}

/// Configuration for opening a data store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Directory holding the store's files. `None` keeps everything in memory.
    pub directory: Option<PathBuf>,

    /// Maximum time a single lock wait may take. `None` derives it from
    /// the transaction timeout.
    pub lock_timeout: Option<Duration>,

    /// Default transaction timeout.
    pub txn_timeout: Duration,

    /// Whether to sync the log on every commit (safer but slower).
    pub sync_on_commit: bool,

    /// Isolation hint passed to the backend.
    pub isolation: IsolationLevel,

    /// Number of object IDs reserved at a time.
    pub allocation_block_size: u64,

    /// Number of independently locked stripes in the lock table.
    pub num_key_maps: usize,

    /// Access coordinator implementation.
    pub coordinator: CoordinatorKind,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            directory: None,
            lock_timeout: None,
            txn_timeout: Duration::from_secs(1),
            sync_on_commit: false,
            isolation: IsolationLevel::Serializable,
            allocation_block_size: 100,
            num_key_maps: 8,
            coordinator: CoordinatorKind::Locking,
        }
    }
}

impl StoreConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the store directory.
    #[must_use]
    pub fn directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.directory = Some(path.into());
        self
    }

    /// Sets the lock timeout.
    #[must_use]
    pub const fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = Some(timeout);
        self
    }

    /// Sets the default transaction timeout.
    #[must_use]
    pub const fn txn_timeout(mut self, timeout: Duration) -> Self {
        self.txn_timeout = timeout;
        self
    }

    /// Sets whether to sync the log on every commit.
    #[must_use]
    pub const fn sync_on_commit(mut self, value: bool) -> Self {
        self.sync_on_commit = value;
        self
    }

    /// Sets the isolation hint.
    #[must_use]
    pub const fn isolation(mut self, level: IsolationLevel) -> Self {
        self.isolation = level;
        self
    }

    /// Sets the allocation block size.
    #[must_use]
    pub const fn allocation_block_size(mut self, size: u64) -> Self {
        self.allocation_block_size = size;
        self
    }

    /// Sets the number of lock table stripes.
    #[must_use]
    pub const fn num_key_maps(mut self, count: usize) -> Self {
        self.num_key_maps = count;
        self
    }

    /// Sets the access coordinator.
    #[must_use]
    pub const fn coordinator(mut self, kind: CoordinatorKind) -> Self {
        self.coordinator = kind;
        self
    }

    /// Returns the lock timeout in force: the configured value, or a tenth
    /// of the transaction timeout with a floor of 1 ms.
    #[must_use]
    pub fn effective_lock_timeout(&self) -> Duration {
        match self.lock_timeout {
            Some(timeout) => timeout,
            None if self.txn_timeout.is_zero() => DEFAULT_LOCK_TIMEOUT,
            None => self
                .txn_timeout
                .mul_f64(LOCK_TIMEOUT_PROPORTION)
                .max(Duration::from_millis(1)),
        }
    }

    /// Checks the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidArgument`] for a zero block size,
    /// stripe count or timeout, or a block size too large for the ID space.
    pub fn validate(&self) -> StoreResult<()> {
        if self.allocation_block_size == 0 {
            return Err(StoreError::invalid_argument(
                "allocation block size must be greater than 0",
            ));
        }
        if self.allocation_block_size > i32::MAX as u64 {
            return Err(StoreError::invalid_argument(format!(
                "allocation block size {} is too large",
                self.allocation_block_size
            )));
        }
        if self.num_key_maps == 0 {
            return Err(StoreError::invalid_argument(
                "number of key maps must be greater than 0",
            ));
        }
        if self.txn_timeout.is_zero() {
            return Err(StoreError::invalid_argument(
                "transaction timeout must be greater than 0",
            ));
        }
        if self.lock_timeout.is_some_and(|t| t.is_zero()) {
            return Err(StoreError::invalid_argument(
                "lock timeout must be greater than 0",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = StoreConfig::default();
        assert!(config.directory.is_none());
        assert!(!config.sync_on_commit);
        assert_eq!(config.allocation_block_size, 100);
        assert_eq!(config.num_key_maps, 8);
        assert_eq!(config.coordinator, CoordinatorKind::Locking);
        assert_eq!(config.effective_lock_timeout(), Duration::from_millis(100));
        config.validate().unwrap();
    }

    #[test]
    fn builder_pattern() {
        let config = StoreConfig::new()
            .directory("/tmp/store")
            .lock_timeout(Duration::from_millis(7))
            .sync_on_commit(true)
            .allocation_block_size(10)
            .coordinator(CoordinatorKind::Null);

        assert_eq!(config.directory, Some(PathBuf::from("/tmp/store")));
        assert_eq!(config.effective_lock_timeout(), Duration::from_millis(7));
        assert!(config.sync_on_commit);
        assert_eq!(config.allocation_block_size, 10);
        assert_eq!(config.coordinator, CoordinatorKind::Null);
    }

    #[test]
    fn lock_timeout_derived_from_txn_timeout() {
        let config = StoreConfig::new().txn_timeout(Duration::from_millis(500));
        assert_eq!(config.effective_lock_timeout(), Duration::from_millis(50));

        let tiny = StoreConfig::new().txn_timeout(Duration::from_micros(100));
        assert_eq!(tiny.effective_lock_timeout(), Duration::from_millis(1));
    }

    #[test]
    fn invalid_values_rejected() {
        for config in [
            StoreConfig::new().allocation_block_size(0),
            StoreConfig::new().num_key_maps(0),
            StoreConfig::new().txn_timeout(Duration::ZERO),
            StoreConfig::new().lock_timeout(Duration::ZERO),
        ] {
            assert!(config.validate().unwrap_err().is_invalid_argument());
        }
    }
}
