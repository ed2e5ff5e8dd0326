//! In-memory storage backend for testing.

use crate::backend::{IsolationLevel, StorageBackend};
use crate::error::{StorageError, StorageResult};
use crate::table::{Entry, Table, TableSet, WriteBatch};
use parking_lot::RwLock;
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, Ordering};

/// An in-memory storage backend.
///
/// This backend stores all tables in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral stores that don't need persistence
///
/// # Thread Safety
///
/// This backend is thread-safe and can be shared across threads. A batch
/// is applied under a single write lock, so readers see all of it or none.
///
/// # Example
///
/// ```rust
/// use darkstore_storage::{InMemoryBackend, StorageBackend, Table, WriteBatch};
///
/// let backend = InMemoryBackend::new();
/// let mut batch = WriteBatch::new();
/// batch.put(Table::Names, b"alpha".to_vec(), b"1".to_vec());
/// backend.apply(&batch, false).unwrap();
/// assert_eq!(backend.get(Table::Names, b"alpha").unwrap(), Some(b"1".to_vec()));
/// ```
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    tables: RwLock<TableSet>,
    isolation: IsolationLevel,
    closed: AtomicBool,
}

impl InMemoryBackend {
    /// Creates a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty backend reporting the given isolation level.
    #[must_use]
    pub fn with_isolation(isolation: IsolationLevel) -> Self {
        Self {
            isolation,
            ..Self::default()
        }
    }

    /// Returns the number of records in a table.
    ///
    /// Useful for testing and debugging.
    #[must_use]
    pub fn len(&self, table: Table) -> usize {
        self.tables.read().len(table)
    }

    /// Returns true if the table holds no records.
    #[must_use]
    pub fn is_empty(&self, table: Table) -> bool {
        self.len(table) == 0
    }

    fn check_open(&self) -> StorageResult<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(StorageError::Closed)
        } else {
            Ok(())
        }
    }
}

impl StorageBackend for InMemoryBackend {
    fn get(&self, table: Table, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        self.check_open()?;
        Ok(self.tables.read().get(table, key))
    }

    fn next_entry(&self, table: Table, from: Bound<&[u8]>) -> StorageResult<Option<Entry>> {
        self.check_open()?;
        Ok(self.tables.read().next_entry(table, from))
    }

    fn prev_entry(&self, table: Table, before: Bound<&[u8]>) -> StorageResult<Option<Entry>> {
        self.check_open()?;
        Ok(self.tables.read().prev_entry(table, before))
    }

    fn apply(&self, batch: &WriteBatch, _sync: bool) -> StorageResult<()> {
        self.check_open()?;
        if !batch.is_empty() {
            self.tables.write().apply(batch);
        }
        Ok(())
    }

    fn flush(&self) -> StorageResult<()> {
        // In-memory backend has no pending writes
        self.check_open()
    }

    fn close(&self) -> StorageResult<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    fn isolation(&self) -> IsolationLevel {
        self.isolation
    }
}
