//! Storage backend trait definition.

use crate::error::StorageResult;
use crate::table::{Entry, Table, WriteBatch};
use std::fmt;
use std::ops::Bound;

/// Isolation level requested from a backend.
///
/// This is a hint. The data store performs its own locking above the
/// backend, so a backend that can only offer one level simply reports
/// what it was asked for and behaves as `ReadCommitted` or better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    /// Reads may observe uncommitted writes of other transactions.
    ReadUncommitted,
    /// Reads observe only committed data.
    ReadCommitted,
    /// Reads are repeatable for the life of a transaction.
    RepeatableRead,
    /// Full serializability.
    #[default]
    Serializable,
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ReadUncommitted => "read-uncommitted",
            Self::ReadCommitted => "read-committed",
            Self::RepeatableRead => "repeatable-read",
            Self::Serializable => "serializable",
        };
        f.write_str(name)
    }
}

/// An ordered byte-key store with a fixed set of tables.
///
/// Backends are **opaque byte stores**: they order keys by unsigned
/// byte-lexicographic comparison and never interpret keys or values.
/// All key encoding is done by the caller.
///
/// # Invariants
///
/// - `apply` is atomic: after a crash either every mutation of a batch is
///   visible or none is
/// - reads never observe a partially applied batch
/// - after `close`, every operation fails with [`crate::StorageError::Closed`]
/// - backends must be `Send + Sync` for concurrent access
///
/// # Implementors
///
/// - [`super::InMemoryBackend`] - For testing
/// - [`super::FileBackend`] - For persistent storage
pub trait StorageBackend: Send + Sync + fmt::Debug {
    /// Returns the value stored under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is closed or an I/O error occurs.
    fn get(&self, table: Table, key: &[u8]) -> StorageResult<Option<Vec<u8>>>;

    /// Returns the first entry whose key lies after `from`.
    ///
    /// `Bound::Included(k)` accepts `k` itself, `Bound::Excluded(k)` starts
    /// strictly after it, and `Bound::Unbounded` returns the first entry of
    /// the table.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is closed or an I/O error occurs.
    fn next_entry(&self, table: Table, from: Bound<&[u8]>) -> StorageResult<Option<Entry>>;

    /// Returns the last entry whose key lies before `before`.
    ///
    /// `Bound::Unbounded` returns the last entry of the table.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is closed or an I/O error occurs.
    fn prev_entry(&self, table: Table, before: Bound<&[u8]>) -> StorageResult<Option<Entry>>;

    /// Applies every mutation in `batch` atomically.
    ///
    /// When `sync` is true the batch is durable once this returns.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is closed or the write fails. On
    /// error none of the batch is visible.
    fn apply(&self, batch: &WriteBatch, sync: bool) -> StorageResult<()>;

    /// Forces all applied batches to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush operation fails.
    fn flush(&self) -> StorageResult<()>;

    /// Flushes and closes the backend. Closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the final flush fails.
    fn close(&self) -> StorageResult<()>;

    /// Returns the isolation level this backend was opened with.
    fn isolation(&self) -> IsolationLevel;
}
