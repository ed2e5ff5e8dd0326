//! The two-phase participant contract.

use super::Transaction;
use crate::error::StoreResult;
use std::fmt;

/// A component that takes part in a [`Transaction`] and is driven through
/// prepare, commit and abort by the transaction's coordinator.
///
/// A transaction has at most one durable participant; it is always driven
/// last, so that non-durable participants (such as the locking access
/// coordinator) finish after the durable state has been committed.
pub trait TransactionParticipant: Send + Sync + fmt::Debug {
    /// Prepares to commit.
    ///
    /// Returns `true` if the participant made no changes, in which case it
    /// has already finished and must not be committed.
    ///
    /// # Errors
    ///
    /// Returns an error if the participant cannot commit; the coordinator
    /// then aborts the transaction.
    fn prepare(&self, txn: &Transaction) -> StoreResult<bool>;

    /// Commits a transaction whose `prepare` returned `false`.
    ///
    /// # Errors
    ///
    /// Returns an error if the participant was not prepared. Errors are
    /// logged by the coordinator; the transaction still commits.
    fn commit(&self, txn: &Transaction) -> StoreResult<()>;

    /// Prepares and commits in one step.
    ///
    /// # Errors
    ///
    /// Returns an error if the participant cannot commit; the coordinator
    /// then aborts the transaction.
    fn prepare_and_commit(&self, txn: &Transaction) -> StoreResult<()>;

    /// Discards all changes made by the transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the participant does not know the transaction.
    /// Errors are logged by the coordinator.
    fn abort(&self, txn: &Transaction) -> StoreResult<()>;

    /// Returns false for participants whose state does not survive a
    /// restart.
    fn is_durable(&self) -> bool {
        true
    }

    /// Name used in log messages.
    fn type_name(&self) -> &'static str;
}
