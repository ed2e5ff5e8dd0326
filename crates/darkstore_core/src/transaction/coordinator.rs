//! Transaction creation and completion.

use super::state::Transaction;
use crate::access::AccessCoordinator;
use crate::error::{AbortCause, StoreError, StoreResult};
use crate::types::TransactionId;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Hands out transactions and drives their commit and abort.
///
/// Every new transaction is announced to the access coordinator before it
/// is returned, so lock state exists before the first operation.
pub struct TransactionCoordinator {
    next_id: AtomicU64,
    default_timeout: Duration,
    access: Arc<dyn AccessCoordinator>,
}

impl TransactionCoordinator {
    pub(crate) fn new(default_timeout: Duration, access: Arc<dyn AccessCoordinator>) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            default_timeout,
            access,
        }
    }

    /// Returns the timeout given to transactions begun without one.
    #[must_use]
    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Begins a transaction with the default timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the access coordinator refuses the transaction.
    pub fn begin(&self) -> StoreResult<Transaction> {
        self.begin_with_timeout(self.default_timeout)
    }

    /// Begins a transaction with the given timeout.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidArgument`] for a zero timeout, or an
    /// error from the access coordinator.
    pub fn begin_with_timeout(&self, timeout: Duration) -> StoreResult<Transaction> {
        self.begin_retry(timeout, Instant::now(), 1)
    }

    /// Begins a transaction that retries work first requested at
    /// `requested_start`. `try_count` counts attempts, starting at 1.
    ///
    /// Retried transactions keep their original start, which makes them
    /// older in deadlock resolution.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidArgument`] for a zero timeout or try
    /// count, or an error from the access coordinator.
    pub fn begin_retry(
        &self,
        timeout: Duration,
        requested_start: Instant,
        try_count: u32,
    ) -> StoreResult<Transaction> {
        if timeout.is_zero() {
            return Err(StoreError::invalid_argument(
                "transaction timeout must be greater than 0",
            ));
        }
        if try_count == 0 {
            return Err(StoreError::invalid_argument("try count must be at least 1"));
        }
        let id = TransactionId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let txn = Transaction::new(id, timeout);
        debug!(txn = %id, ?timeout, try_count, "begin");
        self.access
            .notify_new_transaction(&txn, requested_start, try_count)?;
        Ok(txn)
    }

    /// Commits a transaction.
    ///
    /// # Errors
    ///
    /// Returns the error that made a participant fail to prepare, after
    /// aborting the transaction, or [`StoreError::TransactionNotActive`] if
    /// it already ended.
    pub fn commit(&self, txn: &Transaction) -> StoreResult<()> {
        txn.commit()
    }

    /// Aborts a transaction at the caller's request.
    ///
    /// # Errors
    ///
    /// See [`Transaction::abort`].
    pub fn abort(&self, txn: &Transaction) -> StoreResult<()> {
        txn.abort(AbortCause::requested("aborted by caller"))
    }

    /// Aborts a transaction with the given cause.
    ///
    /// # Errors
    ///
    /// See [`Transaction::abort`].
    pub fn abort_with(&self, txn: &Transaction, cause: AbortCause) -> StoreResult<()> {
        txn.abort(cause)
    }
}

impl fmt::Debug for TransactionCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionCoordinator")
            .field("next_id", &self.next_id.load(Ordering::Relaxed))
            .field("default_timeout", &self.default_timeout)
            .field("access", &self.access.kind())
            .finish()
    }
}
