//! Lock manager.
//!
//! A [`LockManager`] owns every lock queue. Each queue tracks the requests
//! that currently own a key and the requests waiting for it. Transactions
//! are represented by a [`Locker`], which records what the transaction is
//! waiting for and whether its waiting has already failed.
//!
//! ## Rules
//!
//! - `Read` locks are shared, `Write` locks are exclusive
//! - a `Read` request also queues behind requests that are already waiting,
//!   so writers are not starved
//! - upgrading an owned `Read` to `Write` does not queue behind the
//!   upgrader itself, and upgrade waiters go ahead of other waiters
//! - waiting ends when the lock is granted, when
//!   `min(now + lock_timeout, deadline)` passes, or when deadlock detection
//!   picks the locker as victim
//! - a failed wait is remembered: every later request by the same locker
//!   fails the same way
//!
//! Mutexes are always taken in the order locker state, then key map, and
//! no thread ever holds two of either kind.

mod deadlock;
mod locker;
mod manager;
mod queue;

pub use locker::Locker;
pub use manager::{LockHolder, LockManager};

use crate::types::TransactionId;
use std::fmt;
use thiserror::Error;

/// Lock mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    /// Shared access.
    Read,
    /// Exclusive access.
    Write,
}

impl LockMode {
    /// Returns true for [`LockMode::Write`].
    #[must_use]
    pub const fn is_write(self) -> bool {
        matches!(self, Self::Write)
    }
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Read => "read",
            Self::Write => "write",
        })
    }
}

/// Why a lock request was not granted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockError {
    /// The request is queued behind another transaction. Only returned by
    /// [`LockManager::lock_no_wait`].
    #[error("lock blocked by {conflicting}")]
    Blocked {
        /// A transaction the request waits for.
        conflicting: TransactionId,
    },

    /// The wait exceeded the lock timeout or the transaction deadline.
    #[error("lock wait timed out, blocked by {conflicting}")]
    Timeout {
        /// A transaction the request was waiting for.
        conflicting: TransactionId,
    },

    /// The locker was chosen as the victim of a deadlock.
    #[error("deadlock detected with {conflicting}")]
    Deadlock {
        /// Another transaction in the cycle.
        conflicting: TransactionId,
    },

    /// The locker was used in a way the lock manager does not allow.
    #[error("illegal lock state: {0}")]
    IllegalState(String),
}

impl LockError {
    /// Returns the transaction this error names, if any.
    #[must_use]
    pub fn conflicting(&self) -> Option<TransactionId> {
        match self {
            Self::Blocked { conflicting }
            | Self::Timeout { conflicting }
            | Self::Deadlock { conflicting } => Some(*conflicting),
            Self::IllegalState(_) => None,
        }
    }
}

/// Result type for lock operations.
pub type LockResult<T> = Result<T, LockError>;
