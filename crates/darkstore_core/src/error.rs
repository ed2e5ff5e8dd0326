//! Error types for darkstore core.

use crate::lock::LockError;
use crate::types::{ClassId, ObjectId, TransactionId};
use std::fmt;
use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in darkstore core operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The object does not exist or only holds a placeholder.
    #[error("object not found: {oid}")]
    ObjectNotFound {
        /// The object ID that was not found.
        oid: ObjectId,
    },

    /// The name is not bound.
    #[error("name not bound: {name:?}")]
    NameNotBound {
        /// The name that was looked up.
        name: String,
    },

    /// No class descriptor has this ID.
    #[error("class info not found: {id}")]
    ClassInfoNotFound {
        /// The class ID that was looked up.
        id: ClassId,
    },

    /// An argument was rejected.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the problem.
        message: String,
    },

    /// The transaction has already committed, aborted, or prepared read-only.
    #[error("transaction not active: {txn}")]
    TransactionNotActive {
        /// The transaction.
        txn: TransactionId,
    },

    /// The operation is not allowed in the current state.
    #[error("illegal state: {message}")]
    IllegalState {
        /// Description of why the operation is not allowed.
        message: String,
    },

    /// A lock wait or the transaction deadline expired.
    #[error("transaction {txn} timed out{}", fmt_conflict(.conflicting))]
    Timeout {
        /// The transaction that timed out.
        txn: TransactionId,
        /// A transaction it was waiting for, if known.
        conflicting: Option<TransactionId>,
    },

    /// The transaction was chosen as a deadlock victim.
    #[error("transaction {txn} aborted by deadlock with {conflicting}")]
    Deadlock {
        /// The victim.
        txn: TransactionId,
        /// Another transaction in the cycle.
        conflicting: TransactionId,
    },

    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] darkstore_storage::StorageError),

    /// Key codec error.
    #[error("codec error: {0}")]
    Codec(#[from] darkstore_codec::CodecError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Persisted metadata is missing or malformed.
    #[error("invalid store format: {message}")]
    InvalidFormat {
        /// Description of the format issue.
        message: String,
    },

    /// Another process has the store directory open.
    #[error("store locked: another process has exclusive access")]
    StoreLocked,
}

fn fmt_conflict(conflicting: &Option<TransactionId>) -> String {
    conflicting.map_or_else(String::new, |t| format!(" waiting for {t}"))
}

/// The broad class of a [`StoreError`], for callers that branch on errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// An object, binding or class descriptor does not exist.
    NotFound,
    /// A caller passed a bad argument.
    InvalidArgument,
    /// The transaction is no longer active.
    TransactionInactive,
    /// The call is not allowed in the current state.
    IllegalState,
    /// A lock wait or deadline expired. Retrying in a new transaction may succeed.
    Timeout,
    /// The transaction lost a deadlock. Retrying in a new transaction may succeed.
    Deadlock,
    /// The backend or its files failed.
    BackendFailure,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotFound => "not found",
            Self::InvalidArgument => "invalid argument",
            Self::TransactionInactive => "transaction inactive",
            Self::IllegalState => "illegal state",
            Self::Timeout => "timeout",
            Self::Deadlock => "deadlock",
            Self::BackendFailure => "backend failure",
        };
        f.write_str(name)
    }
}

impl StoreError {
    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates an illegal state error.
    pub fn illegal_state(message: impl Into<String>) -> Self {
        Self::IllegalState {
            message: message.into(),
        }
    }

    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Creates a not-bound error.
    pub fn name_not_bound(name: impl Into<String>) -> Self {
        Self::NameNotBound { name: name.into() }
    }

    /// Converts a failed lock request into the error reported for `txn`.
    pub fn from_lock(txn: TransactionId, error: LockError) -> Self {
        match error {
            LockError::Timeout { conflicting } | LockError::Blocked { conflicting } => {
                Self::Timeout {
                    txn,
                    conflicting: Some(conflicting),
                }
            }
            LockError::Deadlock { conflicting } => Self::Deadlock { txn, conflicting },
            LockError::IllegalState(message) => Self::IllegalState { message },
        }
    }

    /// Returns the kind of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ObjectNotFound { .. } | Self::NameNotBound { .. } | Self::ClassInfoNotFound { .. } => {
                ErrorKind::NotFound
            }
            Self::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            Self::TransactionNotActive { .. } => ErrorKind::TransactionInactive,
            Self::IllegalState { .. } => ErrorKind::IllegalState,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Deadlock { .. } => ErrorKind::Deadlock,
            Self::Storage(_)
            | Self::Codec(_)
            | Self::Io(_)
            | Self::InvalidFormat { .. }
            | Self::StoreLocked => ErrorKind::BackendFailure,
        }
    }

    /// Returns true for errors that mean "does not exist".
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Returns true for [`ErrorKind::InvalidArgument`].
    #[must_use]
    pub fn is_invalid_argument(&self) -> bool {
        self.kind() == ErrorKind::InvalidArgument
    }

    /// Returns true if the error aborted the transaction and a fresh
    /// transaction may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Timeout | ErrorKind::Deadlock)
    }
}

/// A shareable record of why a transaction was aborted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbortCause {
    /// Kind of the error that caused the abort, or `None` if the abort was
    /// requested by the caller.
    pub kind: Option<ErrorKind>,
    /// Description of the cause.
    pub message: String,
}

impl AbortCause {
    /// Creates a cause with the given kind and message.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind: Some(kind),
            message: message.into(),
        }
    }

    /// Creates the cause recorded when the caller asks for an abort.
    pub fn requested(message: impl Into<String>) -> Self {
        Self {
            kind: None,
            message: message.into(),
        }
    }

    /// Returns true if the abort followed a timeout or deadlock.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, Some(ErrorKind::Timeout | ErrorKind::Deadlock))
    }
}

impl From<&StoreError> for AbortCause {
    fn from(error: &StoreError) -> Self {
        Self::new(error.kind(), error.to_string())
    }
}

impl fmt::Display for AbortCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            Some(kind) => write!(f, "{kind}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}
