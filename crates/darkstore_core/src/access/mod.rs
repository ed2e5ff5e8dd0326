//! Access coordination.
//!
//! Store operations announce every object and name they touch to an
//! [`AccessCoordinator`] before touching it. The locking coordinator turns
//! those announcements into read and write locks held until the
//! transaction ends; the null coordinator grants everything.

mod locking;
mod null;

pub use locking::LockingAccessCoordinator;
pub use null::NullAccessCoordinator;

use crate::config::CoordinatorKind;
use crate::error::StoreResult;
use crate::lock::{LockManager, LockMode};
use crate::transaction::Transaction;
use crate::types::ObjectId;
use std::fmt;
use std::time::Instant;

/// A resource guarded by the access coordinator.
///
/// `NameEnd` stands for the position after the last bound name, so that
/// scans reaching the end of the namespace conflict with inserts there.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AccessKey {
    /// A stored object.
    Object(ObjectId),
    /// A name in the binding namespace.
    Name(String),
    /// The end of the binding namespace.
    NameEnd,
}

impl AccessKey {
    /// Returns the key for a name, or [`AccessKey::NameEnd`] for `None`.
    #[must_use]
    pub fn name_or_end(name: Option<&str>) -> Self {
        name.map_or(Self::NameEnd, |n| Self::Name(n.to_owned()))
    }
}

impl fmt::Display for AccessKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Object(oid) => fmt::Display::fmt(oid, f),
            Self::Name(name) => write!(f, "name:{name:?}"),
            Self::NameEnd => f.write_str("name:<end>"),
        }
    }
}

/// Decides whether a transaction may access a resource.
pub trait AccessCoordinator: Send + Sync + fmt::Debug {
    /// Called for every new transaction before it performs any operation.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::IllegalState`] if the transaction is
    /// already known.
    fn notify_new_transaction(
        &self,
        txn: &Transaction,
        requested_start: Instant,
        try_count: u32,
    ) -> StoreResult<()>;

    /// Requests access to `key`, blocking until it is granted.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::Timeout`] or
    /// [`crate::StoreError::Deadlock`] if access cannot be granted, or
    /// [`crate::StoreError::TransactionNotActive`] for an unknown
    /// transaction.
    fn acquire(&self, txn: &Transaction, key: &AccessKey, mode: LockMode) -> StoreResult<()>;

    /// Requests shared access to `key`.
    ///
    /// # Errors
    ///
    /// See [`Self::acquire`].
    fn acquire_read(&self, txn: &Transaction, key: &AccessKey) -> StoreResult<()> {
        self.acquire(txn, key, LockMode::Read)
    }

    /// Requests exclusive access to `key`.
    ///
    /// # Errors
    ///
    /// See [`Self::acquire`].
    fn acquire_write(&self, txn: &Transaction, key: &AccessKey) -> StoreResult<()> {
        self.acquire(txn, key, LockMode::Write)
    }

    /// Drops everything held for `txn`.
    fn release_all(&self, txn: &Transaction);

    /// Which implementation this is.
    fn kind(&self) -> CoordinatorKind;

    /// The lock manager, for coordinators that have one.
    fn lock_manager(&self) -> Option<&LockManager<AccessKey>> {
        None
    }
}
