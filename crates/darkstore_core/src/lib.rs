//! # darkstore Core
//!
//! Transactional object store with an ordered name namespace.
//!
//! This crate provides:
//! - [`DataStore`]: objects keyed by [`ObjectId`], name bindings and class
//!   descriptor interning, with block ID allocation and placeholder recovery
//! - [`LockManager`]: read/write locks with timeouts and deadlock detection
//! - Access coordinators: [`LockingAccessCoordinator`] and
//!   [`NullAccessCoordinator`]
//! - [`Transaction`] and [`TransactionCoordinator`], driving participants
//!   through prepare, commit and abort
//!
//! ## Isolation
//!
//! Objects are protected by two-phase locking. Name bindings use next-key
//! locking: operations that depend on which names exist also lock the name
//! that follows, re-checking it after every wait, so scans and lookups of
//! absent names are serializable.
//!
//! ## Example
//!
//! ```rust
//! use darkstore_core::{DataStore, StoreConfig};
//!
//! let store = DataStore::open(StoreConfig::default()).unwrap();
//! let oid = store
//!     .transaction(|txn| {
//!         let oid = store.create_object(txn)?;
//!         store.set_object(txn, oid, &[1, 2])?;
//!         Ok(oid)
//!     })
//!     .unwrap();
//!
//! let txn = store.begin().unwrap();
//! assert_eq!(store.get_object(&txn, oid, false).unwrap(), vec![1, 2]);
//! assert_eq!(store.next_bound_name(&txn, None).unwrap(), None);
//! store.commit(&txn).unwrap();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod access;
mod config;
mod dir;
mod error;
pub mod lock;
mod stats;
mod store;
mod transaction;
mod types;

pub use access::{AccessCoordinator, AccessKey, LockingAccessCoordinator, NullAccessCoordinator};
pub use config::{CoordinatorKind, StoreConfig, DEFAULT_LOCK_TIMEOUT};
pub use dir::StoreDir;
pub use error::{AbortCause, ErrorKind, StoreError, StoreResult};
pub use lock::{LockError, LockManager, LockMode, Locker};
pub use stats::{StatsSnapshot, StoreStats};
pub use store::DataStore;
pub use transaction::{Transaction, TransactionCoordinator, TransactionParticipant, TransactionStatus};
pub use types::{ClassId, ObjectId, TransactionId};

#[cfg(any(test, feature = "testing"))]
pub use store::plant_orphan_placeholder;

// Re-export the storage layer for embedders supplying their own backend.
pub use darkstore_storage::{FileBackend, InMemoryBackend, IsolationLevel, StorageBackend};
