//! # darkstore Storage
//!
//! Ordered byte-key storage backends for darkstore.
//!
//! This crate provides the lowest-level storage abstraction for darkstore.
//! Backends are **opaque ordered byte stores**: a fixed set of tables, each
//! mapping byte keys to byte values in unsigned lexicographic order.
//!
//! ## Design Principles
//!
//! - Backends do not interpret keys or values
//! - A batch of writes is applied atomically
//! - Must be `Send + Sync` for concurrent access
//! - Transactions are an overlay ([`BackendTransaction`]) above the backend
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - For testing and ephemeral storage
//! - [`FileBackend`] - For persistent storage in a checksummed log
//!
//! ## Example
//!
//! ```rust
//! use darkstore_storage::{BackendTransaction, InMemoryBackend, StorageBackend, Table};
//! use std::sync::Arc;
//!
//! let backend: Arc<dyn StorageBackend> = Arc::new(InMemoryBackend::new());
//! let mut txn = BackendTransaction::begin(backend.clone());
//! txn.put(Table::Names, b"hello", b"world");
//! assert_eq!(backend.get(Table::Names, b"hello").unwrap(), None);
//! txn.commit(false).unwrap();
//! assert_eq!(backend.get(Table::Names, b"hello").unwrap(), Some(b"world".to_vec()));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;
pub mod record;
mod table;
mod txn;

pub use backend::{IsolationLevel, StorageBackend};
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
pub use table::{BatchOp, Entry, Table, WriteBatch};
pub use txn::BackendTransaction;
