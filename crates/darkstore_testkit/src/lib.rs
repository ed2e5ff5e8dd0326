//! # darkstore Testkit
//!
//! Test utilities for darkstore.
//!
//! This crate provides:
//! - Store fixtures, in memory or in a temporary directory
//! - [`TxnRunner`], which drives one transaction from its own thread so
//!   tests can interleave conflicting transactions
//! - Property-based test generators using proptest
//! - Stress testing utilities
//!
//! ## Usage
//!
//! ```rust,ignore
//! use darkstore_testkit::prelude::*;
//!
//! #[test]
//! fn reader_blocks_writer() {
//!     let store = TestStore::memory();
//!     let reader = TxnRunner::begin(&store);
//!     let writer = TxnRunner::begin(&store);
//!     // ...
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod runner;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::runner::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
pub use runner::*;
pub use stress::*;
