//! Transactions.
//!
//! A [`Transaction`] is created by the [`TransactionCoordinator`] and
//! collects [`TransactionParticipant`]s as it runs. On commit every
//! participant except the last is prepared; participants that report no
//! changes are dropped, the last one prepares and commits in one step, and
//! the remaining prepared participants are then committed. A failure while
//! preparing aborts every participant.

mod coordinator;
mod participant;
mod state;

pub use coordinator::TransactionCoordinator;
pub use participant::TransactionParticipant;
pub use state::{Transaction, TransactionStatus};
