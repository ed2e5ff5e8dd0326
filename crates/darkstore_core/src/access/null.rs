use super::{AccessCoordinator, AccessKey};
use crate::config::CoordinatorKind;
use crate::error::StoreResult;
use crate::lock::LockMode;
use crate::transaction::Transaction;
use std::time::Instant;

/// An access coordinator that grants every request and keeps no state.
#[derive(Debug, Default)]
pub struct NullAccessCoordinator;

impl NullAccessCoordinator {
    /// Creates the coordinator.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl AccessCoordinator for NullAccessCoordinator {
    fn notify_new_transaction(
        &self,
        _txn: &Transaction,
        _requested_start: Instant,
        _try_count: u32,
    ) -> StoreResult<()> {
        Ok(())
    }

    fn acquire(&self, _txn: &Transaction, _key: &AccessKey, _mode: LockMode) -> StoreResult<()> {
        Ok(())
    }

    fn release_all(&self, _txn: &Transaction) {}

    fn kind(&self) -> CoordinatorKind {
        CoordinatorKind::Null
    }
}
