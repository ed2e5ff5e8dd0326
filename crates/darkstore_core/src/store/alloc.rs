//! Object ID blocks.
//!
//! IDs are reserved from the header in blocks. A transaction hands out IDs
//! from the blocks it holds; blocks that still have IDs left go back to a
//! shared pool when the transaction prepares or aborts. The last ID of every
//! block carries a placeholder record until the block has been used up, so
//! that recovery can find blocks whose allocating transaction never
//! finished.

use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap};

/// A contiguous range of object IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ObjectIdBlock {
    first: u64,
    next: u64,
    last: u64,
    abort_next: u64,
}

impl ObjectIdBlock {
    pub(crate) fn new(first: u64, size: u64) -> Self {
        Self {
            first,
            next: first,
            last: first + size - 1,
            abort_next: first,
        }
    }

    /// Marks the point to return to if the transaction taking the block aborts.
    pub(crate) fn init_txn(&mut self) {
        self.abort_next = self.next;
    }

    pub(crate) fn has_next(&self) -> bool {
        self.next <= self.last
    }

    /// Hands out the next ID. Returns it along with whether it is the
    /// block's first.
    pub(crate) fn take(&mut self) -> Option<(u64, bool)> {
        if !self.has_next() {
            return None;
        }
        let oid = self.next;
        self.next += 1;
        Some((oid, oid == self.first))
    }

    pub(crate) fn reset(&mut self) {
        self.next = self.abort_next;
    }

    pub(crate) fn last(&self) -> u64 {
        self.last
    }
}

#[derive(Debug)]
struct ByLast(ObjectIdBlock);

impl PartialEq for ByLast {
    fn eq(&self, other: &Self) -> bool {
        self.0.last == other.0.last
    }
}

impl Eq for ByLast {}

impl Ord for ByLast {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.last.cmp(&other.0.last)
    }
}

impl PartialOrd for ByLast {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Blocks not held by any transaction, plus the placeholder IDs that may
/// still be present.
#[derive(Debug, Default)]
pub(crate) struct FreeObjectIds {
    pool: BinaryHeap<Reverse<ByLast>>,
    placeholders: BTreeSet<u64>,
}

impl FreeObjectIds {
    /// Takes the pooled block with the lowest IDs.
    pub(crate) fn take(&mut self) -> Option<ObjectIdBlock> {
        self.pool.pop().map(|Reverse(ByLast(block))| block)
    }

    /// Records a newly reserved block's placeholder and returns the lowest
    /// outstanding placeholder ID.
    pub(crate) fn add_new_block(&mut self, block: &ObjectIdBlock) -> u64 {
        self.placeholders.insert(block.last);
        self.placeholders.first().copied().unwrap_or(block.last)
    }

    /// Returns a block with IDs left to the pool.
    pub(crate) fn put_back(&mut self, block: ObjectIdBlock) {
        debug_assert!(block.has_next());
        self.pool.push(Reverse(ByLast(block)));
    }

    /// Forgets the placeholder of a block that has been used up.
    pub(crate) fn placeholder_removed(&mut self, last: u64) {
        self.placeholders.remove(&last);
    }

    pub(crate) fn pooled(&self) -> usize {
        self.pool.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_hands_out_in_order() {
        let mut block = ObjectIdBlock::new(11, 3);
        assert_eq!(block.take(), Some((11, true)));
        assert_eq!(block.take(), Some((12, false)));
        assert_eq!(block.take(), Some((13, false)));
        assert_eq!(block.take(), None);
        assert_eq!(block.last(), 13);
    }

    #[test]
    fn reset_returns_to_transaction_start() {
        let mut block = ObjectIdBlock::new(1, 10);
        block.take();
        block.init_txn();
        block.take();
        block.take();
        block.reset();
        assert_eq!(block.take(), Some((2, false)));
    }

    #[test]
    fn pool_prefers_lowest_block() {
        let mut free = FreeObjectIds::default();
        free.put_back(ObjectIdBlock::new(21, 10));
        free.put_back(ObjectIdBlock::new(1, 10));
        free.put_back(ObjectIdBlock::new(11, 10));
        assert_eq!(free.pooled(), 3);
        assert_eq!(free.take().unwrap().last(), 10);
        assert_eq!(free.take().unwrap().last(), 20);
        assert_eq!(free.take().unwrap().last(), 30);
        assert!(free.take().is_none());
    }

    #[test]
    fn first_placeholder_tracks_oldest_block() {
        let mut free = FreeObjectIds::default();
        let a = ObjectIdBlock::new(1, 10);
        let b = ObjectIdBlock::new(11, 10);
        assert_eq!(free.add_new_block(&a), 10);
        assert_eq!(free.add_new_block(&b), 10);
        free.placeholder_removed(10);
        let c = ObjectIdBlock::new(21, 10);
        assert_eq!(free.add_new_block(&c), 20);
    }
}
