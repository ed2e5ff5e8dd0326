//! Backend transactions.
//!
//! A [`BackendTransaction`] buffers writes in a private overlay on top of a
//! shared backend. Reads through the transaction see its own writes merged
//! with the committed state; other readers see nothing until `commit`
//! applies the overlay as one atomic batch.

use crate::backend::StorageBackend;
use crate::error::StorageResult;
use crate::table::{Entry, Table, WriteBatch};
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

/// Pending writes for one table. `None` marks a delete.
type Overlay = BTreeMap<Vec<u8>, Option<Vec<u8>>>;

#[derive(Clone, Copy)]
enum Direction {
    Forward,
    Backward,
}

/// A read-your-writes transaction over a [`StorageBackend`].
///
/// Dropping a transaction without committing discards its writes.
#[derive(Debug)]
pub struct BackendTransaction {
    backend: Arc<dyn StorageBackend>,
    overlay: [Overlay; Table::COUNT],
}

impl BackendTransaction {
    /// Begins a transaction against `backend`.
    #[must_use]
    pub fn begin(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            backend,
            overlay: Default::default(),
        }
    }

    /// Returns true if the transaction has buffered any write.
    #[must_use]
    pub fn is_modified(&self) -> bool {
        self.overlay.iter().any(|t| !t.is_empty())
    }

    /// Reads a record, seeing this transaction's own writes.
    ///
    /// # Errors
    ///
    /// Propagates backend errors.
    pub fn get(&self, table: Table, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        match self.overlay[table.index()].get(key) {
            Some(pending) => Ok(pending.clone()),
            None => self.backend.get(table, key),
        }
    }

    /// Buffers a put.
    pub fn put(&mut self, table: Table, key: &[u8], value: &[u8]) {
        self.overlay[table.index()].insert(key.to_vec(), Some(value.to_vec()));
    }

    /// Buffers a delete.
    pub fn delete(&mut self, table: Table, key: &[u8]) {
        self.overlay[table.index()].insert(key.to_vec(), None);
    }

    /// Returns the first visible entry after `from`.
    ///
    /// # Errors
    ///
    /// Propagates backend errors.
    pub fn next_entry(&self, table: Table, from: Bound<&[u8]>) -> StorageResult<Option<Entry>> {
        self.merged(table, from, Direction::Forward)
    }

    /// Returns the last visible entry before `before`.
    ///
    /// # Errors
    ///
    /// Propagates backend errors.
    pub fn prev_entry(&self, table: Table, before: Bound<&[u8]>) -> StorageResult<Option<Entry>> {
        self.merged(table, before, Direction::Backward)
    }

    fn merged(
        &self,
        table: Table,
        start: Bound<&[u8]>,
        direction: Direction,
    ) -> StorageResult<Option<Entry>> {
        let overlay = &self.overlay[table.index()];
        let mut bound: Bound<Vec<u8>> = match start {
            Bound::Included(k) => Bound::Included(k.to_vec()),
            Bound::Excluded(k) => Bound::Excluded(k.to_vec()),
            Bound::Unbounded => Bound::Unbounded,
        };

        loop {
            let bound_ref = match &bound {
                Bound::Included(k) => Bound::Included(k.as_slice()),
                Bound::Excluded(k) => Bound::Excluded(k.as_slice()),
                Bound::Unbounded => Bound::Unbounded,
            };

            let (base, local) = match direction {
                Direction::Forward => (
                    self.backend.next_entry(table, bound_ref)?,
                    overlay
                        .range::<[u8], _>((bound_ref, Bound::Unbounded))
                        .next(),
                ),
                Direction::Backward => (
                    self.backend.prev_entry(table, bound_ref)?,
                    overlay
                        .range::<[u8], _>((Bound::Unbounded, bound_ref))
                        .next_back(),
                ),
            };

            let Some((local_key, local_value)) = local else {
                return Ok(base);
            };

            // The overlay wins ties; otherwise take whichever key comes first
            // in the scan direction.
            let base_first = match (&base, direction) {
                (Some((k, _)), Direction::Forward) => k < local_key,
                (Some((k, _)), Direction::Backward) => k > local_key,
                (None, _) => false,
            };
            if base_first {
                return Ok(base);
            }

            match local_value {
                Some(value) => return Ok(Some((local_key.clone(), value.clone()))),
                None => bound = Bound::Excluded(local_key.clone()),
            }
        }
    }

    /// Applies all buffered writes atomically and ends the transaction.
    ///
    /// # Errors
    ///
    /// Propagates backend errors; on error nothing was applied.
    pub fn commit(self, sync: bool) -> StorageResult<()> {
        let mut batch = WriteBatch::new();
        for table in Table::ALL {
            for (key, value) in &self.overlay[table.index()] {
                match value {
                    Some(value) => batch.put(table, key.clone(), value.clone()),
                    None => batch.delete(table, key.clone()),
                }
            }
        }
        self.backend.apply(&batch, sync)
    }

    /// Discards all buffered writes and ends the transaction.
    pub fn abort(self) {}
}
