//! Tables, write batches and the ordered maps that hold them.

use std::collections::BTreeMap;
use std::ops::Bound;

/// A key/value pair returned by ordered lookups.
pub type Entry = (Vec<u8>, Vec<u8>);

/// One of the fixed tables every backend provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Table {
    /// Store header and other metadata.
    Info = 0,
    /// Class descriptors, keyed by hash and by id.
    Classes = 1,
    /// Object records, keyed by encoded object id.
    Oids = 2,
    /// Name bindings, keyed by encoded name.
    Names = 3,
}

impl Table {
    /// Number of tables.
    pub const COUNT: usize = 4;

    /// All tables in index order.
    pub const ALL: [Table; Self::COUNT] = [Self::Info, Self::Classes, Self::Oids, Self::Names];

    /// Returns the table's index.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Converts a byte to a table.
    pub fn from_byte(b: u8) -> Option<Self> {
        Self::ALL.get(b as usize).copied()
    }

    /// Converts the table to a byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

/// A single mutation inside a [`WriteBatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    /// Insert or replace a record.
    Put {
        /// Target table.
        table: Table,
        /// Record key.
        key: Vec<u8>,
        /// Record value.
        value: Vec<u8>,
    },
    /// Remove a record if present.
    Delete {
        /// Target table.
        table: Table,
        /// Record key.
        key: Vec<u8>,
    },
}

/// An ordered list of mutations applied atomically by a backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    /// Creates an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a put.
    pub fn put(&mut self, table: Table, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.ops.push(BatchOp::Put {
            table,
            key: key.into(),
            value: value.into(),
        });
    }

    /// Adds a delete.
    pub fn delete(&mut self, table: Table, key: impl Into<Vec<u8>>) {
        self.ops.push(BatchOp::Delete {
            table,
            key: key.into(),
        });
    }

    /// Returns the mutations in application order.
    #[must_use]
    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    /// Returns the number of mutations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Returns true if the batch holds no mutations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// The in-memory image of all tables.
///
/// Shared by the in-memory backend and by the file backend, which replays
/// its log into one of these on open.
#[derive(Debug, Default)]
pub(crate) struct TableSet {
    tables: [BTreeMap<Vec<u8>, Vec<u8>>; Table::COUNT],
}

impl TableSet {
    pub(crate) fn get(&self, table: Table, key: &[u8]) -> Option<Vec<u8>> {
        self.tables[table.index()].get(key).cloned()
    }

    pub(crate) fn next_entry(&self, table: Table, from: Bound<&[u8]>) -> Option<Entry> {
        self.tables[table.index()]
            .range::<[u8], _>((from, Bound::Unbounded))
            .next()
            .map(|(k, v)| (k.clone(), v.clone()))
    }

    pub(crate) fn prev_entry(&self, table: Table, before: Bound<&[u8]>) -> Option<Entry> {
        self.tables[table.index()]
            .range::<[u8], _>((Bound::Unbounded, before))
            .next_back()
            .map(|(k, v)| (k.clone(), v.clone()))
    }

    pub(crate) fn len(&self, table: Table) -> usize {
        self.tables[table.index()].len()
    }

    pub(crate) fn apply(&mut self, batch: &WriteBatch) {
        for op in batch.ops() {
            match op {
                BatchOp::Put { table, key, value } => {
                    self.tables[table.index()].insert(key.clone(), value.clone());
                }
                BatchOp::Delete { table, key } => {
                    self.tables[table.index()].remove(key);
                }
            }
        }
    }
}
