//! Core type definitions for darkstore.

use crate::error::{StoreError, StoreResult};
use std::fmt;

/// Unique identifier for a transaction.
///
/// Transaction IDs are handed out in increasing order by the transaction
/// coordinator and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// Creates a new transaction ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn:{}", self.0)
    }
}

/// Identifier of a stored object.
///
/// Object IDs are non-negative 63-bit integers, allocated in blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(u64);

impl ObjectId {
    /// Largest valid object ID.
    pub const MAX: Self = Self(i64::MAX as u64);

    /// Creates an object ID.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidArgument`] if `id` does not fit in 63 bits.
    pub fn new(id: u64) -> StoreResult<Self> {
        if id > Self::MAX.0 {
            return Err(StoreError::invalid_argument(format!(
                "object id {id} is out of range"
            )));
        }
        Ok(Self(id))
    }

    /// Creates an object ID from a signed value.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidArgument`] if `id` is negative.
    pub fn from_i64(id: i64) -> StoreResult<Self> {
        u64::try_from(id)
            .map(Self)
            .map_err(|_| StoreError::invalid_argument(format!("object id {id} is negative")))
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the raw ID value as a signed integer.
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        self.0 as i64
    }

    pub(crate) const fn from_raw(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "oid:{}", self.0)
    }
}

/// Identifier of an interned class descriptor. Valid IDs start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClassId(pub u32);

impl ClassId {
    /// Creates a class ID.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "class:{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_id_ordering() {
        assert!(TransactionId::new(1) < TransactionId::new(2));
        assert_eq!(format!("{}", TransactionId::new(7)), "txn:7");
    }

    #[test]
    fn object_id_range() {
        assert_eq!(ObjectId::new(5).unwrap().as_u64(), 5);
        assert_eq!(ObjectId::new(i64::MAX as u64).unwrap(), ObjectId::MAX);
        assert!(ObjectId::new(1 << 63).unwrap_err().is_invalid_argument());
        assert!(ObjectId::from_i64(-1).unwrap_err().is_invalid_argument());
        assert_eq!(ObjectId::from_i64(9).unwrap().as_i64(), 9);
    }

    #[test]
    fn class_id_display() {
        assert_eq!(format!("{}", ClassId::new(42)), "class:42");
    }
}
