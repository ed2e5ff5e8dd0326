//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur during encoding or decoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The input has the wrong length for a fixed-width value.
    #[error("wrong length: expected {expected} bytes, got {actual}")]
    WrongLength {
        /// Number of bytes the decoder needs.
        expected: usize,
        /// Number of bytes supplied.
        actual: usize,
    },

    /// The encoded string would exceed the maximum encoded length.
    #[error("string too long: {len} encoded bytes exceeds maximum of {max}")]
    StringTooLong {
        /// Encoded length of the string, excluding the terminator.
        len: usize,
        /// Maximum encoded length.
        max: usize,
    },

    /// The input is not a well-formed encoded string.
    #[error("malformed string: {message}")]
    MalformedString {
        /// Description of the problem.
        message: String,
    },
}

impl CodecError {
    /// Creates a malformed string error.
    pub fn malformed_string(message: impl Into<String>) -> Self {
        Self::MalformedString {
            message: message.into(),
        }
    }
}
