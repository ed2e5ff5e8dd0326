//! # darkstore Codec
//!
//! Order-preserving byte encoding for darkstore record keys.
//!
//! Every encoding in this crate satisfies one property: comparing two
//! encodings as unsigned byte strings gives the same answer as comparing the
//! values they encode. The storage layer only knows how to order bytes, so
//! this is what lets the name namespace and the object id space be scanned
//! in order.
//!
//! ## Usage
//!
//! ```
//! use darkstore_codec::{decode_long, encode_long, encode_string};
//!
//! assert!(encode_long(-5) < encode_long(3));
//! assert_eq!(decode_long(&encode_long(42)).unwrap(), 42);
//!
//! assert!(encode_string("apple").unwrap() < encode_string("banana").unwrap());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod number;
mod string;

pub use error::{CodecError, CodecResult};
pub use number::{
    decode_int, decode_long, decode_short, encode_int, encode_long, encode_short, INT_SIZE,
    LONG_SIZE, SHORT_SIZE,
};
pub use string::{decode_string, encode_string, encoded_string_len, MAX_STRING_LENGTH};
