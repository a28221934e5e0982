/// MSB-first bit packing used by every message layout.
pub mod bits;

/// CRC16 (Modbus serial line) and odd parity (MIL-STD-1553).
pub mod checksum;

/// Data-driven message layouts: randomized generation, encoding and decoding.
pub mod layout;

pub use layout::{Field, FieldKind, Layout, Policy, Record, Unit, Value};

use thiserror::Error;

/// Errors raised while packing or parsing a message layout.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The input ended before the field could be read
    #[error("truncated frame while reading `{field}`")]
    Truncated {
        /// name of the field that was being read
        field: &'static str,
    },
    /// The layout does not end on a byte boundary
    #[error("layout is not byte aligned ({bits} bits)")]
    Unaligned {
        /// total number of bits written
        bits: usize,
    },
    /// Bytes left over after all fields were decoded
    #[error("{count} trailing bytes after the last field")]
    TrailingBytes {
        /// number of unconsumed bytes
        count: usize,
    },
    /// A length field announced more data than the list consumed (or vice versa)
    #[error("length of `{field}` does not match its content")]
    LengthMismatch {
        /// name of the list field
        field: &'static str,
    },
    /// A record is missing a value required by the layout
    #[error("missing value for `{field}`")]
    MissingField {
        /// name of the missing field
        field: &'static str,
    },
    /// A field holds a value of the wrong shape
    #[error("`{field}` has the wrong value type")]
    WrongType {
        /// name of the offending field
        field: &'static str,
    },
}
