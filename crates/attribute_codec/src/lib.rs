//! Compact self-describing encoding for session attribute values.
//!
//! A builtin-encoded value is laid out as `[0x00][tag][payload...]`: byte 0 is
//! the [`BUILTIN_SERIALIZATION`] discriminator, byte 1 selects one of the 17
//! codecs in the [`registry`], and the payload is either fixed width,
//! length-prefixed, or a trimmed LEB128-style varint.
//!
//! Values whose kind has no builtin codec ([`AttributeValue::Object`]) are not
//! handled here: [`registry::encode`] reports `Ok(None)` and the caller falls
//! back to generic serialization.

pub mod display;
pub mod error;
pub mod fixed;
pub mod registry;
pub mod value;
pub mod varint;

pub use display::limited_bytes_to_string;
pub use error::{CodecError, Result};
pub use registry::{
    decode, encode, lookup_by_index, lookup_by_kind, lookup_by_value, BuiltinSerializationInfo,
    BUILTIN_COUNT,
};
pub use value::{AttributeValue, BigDecimal, BuiltinKind, SqlTimestamp};

/// Discriminator byte marking a builtin-encoded value.
pub const BUILTIN_SERIALIZATION: u8 = 0;
