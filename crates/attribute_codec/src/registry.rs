//! Builtin codec table.
//!
//! The table is a `static` array indexed by tag, so it is fully populated before
//! first use and never mutated. Lookups hand out `&'static` codec references.

use std::borrow::Cow;

use num_bigint::{BigInt, Sign};

use crate::error::{ensure_readable, CodecError, Result};
use crate::fixed::{self, INT_BYTES, LONG_BYTES};
use crate::value::{
    double_to_long_bits, float_to_int_bits, AttributeValue, BigDecimal, BuiltinKind, SqlTimestamp,
};
use crate::varint;
use crate::BUILTIN_SERIALIZATION;

pub const BUILTIN_COUNT: usize = 17;

const HEADER_BYTES: usize = 2;

/// Encoder/decoder pair for one builtin kind.
///
/// Encoded arrays always start with `[BUILTIN_SERIALIZATION, index()]`.
pub trait BuiltinSerializationInfo: Send + Sync {
    fn kind(&self) -> BuiltinKind;

    fn index(&self) -> u8 {
        self.kind().tag()
    }

    fn object_to_bytes(&self, value: &AttributeValue) -> Result<Cow<'static, [u8]>>;

    fn bytes_to_object(&self, bytes: &[u8]) -> Result<AttributeValue>;
}

static BUILTINS: [&dyn BuiltinSerializationInfo; BUILTIN_COUNT] = [
    &LONG,
    &INTEGER,
    &ShortInfo,
    &ByteInfo,
    &FLOAT,
    &DOUBLE,
    &CharacterInfo,
    &BooleanInfo,
    &DATE,
    &SQL_DATE,
    &TimestampInfo,
    &SQL_TIME,
    &BigDecimalInfo,
    &BigIntegerInfo,
    &ByteArrayInfo,
    &ATOMIC_INTEGER,
    &ATOMIC_LONG,
];

/// Codec for a tag, or `None` when the tag is not assigned.
#[must_use]
pub fn lookup_by_index(tag: u8) -> Option<&'static dyn BuiltinSerializationInfo> {
    BUILTINS.get(usize::from(tag)).copied()
}

#[must_use]
pub fn lookup_by_kind(kind: BuiltinKind) -> &'static dyn BuiltinSerializationInfo {
    BUILTINS[usize::from(kind.tag())]
}

/// Codec for the run-time kind of `value`, or `None` when it needs generic serialization.
#[must_use]
pub fn lookup_by_value(value: &AttributeValue) -> Option<&'static dyn BuiltinSerializationInfo> {
    value.kind().map(lookup_by_kind)
}

/// Encodes `value` with its builtin codec. `Ok(None)` means no builtin codec applies.
pub fn encode(value: &AttributeValue) -> Result<Option<Vec<u8>>> {
    lookup_by_value(value)
        .map(|info| info.object_to_bytes(value).map(Cow::into_owned))
        .transpose()
}

/// Decodes a builtin-encoded array, dispatching on its tag byte.
pub fn decode(bytes: &[u8]) -> Result<AttributeValue> {
    ensure_readable(bytes, 0, HEADER_BYTES)?;
    if bytes[0] != BUILTIN_SERIALIZATION {
        return Err(CodecError::NotBuiltin {
            discriminator: bytes[0],
        });
    }
    let info = lookup_by_index(bytes[1]).ok_or(CodecError::UnknownTag { tag: bytes[1] })?;
    info.bytes_to_object(bytes)
}

fn start(kind: BuiltinKind, payload_len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_BYTES + payload_len);
    out.push(BUILTIN_SERIALIZATION);
    out.push(kind.tag());
    out
}

fn check_header(kind: BuiltinKind, bytes: &[u8]) -> Result<()> {
    ensure_readable(bytes, 0, HEADER_BYTES)?;
    if bytes[0] != BUILTIN_SERIALIZATION {
        return Err(CodecError::NotBuiltin {
            discriminator: bytes[0],
        });
    }
    if bytes[1] != kind.tag() {
        return Err(CodecError::TagMismatch {
            expected: kind,
            found: bytes[1],
        });
    }
    Ok(())
}

fn check_consumed(kind: BuiltinKind, bytes: &[u8], end: usize) -> Result<()> {
    if end != bytes.len() {
        return Err(CodecError::TrailingBytes {
            kind,
            extra: bytes.len() - end,
        });
    }
    Ok(())
}

fn mismatch(kind: BuiltinKind, value: &AttributeValue) -> CodecError {
    CodecError::KindMismatch {
        expected: kind,
        found: value.type_name(),
    }
}

fn push_fixed<const N: usize>(out: &mut Vec<u8>, bytes: [u8; N]) {
    out.extend_from_slice(&bytes);
}

fn push_length_prefixed(out: &mut Vec<u8>, data: &[u8]) -> Result<()> {
    let length =
        i32::try_from(data.len()).map_err(|_| CodecError::LengthOverflow { length: data.len() })?;
    push_fixed(out, length.to_be_bytes());
    out.extend_from_slice(data);
    Ok(())
}

/// Reads a 4-byte length and the bytes it covers; returns the slice and the next offset.
fn read_length_prefixed(bytes: &[u8], offset: usize) -> Result<(&[u8], usize)> {
    let length = fixed::bytes_to_int(bytes, offset)?;
    let length = usize::try_from(length).map_err(|_| CodecError::NegativeLength { length })?;
    let start = offset + INT_BYTES;
    ensure_readable(bytes, start, length)?;
    Ok((&bytes[start..start + length], start + length))
}

/// Kinds stored as a trimmed `i64` varint.
struct VarLongInfo {
    kind: BuiltinKind,
    extract: fn(&AttributeValue) -> Option<i64>,
    build: fn(i64) -> AttributeValue,
}

impl BuiltinSerializationInfo for VarLongInfo {
    fn kind(&self) -> BuiltinKind {
        self.kind
    }

    fn object_to_bytes(&self, value: &AttributeValue) -> Result<Cow<'static, [u8]>> {
        let raw = (self.extract)(value).ok_or_else(|| mismatch(self.kind, value))?;
        let mut out = start(self.kind, varint::long_var_int_len(raw));
        varint::push_long_var_int(raw, &mut out);
        Ok(Cow::Owned(out))
    }

    fn bytes_to_object(&self, bytes: &[u8]) -> Result<AttributeValue> {
        check_header(self.kind, bytes)?;
        let (raw, consumed) = varint::decode_long_var_int(bytes, HEADER_BYTES)?;
        check_consumed(self.kind, bytes, HEADER_BYTES + consumed)?;
        Ok((self.build)(raw))
    }
}

/// Kinds stored as a trimmed `i32` varint.
struct VarIntInfo {
    kind: BuiltinKind,
    extract: fn(&AttributeValue) -> Option<i32>,
    build: fn(i32) -> AttributeValue,
}

impl BuiltinSerializationInfo for VarIntInfo {
    fn kind(&self) -> BuiltinKind {
        self.kind
    }

    fn object_to_bytes(&self, value: &AttributeValue) -> Result<Cow<'static, [u8]>> {
        let raw = (self.extract)(value).ok_or_else(|| mismatch(self.kind, value))?;
        let mut out = start(self.kind, varint::int_var_int_len(raw));
        varint::push_int_var_int(raw, &mut out);
        Ok(Cow::Owned(out))
    }

    fn bytes_to_object(&self, bytes: &[u8]) -> Result<AttributeValue> {
        check_header(self.kind, bytes)?;
        let (raw, consumed) = varint::decode_int_var_int(bytes, HEADER_BYTES)?;
        check_consumed(self.kind, bytes, HEADER_BYTES + consumed)?;
        Ok((self.build)(raw))
    }
}

static LONG: VarLongInfo = VarLongInfo {
    kind: BuiltinKind::Long,
    extract: |value| match value {
        AttributeValue::Long(raw) => Some(*raw),
        _ => None,
    },
    build: AttributeValue::Long,
};

static INTEGER: VarIntInfo = VarIntInfo {
    kind: BuiltinKind::Integer,
    extract: |value| match value {
        AttributeValue::Integer(raw) => Some(*raw),
        _ => None,
    },
    build: AttributeValue::Integer,
};

static FLOAT: VarIntInfo = VarIntInfo {
    kind: BuiltinKind::Float,
    extract: |value| match value {
        AttributeValue::Float(raw) => Some(float_to_int_bits(*raw)),
        _ => None,
    },
    build: |bits| AttributeValue::Float(f32::from_bits(bits as u32)),
};

static DOUBLE: VarLongInfo = VarLongInfo {
    kind: BuiltinKind::Double,
    extract: |value| match value {
        AttributeValue::Double(raw) => Some(double_to_long_bits(*raw)),
        _ => None,
    },
    build: |bits| AttributeValue::Double(f64::from_bits(bits as u64)),
};

static DATE: VarLongInfo = VarLongInfo {
    kind: BuiltinKind::Date,
    extract: |value| match value {
        AttributeValue::Date(millis) => Some(*millis),
        _ => None,
    },
    build: AttributeValue::Date,
};

static SQL_DATE: VarLongInfo = VarLongInfo {
    kind: BuiltinKind::SqlDate,
    extract: |value| match value {
        AttributeValue::SqlDate(millis) => Some(*millis),
        _ => None,
    },
    build: AttributeValue::SqlDate,
};

static SQL_TIME: VarLongInfo = VarLongInfo {
    kind: BuiltinKind::SqlTime,
    extract: |value| match value {
        AttributeValue::SqlTime(millis) => Some(*millis),
        _ => None,
    },
    build: AttributeValue::SqlTime,
};

static ATOMIC_INTEGER: VarIntInfo = VarIntInfo {
    kind: BuiltinKind::AtomicInteger,
    extract: |value| match value {
        AttributeValue::AtomicInteger(raw) => Some(*raw),
        _ => None,
    },
    build: AttributeValue::AtomicInteger,
};

static ATOMIC_LONG: VarLongInfo = VarLongInfo {
    kind: BuiltinKind::AtomicLong,
    extract: |value| match value {
        AttributeValue::AtomicLong(raw) => Some(*raw),
        _ => None,
    },
    build: AttributeValue::AtomicLong,
};

struct ShortInfo;

impl BuiltinSerializationInfo for ShortInfo {
    fn kind(&self) -> BuiltinKind {
        BuiltinKind::Short
    }

    fn object_to_bytes(&self, value: &AttributeValue) -> Result<Cow<'static, [u8]>> {
        let AttributeValue::Short(raw) = value else {
            return Err(mismatch(self.kind(), value));
        };
        let mut out = start(self.kind(), fixed::SHORT_BYTES);
        push_fixed(&mut out, raw.to_be_bytes());
        Ok(Cow::Owned(out))
    }

    fn bytes_to_object(&self, bytes: &[u8]) -> Result<AttributeValue> {
        check_header(self.kind(), bytes)?;
        let raw = fixed::bytes_to_short(bytes, HEADER_BYTES)?;
        check_consumed(self.kind(), bytes, HEADER_BYTES + fixed::SHORT_BYTES)?;
        Ok(AttributeValue::Short(raw))
    }
}

struct ByteInfo;

impl BuiltinSerializationInfo for ByteInfo {
    fn kind(&self) -> BuiltinKind {
        BuiltinKind::Byte
    }

    fn object_to_bytes(&self, value: &AttributeValue) -> Result<Cow<'static, [u8]>> {
        let AttributeValue::Byte(raw) = value else {
            return Err(mismatch(self.kind(), value));
        };
        let mut out = start(self.kind(), 1);
        out.push(*raw as u8);
        Ok(Cow::Owned(out))
    }

    fn bytes_to_object(&self, bytes: &[u8]) -> Result<AttributeValue> {
        check_header(self.kind(), bytes)?;
        ensure_readable(bytes, HEADER_BYTES, 1)?;
        check_consumed(self.kind(), bytes, HEADER_BYTES + 1)?;
        Ok(AttributeValue::Byte(bytes[HEADER_BYTES] as i8))
    }
}

struct CharacterInfo;

impl BuiltinSerializationInfo for CharacterInfo {
    fn kind(&self) -> BuiltinKind {
        BuiltinKind::Character
    }

    fn object_to_bytes(&self, value: &AttributeValue) -> Result<Cow<'static, [u8]>> {
        let AttributeValue::Character(raw) = value else {
            return Err(mismatch(self.kind(), value));
        };
        let mut out = start(self.kind(), fixed::CHAR_BYTES);
        push_fixed(&mut out, raw.to_be_bytes());
        Ok(Cow::Owned(out))
    }

    fn bytes_to_object(&self, bytes: &[u8]) -> Result<AttributeValue> {
        check_header(self.kind(), bytes)?;
        let raw = fixed::bytes_to_char(bytes, HEADER_BYTES)?;
        check_consumed(self.kind(), bytes, HEADER_BYTES + fixed::CHAR_BYTES)?;
        Ok(AttributeValue::Character(raw))
    }
}

// Shared encodings; callers only ever read them.
static TRUE_BYTES: [u8; 3] = [BUILTIN_SERIALIZATION, BuiltinKind::Boolean.tag(), 1];
static FALSE_BYTES: [u8; 3] = [BUILTIN_SERIALIZATION, BuiltinKind::Boolean.tag(), 0];

struct BooleanInfo;

impl BuiltinSerializationInfo for BooleanInfo {
    fn kind(&self) -> BuiltinKind {
        BuiltinKind::Boolean
    }

    fn object_to_bytes(&self, value: &AttributeValue) -> Result<Cow<'static, [u8]>> {
        match value {
            AttributeValue::Boolean(true) => Ok(Cow::Borrowed(&TRUE_BYTES)),
            AttributeValue::Boolean(false) => Ok(Cow::Borrowed(&FALSE_BYTES)),
            other => Err(mismatch(self.kind(), other)),
        }
    }

    fn bytes_to_object(&self, bytes: &[u8]) -> Result<AttributeValue> {
        check_header(self.kind(), bytes)?;
        ensure_readable(bytes, HEADER_BYTES, 1)?;
        check_consumed(self.kind(), bytes, HEADER_BYTES + 1)?;
        Ok(AttributeValue::Boolean(bytes[HEADER_BYTES] != 0))
    }
}

/// 8-byte epoch millis followed by 4-byte nanos, never varint.
struct TimestampInfo;

impl BuiltinSerializationInfo for TimestampInfo {
    fn kind(&self) -> BuiltinKind {
        BuiltinKind::SqlTimestamp
    }

    fn object_to_bytes(&self, value: &AttributeValue) -> Result<Cow<'static, [u8]>> {
        let AttributeValue::SqlTimestamp(timestamp) = value else {
            return Err(mismatch(self.kind(), value));
        };
        let mut out = start(self.kind(), LONG_BYTES + INT_BYTES);
        push_fixed(&mut out, timestamp.millis.to_be_bytes());
        push_fixed(&mut out, timestamp.nanos.to_be_bytes());
        Ok(Cow::Owned(out))
    }

    fn bytes_to_object(&self, bytes: &[u8]) -> Result<AttributeValue> {
        check_header(self.kind(), bytes)?;
        let millis = fixed::bytes_to_long(bytes, HEADER_BYTES)?;
        let nanos = fixed::bytes_to_int(bytes, HEADER_BYTES + LONG_BYTES)?;
        check_consumed(self.kind(), bytes, HEADER_BYTES + LONG_BYTES + INT_BYTES)?;
        Ok(AttributeValue::SqlTimestamp(SqlTimestamp::new(
            millis, nanos,
        )))
    }
}

/// Length-prefixed unscaled two's-complement bytes, then a 4-byte scale.
struct BigDecimalInfo;

impl BuiltinSerializationInfo for BigDecimalInfo {
    fn kind(&self) -> BuiltinKind {
        BuiltinKind::BigDecimal
    }

    fn object_to_bytes(&self, value: &AttributeValue) -> Result<Cow<'static, [u8]>> {
        let AttributeValue::BigDecimal(decimal) = value else {
            return Err(mismatch(self.kind(), value));
        };
        let unscaled = magnitude_bytes(decimal.unscaled());
        let mut out = start(self.kind(), INT_BYTES + unscaled.len() + INT_BYTES);
        push_length_prefixed(&mut out, &unscaled)?;
        push_fixed(&mut out, decimal.scale().to_be_bytes());
        Ok(Cow::Owned(out))
    }

    fn bytes_to_object(&self, bytes: &[u8]) -> Result<AttributeValue> {
        check_header(self.kind(), bytes)?;
        let (unscaled, next) = read_length_prefixed(bytes, HEADER_BYTES)?;
        let scale = fixed::bytes_to_int(bytes, next)?;
        check_consumed(self.kind(), bytes, next + INT_BYTES)?;
        Ok(AttributeValue::BigDecimal(BigDecimal::new(
            BigInt::from_signed_bytes_be(unscaled),
            scale,
        )))
    }
}

/// Minimal two's-complement bytes, empty for zero.
fn magnitude_bytes(value: &BigInt) -> Vec<u8> {
    if value.sign() == Sign::NoSign {
        Vec::new()
    } else {
        value.to_signed_bytes_be()
    }
}

/// Length-prefixed minimal two's-complement magnitude.
struct BigIntegerInfo;

impl BuiltinSerializationInfo for BigIntegerInfo {
    fn kind(&self) -> BuiltinKind {
        BuiltinKind::BigInteger
    }

    fn object_to_bytes(&self, value: &AttributeValue) -> Result<Cow<'static, [u8]>> {
        let AttributeValue::BigInteger(integer) = value else {
            return Err(mismatch(self.kind(), value));
        };
        let magnitude = magnitude_bytes(integer);
        let mut out = start(self.kind(), INT_BYTES + magnitude.len());
        push_length_prefixed(&mut out, &magnitude)?;
        Ok(Cow::Owned(out))
    }

    fn bytes_to_object(&self, bytes: &[u8]) -> Result<AttributeValue> {
        check_header(self.kind(), bytes)?;
        let (magnitude, next) = read_length_prefixed(bytes, HEADER_BYTES)?;
        check_consumed(self.kind(), bytes, next)?;
        Ok(AttributeValue::BigInteger(BigInt::from_signed_bytes_be(
            magnitude,
        )))
    }
}

struct ByteArrayInfo;

impl BuiltinSerializationInfo for ByteArrayInfo {
    fn kind(&self) -> BuiltinKind {
        BuiltinKind::ByteArray
    }

    fn object_to_bytes(&self, value: &AttributeValue) -> Result<Cow<'static, [u8]>> {
        let AttributeValue::ByteArray(data) = value else {
            return Err(mismatch(self.kind(), value));
        };
        let mut out = start(self.kind(), INT_BYTES + data.len());
        push_length_prefixed(&mut out, data)?;
        Ok(Cow::Owned(out))
    }

    fn bytes_to_object(&self, bytes: &[u8]) -> Result<AttributeValue> {
        check_header(self.kind(), bytes)?;
        let (data, next) = read_length_prefixed(bytes, HEADER_BYTES)?;
        check_consumed(self.kind(), bytes, next)?;
        Ok(AttributeValue::ByteArray(data.to_vec()))
    }
}
