use num_bigint::BigInt;
use serde_json::Value;
use time::{Duration, OffsetDateTime};

use crate::error::CodecError;

/// Builtin value kinds and their wire tags. Tags are never reused.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BuiltinKind {
    Long = 0,
    Integer = 1,
    Short = 2,
    Byte = 3,
    Float = 4,
    Double = 5,
    Character = 6,
    Boolean = 7,
    Date = 8,
    SqlDate = 9,
    SqlTimestamp = 10,
    SqlTime = 11,
    BigDecimal = 12,
    BigInteger = 13,
    ByteArray = 14,
    AtomicInteger = 15,
    AtomicLong = 16,
}

impl BuiltinKind {
    pub const ALL: [BuiltinKind; 17] = [
        Self::Long,
        Self::Integer,
        Self::Short,
        Self::Byte,
        Self::Float,
        Self::Double,
        Self::Character,
        Self::Boolean,
        Self::Date,
        Self::SqlDate,
        Self::SqlTimestamp,
        Self::SqlTime,
        Self::BigDecimal,
        Self::BigInteger,
        Self::ByteArray,
        Self::AtomicInteger,
        Self::AtomicLong,
    ];

    #[must_use]
    pub const fn tag(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub const fn type_name(self) -> &'static str {
        match self {
            Self::Long => "Long",
            Self::Integer => "Integer",
            Self::Short => "Short",
            Self::Byte => "Byte",
            Self::Float => "Float",
            Self::Double => "Double",
            Self::Character => "Character",
            Self::Boolean => "Boolean",
            Self::Date => "Date",
            Self::SqlDate => "SqlDate",
            Self::SqlTimestamp => "SqlTimestamp",
            Self::SqlTime => "SqlTime",
            Self::BigDecimal => "BigDecimal",
            Self::BigInteger => "BigInteger",
            Self::ByteArray => "ByteArray",
            Self::AtomicInteger => "AtomicInteger",
            Self::AtomicLong => "AtomicLong",
        }
    }
}

impl TryFrom<u8> for BuiltinKind {
    type Error = CodecError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .get(usize::from(tag))
            .copied()
            .ok_or(CodecError::UnknownTag { tag })
    }
}

/// Timestamp split into epoch milliseconds and the full sub-second nanos.
///
/// The millisecond part of `nanos` is also contained in `millis`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SqlTimestamp {
    pub millis: i64,
    pub nanos: i32,
}

impl SqlTimestamp {
    #[must_use]
    pub const fn new(millis: i64, nanos: i32) -> Self {
        Self { millis, nanos }
    }

    #[must_use]
    pub fn from_offset_date_time(value: OffsetDateTime) -> Self {
        let nanos = value.nanosecond();
        Self {
            millis: value.unix_timestamp() * 1000 + i64::from(nanos / 1_000_000),
            nanos: nanos as i32,
        }
    }

    /// Returns `None` when the instant is outside the representable range.
    #[must_use]
    pub fn to_offset_date_time(self) -> Option<OffsetDateTime> {
        let seconds = self.millis.div_euclid(1000);
        OffsetDateTime::from_unix_timestamp(seconds)
            .ok()?
            .checked_add(Duration::nanoseconds(i64::from(self.nanos)))
    }
}

/// Arbitrary-precision decimal as `unscaled * 10^-scale`.
///
/// Equality includes the scale, so `1.0` and `1.00` differ.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BigDecimal {
    unscaled: BigInt,
    scale: i32,
}

impl BigDecimal {
    #[must_use]
    pub fn new(unscaled: impl Into<BigInt>, scale: i32) -> Self {
        Self {
            unscaled: unscaled.into(),
            scale,
        }
    }

    #[must_use]
    pub fn unscaled(&self) -> &BigInt {
        &self.unscaled
    }

    #[must_use]
    pub fn scale(&self) -> i32 {
        self.scale
    }
}

/// A session attribute value.
///
/// Every variant but [`AttributeValue::Object`] has a builtin codec.
#[derive(Debug, Clone)]
pub enum AttributeValue {
    Long(i64),
    Integer(i32),
    Short(i16),
    Byte(i8),
    Float(f32),
    Double(f64),
    /// UTF-16 code unit.
    Character(u16),
    Boolean(bool),
    /// Epoch milliseconds.
    Date(i64),
    /// Epoch milliseconds.
    SqlDate(i64),
    SqlTimestamp(SqlTimestamp),
    /// Epoch milliseconds.
    SqlTime(i64),
    BigDecimal(BigDecimal),
    BigInteger(BigInt),
    ByteArray(Vec<u8>),
    AtomicInteger(i32),
    AtomicLong(i64),
    /// Application value carried through the generic serialization path.
    Object(Value),
}

impl AttributeValue {
    /// The builtin kind, or `None` for values that need generic serialization.
    #[must_use]
    pub fn kind(&self) -> Option<BuiltinKind> {
        let kind = match self {
            Self::Long(_) => BuiltinKind::Long,
            Self::Integer(_) => BuiltinKind::Integer,
            Self::Short(_) => BuiltinKind::Short,
            Self::Byte(_) => BuiltinKind::Byte,
            Self::Float(_) => BuiltinKind::Float,
            Self::Double(_) => BuiltinKind::Double,
            Self::Character(_) => BuiltinKind::Character,
            Self::Boolean(_) => BuiltinKind::Boolean,
            Self::Date(_) => BuiltinKind::Date,
            Self::SqlDate(_) => BuiltinKind::SqlDate,
            Self::SqlTimestamp(_) => BuiltinKind::SqlTimestamp,
            Self::SqlTime(_) => BuiltinKind::SqlTime,
            Self::BigDecimal(_) => BuiltinKind::BigDecimal,
            Self::BigInteger(_) => BuiltinKind::BigInteger,
            Self::ByteArray(_) => BuiltinKind::ByteArray,
            Self::AtomicInteger(_) => BuiltinKind::AtomicInteger,
            Self::AtomicLong(_) => BuiltinKind::AtomicLong,
            Self::Object(_) => return None,
        };
        Some(kind)
    }

    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.kind().map_or("Object", BuiltinKind::type_name)
    }
}

/// Floats compare by canonical bit pattern: NaN equals NaN, `0.0` differs from `-0.0`.
impl PartialEq for AttributeValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Long(a), Self::Long(b)) => a == b,
            (Self::Integer(a), Self::Integer(b)) => a == b,
            (Self::Short(a), Self::Short(b)) => a == b,
            (Self::Byte(a), Self::Byte(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => float_to_int_bits(*a) == float_to_int_bits(*b),
            (Self::Double(a), Self::Double(b)) => {
                double_to_long_bits(*a) == double_to_long_bits(*b)
            }
            (Self::Character(a), Self::Character(b)) => a == b,
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::Date(a), Self::Date(b)) => a == b,
            (Self::SqlDate(a), Self::SqlDate(b)) => a == b,
            (Self::SqlTimestamp(a), Self::SqlTimestamp(b)) => a == b,
            (Self::SqlTime(a), Self::SqlTime(b)) => a == b,
            (Self::BigDecimal(a), Self::BigDecimal(b)) => a == b,
            (Self::BigInteger(a), Self::BigInteger(b)) => a == b,
            (Self::ByteArray(a), Self::ByteArray(b)) => a == b,
            (Self::AtomicInteger(a), Self::AtomicInteger(b)) => a == b,
            (Self::AtomicLong(a), Self::AtomicLong(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a == b,
            _ => false,
        }
    }
}

const CANONICAL_FLOAT_NAN: i32 = 0x7fc0_0000;
const CANONICAL_DOUBLE_NAN: i64 = 0x7ff8_0000_0000_0000;

/// IEEE-754 bits with every NaN collapsed to the canonical quiet NaN.
#[must_use]
pub fn float_to_int_bits(value: f32) -> i32 {
    if value.is_nan() {
        CANONICAL_FLOAT_NAN
    } else {
        value.to_bits() as i32
    }
}

/// IEEE-754 bits with every NaN collapsed to the canonical quiet NaN.
#[must_use]
pub fn double_to_long_bits(value: f64) -> i64 {
    if value.is_nan() {
        CANONICAL_DOUBLE_NAN
    } else {
        value.to_bits() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn tags_follow_declaration_order() {
        for (index, kind) in BuiltinKind::ALL.iter().enumerate() {
            assert_eq!(usize::from(kind.tag()), index);
            assert_eq!(BuiltinKind::try_from(kind.tag()), Ok(*kind));
        }
        assert_eq!(
            BuiltinKind::try_from(17),
            Err(CodecError::UnknownTag { tag: 17 })
        );
    }

    #[test]
    fn nan_equals_nan_but_signed_zeros_differ() {
        assert_eq!(
            AttributeValue::Float(f32::NAN),
            AttributeValue::Float(-f32::NAN)
        );
        assert_ne!(AttributeValue::Double(0.0), AttributeValue::Double(-0.0));
        assert_ne!(AttributeValue::Long(1), AttributeValue::AtomicLong(1));
    }

    #[test]
    fn timestamp_keeps_sub_millisecond_nanos() {
        let instant = datetime!(2024-03-01 12:30:45.123456789 UTC);
        let timestamp = SqlTimestamp::from_offset_date_time(instant);
        assert_eq!(timestamp.millis % 1000, 123);
        assert_eq!(timestamp.nanos, 123_456_789);
        assert_eq!(timestamp.to_offset_date_time(), Some(instant));
    }

    #[test]
    fn decimal_equality_includes_scale() {
        assert_ne!(BigDecimal::new(10, 1), BigDecimal::new(100, 2));
        assert_eq!(BigDecimal::new(-5, 3).scale(), 3);
    }
}
