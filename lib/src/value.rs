use serde::{Deserialize, Serialize};

use crate::field_type::FieldTypeKind;

/// Arbitrary-scale decimal: `unscaled * 10^exponent`.
///
/// Comparison and hashing are value-based (scale aware), never over the raw
/// coefficient: `Decimal::new(10, -1)` equals `Decimal::new(1, 0)`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Decimal {
    unscaled: i128,
    exponent: i32,
}

impl Decimal {
    pub fn new(unscaled: i128, exponent: i32) -> Self {
        Self { unscaled, exponent }
    }

    pub fn from_i64(value: i64) -> Self {
        Self {
            unscaled: value as i128,
            exponent: 0,
        }
    }

    pub fn unscaled(&self) -> i128 {
        self.unscaled
    }

    pub fn exponent(&self) -> i32 {
        self.exponent
    }

    pub fn is_zero(&self) -> bool {
        self.unscaled == 0
    }

    /// Normalized form with trailing zeros trimmed from the coefficient.
    /// Equal values share a unique normalized representation, which is what
    /// hashing operates on.
    pub fn normalized(&self) -> Self {
        if self.unscaled == 0 {
            return Self {
                unscaled: 0,
                exponent: 0,
            };
        }
        let mut unscaled = self.unscaled;
        let mut exponent = self.exponent;
        while unscaled % 10 == 0 {
            unscaled /= 10;
            exponent += 1;
        }
        Self { unscaled, exponent }
    }

    fn signum(&self) -> i32 {
        match self.unscaled {
            0 => 0,
            n if n > 0 => 1,
            _ => -1,
        }
    }

    /// Total order by numeric value.
    pub fn compare(&self, other: &Decimal) -> std::cmp::Ordering {
        use std::cmp::Ordering;
        let ls = self.signum();
        let rs = other.signum();
        if ls != rs {
            return ls.cmp(&rs);
        }
        if ls == 0 {
            return Ordering::Equal;
        }
        let magnitude = Self::compare_magnitude(self, other);
        if ls > 0 {
            magnitude
        } else {
            magnitude.reverse()
        }
    }

    // Compares |a| vs |b| using digit strings so that aligning scales can
    // never overflow the coefficient type.
    fn compare_magnitude(a: &Decimal, b: &Decimal) -> std::cmp::Ordering {
        use std::cmp::Ordering;
        let da = a.unscaled.unsigned_abs().to_string();
        let db = b.unscaled.unsigned_abs().to_string();
        // numeric order of the value = number of digits + exponent
        let oa = da.len() as i64 + a.exponent as i64;
        let ob = db.len() as i64 + b.exponent as i64;
        if oa != ob {
            return oa.cmp(&ob);
        }
        // same order of magnitude: compare digits left-aligned
        let width = da.len().max(db.len());
        let pa = format!("{da:0<width$}");
        let pb = format!("{db:0<width$}");
        match pa.cmp(&pb) {
            Ordering::Equal => Ordering::Equal,
            other => other,
        }
    }
}

impl PartialEq for Decimal {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == std::cmp::Ordering::Equal
    }
}

impl Eq for Decimal {}

impl PartialOrd for Decimal {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.compare(other))
    }
}

impl Ord for Decimal {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.compare(other)
    }
}

impl std::fmt::Display for Decimal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.exponent == 0 {
            return write!(f, "{}", self.unscaled);
        }
        write!(f, "{}E{}", self.unscaled, self.exponent)
    }
}

/// Reference to a large object held by an external datastore provider.
/// Not value-comparable; ordered by (provider id, object id) only so that
/// sorted outputs are reproducible.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct LobReference {
    pub provider: u64,
    pub object_id: u64,
}

impl LobReference {
    pub fn new(provider: u64, object_id: u64) -> Self {
        Self {
            provider,
            object_id,
        }
    }
}

/// Time of day: nanoseconds since midnight, with an optional UTC offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeOfDay {
    pub nanos_of_day: u64,
    pub offset_minutes: Option<i32>,
}

/// Point in time: seconds since epoch plus subsecond nanos, with an
/// optional UTC offset. Ordering compares seconds first, then subseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimePoint {
    pub seconds: i64,
    pub subsecond_nanos: u32,
    pub offset_minutes: Option<i32>,
}

impl TimePoint {
    pub fn new(seconds: i64, subsecond_nanos: u32) -> Self {
        Self {
            seconds,
            subsecond_nanos,
            offset_minutes: None,
        }
    }
}

impl PartialOrd for TimePoint {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimePoint {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.seconds
            .cmp(&other.seconds)
            .then(self.subsecond_nanos.cmp(&other.subsecond_nanos))
    }
}

/// A runtime value. `Null` is first-class; every other variant corresponds
/// to one [`FieldTypeKind`].
///
/// The derived `PartialEq` is bitwise on floats; SQL comparison semantics
/// (NaN handling, scale-aware decimals, NULL ordering) live in
/// [`crate::compare`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Boolean(bool),
    Int1(i8),
    Int2(i16),
    Int4(i32),
    Int8(i64),
    Float4(f32),
    Float8(f64),
    Decimal(Decimal),
    Character(String),
    Octet(Vec<u8>),
    /// Days since the epoch date.
    Date(i64),
    TimeOfDay(TimeOfDay),
    TimePoint(TimePoint),
    Blob(LobReference),
    Clob(LobReference),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn kind(&self) -> Option<FieldTypeKind> {
        match self {
            Value::Null => None,
            Value::Boolean(_) => Some(FieldTypeKind::Boolean),
            Value::Int1(_) => Some(FieldTypeKind::Int1),
            Value::Int2(_) => Some(FieldTypeKind::Int2),
            Value::Int4(_) => Some(FieldTypeKind::Int4),
            Value::Int8(_) => Some(FieldTypeKind::Int8),
            Value::Float4(_) => Some(FieldTypeKind::Float4),
            Value::Float8(_) => Some(FieldTypeKind::Float8),
            Value::Decimal(_) => Some(FieldTypeKind::Decimal),
            Value::Character(_) => Some(FieldTypeKind::Character),
            Value::Octet(_) => Some(FieldTypeKind::Octet),
            Value::Date(_) => Some(FieldTypeKind::Date),
            Value::TimeOfDay(_) => Some(FieldTypeKind::TimeOfDay),
            Value::TimePoint(_) => Some(FieldTypeKind::TimePoint),
            Value::Blob(_) => Some(FieldTypeKind::Blob),
            Value::Clob(_) => Some(FieldTypeKind::Clob),
        }
    }

    /// Widening view as i64 for the integer family; None otherwise.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int1(v) => Some(*v as i64),
            Value::Int2(v) => Some(*v as i64),
            Value::Int4(v) => Some(*v as i64),
            Value::Int8(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float4(v) => Some(*v as f64),
            Value::Float8(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Character(s) => Some(s),
            _ => None,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Boolean(v) => write!(f, "{v}"),
            Value::Int1(v) => write!(f, "{v}"),
            Value::Int2(v) => write!(f, "{v}"),
            Value::Int4(v) => write!(f, "{v}"),
            Value::Int8(v) => write!(f, "{v}"),
            Value::Float4(v) => write!(f, "{v}"),
            Value::Float8(v) => write!(f, "{v}"),
            Value::Decimal(v) => write!(f, "{v}"),
            Value::Character(v) => write!(f, "{v}"),
            Value::Octet(v) => {
                for b in v {
                    write!(f, "{b:02x}")?;
                }
                Ok(())
            }
            Value::Date(v) => write!(f, "date({v})"),
            Value::TimeOfDay(v) => write!(f, "time_of_day({})", v.nanos_of_day),
            Value::TimePoint(v) => write!(f, "time_point({}, {})", v.seconds, v.subsecond_nanos),
            Value::Blob(v) => write!(f, "blob({}, {})", v.provider, v.object_id),
            Value::Clob(v) => write!(f, "clob({}, {})", v.provider, v.object_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cmp::Ordering;

    #[test]
    fn test_decimal_scale_aware_equality() {
        assert_eq!(Decimal::new(10, -1), Decimal::new(1, 0));
        assert_eq!(Decimal::new(12300, -2), Decimal::new(123, 0));
        assert_ne!(Decimal::new(1231, -1), Decimal::new(123, 0));
    }

    #[test]
    fn test_decimal_ordering_across_scales() {
        // 12.34 < 12.5
        assert_eq!(
            Decimal::new(1234, -2).compare(&Decimal::new(125, -1)),
            Ordering::Less
        );
        // -12.34 > -12.5
        assert_eq!(
            Decimal::new(-1234, -2).compare(&Decimal::new(-125, -1)),
            Ordering::Greater
        );
        // 1.239 < 12.34 (different orders of magnitude)
        assert_eq!(
            Decimal::new(1239, -3).compare(&Decimal::new(1234, -2)),
            Ordering::Less
        );
        assert_eq!(
            Decimal::new(0, 5).compare(&Decimal::new(0, -5)),
            Ordering::Equal
        );
    }

    #[test]
    fn test_decimal_normalized_unique_for_equal_values() {
        let a = Decimal::new(1200, -2).normalized();
        let b = Decimal::new(12, 0).normalized();
        assert_eq!(a.unscaled(), b.unscaled());
        assert_eq!(a.exponent(), b.exponent());
    }

    #[test]
    fn test_time_point_compares_seconds_then_subseconds() {
        let earlier = TimePoint::new(100, 999_999_999);
        let later = TimePoint::new(101, 0);
        assert!(earlier < later);
        assert!(TimePoint::new(100, 1) > TimePoint::new(100, 0));
    }

    #[test]
    fn test_int_widening() {
        assert_eq!(Value::Int1(-5).as_int(), Some(-5));
        assert_eq!(Value::Int8(1 << 40).as_int(), Some(1 << 40));
        assert_eq!(Value::Character("x".into()).as_int(), None);
    }
}
