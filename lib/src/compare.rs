//! Total order and equality over runtime values and records.
//!
//! Floats get the test-reproducible treatment: NaN equals NaN, +0.0 equals
//! -0.0, and NaN orders above every other value. NULL sorts before any
//! non-null value.

use std::cmp::Ordering;

use crate::record::RecordMeta;
use crate::value::Value;

/// Total order for f64 with NaN greatest and -0.0 == +0.0.
pub fn total_compare_f64(l: f64, r: f64) -> Ordering {
    match (l.is_nan(), r.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => {
            if l == r {
                // covers +0.0 vs -0.0
                Ordering::Equal
            } else if l < r {
                Ordering::Less
            } else {
                Ordering::Greater
            }
        }
    }
}

pub fn total_compare_f32(l: f32, r: f32) -> Ordering {
    total_compare_f64(l as f64, r as f64)
}

/// Compares two values of the same field kind. NULL sorts first.
///
/// # Panics
/// Panics when the operands have different non-null kinds; the caller is
/// responsible for comparing like with like (records share a schema).
pub fn compare_values(l: &Value, r: &Value) -> Ordering {
    match (l, r) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
        (Value::Int1(a), Value::Int1(b)) => a.cmp(b),
        (Value::Int2(a), Value::Int2(b)) => a.cmp(b),
        (Value::Int4(a), Value::Int4(b)) => a.cmp(b),
        (Value::Int8(a), Value::Int8(b)) => a.cmp(b),
        (Value::Float4(a), Value::Float4(b)) => total_compare_f32(*a, *b),
        (Value::Float8(a), Value::Float8(b)) => total_compare_f64(*a, *b),
        (Value::Decimal(a), Value::Decimal(b)) => a.compare(b),
        (Value::Character(a), Value::Character(b)) => a.cmp(b),
        (Value::Octet(a), Value::Octet(b)) => a.cmp(b),
        (Value::Date(a), Value::Date(b)) => a.cmp(b),
        (Value::TimeOfDay(a), Value::TimeOfDay(b)) => {
            a.nanos_of_day.cmp(&b.nanos_of_day)
        }
        (Value::TimePoint(a), Value::TimePoint(b)) => a.cmp(b),
        (Value::Blob(a), Value::Blob(b)) => a.cmp(b),
        (Value::Clob(a), Value::Clob(b)) => a.cmp(b),
        (a, b) => panic!(
            "comparing values of different kinds: {:?} vs {:?}",
            a.kind(),
            b.kind()
        ),
    }
}

pub fn equal_values(l: &Value, r: &Value) -> bool {
    compare_values(l, r) == Ordering::Equal
}

/// Field-by-field comparator over records sharing a schema: compares in
/// declared order, first non-zero wins.
#[derive(Debug, Clone, Default)]
pub struct RecordComparator {
    /// When non-empty, restricts and reorders the compared fields.
    key_indices: Vec<usize>,
}

impl RecordComparator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Comparator over the given key fields, in the given order.
    pub fn with_key_indices(key_indices: Vec<usize>) -> Self {
        Self { key_indices }
    }

    pub fn compare(&self, l: &[Value], r: &[Value]) -> Ordering {
        if self.key_indices.is_empty() {
            debug_assert_eq!(l.len(), r.len());
            for (a, b) in l.iter().zip(r.iter()) {
                let res = compare_values(a, b);
                if res != Ordering::Equal {
                    return res;
                }
            }
            return Ordering::Equal;
        }
        for &i in &self.key_indices {
            let res = compare_values(&l[i], &r[i]);
            if res != Ordering::Equal {
                return res;
            }
        }
        Ordering::Equal
    }

    pub fn equal(&self, l: &[Value], r: &[Value]) -> bool {
        self.compare(l, r) == Ordering::Equal
    }
}

/// Validates that a value is assignable to a declared field type. Used by
/// parameter binding and insert paths before any comparison happens.
pub fn kind_matches(meta: &RecordMeta, index: usize, value: &Value) -> bool {
    match value.kind() {
        None => meta.field(index).nullable,
        Some(kind) => meta.field(index).field_type.kind() == kind,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Decimal;

    #[test]
    fn test_nan_equal_and_greatest() {
        let nan = Value::Float8(f64::NAN);
        let one = Value::Float8(1.0);
        assert!(equal_values(&nan, &nan));
        assert_eq!(compare_values(&one, &nan), Ordering::Less);
        assert_eq!(compare_values(&nan, &one), Ordering::Greater);
        // less(NaN, NaN) is false
        assert_eq!(compare_values(&nan, &nan), Ordering::Equal);
    }

    #[test]
    fn test_signed_zero_equal() {
        assert!(equal_values(&Value::Float8(0.0), &Value::Float8(-0.0)));
        assert!(equal_values(&Value::Float4(0.0), &Value::Float4(-0.0)));
    }

    #[test]
    fn test_null_sorts_first() {
        assert_eq!(
            compare_values(&Value::Null, &Value::Int4(i32::MIN)),
            Ordering::Less
        );
        assert_eq!(compare_values(&Value::Null, &Value::Null), Ordering::Equal);
    }

    #[test]
    fn test_record_comparator_first_nonzero_wins() {
        let cmp = RecordComparator::new();
        let a = vec![Value::Int4(1), Value::Int4(9)];
        let b = vec![Value::Int4(2), Value::Int4(0)];
        assert_eq!(cmp.compare(&a, &b), Ordering::Less);
        let c = vec![Value::Int4(1), Value::Int4(0)];
        assert_eq!(cmp.compare(&a, &c), Ordering::Greater);
    }

    #[test]
    fn test_key_indices_restrict_comparison() {
        let cmp = RecordComparator::with_key_indices(vec![1]);
        let a = vec![Value::Int4(100), Value::Character("a".into())];
        let b = vec![Value::Int4(-1), Value::Character("a".into())];
        assert!(cmp.equal(&a, &b));
    }

    #[test]
    fn test_decimal_values_compare_by_value() {
        let a = Value::Decimal(Decimal::new(100, -2));
        let b = Value::Decimal(Decimal::new(1, 0));
        assert!(equal_values(&a, &b));
    }
}
