//! Per-field hashing and the compound record hash used by the hash
//! partitioner. The hash must agree with [`crate::compare::equal_values`]:
//! equal values hash equal, including NaN/NaN, +0.0/-0.0 and decimals at
//! different scales.

use crate::value::Value;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

fn fnv1a(state: u64, bytes: &[u8]) -> u64 {
    let mut h = state;
    for b in bytes {
        h ^= *b as u64;
        h = h.wrapping_mul(FNV_PRIME);
    }
    h
}

fn canonical_f64_bits(v: f64) -> u64 {
    if v.is_nan() {
        return f64::NAN.to_bits();
    }
    if v == 0.0 {
        return 0.0f64.to_bits();
    }
    v.to_bits()
}

/// Hashes a single value into the running state.
pub fn hash_value(state: u64, value: &Value) -> u64 {
    match value {
        Value::Null => fnv1a(state, &[0xff]),
        Value::Boolean(v) => fnv1a(state, &[*v as u8]),
        Value::Int1(v) => fnv1a(state, &(*v as i64).to_le_bytes()),
        Value::Int2(v) => fnv1a(state, &(*v as i64).to_le_bytes()),
        Value::Int4(v) => fnv1a(state, &(*v as i64).to_le_bytes()),
        Value::Int8(v) => fnv1a(state, &v.to_le_bytes()),
        Value::Float4(v) => fnv1a(state, &canonical_f64_bits(*v as f64).to_le_bytes()),
        Value::Float8(v) => fnv1a(state, &canonical_f64_bits(*v).to_le_bytes()),
        Value::Decimal(v) => {
            let n = v.normalized();
            let h = fnv1a(state, &n.unscaled().to_le_bytes());
            fnv1a(h, &n.exponent().to_le_bytes())
        }
        Value::Character(v) => fnv1a(state, v.as_bytes()),
        Value::Octet(v) => fnv1a(state, v),
        Value::Date(v) => fnv1a(state, &v.to_le_bytes()),
        Value::TimeOfDay(v) => fnv1a(state, &v.nanos_of_day.to_le_bytes()),
        Value::TimePoint(v) => {
            let h = fnv1a(state, &v.seconds.to_le_bytes());
            fnv1a(h, &v.subsecond_nanos.to_le_bytes())
        }
        Value::Blob(v) | Value::Clob(v) => {
            let h = fnv1a(state, &v.provider.to_le_bytes());
            fnv1a(h, &v.object_id.to_le_bytes())
        }
    }
}

/// Compound hash over the given key fields of a record, folding per-field
/// hashes in declared order.
pub fn hash_record_keys(record: &[Value], key_indices: &[usize]) -> u64 {
    let mut state = FNV_OFFSET;
    for &i in key_indices {
        state = hash_value(state, &record[i]);
    }
    state
}

/// Hash over all fields of a record.
pub fn hash_record(record: &[Value]) -> u64 {
    let mut state = FNV_OFFSET;
    for v in record {
        state = hash_value(state, v);
    }
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Decimal;

    #[test]
    fn test_equal_floats_hash_equal() {
        let s = FNV_OFFSET;
        assert_eq!(
            hash_value(s, &Value::Float8(0.0)),
            hash_value(s, &Value::Float8(-0.0))
        );
        assert_eq!(
            hash_value(s, &Value::Float8(f64::NAN)),
            hash_value(s, &Value::Float8(-f64::NAN))
        );
    }

    #[test]
    fn test_equal_decimals_hash_equal() {
        let s = FNV_OFFSET;
        assert_eq!(
            hash_value(s, &Value::Decimal(Decimal::new(1200, -2))),
            hash_value(s, &Value::Decimal(Decimal::new(12, 0)))
        );
    }

    #[test]
    fn test_key_hash_uses_declared_order() {
        let rec = vec![Value::Int4(1), Value::Int4(2)];
        let fwd = hash_record_keys(&rec, &[0, 1]);
        let rev = hash_record_keys(&rec, &[1, 0]);
        assert_ne!(fwd, rev);
    }

    #[test]
    fn test_distinct_values_usually_differ() {
        let a = hash_record(&[Value::Int8(1)]);
        let b = hash_record(&[Value::Int8(2)]);
        assert_ne!(a, b);
    }
}
