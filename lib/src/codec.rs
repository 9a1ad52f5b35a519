//! Order-preserving key encoding for the storage layer.
//!
//! Keys encode so that unsigned byte-wise comparison of the encoded form
//! matches [`crate::compare::compare_values`] on the source values. This is
//! what lets full scans over the ordered storage return rows in key order.
//!
//! Encoding per kind:
//! - integers: big-endian two's complement with the sign bit flipped
//! - floats: IEEE bits, sign-flipped for positives, all-bits-flipped for
//!   negatives (canonical NaN, canonical zero)
//! - character: the bytes followed by a 0x00 terminator
//! - date/time kinds: their integer representation as above
//!
//! NULL key fields encode a 0x00 marker before the field (non-null fields
//! carry 0x01), so NULL sorts first.

use crate::error::{EngineError, EngineResult, ErrorKind};
use crate::value::{TimePoint, Value};

const NULL_MARKER: u8 = 0x00;
const VALUE_MARKER: u8 = 0x01;

fn put_i64(buf: &mut Vec<u8>, v: i64) {
    let flipped = (v as u64) ^ (1u64 << 63);
    buf.extend_from_slice(&flipped.to_be_bytes());
}

fn put_f64(buf: &mut Vec<u8>, v: f64) {
    let canonical = if v.is_nan() {
        f64::NAN
    } else if v == 0.0 {
        0.0
    } else {
        v
    };
    let bits = canonical.to_bits();
    let ordered = if canonical.is_sign_negative() && !canonical.is_nan() {
        !bits
    } else {
        bits | (1u64 << 63)
    };
    buf.extend_from_slice(&ordered.to_be_bytes());
}

/// Appends one key field to the buffer.
pub fn encode_key_value(buf: &mut Vec<u8>, value: &Value) -> EngineResult<()> {
    if value.is_null() {
        buf.push(NULL_MARKER);
        return Ok(());
    }
    buf.push(VALUE_MARKER);
    match value {
        Value::Boolean(v) => buf.push(*v as u8),
        Value::Int1(v) => put_i64(buf, *v as i64),
        Value::Int2(v) => put_i64(buf, *v as i64),
        Value::Int4(v) => put_i64(buf, *v as i64),
        Value::Int8(v) => put_i64(buf, *v),
        Value::Float4(v) => put_f64(buf, *v as f64),
        Value::Float8(v) => put_f64(buf, *v),
        Value::Character(v) => {
            if v.as_bytes().contains(&0u8) {
                return Err(EngineError::new(
                    ErrorKind::InvalidArgument("key string contains NUL".into()),
                    "character key fields must not contain NUL bytes",
                ));
            }
            buf.extend_from_slice(v.as_bytes());
            buf.push(0u8);
        }
        Value::Date(v) => put_i64(buf, *v),
        Value::TimeOfDay(v) => put_i64(buf, v.nanos_of_day as i64),
        Value::TimePoint(TimePoint {
            seconds,
            subsecond_nanos,
            ..
        }) => {
            put_i64(buf, *seconds);
            buf.extend_from_slice(&subsecond_nanos.to_be_bytes());
        }
        Value::Decimal(_) | Value::Octet(_) | Value::Blob(_) | Value::Clob(_) => {
            return Err(EngineError::new(
                ErrorKind::UnsupportedRuntimeFeature(format!(
                    "{:?} key column",
                    value.kind()
                )),
                "unsupported key column type",
            ));
        }
        Value::Null => unreachable!(),
    }
    Ok(())
}

/// Encodes a composite key from the given fields of a record.
pub fn encode_key(record: &[Value], key_indices: &[usize]) -> EngineResult<Vec<u8>> {
    let mut buf = Vec::with_capacity(key_indices.len() * 9);
    for &i in key_indices {
        encode_key_value(&mut buf, &record[i])?;
    }
    Ok(buf)
}
