//! Statement execution helpers: value coercion, the scan process logic
//! running against the storage façade, and the row codec shared by the
//! write and read paths.

use std::sync::Arc;

use cascade_core::executor::function::ScalarFunctionKind;
use cascade_core::executor::process::{ProcessContext, ProcessLogic};
use cascade_lib::codec::encode_key;
use cascade_lib::compare::compare_values;
use cascade_lib::error::{EngineError, EngineResult, ErrorKind};
use cascade_lib::field_type::{FieldType, FieldTypeKind};
use cascade_lib::record::Record;
use cascade_lib::value::{Decimal, Value};
use cascade_storage::Storage;

use crate::metadata::TableMetadata;
use crate::params::ParameterSet;
use crate::plan::{CompareOp, Condition, ScalarExpr};

/// Cancellation is re-checked after each batch of this many scanned rows.
const SCAN_CANCEL_CHECK_INTERVAL: usize = 1024;

/// Serializes one row for the primary-index value slot.
pub fn encode_row(record: &Record) -> EngineResult<Vec<u8>> {
    bincode::serialize(record).map_err(|e| {
        EngineError::new(ErrorKind::IoError(e.to_string()), "failed to encode row")
    })
}

/// Decodes a stored row. A size/shape mismatch here means corrupted
/// storage, which is an engine bug.
pub fn decode_row(bytes: &[u8]) -> Record {
    bincode::deserialize(bytes).expect("stored row decodes")
}

/// Encodes the primary-key portion of a row.
pub fn encode_row_key(record: &[Value], primary_key: &[usize]) -> EngineResult<Vec<u8>> {
    encode_key(record, primary_key)
}

/// Coerces a bound or literal value to a declared field type. Integer and
/// float literals arrive at their widest type and narrow here; everything
/// else must match the declared kind exactly.
pub fn coerce_value(value: &Value, target: &FieldType) -> EngineResult<Value> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    let mismatch = || {
        EngineError::new(
            ErrorKind::InvalidArgument(format!(
                "{:?} for {} column",
                value.kind(),
                target.kind().name()
            )),
            format!("value is not assignable to {} column", target.kind().name()),
        )
    };
    let coerced = match target.kind() {
        FieldTypeKind::Boolean => match value {
            Value::Boolean(b) => Value::Boolean(*b),
            _ => return Err(mismatch()),
        },
        FieldTypeKind::Int1 => Value::Int1(narrow(value, i8::MIN as i64, i8::MAX as i64)? as i8),
        FieldTypeKind::Int2 => Value::Int2(narrow(value, i16::MIN as i64, i16::MAX as i64)? as i16),
        FieldTypeKind::Int4 => Value::Int4(narrow(value, i32::MIN as i64, i32::MAX as i64)? as i32),
        FieldTypeKind::Int8 => match value.as_int() {
            Some(v) => Value::Int8(v),
            None => return Err(mismatch()),
        },
        FieldTypeKind::Float4 => match value.as_float().or_else(|| value.as_int().map(|i| i as f64)) {
            Some(f) => Value::Float4(f as f32),
            None => return Err(mismatch()),
        },
        FieldTypeKind::Float8 => match value.as_float().or_else(|| value.as_int().map(|i| i as f64)) {
            Some(f) => Value::Float8(f),
            None => return Err(mismatch()),
        },
        FieldTypeKind::Decimal => match value {
            Value::Decimal(d) => Value::Decimal(*d),
            Value::Int1(_) | Value::Int2(_) | Value::Int4(_) | Value::Int8(_) => {
                Value::Decimal(Decimal::from_i64(value.as_int().expect("integer family")))
            }
            _ => return Err(mismatch()),
        },
        FieldTypeKind::Character => match value {
            Value::Character(s) => {
                let option = target.length_option().unwrap_or_default();
                match option.length {
                    Some(limit) if s.chars().count() > limit && option.varying => {
                        return Err(EngineError::new(
                            ErrorKind::ConstraintViolation(format!("varchar({limit})")),
                            "string exceeds declared length",
                        ))
                    }
                    Some(limit) if !option.varying => {
                        // fixed-length char pads to the declared length
                        let mut padded = s.clone();
                        while padded.chars().count() < limit {
                            padded.push(' ');
                        }
                        if padded.chars().count() > limit {
                            return Err(EngineError::new(
                                ErrorKind::ConstraintViolation(format!("char({limit})")),
                                "string exceeds declared length",
                            ));
                        }
                        Value::Character(padded)
                    }
                    _ => Value::Character(s.clone()),
                }
            }
            _ => return Err(mismatch()),
        },
        FieldTypeKind::Octet => match value {
            Value::Octet(b) => Value::Octet(b.clone()),
            _ => return Err(mismatch()),
        },
        FieldTypeKind::Date => match value {
            Value::Date(d) => Value::Date(*d),
            Value::Int4(_) | Value::Int8(_) => Value::Date(value.as_int().expect("integer")),
            _ => return Err(mismatch()),
        },
        FieldTypeKind::TimeOfDay => match value {
            Value::TimeOfDay(t) => Value::TimeOfDay(*t),
            _ => return Err(mismatch()),
        },
        FieldTypeKind::TimePoint => match value {
            Value::TimePoint(t) => Value::TimePoint(*t),
            _ => return Err(mismatch()),
        },
        FieldTypeKind::Blob => match value {
            Value::Blob(r) => Value::Blob(*r),
            _ => return Err(mismatch()),
        },
        FieldTypeKind::Clob => match value {
            Value::Clob(r) => Value::Clob(*r),
            _ => return Err(mismatch()),
        },
        FieldTypeKind::Unknown => value.clone(),
    };
    Ok(coerced)
}

fn narrow(value: &Value, min: i64, max: i64) -> EngineResult<i64> {
    let v = value.as_int().ok_or_else(|| {
        EngineError::new(
            ErrorKind::InvalidArgument(format!("{:?}", value.kind())),
            "integer value required",
        )
    })?;
    if v < min || v > max {
        return Err(EngineError::new(
            ErrorKind::ConstraintViolation(format!("{v} out of range")),
            "integer value out of range for column",
        ));
    }
    Ok(v)
}

/// Resolves a literal or placeholder to a concrete value. Column
/// references are not valid in value position.
pub fn resolve_scalar(expr: &ScalarExpr, params: &ParameterSet) -> EngineResult<Value> {
    match expr {
        ScalarExpr::Literal(v) => Ok(v.clone()),
        ScalarExpr::Placeholder(name) => params.resolve(name).cloned(),
        ScalarExpr::FunctionCall { function, .. } => Err(EngineError::new(
            ErrorKind::CompileError(function.clone()),
            "function calls are not supported in value position",
        )),
        ScalarExpr::Column(name) => Err(EngineError::new(
            ErrorKind::CompileError(name.clone()),
            "column references are not supported in value position",
        )),
    }
}

/// A WHERE conjunct with the column resolved and the comparand coerced.
#[derive(Debug, Clone)]
pub struct CompiledCondition {
    pub column: usize,
    pub op: CompareOp,
    pub value: Value,
}

impl CompiledCondition {
    pub fn compile(
        condition: &Condition,
        table: &TableMetadata,
        params: &ParameterSet,
    ) -> EngineResult<Self> {
        let column = table.column_index(&condition.column)?;
        let raw = resolve_scalar(&condition.value, params)?;
        let value = coerce_value(&raw, &table.columns.field(column).field_type)?;
        Ok(Self {
            column,
            op: condition.op,
            value,
        })
    }

    /// SQL comparison semantics: NULL on either side never matches.
    pub fn matches(&self, row: &[Value]) -> bool {
        let lhs = &row[self.column];
        if lhs.is_null() || self.value.is_null() {
            return false;
        }
        let ordering = compare_values(lhs, &self.value);
        match self.op {
            CompareOp::Eq => ordering == std::cmp::Ordering::Equal,
            CompareOp::Ne => ordering != std::cmp::Ordering::Equal,
            CompareOp::Lt => ordering == std::cmp::Ordering::Less,
            CompareOp::Le => ordering != std::cmp::Ordering::Greater,
            CompareOp::Gt => ordering == std::cmp::Ordering::Greater,
            CompareOp::Ge => ordering != std::cmp::Ordering::Less,
        }
    }
}

/// One output column of a compiled scan.
#[derive(Debug, Clone)]
pub enum ProjectionItem {
    Column(usize),
    Scalar {
        function: ScalarFunctionKind,
        column: usize,
    },
}

impl ProjectionItem {
    pub fn evaluate(&self, row: &[Value]) -> EngineResult<Value> {
        match self {
            ProjectionItem::Column(i) => Ok(row[*i].clone()),
            ProjectionItem::Scalar { function, column } => function.evaluate(&row[*column]),
        }
    }
}

/// Source-side process: scans the table through the request's transaction,
/// filters, projects, and writes into its downstream exchange.
///
/// Rows are spread over the partitions round-robin; a single-partition
/// scan therefore preserves key order.
pub struct ScanLogic {
    storage: Arc<Storage>,
    filter: Vec<CompiledCondition>,
    projection: Vec<ProjectionItem>,
    partitions: usize,
}

impl ScanLogic {
    pub fn new(
        storage: Arc<Storage>,
        filter: Vec<CompiledCondition>,
        projection: Vec<ProjectionItem>,
        partitions: usize,
    ) -> Self {
        Self {
            storage,
            filter,
            projection,
            partitions: partitions.max(1),
        }
    }
}

impl ProcessLogic for ScanLogic {
    fn run(&self, ctx: &mut ProcessContext<'_>) -> EngineResult<()> {
        let request = Arc::clone(ctx.request());
        let tx = request.transaction().ok_or_else(|| {
            EngineError::new(
                ErrorKind::Internal("scan without transaction".into()),
                "scan process requires a transaction",
            )
        })?;
        let rows = tx.with_storage(|storage_tx| storage_tx.full_scan(&self.storage));
        let mut since_check = 0usize;
        for (index, (_, bytes)) in rows.into_iter().enumerate() {
            if index % self.partitions != ctx.partition() {
                continue;
            }
            since_check += 1;
            if since_check >= SCAN_CANCEL_CHECK_INTERVAL {
                since_check = 0;
                if request.check_cancel() {
                    return Ok(());
                }
            }
            let row = decode_row(&bytes);
            if !self.filter.iter().all(|c| c.matches(row.values())) {
                continue;
            }
            let projected: Vec<Value> = self
                .projection
                .iter()
                .map(|p| p.evaluate(row.values()))
                .collect::<EngineResult<_>>()?;
            let record = Record::new(projected);
            for output in 0..ctx.output_count() {
                ctx.output(output).write(record.clone())?;
            }
        }
        Ok(())
    }
}

/// Remaps a storage `concurrent_operation` on a read path per the
/// configuration knobs.
pub fn remap_concurrent_read(error: EngineError, as_not_found: bool) -> EngineError {
    match error.kind() {
        ErrorKind::ConcurrentOperation(_) if as_not_found => EngineError::new(
            ErrorKind::NotFound(String::new()),
            "entry is not yet visible to this transaction",
        ),
        ErrorKind::ConcurrentOperation(_) => EngineError::new(
            ErrorKind::SerializationFailure(String::new()),
            "conflicting concurrent operation on read",
        ),
        _ => error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_lib::field_type::LengthOption;

    #[test]
    fn test_integer_narrowing() {
        let t = FieldType::new(FieldTypeKind::Int4);
        assert_eq!(coerce_value(&Value::Int8(42), &t).unwrap(), Value::Int4(42));
        assert!(coerce_value(&Value::Int8(i64::MAX), &t).is_err());
    }

    #[test]
    fn test_int_to_float_widening() {
        let t = FieldType::new(FieldTypeKind::Float8);
        assert_eq!(
            coerce_value(&Value::Int8(3), &t).unwrap(),
            Value::Float8(3.0)
        );
    }

    #[test]
    fn test_varchar_length_enforced() {
        let t = FieldType::character(LengthOption {
            varying: true,
            length: Some(3),
        });
        assert!(coerce_value(&Value::Character("abcd".into()), &t).is_err());
        assert_eq!(
            coerce_value(&Value::Character("ab".into()), &t).unwrap(),
            Value::Character("ab".into())
        );
    }

    #[test]
    fn test_char_pads_to_length() {
        let t = FieldType::character(LengthOption {
            varying: false,
            length: Some(4),
        });
        assert_eq!(
            coerce_value(&Value::Character("ab".into()), &t).unwrap(),
            Value::Character("ab  ".into())
        );
    }

    #[test]
    fn test_null_coerces_to_anything() {
        let t = FieldType::new(FieldTypeKind::TimePoint);
        assert!(coerce_value(&Value::Null, &t).unwrap().is_null());
    }

    #[test]
    fn test_condition_null_never_matches() {
        let cond = CompiledCondition {
            column: 0,
            op: CompareOp::Eq,
            value: Value::Int4(1),
        };
        assert!(cond.matches(&[Value::Int4(1)]));
        assert!(!cond.matches(&[Value::Null]));
        let null_cond = CompiledCondition {
            column: 0,
            op: CompareOp::Eq,
            value: Value::Null,
        };
        assert!(!null_cond.matches(&[Value::Int4(1)]));
    }

    #[test]
    fn test_row_round_trip() {
        let row = Record::new(vec![Value::Int4(1), Value::Character("x".into())]);
        let bytes = encode_row(&row).unwrap();
        assert_eq!(decode_row(&bytes), row);
    }

    #[test]
    fn test_concurrent_read_remap() {
        let err = EngineError::new(ErrorKind::ConcurrentOperation(String::new()), "race");
        assert!(matches!(
            remap_concurrent_read(err.clone(), true).kind(),
            ErrorKind::NotFound(_)
        ));
        assert!(matches!(
            remap_concurrent_read(err, false).kind(),
            ErrorKind::SerializationFailure(_)
        ));
    }
}
