use std::collections::HashMap;
use std::sync::RwLock;

use cascade_lib::compare::compare_values;
use cascade_lib::error::{EngineError, EngineResult, ErrorKind};
use cascade_lib::value::{Decimal, Value};

/// Builtin incremental aggregate functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunctionKind {
    /// COUNT(*) — counts rows, nulls included.
    CountRows,
    /// COUNT(x) — counts non-null arguments.
    Count,
    Sum,
    Min,
    Max,
    Avg,
}

/// Running state of one aggregate column. `accumulate` is the pre phase
/// applied on insertion, `combine` merges mid states across partitions and
/// `finish` is the post phase producing the output value.
#[derive(Debug, Clone)]
pub enum AggregateState {
    Count(i64),
    Sum(Option<Value>),
    Min(Option<Value>),
    Max(Option<Value>),
    Avg { sum: Option<Value>, count: i64 },
}

fn add_values(acc: Option<Value>, v: &Value) -> EngineResult<Option<Value>> {
    let result = match (acc, v) {
        (None, v) => v.clone(),
        (Some(Value::Int8(a)), v) => match v.as_int() {
            Some(b) => Value::Int8(a.wrapping_add(b)),
            None => return arg_error(v),
        },
        (Some(Value::Int4(a)), v) => match v.as_int() {
            Some(b) => Value::Int8(a as i64 + b),
            None => return arg_error(v),
        },
        (Some(Value::Int2(a)), v) => match v.as_int() {
            Some(b) => Value::Int8(a as i64 + b),
            None => return arg_error(v),
        },
        (Some(Value::Int1(a)), v) => match v.as_int() {
            Some(b) => Value::Int8(a as i64 + b),
            None => return arg_error(v),
        },
        (Some(Value::Float8(a)), v) => match v.as_float() {
            Some(b) => Value::Float8(a + b),
            None => return arg_error(v),
        },
        (Some(Value::Float4(a)), v) => match v.as_float() {
            Some(b) => Value::Float8(a as f64 + b),
            None => return arg_error(v),
        },
        (Some(Value::Decimal(a)), Value::Decimal(b)) => Value::Decimal(add_decimals(a, *b)),
        (Some(acc), v) => {
            return Err(EngineError::new(
                ErrorKind::UnsupportedRuntimeFeature(format!(
                    "sum over {:?} and {:?}",
                    acc.kind(),
                    v.kind()
                )),
                "unsupported operand for sum aggregate",
            ))
        }
    };
    Ok(Some(result))
}

fn arg_error(v: &Value) -> EngineResult<Option<Value>> {
    Err(EngineError::new(
        ErrorKind::UnsupportedRuntimeFeature(format!("{:?} argument", v.kind())),
        "unsupported aggregate argument type",
    ))
}

fn add_decimals(a: Decimal, b: Decimal) -> Decimal {
    // align to the smaller exponent
    let exp = a.exponent().min(b.exponent());
    let scale = |d: Decimal| -> i128 {
        let mut u = d.unscaled();
        for _ in 0..(d.exponent() - exp) {
            u = u.saturating_mul(10);
        }
        u
    };
    Decimal::new(scale(a).saturating_add(scale(b)), exp)
}

impl AggregateFunctionKind {
    pub fn name(&self) -> &'static str {
        match self {
            AggregateFunctionKind::CountRows | AggregateFunctionKind::Count => "count",
            AggregateFunctionKind::Sum => "sum",
            AggregateFunctionKind::Min => "min",
            AggregateFunctionKind::Max => "max",
            AggregateFunctionKind::Avg => "avg",
        }
    }

    pub fn new_state(&self) -> AggregateState {
        match self {
            AggregateFunctionKind::CountRows | AggregateFunctionKind::Count => {
                AggregateState::Count(0)
            }
            AggregateFunctionKind::Sum => AggregateState::Sum(None),
            AggregateFunctionKind::Min => AggregateState::Min(None),
            AggregateFunctionKind::Max => AggregateState::Max(None),
            AggregateFunctionKind::Avg => AggregateState::Avg {
                sum: None,
                count: 0,
            },
        }
    }

    /// Whether the function consumes an argument column.
    pub fn takes_argument(&self) -> bool {
        !matches!(self, AggregateFunctionKind::CountRows)
    }
}

impl AggregateState {
    /// Pre phase: folds one input into the state. `None` stands for the
    /// missing argument of COUNT(*).
    pub fn accumulate(&mut self, value: Option<&Value>) -> EngineResult<()> {
        match self {
            AggregateState::Count(n) => {
                // COUNT(*) counts every row, COUNT(x) skips nulls
                match value {
                    Some(v) if v.is_null() => {}
                    _ => *n += 1,
                }
            }
            AggregateState::Sum(acc) => {
                if let Some(v) = value {
                    if !v.is_null() {
                        *acc = add_values(acc.take(), v)?;
                    }
                }
            }
            AggregateState::Min(acc) => {
                if let Some(v) = value {
                    if !v.is_null() {
                        let replace = match acc {
                            None => true,
                            Some(current) => {
                                compare_values(v, current) == std::cmp::Ordering::Less
                            }
                        };
                        if replace {
                            *acc = Some(v.clone());
                        }
                    }
                }
            }
            AggregateState::Max(acc) => {
                if let Some(v) = value {
                    if !v.is_null() {
                        let replace = match acc {
                            None => true,
                            Some(current) => {
                                compare_values(v, current) == std::cmp::Ordering::Greater
                            }
                        };
                        if replace {
                            *acc = Some(v.clone());
                        }
                    }
                }
            }
            AggregateState::Avg { sum, count } => {
                if let Some(v) = value {
                    if !v.is_null() {
                        *sum = add_values(sum.take(), v)?;
                        *count += 1;
                    }
                }
            }
        }
        Ok(())
    }

    /// Mid phase: merges another partition's state into this one.
    pub fn combine(&mut self, other: AggregateState) -> EngineResult<()> {
        match (self, other) {
            (AggregateState::Count(a), AggregateState::Count(b)) => *a += b,
            (AggregateState::Sum(a), AggregateState::Sum(b)) => {
                if let Some(v) = b {
                    *a = add_values(a.take(), &v)?;
                }
            }
            (AggregateState::Min(a), AggregateState::Min(b)) => {
                if let Some(v) = b {
                    let replace = match a {
                        None => true,
                        Some(current) => compare_values(&v, current) == std::cmp::Ordering::Less,
                    };
                    if replace {
                        *a = Some(v);
                    }
                }
            }
            (AggregateState::Max(a), AggregateState::Max(b)) => {
                if let Some(v) = b {
                    let replace = match a {
                        None => true,
                        Some(current) => {
                            compare_values(&v, current) == std::cmp::Ordering::Greater
                        }
                    };
                    if replace {
                        *a = Some(v);
                    }
                }
            }
            (
                AggregateState::Avg { sum: a, count: ac },
                AggregateState::Avg { sum: b, count: bc },
            ) => {
                if let Some(v) = b {
                    *a = add_values(a.take(), &v)?;
                }
                *ac += bc;
            }
            _ => {
                return Err(EngineError::new(
                    ErrorKind::Internal("aggregate state mismatch".into()),
                    "combined aggregate states of different kinds",
                ))
            }
        }
        Ok(())
    }

    /// Post phase: produces the output value.
    pub fn finish(self) -> Value {
        match self {
            AggregateState::Count(n) => Value::Int8(n),
            AggregateState::Sum(acc) => acc.unwrap_or(Value::Null),
            AggregateState::Min(acc) => acc.unwrap_or(Value::Null),
            AggregateState::Max(acc) => acc.unwrap_or(Value::Null),
            AggregateState::Avg { sum, count } => match (sum, count) {
                (Some(v), n) if n > 0 => {
                    let total = v
                        .as_float()
                        .or_else(|| v.as_int().map(|i| i as f64))
                        .unwrap_or(0.0);
                    Value::Float8(total / n as f64)
                }
                _ => Value::Null,
            },
        }
    }
}

/// Name-keyed repository of incremental aggregate functions.
pub struct AggregateFunctionRepository {
    map: RwLock<HashMap<String, AggregateFunctionKind>>,
}

impl AggregateFunctionRepository {
    pub fn new() -> Self {
        Self {
            map: RwLock::new(HashMap::new()),
        }
    }

    pub fn builtin() -> Self {
        let repo = Self::new();
        repo.register("count", AggregateFunctionKind::Count);
        repo.register("sum", AggregateFunctionKind::Sum);
        repo.register("min", AggregateFunctionKind::Min);
        repo.register("max", AggregateFunctionKind::Max);
        repo.register("avg", AggregateFunctionKind::Avg);
        repo
    }

    pub fn register(&self, name: &str, kind: AggregateFunctionKind) {
        self.map
            .write()
            .unwrap()
            .insert(name.to_ascii_lowercase(), kind);
    }

    pub fn find(&self, name: &str) -> Option<AggregateFunctionKind> {
        self.map
            .read()
            .unwrap()
            .get(&name.to_ascii_lowercase())
            .copied()
    }

    pub fn size(&self) -> usize {
        self.map.read().unwrap().len()
    }
}

impl Default for AggregateFunctionRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_rows_counts_nulls() {
        let mut rows = AggregateFunctionKind::CountRows.new_state();
        rows.accumulate(None).unwrap();
        rows.accumulate(None).unwrap();
        assert_eq!(rows.finish(), Value::Int8(2));

        let mut args = AggregateFunctionKind::Count.new_state();
        args.accumulate(Some(&Value::Int4(1))).unwrap();
        args.accumulate(Some(&Value::Null)).unwrap();
        assert_eq!(args.finish(), Value::Int8(1));
    }

    #[test]
    fn test_sum_widens_integers() {
        let mut s = AggregateFunctionKind::Sum.new_state();
        s.accumulate(Some(&Value::Int4(3))).unwrap();
        s.accumulate(Some(&Value::Int4(4))).unwrap();
        assert_eq!(s.finish(), Value::Int8(7));
    }

    #[test]
    fn test_min_max() {
        let mut min = AggregateFunctionKind::Min.new_state();
        let mut max = AggregateFunctionKind::Max.new_state();
        for v in [5, 1, 9] {
            min.accumulate(Some(&Value::Int4(v))).unwrap();
            max.accumulate(Some(&Value::Int4(v))).unwrap();
        }
        assert_eq!(min.finish(), Value::Int4(1));
        assert_eq!(max.finish(), Value::Int4(9));
    }

    #[test]
    fn test_avg() {
        let mut avg = AggregateFunctionKind::Avg.new_state();
        for v in [1, 2, 3, 4] {
            avg.accumulate(Some(&Value::Int4(v))).unwrap();
        }
        assert_eq!(avg.finish(), Value::Float8(2.5));
        assert_eq!(AggregateFunctionKind::Avg.new_state().finish(), Value::Null);
    }

    #[test]
    fn test_combine_merges_partitions() {
        let mut a = AggregateFunctionKind::Sum.new_state();
        a.accumulate(Some(&Value::Int8(10))).unwrap();
        let mut b = AggregateFunctionKind::Sum.new_state();
        b.accumulate(Some(&Value::Int8(32))).unwrap();
        a.combine(b).unwrap();
        assert_eq!(a.finish(), Value::Int8(42));
    }

    #[test]
    fn test_decimal_sum_aligns_scales() {
        let mut s = AggregateFunctionKind::Sum.new_state();
        s.accumulate(Some(&Value::Decimal(Decimal::new(15, -1)))).unwrap(); // 1.5
        s.accumulate(Some(&Value::Decimal(Decimal::new(25, -2)))).unwrap(); // 0.25
        assert_eq!(s.finish(), Value::Decimal(Decimal::new(175, -2)));
    }

    #[test]
    fn test_repository_lookup_case_insensitive() {
        let repo = AggregateFunctionRepository::builtin();
        assert_eq!(repo.find("SUM"), Some(AggregateFunctionKind::Sum));
        assert_eq!(repo.find("nope"), None);
    }
}
