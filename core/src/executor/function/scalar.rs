use std::collections::HashMap;
use std::sync::RwLock;

use cascade_lib::error::{EngineError, EngineResult, ErrorKind};
use cascade_lib::value::Value;

/// Builtin scalar functions usable in projections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarFunctionKind {
    Upper,
    Lower,
    Abs,
    OctetLength,
}

impl ScalarFunctionKind {
    /// Applies the function. NULL in, NULL out.
    pub fn evaluate(&self, argument: &Value) -> EngineResult<Value> {
        if argument.is_null() {
            return Ok(Value::Null);
        }
        match self {
            ScalarFunctionKind::Upper => match argument {
                Value::Character(s) => Ok(Value::Character(s.to_uppercase())),
                _ => type_error("upper", argument),
            },
            ScalarFunctionKind::Lower => match argument {
                Value::Character(s) => Ok(Value::Character(s.to_lowercase())),
                _ => type_error("lower", argument),
            },
            ScalarFunctionKind::Abs => match argument {
                Value::Int1(v) => Ok(Value::Int1(v.wrapping_abs())),
                Value::Int2(v) => Ok(Value::Int2(v.wrapping_abs())),
                Value::Int4(v) => Ok(Value::Int4(v.wrapping_abs())),
                Value::Int8(v) => Ok(Value::Int8(v.wrapping_abs())),
                Value::Float4(v) => Ok(Value::Float4(v.abs())),
                Value::Float8(v) => Ok(Value::Float8(v.abs())),
                _ => type_error("abs", argument),
            },
            ScalarFunctionKind::OctetLength => match argument {
                Value::Character(s) => Ok(Value::Int8(s.len() as i64)),
                Value::Octet(b) => Ok(Value::Int8(b.len() as i64)),
                _ => type_error("octet_length", argument),
            },
        }
    }
}

fn type_error(name: &str, argument: &Value) -> EngineResult<Value> {
    Err(EngineError::new(
        ErrorKind::UnsupportedRuntimeFeature(format!("{name}({:?})", argument.kind())),
        format!("unsupported argument type for {name}"),
    ))
}

/// Name-keyed repository of scalar functions.
pub struct ScalarFunctionRepository {
    map: RwLock<HashMap<String, ScalarFunctionKind>>,
}

impl ScalarFunctionRepository {
    pub fn new() -> Self {
        Self {
            map: RwLock::new(HashMap::new()),
        }
    }

    pub fn builtin() -> Self {
        let repo = Self::new();
        repo.register("upper", ScalarFunctionKind::Upper);
        repo.register("lower", ScalarFunctionKind::Lower);
        repo.register("abs", ScalarFunctionKind::Abs);
        repo.register("octet_length", ScalarFunctionKind::OctetLength);
        repo
    }

    pub fn register(&self, name: &str, kind: ScalarFunctionKind) {
        self.map
            .write()
            .unwrap()
            .insert(name.to_ascii_lowercase(), kind);
    }

    pub fn find(&self, name: &str) -> Option<ScalarFunctionKind> {
        self.map
            .read()
            .unwrap()
            .get(&name.to_ascii_lowercase())
            .copied()
    }
}

impl Default for ScalarFunctionRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upper_lower() {
        assert_eq!(
            ScalarFunctionKind::Upper
                .evaluate(&Value::Character("abc".into()))
                .unwrap(),
            Value::Character("ABC".into())
        );
        assert_eq!(
            ScalarFunctionKind::Lower
                .evaluate(&Value::Character("AbC".into()))
                .unwrap(),
            Value::Character("abc".into())
        );
    }

    #[test]
    fn test_null_propagates() {
        assert_eq!(
            ScalarFunctionKind::Upper.evaluate(&Value::Null).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn test_abs_and_octet_length() {
        assert_eq!(
            ScalarFunctionKind::Abs.evaluate(&Value::Int4(-5)).unwrap(),
            Value::Int4(5)
        );
        assert_eq!(
            ScalarFunctionKind::OctetLength
                .evaluate(&Value::Character("abcd".into()))
                .unwrap(),
            Value::Int8(4)
        );
    }

    #[test]
    fn test_type_mismatch_fails() {
        assert!(ScalarFunctionKind::Upper.evaluate(&Value::Int4(1)).is_err());
    }
}
