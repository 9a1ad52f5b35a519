use std::collections::HashMap;

use cascade_lib::error::{EngineError, EngineResult, ErrorKind};
use cascade_lib::value::{Decimal, LobReference, TimeOfDay, TimePoint, Value};

/// Named placeholder assignments for one statement execution. Null
/// assignment is first-class: a name can be bound to SQL NULL explicitly,
/// which is different from not being bound at all.
#[derive(Debug, Clone, Default)]
pub struct ParameterSet {
    entries: HashMap<String, Value>,
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_value(&mut self, name: &str, value: Value) {
        self.entries.insert(name.to_ascii_lowercase(), value);
    }

    pub fn set_null(&mut self, name: &str) {
        self.set_value(name, Value::Null);
    }

    pub fn set_boolean(&mut self, name: &str, value: bool) {
        self.set_value(name, Value::Boolean(value));
    }

    pub fn set_int4(&mut self, name: &str, value: i32) {
        self.set_value(name, Value::Int4(value));
    }

    pub fn set_int8(&mut self, name: &str, value: i64) {
        self.set_value(name, Value::Int8(value));
    }

    pub fn set_float4(&mut self, name: &str, value: f32) {
        self.set_value(name, Value::Float4(value));
    }

    pub fn set_float8(&mut self, name: &str, value: f64) {
        self.set_value(name, Value::Float8(value));
    }

    pub fn set_decimal(&mut self, name: &str, value: Decimal) {
        self.set_value(name, Value::Decimal(value));
    }

    pub fn set_character(&mut self, name: &str, value: impl Into<String>) {
        self.set_value(name, Value::Character(value.into()));
    }

    pub fn set_octet(&mut self, name: &str, value: Vec<u8>) {
        self.set_value(name, Value::Octet(value));
    }

    pub fn set_date(&mut self, name: &str, days: i64) {
        self.set_value(name, Value::Date(days));
    }

    pub fn set_time_of_day(&mut self, name: &str, value: TimeOfDay) {
        self.set_value(name, Value::TimeOfDay(value));
    }

    pub fn set_time_point(&mut self, name: &str, value: TimePoint) {
        self.set_value(name, Value::TimePoint(value));
    }

    pub fn set_blob(&mut self, name: &str, reference: LobReference) {
        self.set_value(name, Value::Blob(reference));
    }

    pub fn set_clob(&mut self, name: &str, reference: LobReference) {
        self.set_value(name, Value::Clob(reference));
    }

    /// Resolves a placeholder; unbound names are an error.
    pub fn resolve(&self, name: &str) -> EngineResult<&Value> {
        self.entries
            .get(&name.to_ascii_lowercase())
            .ok_or_else(|| {
                EngineError::new(
                    ErrorKind::InvalidArgument(name.to_string()),
                    format!("placeholder ':{name}' is not bound"),
                )
            })
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_resolve() {
        let mut params = ParameterSet::new();
        params.set_int8("P0", 42);
        params.set_character("p1", "x");
        assert_eq!(params.resolve("p0").unwrap().as_int(), Some(42));
        assert_eq!(params.resolve("P1").unwrap().as_str(), Some("x"));
        assert!(params.resolve("p2").is_err());
    }

    #[test]
    fn test_null_binding_is_distinct_from_unbound() {
        let mut params = ParameterSet::new();
        params.set_null("p0");
        assert!(params.resolve("p0").unwrap().is_null());
        assert!(params.resolve("p1").is_err());
    }

    #[test]
    fn test_rebinding_overwrites() {
        let mut params = ParameterSet::new();
        params.set_int4("p", 1);
        params.set_int4("p", 2);
        assert_eq!(params.resolve("p").unwrap().as_int(), Some(2));
        assert_eq!(params.size(), 1);
    }
}
