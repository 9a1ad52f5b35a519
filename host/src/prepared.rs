use std::collections::HashMap;

use cascade_lib::field_type::FieldTypeKind;

use crate::plan::Statement;

/// A compiled statement cached in a session's statement store.
///
/// Shared by reference: the store keeps one strong reference and every
/// in-flight execution another, so closing the statement mid-query is
/// safe — the query holds the statement alive until it completes.
pub struct PreparedStatement {
    sql: String,
    statement: Statement,
    /// Declared placeholder kinds, used to validate bound parameters.
    placeholders: HashMap<String, FieldTypeKind>,
}

impl PreparedStatement {
    pub fn new(
        sql: impl Into<String>,
        statement: Statement,
        placeholders: HashMap<String, FieldTypeKind>,
    ) -> Self {
        let placeholders = placeholders
            .into_iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v))
            .collect();
        Self {
            sql: sql.into(),
            statement,
            placeholders,
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn statement(&self) -> &Statement {
        &self.statement
    }

    pub fn placeholder_kind(&self, name: &str) -> Option<FieldTypeKind> {
        self.placeholders.get(&name.to_ascii_lowercase()).copied()
    }

    pub fn placeholder_count(&self) -> usize {
        self.placeholders.len()
    }

    /// Whether the statement produces a result-record stream.
    pub fn has_result_records(&self) -> bool {
        matches!(self.statement, Statement::Query(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile;

    #[test]
    fn test_placeholder_kinds_are_case_insensitive() {
        let statement = compile("SELECT * FROM T WHERE C0 = :Key").unwrap();
        let prepared = PreparedStatement::new(
            "SELECT * FROM T WHERE C0 = :Key",
            statement,
            HashMap::from([("KEY".to_string(), FieldTypeKind::Int8)]),
        );
        assert_eq!(
            prepared.placeholder_kind("key"),
            Some(FieldTypeKind::Int8)
        );
        assert!(prepared.has_result_records());
    }
}
