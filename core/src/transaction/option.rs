/// Options for beginning a transaction.
#[derive(Debug, Clone, Default)]
pub struct TransactionOption {
    /// Read-only transaction (RTX).
    pub readonly: bool,
    /// Long transaction (LTX).
    pub is_long: bool,
    /// Permits DDL under this transaction.
    pub modifies_definitions: bool,
    /// Storage names locked for write by an LTX.
    pub write_preserve: Vec<String>,
    /// Free-form trace label.
    pub label: Option<String>,
    /// Storage-scoped read restrictions.
    pub read_areas_inclusive: Vec<String>,
    pub read_areas_exclusive: Vec<String>,
}

impl TransactionOption {
    pub fn occ() -> Self {
        Self::default()
    }

    pub fn rtx() -> Self {
        Self {
            readonly: true,
            ..Self::default()
        }
    }

    pub fn ltx(write_preserve: Vec<String>) -> Self {
        Self {
            is_long: true,
            write_preserve,
            ..Self::default()
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_definitions(mut self) -> Self {
        self.modifies_definitions = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders() {
        let o = TransactionOption::ltx(vec!["t".into()])
            .with_label("load job")
            .with_definitions();
        assert!(o.is_long);
        assert!(o.modifies_definitions);
        assert_eq!(o.write_preserve, vec!["t".to_string()]);
        assert_eq!(o.label.as_deref(), Some("load job"));
        assert!(TransactionOption::rtx().readonly);
    }
}
