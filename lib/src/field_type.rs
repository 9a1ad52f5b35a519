use serde::{Deserialize, Serialize};

/// Closed set of runtime field type kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldTypeKind {
    Boolean,
    Int1,
    Int2,
    Int4,
    Int8,
    Float4,
    Float8,
    Decimal,
    Character,
    Octet,
    Date,
    TimeOfDay,
    TimePoint,
    Blob,
    Clob,
    /// The void/unknown type (e.g. a bare NULL literal).
    Unknown,
}

impl FieldTypeKind {
    pub fn name(&self) -> &'static str {
        match self {
            FieldTypeKind::Boolean => "boolean",
            FieldTypeKind::Int1 => "int1",
            FieldTypeKind::Int2 => "int2",
            FieldTypeKind::Int4 => "int4",
            FieldTypeKind::Int8 => "int8",
            FieldTypeKind::Float4 => "float4",
            FieldTypeKind::Float8 => "float8",
            FieldTypeKind::Decimal => "decimal",
            FieldTypeKind::Character => "character",
            FieldTypeKind::Octet => "octet",
            FieldTypeKind::Date => "date",
            FieldTypeKind::TimeOfDay => "time_of_day",
            FieldTypeKind::TimePoint => "time_point",
            FieldTypeKind::Blob => "blob",
            FieldTypeKind::Clob => "clob",
            FieldTypeKind::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for FieldTypeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Precision/scale option for decimal types. `precision == None` means
/// unbounded precision; `scale == None` means floating scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct DecimalOption {
    pub precision: Option<u8>,
    pub scale: Option<u8>,
}

/// Length option for character/octet types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LengthOption {
    pub varying: bool,
    pub length: Option<usize>,
}

impl Default for LengthOption {
    fn default() -> Self {
        Self {
            varying: true,
            length: None,
        }
    }
}

/// Offset option for time-of-day/time-point types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TimeOption {
    pub with_offset: bool,
}

/// A field type: the kind plus kind-specific options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldType {
    kind: FieldTypeKind,
    decimal: Option<DecimalOption>,
    length: Option<LengthOption>,
    time: Option<TimeOption>,
}

impl FieldType {
    pub fn new(kind: FieldTypeKind) -> Self {
        Self {
            kind,
            decimal: None,
            length: None,
            time: None,
        }
    }

    pub fn decimal(option: DecimalOption) -> Self {
        Self {
            kind: FieldTypeKind::Decimal,
            decimal: Some(option),
            length: None,
            time: None,
        }
    }

    pub fn character(option: LengthOption) -> Self {
        Self {
            kind: FieldTypeKind::Character,
            decimal: None,
            length: Some(option),
            time: None,
        }
    }

    pub fn octet(option: LengthOption) -> Self {
        Self {
            kind: FieldTypeKind::Octet,
            decimal: None,
            length: Some(option),
            time: None,
        }
    }

    pub fn time_of_day(option: TimeOption) -> Self {
        Self {
            kind: FieldTypeKind::TimeOfDay,
            decimal: None,
            length: None,
            time: Some(option),
        }
    }

    pub fn time_point(option: TimeOption) -> Self {
        Self {
            kind: FieldTypeKind::TimePoint,
            decimal: None,
            length: None,
            time: Some(option),
        }
    }

    pub fn kind(&self) -> FieldTypeKind {
        self.kind
    }

    pub fn decimal_option(&self) -> Option<DecimalOption> {
        self.decimal
    }

    pub fn length_option(&self) -> Option<LengthOption> {
        self.length
    }

    pub fn time_option(&self) -> Option<TimeOption> {
        self.time
    }
}

impl From<FieldTypeKind> for FieldType {
    fn from(kind: FieldTypeKind) -> Self {
        FieldType::new(kind)
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind.name())?;
        if let Some(d) = self.decimal {
            write!(
                f,
                "({}, {})",
                d.precision.map_or("*".into(), |p| p.to_string()),
                d.scale.map_or("*".into(), |s| s.to_string()),
            )?;
        }
        if let Some(l) = self.length {
            if let Some(n) = l.length {
                write!(f, "({n})")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_options() {
        let t = FieldType::decimal(DecimalOption {
            precision: Some(10),
            scale: Some(2),
        });
        assert_eq!(t.to_string(), "decimal(10, 2)");
        let t = FieldType::character(LengthOption {
            varying: true,
            length: Some(20),
        });
        assert_eq!(t.to_string(), "character(20)");
        assert_eq!(FieldType::new(FieldTypeKind::Int4).to_string(), "int4");
    }
}
