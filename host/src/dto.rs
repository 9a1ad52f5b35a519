//! Wire DTOs for the describe-table surface. These are the structures
//! marshalled into the host protocol; `to_wire`/`from_wire` round-trip
//! through the serialized form.

use cascade_lib::error::{EngineError, EngineResult, ErrorKind};
use cascade_lib::field_type::FieldType;
use serde::{Deserialize, Serialize};

use crate::metadata::TableMetadata;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDto {
    pub name: String,
    pub field_type: FieldType,
    pub nullable: bool,
    pub primary_key_position: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescribeTableDto {
    pub table_name: String,
    pub columns: Vec<ColumnDto>,
    pub indexes: Vec<String>,
    /// user name → allowed action names, sorted for stable output.
    pub authorized_users: Vec<(String, Vec<String>)>,
}

impl DescribeTableDto {
    pub fn from_metadata(metadata: &TableMetadata) -> Self {
        let columns = metadata
            .columns
            .fields()
            .iter()
            .enumerate()
            .map(|(i, f)| ColumnDto {
                name: f.name.clone(),
                field_type: f.field_type,
                nullable: f.nullable,
                primary_key_position: metadata.primary_key.iter().position(|&pk| pk == i),
            })
            .collect();
        let mut authorized_users: Vec<(String, Vec<String>)> = metadata
            .authorized_users
            .iter()
            .map(|(name, set)| {
                (
                    name.to_string(),
                    set.iter().map(|a| a.name().to_string()).collect(),
                )
            })
            .collect();
        authorized_users.sort();
        Self {
            table_name: metadata.name.clone(),
            columns,
            indexes: metadata.indexes.iter().map(|i| i.name.clone()).collect(),
            authorized_users,
        }
    }

    /// Serializes into the wire form.
    pub fn to_wire(&self) -> EngineResult<String> {
        serde_json::to_string(self).map_err(|e| {
            EngineError::new(
                ErrorKind::IoError(e.to_string()),
                "failed to serialize describe-table response",
            )
        })
    }

    /// Parses the wire form back.
    pub fn from_wire(wire: &str) -> EngineResult<Self> {
        serde_json::from_str(wire).map_err(|e| {
            EngineError::new(
                ErrorKind::InvalidArgument(e.to_string()),
                "malformed describe-table payload",
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{ActionKind, ActionSet};
    use cascade_lib::field_type::FieldTypeKind;
    use cascade_lib::record::{Field, RecordMeta};

    fn dto() -> DescribeTableDto {
        let mut metadata = TableMetadata::new(
            "t",
            RecordMeta::new(vec![
                Field::new("c0", FieldTypeKind::Int8).not_null(),
                Field::new("c1", FieldTypeKind::Character),
            ]),
            vec![0],
        );
        metadata
            .authorized_users
            .add_user_actions("alice", ActionSet::of(&[ActionKind::Control]));
        DescribeTableDto::from_metadata(&metadata)
    }

    #[test]
    fn test_wire_round_trip() {
        let original = dto();
        let wire = original.to_wire().unwrap();
        let parsed = DescribeTableDto::from_wire(&wire).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn test_primary_key_positions() {
        let d = dto();
        assert_eq!(d.columns[0].primary_key_position, Some(0));
        assert_eq!(d.columns[1].primary_key_position, None);
    }

    #[test]
    fn test_malformed_wire_rejected() {
        assert!(DescribeTableDto::from_wire("not json").is_err());
    }
}
