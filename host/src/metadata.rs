use std::sync::Arc;

use cascade_lib::error::{EngineError, EngineResult, ErrorKind};
use cascade_lib::record::RecordMeta;
use cascade_storage::StorageEngine;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::auth::{ActionSet, AuthorizedUsersActionSet};

/// Reserved storage holding serialized table metadata.
pub const SYSTEM_TABLES_STORAGE: &str = "__system_tables";

/// A secondary index over a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDef {
    pub name: String,
    pub columns: Vec<String>,
}

impl IndexDef {
    /// Storage name backing this index.
    pub fn storage_name(&self, table: &str) -> String {
        format!("__index_{table}_{}", self.name)
    }
}

/// Everything the engine knows about one table: shape, primary key,
/// secondary indexes, and the authorization lists persisted with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableMetadata {
    pub name: String,
    pub columns: RecordMeta,
    /// Field indices of the primary key columns, in key order.
    pub primary_key: Vec<usize>,
    pub indexes: Vec<IndexDef>,
    pub authorized_users: AuthorizedUsersActionSet,
    pub default_privileges: ActionSet,
}

impl TableMetadata {
    pub fn new(name: impl Into<String>, columns: RecordMeta, primary_key: Vec<usize>) -> Self {
        Self {
            name: name.into(),
            columns,
            primary_key,
            indexes: Vec::new(),
            authorized_users: AuthorizedUsersActionSet::new(),
            default_privileges: ActionSet::new(),
        }
    }

    pub fn column_index(&self, name: &str) -> EngineResult<usize> {
        self.columns.index_of(name).ok_or_else(|| {
            EngineError::new(
                ErrorKind::CompileError(format!("column '{name}' not found")),
                format!("table '{}' has no column '{name}'", self.name),
            )
        })
    }

    pub fn index(&self, name: &str) -> Option<&IndexDef> {
        self.indexes.iter().find(|i| i.name.eq_ignore_ascii_case(name))
    }
}

/// Persists table metadata into the reserved system storage and loads it
/// back at start, so the catalog survives engine restarts over the same
/// storage.
pub struct MetadataStore {
    engine: Arc<StorageEngine>,
}

impl MetadataStore {
    pub fn new(engine: Arc<StorageEngine>) -> Self {
        engine.get_or_create_storage(SYSTEM_TABLES_STORAGE);
        Self { engine }
    }

    pub fn persist(&self, metadata: &TableMetadata) -> EngineResult<()> {
        let storage = self.engine.get_or_create_storage(SYSTEM_TABLES_STORAGE);
        let bytes = bincode::serialize(metadata).map_err(|e| {
            EngineError::new(
                ErrorKind::IoError(e.to_string()),
                "failed to serialize table metadata",
            )
        })?;
        storage.put_direct(metadata.name.as_bytes().to_vec(), bytes);
        debug!(table = %metadata.name, "table metadata persisted");
        Ok(())
    }

    pub fn remove(&self, table: &str) {
        if let Some(storage) = self.engine.get_storage(SYSTEM_TABLES_STORAGE) {
            let mut tx = self.engine.begin(cascade_storage::TransactionType::Occ);
            let _ = tx.remove(&storage, table.as_bytes().to_vec());
            let _ = tx.commit();
        }
    }

    pub fn load_all(&self) -> Vec<TableMetadata> {
        let Some(storage) = self.engine.get_storage(SYSTEM_TABLES_STORAGE) else {
            return Vec::new();
        };
        let mut tx = self.engine.begin(cascade_storage::TransactionType::Rtx);
        tx.full_scan(&storage)
            .into_iter()
            .filter_map(|(_, bytes)| bincode::deserialize(&bytes).ok())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::ActionKind;
    use cascade_lib::field_type::FieldTypeKind;
    use cascade_lib::record::Field;

    fn sample() -> TableMetadata {
        let mut meta = TableMetadata::new(
            "t0",
            RecordMeta::new(vec![
                Field::new("c0", FieldTypeKind::Int4).not_null(),
                Field::new("c1", FieldTypeKind::Float8),
            ]),
            vec![0],
        );
        meta.authorized_users
            .add_user_actions("alice", ActionSet::of(&[ActionKind::Select]));
        meta.default_privileges.add_action(ActionKind::Select);
        meta
    }

    #[test]
    fn test_metadata_survives_persistence() {
        let engine = StorageEngine::new();
        let store = MetadataStore::new(Arc::clone(&engine));
        store.persist(&sample()).unwrap();

        let reloaded = MetadataStore::new(engine).load_all();
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded[0], sample());
        assert!(reloaded[0]
            .authorized_users
            .find_user_actions("alice")
            .action_allowed(ActionKind::Select));
    }

    #[test]
    fn test_remove() {
        let engine = StorageEngine::new();
        let store = MetadataStore::new(Arc::clone(&engine));
        store.persist(&sample()).unwrap();
        store.remove("t0");
        assert!(store.load_all().is_empty());
    }

    #[test]
    fn test_column_lookup() {
        let meta = sample();
        assert_eq!(meta.column_index("C1").unwrap(), 1);
        assert!(meta.column_index("missing").is_err());
    }
}
