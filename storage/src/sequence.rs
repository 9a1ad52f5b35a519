use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use cascade_lib::error::{EngineError, EngineResult, ErrorKind};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::engine::{Storage, StorageEngine};

/// Reserved storage holding sequence metadata.
pub const SYSTEM_SEQUENCES_STORAGE: &str = "__system_sequences";

#[derive(Debug, Serialize, Deserialize)]
struct SequenceEntry {
    def_id: u64,
    name: String,
    current: u64,
}

struct SequenceState {
    def_id: u64,
    current: AtomicU64,
}

/// Named monotonic sequences persisted in a reserved system storage keyed
/// by a dense def-id allocation.
pub struct SequenceRepository {
    storage: Arc<Storage>,
    by_name: DashMap<String, Arc<SequenceState>>,
    next_def_id: AtomicU64,
}

impl SequenceRepository {
    /// Opens the repository, recovering any sequences already persisted.
    pub fn open(engine: &Arc<StorageEngine>) -> Self {
        let storage = engine.get_or_create_storage(SYSTEM_SEQUENCES_STORAGE);
        let by_name = DashMap::new();
        let mut max_def_id = 0u64;
        {
            let entries = storage.entries.read().unwrap();
            for (_, v) in entries.iter() {
                if let Ok(entry) = bincode::deserialize::<SequenceEntry>(&v.value) {
                    max_def_id = max_def_id.max(entry.def_id);
                    by_name.insert(
                        entry.name.clone(),
                        Arc::new(SequenceState {
                            def_id: entry.def_id,
                            current: AtomicU64::new(entry.current),
                        }),
                    );
                }
            }
        }
        Self {
            storage,
            by_name,
            next_def_id: AtomicU64::new(max_def_id + 1),
        }
    }

    /// Creates a sequence starting at 0; duplicate names fail.
    pub fn create_sequence(&self, name: &str) -> EngineResult<u64> {
        if self.by_name.contains_key(name) {
            return Err(EngineError::new(
                ErrorKind::TargetAlreadyExists(name.to_string()),
                format!("sequence '{name}' already exists"),
            ));
        }
        let def_id = self.next_def_id.fetch_add(1, Ordering::SeqCst);
        let state = Arc::new(SequenceState {
            def_id,
            current: AtomicU64::new(0),
        });
        self.by_name.insert(name.to_string(), Arc::clone(&state));
        self.persist(name, &state);
        debug!(name, def_id, "sequence created");
        Ok(def_id)
    }

    /// Advances and returns the next value.
    pub fn next_value(&self, name: &str) -> EngineResult<u64> {
        let state = self.by_name.get(name).ok_or_else(|| {
            EngineError::new(
                ErrorKind::NotFound(name.to_string()),
                format!("sequence '{name}' not found"),
            )
        })?;
        let value = state.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.persist(name, state.value());
        Ok(value)
    }

    pub fn remove_sequence(&self, name: &str) -> bool {
        match self.by_name.remove(name) {
            Some((_, state)) => {
                let mut entries = self.storage.entries.write().unwrap();
                entries.remove(&Self::key(state.def_id));
                true
            }
            None => false,
        }
    }

    pub fn sequence_count(&self) -> usize {
        self.by_name.len()
    }

    fn key(def_id: u64) -> Vec<u8> {
        def_id.to_be_bytes().to_vec()
    }

    fn persist(&self, name: &str, state: &Arc<SequenceState>) {
        let entry = SequenceEntry {
            def_id: state.def_id,
            name: name.to_string(),
            current: state.current.load(Ordering::SeqCst),
        };
        let bytes = bincode::serialize(&entry).expect("sequence entry serializes");
        self.storage.put_direct(Self::key(state.def_id), bytes);
    }
}
