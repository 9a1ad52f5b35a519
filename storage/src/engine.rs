use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use cascade_lib::error::{EngineError, EngineResult, ErrorKind};
use dashmap::DashMap;
use tracing::{debug, info};

use crate::durability::DurabilityCore;
use crate::transaction::{StorageTransaction, TransactionType};
use crate::Lsn;

pub type StorageId = u64;

#[derive(Debug, Clone)]
pub(crate) struct VersionedValue {
    pub value: Vec<u8>,
    pub version: u64,
}

/// One named ordered storage (a table's primary index, an index, or a
/// reserved system storage).
#[derive(Debug)]
pub struct Storage {
    id: StorageId,
    name: String,
    pub(crate) entries: RwLock<BTreeMap<Vec<u8>, VersionedValue>>,
}

impl Storage {
    fn new(id: StorageId, name: String) -> Self {
        Self {
            id,
            name,
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn id(&self) -> StorageId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entry_count(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entry_count() == 0
    }

    /// Writes outside any transaction, used by internal bookkeeping
    /// (sequence metadata). Bumps the version like a committed write.
    pub fn put_direct(&self, key: Vec<u8>, value: Vec<u8>) {
        let mut entries = self.entries.write().unwrap();
        let version = entries.get(&key).map(|v| v.version + 1).unwrap_or(1);
        entries.insert(key, VersionedValue { value, version });
    }

    pub(crate) fn get_direct(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.entries
            .read()
            .unwrap()
            .get(key)
            .map(|v| v.value.clone())
    }
}

/// The process-wide storage engine: storage directory, transaction
/// factory, commit serialization point and durability registration.
pub struct StorageEngine {
    storages: DashMap<String, Arc<Storage>>,
    by_id: DashMap<StorageId, Arc<Storage>>,
    next_storage_id: AtomicU64,
    next_lsn: AtomicU64,
    /// Serializes commit validation and apply so version checks and writes
    /// are atomic with respect to each other.
    pub(crate) commit_mutex: Mutex<()>,
    durability: Arc<DurabilityCore>,
}

impl StorageEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            storages: DashMap::new(),
            by_id: DashMap::new(),
            next_storage_id: AtomicU64::new(1),
            next_lsn: AtomicU64::new(1),
            commit_mutex: Mutex::new(()),
            durability: DurabilityCore::new(),
        })
    }

    pub fn durability(&self) -> &Arc<DurabilityCore> {
        &self.durability
    }

    /// Creates a named storage. Fails when the name is taken.
    pub fn create_storage(&self, name: &str) -> EngineResult<Arc<Storage>> {
        if self.storages.contains_key(name) {
            return Err(EngineError::new(
                ErrorKind::TargetAlreadyExists(name.to_string()),
                format!("storage '{name}' already exists"),
            ));
        }
        let id = self.next_storage_id.fetch_add(1, Ordering::SeqCst);
        let storage = Arc::new(Storage::new(id, name.to_string()));
        self.storages.insert(name.to_string(), Arc::clone(&storage));
        self.by_id.insert(id, Arc::clone(&storage));
        debug!(name, id, "storage created");
        Ok(storage)
    }

    pub fn get_storage(&self, name: &str) -> Option<Arc<Storage>> {
        self.storages.get(name).map(|e| Arc::clone(e.value()))
    }

    pub fn get_storage_by_id(&self, id: StorageId) -> Option<Arc<Storage>> {
        self.by_id.get(&id).map(|e| Arc::clone(e.value()))
    }

    /// Creates the storage if missing, otherwise returns the existing one.
    pub fn get_or_create_storage(&self, name: &str) -> Arc<Storage> {
        if let Some(existing) = self.get_storage(name) {
            return existing;
        }
        match self.create_storage(name) {
            Ok(s) => s,
            // lost the race; the winner's storage is there now
            Err(_) => self.get_storage(name).expect("storage registered"),
        }
    }

    pub fn drop_storage(&self, name: &str) -> EngineResult<()> {
        match self.storages.remove(name) {
            Some((_, storage)) => {
                self.by_id.remove(&storage.id());
                debug!(name, "storage dropped");
                Ok(())
            }
            None => Err(EngineError::new(
                ErrorKind::NotFound(name.to_string()),
                format!("storage '{name}' not found"),
            )),
        }
    }

    pub fn storage_count(&self) -> usize {
        self.storages.len()
    }

    /// Begins a transaction of the given type against this engine.
    pub fn begin(self: &Arc<Self>, transaction_type: TransactionType) -> StorageTransaction {
        StorageTransaction::new(Arc::clone(self), transaction_type)
    }

    pub(crate) fn allocate_lsn(&self) -> Lsn {
        self.next_lsn.fetch_add(1, Ordering::SeqCst)
    }

    pub(crate) fn notify_committed(&self, lsn: Lsn) {
        self.durability.record_committed(lsn);
    }

    /// Starts the background durability watcher.
    pub fn start(&self, notify_interval_ms: u64) {
        self.durability.start(notify_interval_ms);
        info!("storage engine started");
    }

    /// Stops the watcher; all state remains readable afterwards.
    pub fn shutdown(&self) {
        self.durability.stop();
        info!("storage engine stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_lookup_storage() {
        let engine = StorageEngine::new();
        let s = engine.create_storage("t0").unwrap();
        assert_eq!(s.name(), "t0");
        assert!(engine.get_storage("t0").is_some());
        assert!(engine.get_storage_by_id(s.id()).is_some());
        assert!(engine.get_storage("missing").is_none());
    }

    #[test]
    fn test_duplicate_storage_rejected() {
        let engine = StorageEngine::new();
        engine.create_storage("t0").unwrap();
        let err = engine.create_storage("t0").unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::TargetAlreadyExists(_)));
    }

    #[test]
    fn test_drop_storage() {
        let engine = StorageEngine::new();
        engine.create_storage("t0").unwrap();
        engine.drop_storage("t0").unwrap();
        assert!(engine.get_storage("t0").is_none());
        assert!(engine.drop_storage("t0").is_err());
    }

    #[test]
    fn test_direct_put_bumps_version() {
        let engine = StorageEngine::new();
        let s = engine.create_storage("t0").unwrap();
        s.put_direct(b"k".to_vec(), b"v1".to_vec());
        s.put_direct(b"k".to_vec(), b"v2".to_vec());
        assert_eq!(s.get_direct(b"k"), Some(b"v2".to_vec()));
        assert_eq!(s.entries.read().unwrap().get(b"k".as_slice()).unwrap().version, 2);
    }
}
