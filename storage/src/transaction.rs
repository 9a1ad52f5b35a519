use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::Arc;

use cascade_lib::error::{EngineError, EngineResult, ErrorKind};
use tracing::trace;

use crate::engine::{StorageEngine, StorageId, VersionedValue};
use crate::Lsn;

/// Concurrency control mode of a storage transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionType {
    /// Short optimistic transaction.
    Occ,
    /// Long transaction; writes are restricted to the write-preserved
    /// storages declared at begin.
    Ltx { write_preserve: Vec<StorageId> },
    /// Read-only transaction; every write fails.
    Rtx,
}

/// Write disposition for `put`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutMode {
    /// Fail when the key already exists.
    Create,
    /// Fail when the key does not exist.
    Update,
    /// Insert or replace.
    Overwrite,
}

/// Scan bound over encoded keys.
#[derive(Debug, Clone)]
pub enum ScanBound {
    Unbounded,
    Inclusive(Vec<u8>),
    Exclusive(Vec<u8>),
}

impl ScanBound {
    fn as_bound(&self) -> Bound<&Vec<u8>> {
        match self {
            ScanBound::Unbounded => Bound::Unbounded,
            ScanBound::Inclusive(k) => Bound::Included(k),
            ScanBound::Exclusive(k) => Bound::Excluded(k),
        }
    }

    fn contains(&self, key: &[u8], lower: bool) -> bool {
        match self {
            ScanBound::Unbounded => true,
            ScanBound::Inclusive(b) => {
                if lower {
                    key >= b.as_slice()
                } else {
                    key <= b.as_slice()
                }
            }
            ScanBound::Exclusive(b) => {
                if lower {
                    key > b.as_slice()
                } else {
                    key < b.as_slice()
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
enum WriteOp {
    Put(Vec<u8>),
    Remove,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxState {
    Active,
    Committed,
    Aborted,
}

/// A storage-layer transaction: buffered writes plus the observed versions
/// used for optimistic validation at commit.
pub struct StorageTransaction {
    engine: Arc<StorageEngine>,
    transaction_type: TransactionType,
    /// Buffered writes, keyed by (storage, key).
    write_set: HashMap<(StorageId, Vec<u8>), WriteOp>,
    /// Keys whose `put` used create mode; re-validated for absence at
    /// commit so racing creates fail instead of silently overwriting.
    created: Vec<(StorageId, Vec<u8>)>,
    /// Observed version per read key (0 = absent at read time).
    read_set: HashMap<(StorageId, Vec<u8>), u64>,
    state: TxState,
}

impl StorageTransaction {
    pub(crate) fn new(engine: Arc<StorageEngine>, transaction_type: TransactionType) -> Self {
        Self {
            engine,
            transaction_type,
            write_set: HashMap::new(),
            created: Vec::new(),
            read_set: HashMap::new(),
            state: TxState::Active,
        }
    }

    pub fn transaction_type(&self) -> &TransactionType {
        &self.transaction_type
    }

    pub fn is_active(&self) -> bool {
        self.state == TxState::Active
    }

    fn check_active(&self) -> EngineResult<()> {
        if self.state != TxState::Active {
            return Err(EngineError::new(
                ErrorKind::InactiveTransaction(String::new()),
                "storage transaction already ended",
            ));
        }
        Ok(())
    }

    fn check_writable(&self, storage: StorageId) -> EngineResult<()> {
        match &self.transaction_type {
            TransactionType::Occ => Ok(()),
            TransactionType::Rtx => Err(EngineError::new(
                ErrorKind::WriteByRtx(String::new()),
                "write operation attempted by read-only transaction",
            )),
            TransactionType::Ltx { write_preserve } => {
                if write_preserve.contains(&storage) {
                    Ok(())
                } else {
                    Err(EngineError::new(
                        ErrorKind::LtxWriteWithoutWritePreserve(String::new()),
                        "long transaction wrote a storage outside its write preserve",
                    ))
                }
            }
        }
    }

    /// Point read. Buffered writes win over the committed state; reads of
    /// committed entries record the observed version for validation.
    pub fn get(&mut self, storage: &crate::engine::Storage, key: &[u8]) -> Option<Vec<u8>> {
        if let Some(op) = self.write_set.get(&(storage.id(), key.to_vec())) {
            return match op {
                WriteOp::Put(v) => Some(v.clone()),
                WriteOp::Remove => None,
            };
        }
        let entries = storage.entries.read().unwrap();
        let found = entries.get(key);
        let version = found.map(|v| v.version).unwrap_or(0);
        if self.transaction_type != TransactionType::Rtx {
            self.read_set.insert((storage.id(), key.to_vec()), version);
        }
        found.map(|v| v.value.clone())
    }

    /// Buffers a write. Mode conflicts are detected against the state
    /// visible now; create mode is re-validated at commit.
    pub fn put(
        &mut self,
        storage: &crate::engine::Storage,
        key: Vec<u8>,
        value: Vec<u8>,
        mode: PutMode,
    ) -> EngineResult<()> {
        self.check_active()?;
        self.check_writable(storage.id())?;
        let exists = self.exists(storage, &key);
        match mode {
            PutMode::Create => {
                if exists {
                    return Err(EngineError::new(
                        ErrorKind::TargetAlreadyExists(String::new()),
                        "entry already exists",
                    ));
                }
                self.created.push((storage.id(), key.clone()));
            }
            PutMode::Update => {
                if !exists {
                    return Err(EngineError::new(
                        ErrorKind::NotFound(String::new()),
                        "entry to update does not exist",
                    ));
                }
            }
            PutMode::Overwrite => {}
        }
        self.write_set
            .insert((storage.id(), key), WriteOp::Put(value));
        Ok(())
    }

    pub fn remove(
        &mut self,
        storage: &crate::engine::Storage,
        key: Vec<u8>,
    ) -> EngineResult<bool> {
        self.check_active()?;
        self.check_writable(storage.id())?;
        let existed = self.exists(storage, &key);
        self.write_set.insert((storage.id(), key), WriteOp::Remove);
        Ok(existed)
    }

    fn exists(&mut self, storage: &crate::engine::Storage, key: &[u8]) -> bool {
        if let Some(op) = self.write_set.get(&(storage.id(), key.to_vec())) {
            return matches!(op, WriteOp::Put(_));
        }
        let entries = storage.entries.read().unwrap();
        let found = entries.get(key);
        if self.transaction_type != TransactionType::Rtx {
            let version = found.map(|v| v.version).unwrap_or(0);
            self.read_set.insert((storage.id(), key.to_vec()), version);
        }
        found.is_some()
    }

    /// Range scan in key order, merging the committed state with this
    /// transaction's buffered writes. Records observed versions for the
    /// returned keys.
    pub fn scan(
        &mut self,
        storage: &crate::engine::Storage,
        lower: ScanBound,
        upper: ScanBound,
    ) -> Vec<(Vec<u8>, Vec<u8>)> {
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = BTreeMap::new();
        {
            let entries = storage.entries.read().unwrap();
            for (k, v) in entries.range::<Vec<u8>, _>((lower.as_bound(), upper.as_bound())) {
                if self.transaction_type != TransactionType::Rtx {
                    self.read_set
                        .insert((storage.id(), k.clone()), v.version);
                }
                merged.insert(k.clone(), v.value.clone());
            }
        }
        for ((sid, key), op) in &self.write_set {
            if *sid != storage.id()
                || !lower.contains(key, true)
                || !upper.contains(key, false)
            {
                continue;
            }
            match op {
                WriteOp::Put(v) => {
                    merged.insert(key.clone(), v.clone());
                }
                WriteOp::Remove => {
                    merged.remove(key);
                }
            }
        }
        merged.into_iter().collect()
    }

    pub fn full_scan(&mut self, storage: &crate::engine::Storage) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.scan(storage, ScanBound::Unbounded, ScanBound::Unbounded)
    }

    /// Validates and applies the write set, returning the commit LSN.
    ///
    /// Validation fails with `concurrent_operation` when any observed key's
    /// version advanced since it was read, or a create-mode key appeared.
    pub fn commit(&mut self) -> EngineResult<Lsn> {
        self.check_active()?;
        let _commit_guard = self.engine.commit_mutex.lock().unwrap();
        if self.transaction_type != TransactionType::Rtx {
            for ((sid, key), observed) in &self.read_set {
                let Some(storage) = self.engine.get_storage_by_id(*sid) else {
                    // the storage was dropped under us
                    self.state = TxState::Aborted;
                    return Err(EngineError::new(
                        ErrorKind::ConcurrentOperation(String::new()),
                        "storage dropped during transaction",
                    ));
                };
                let entries = storage.entries.read().unwrap();
                let current = entries.get(key).map(|v| v.version).unwrap_or(0);
                if current != *observed {
                    self.state = TxState::Aborted;
                    trace!(storage = *sid, "commit validation failed");
                    return Err(EngineError::new(
                        ErrorKind::ConcurrentOperation(String::new()),
                        "conflicting concurrent operation detected at commit",
                    ));
                }
            }
            for (sid, key) in &self.created {
                if self.read_set.contains_key(&(*sid, key.clone())) {
                    continue; // already validated above
                }
                if let Some(storage) = self.engine.get_storage_by_id(*sid) {
                    if storage.entries.read().unwrap().contains_key(key) {
                        self.state = TxState::Aborted;
                        return Err(EngineError::new(
                            ErrorKind::ConcurrentOperation(String::new()),
                            "concurrently created entry detected at commit",
                        ));
                    }
                }
            }
        }
        for ((sid, key), op) in self.write_set.drain() {
            let Some(storage) = self.engine.get_storage_by_id(sid) else {
                continue;
            };
            let mut entries = storage.entries.write().unwrap();
            match op {
                WriteOp::Put(value) => {
                    let version = entries.get(&key).map(|v| v.version + 1).unwrap_or(1);
                    entries.insert(key, VersionedValue { value, version });
                }
                WriteOp::Remove => {
                    entries.remove(&key);
                }
            }
        }
        let lsn = self.engine.allocate_lsn();
        self.engine.notify_committed(lsn);
        self.state = TxState::Committed;
        Ok(lsn)
    }

    /// Discards all buffered work.
    pub fn abort(&mut self) {
        self.write_set.clear();
        self.created.clear();
        self.read_set.clear();
        self.state = TxState::Aborted;
    }
}
