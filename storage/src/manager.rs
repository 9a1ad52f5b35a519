use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use tracing::trace;

use crate::engine::StorageId;

#[derive(Debug, Default)]
struct LockState {
    exclusive: bool,
    shared: usize,
}

/// Reader-preferring shared/exclusive lock guarding one storage entry.
///
/// At most one exclusive holder; any number of shared holders; the two are
/// mutually exclusive. Releasing a lock that is not held is a logic error
/// and panics.
#[derive(Debug, Default)]
pub struct StorageControl {
    state: Mutex<LockState>,
}

impl StorageControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn can_lock(&self) -> bool {
        let state = self.state.lock().unwrap();
        !state.exclusive && state.shared == 0
    }

    /// Attempts the exclusive lock; fails while any lock is held.
    pub fn lock(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.exclusive || state.shared > 0 {
            return false;
        }
        state.exclusive = true;
        true
    }

    pub fn release(&self) {
        let mut state = self.state.lock().unwrap();
        assert!(state.exclusive, "releasing an unheld exclusive lock");
        state.exclusive = false;
    }

    pub fn can_lock_shared(&self) -> bool {
        !self.state.lock().unwrap().exclusive
    }

    /// Attempts a shared lock; fails only while the exclusive lock is held.
    pub fn lock_shared(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.exclusive {
            return false;
        }
        state.shared += 1;
        true
    }

    pub fn release_shared(&self) {
        let mut state = self.state.lock().unwrap();
        assert!(state.shared > 0, "releasing an unheld shared lock");
        state.shared -= 1;
    }

    pub fn shared_holders(&self) -> usize {
        self.state.lock().unwrap().shared
    }

    pub fn exclusive_locked(&self) -> bool {
        self.state.lock().unwrap().exclusive
    }
}

struct StorageEntry {
    control: StorageControl,
}

/// Process-wide directory of storage controls keyed by storage id.
#[derive(Default)]
pub struct StorageManager {
    entries: DashMap<StorageId, Arc<StorageEntry>>,
}

impl StorageManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_entry(&self, id: StorageId) {
        self.entries.entry(id).or_insert_with(|| {
            Arc::new(StorageEntry {
                control: StorageControl::new(),
            })
        });
    }

    pub fn remove_entry(&self, id: StorageId) -> bool {
        self.entries.remove(&id).is_some()
    }

    pub fn exists(&self, id: StorageId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    fn with_control<R>(&self, id: StorageId, f: impl FnOnce(&StorageControl) -> R) -> Option<R> {
        self.entries.get(&id).map(|e| f(&e.control))
    }

    /// Acquires shared locks on all listed storages or none.
    pub fn lock_shared(self: &Arc<Self>, storages: Vec<StorageId>) -> Option<SharedLock> {
        let mut held = Vec::with_capacity(storages.len());
        for id in &storages {
            let ok = self.with_control(*id, |c| c.lock_shared()).unwrap_or(false);
            if !ok {
                for h in held {
                    self.with_control(h, |c| c.release_shared());
                }
                return None;
            }
            held.push(*id);
        }
        trace!(?storages, "shared storage lock acquired");
        Some(SharedLock {
            manager: Arc::clone(self),
            storages,
        })
    }

    /// Acquires exclusive locks on all listed storages or none.
    pub fn lock_exclusive(self: &Arc<Self>, storages: Vec<StorageId>) -> Option<UniqueLock> {
        let mut held = Vec::with_capacity(storages.len());
        for id in &storages {
            let ok = self.with_control(*id, |c| c.lock()).unwrap_or(false);
            if !ok {
                for h in held {
                    self.with_control(h, |c| c.release());
                }
                return None;
            }
            held.push(*id);
        }
        trace!(?storages, "exclusive storage lock acquired");
        Some(UniqueLock {
            manager: Arc::clone(self),
            storages,
        })
    }

    pub fn shared_holders(&self, id: StorageId) -> usize {
        self.with_control(id, |c| c.shared_holders()).unwrap_or(0)
    }

    pub fn exclusive_locked(&self, id: StorageId) -> bool {
        self.with_control(id, |c| c.exclusive_locked())
            .unwrap_or(false)
    }
}

/// RAII shared lock over a storage list.
pub struct SharedLock {
    manager: Arc<StorageManager>,
    storages: Vec<StorageId>,
}

impl SharedLock {
    pub fn storages(&self) -> &[StorageId] {
        &self.storages
    }
}

impl Drop for SharedLock {
    fn drop(&mut self) {
        for id in &self.storages {
            // entry may already be gone when the storage was dropped while
            // we held the lock; nothing left to release then
            self.manager.with_control(*id, |c| c.release_shared());
        }
    }
}

/// RAII exclusive lock over a storage list.
pub struct UniqueLock {
    manager: Arc<StorageManager>,
    storages: Vec<StorageId>,
}

impl UniqueLock {
    pub fn storages(&self) -> &[StorageId] {
        &self.storages
    }
}

impl Drop for UniqueLock {
    fn drop(&mut self) {
        for id in &self.storages {
            self.manager.with_control(*id, |c| c.release());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exclusive_excludes_everything() {
        let c = StorageControl::new();
        assert!(c.lock());
        assert!(!c.lock());
        assert!(!c.lock_shared());
        assert!(!c.can_lock());
        assert!(!c.can_lock_shared());
        c.release();
        assert!(c.can_lock());
    }

    #[test]
    fn test_shared_allows_many_blocks_exclusive() {
        let c = StorageControl::new();
        assert!(c.lock_shared());
        assert!(c.lock_shared());
        assert_eq!(c.shared_holders(), 2);
        assert!(!c.lock());
        c.release_shared();
        assert!(!c.lock());
        c.release_shared();
        assert!(c.lock());
    }

    #[test]
    #[should_panic(expected = "unheld exclusive")]
    fn test_release_unheld_exclusive_panics() {
        StorageControl::new().release();
    }

    #[test]
    #[should_panic(expected = "unheld shared")]
    fn test_release_unheld_shared_panics() {
        StorageControl::new().release_shared();
    }

    #[test]
    fn test_invariant_shared_and_exclusive_never_coexist() {
        let c = StorageControl::new();
        assert!(c.lock_shared());
        assert!(!c.exclusive_locked());
        c.release_shared();
        assert!(c.lock());
        assert_eq!(c.shared_holders(), 0);
        c.release();
    }

    #[test]
    fn test_manager_all_or_nothing() {
        let m = Arc::new(StorageManager::new());
        m.add_entry(1);
        m.add_entry(2);
        let exclusive_on_2 = m.lock_exclusive(vec![2]).unwrap();
        // 2 is exclusively held, so the pair acquisition must fail and
        // must not leave 1 locked behind
        assert!(m.lock_shared(vec![1, 2]).is_none());
        assert_eq!(m.shared_holders(1), 0);
        drop(exclusive_on_2);
        let both = m.lock_shared(vec![1, 2]).unwrap();
        assert_eq!(m.shared_holders(1), 1);
        assert_eq!(m.shared_holders(2), 1);
        drop(both);
        assert_eq!(m.shared_holders(1), 0);
    }

    #[test]
    fn test_guard_release_on_drop() {
        let m = Arc::new(StorageManager::new());
        m.add_entry(7);
        {
            let _g = m.lock_exclusive(vec![7]).unwrap();
            assert!(m.exclusive_locked(7));
        }
        assert!(!m.exclusive_locked(7));
    }
}
