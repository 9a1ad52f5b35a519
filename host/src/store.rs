use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

/// A session-scoped concurrent store keyed by handle.
///
/// `put` is idempotent-style: it refuses duplicate handles. `dispose`
/// clears the map exactly once; the caller is responsible for not racing
/// dispose against the other operations on the same store.
pub struct SessionElementStore<K: Eq + Hash, V> {
    session_id: u64,
    entries: DashMap<K, Arc<V>>,
    disposed: AtomicBool,
}

impl<K: Eq + Hash, V> SessionElementStore<K, V> {
    pub fn new(session_id: u64) -> Self {
        Self {
            session_id,
            entries: DashMap::new(),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    pub fn lookup(&self, handle: &K) -> Option<Arc<V>> {
        self.entries.get(handle).map(|e| Arc::clone(e.value()))
    }

    /// Inserts the value; false when the handle is already taken.
    pub fn put(&self, handle: K, value: Arc<V>) -> bool {
        match self.entries.entry(handle) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(v) => {
                v.insert(value);
                true
            }
        }
    }

    pub fn remove(&self, handle: &K) -> bool {
        self.entries.remove(handle).is_some()
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    /// Snapshot of the stored values.
    pub fn values(&self) -> Vec<Arc<V>> {
        self.entries.iter().map(|e| Arc::clone(e.value())).collect()
    }

    pub fn find_by(&self, mut predicate: impl FnMut(&K, &Arc<V>) -> bool) -> Option<(K, Arc<V>)>
    where
        K: Clone,
    {
        self.entries
            .iter()
            .find(|e| predicate(e.key(), e.value()))
            .map(|e| (e.key().clone(), Arc::clone(e.value())))
    }

    /// Clears the store. Runs once; later calls are no-ops. Returns
    /// whether this call performed the disposal.
    pub fn dispose(&self) -> bool {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return false;
        }
        debug!(
            session = self.session_id,
            entries = self.entries.len(),
            "disposing session store"
        );
        self.entries.clear();
        true
    }

    pub fn disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_refuses_duplicates() {
        let store: SessionElementStore<u64, String> = SessionElementStore::new(1);
        assert!(store.put(1, Arc::new("a".into())));
        assert!(!store.put(1, Arc::new("b".into())));
        assert_eq!(store.lookup(&1).unwrap().as_str(), "a");
        assert_eq!(store.size(), 1);
    }

    #[test]
    fn test_remove() {
        let store: SessionElementStore<u64, String> = SessionElementStore::new(1);
        store.put(1, Arc::new("a".into()));
        assert!(store.remove(&1));
        assert!(!store.remove(&1));
        assert!(store.lookup(&1).is_none());
    }

    #[test]
    fn test_dispose_runs_once() {
        let store: SessionElementStore<u64, String> = SessionElementStore::new(1);
        store.put(1, Arc::new("a".into()));
        assert!(store.dispose());
        assert!(!store.dispose());
        assert_eq!(store.size(), 0);
        assert!(store.disposed());
    }

    #[test]
    fn test_shared_value_survives_removal() {
        let store: SessionElementStore<u64, String> = SessionElementStore::new(1);
        let value = Arc::new("kept".to_string());
        store.put(1, Arc::clone(&value));
        let held = store.lookup(&1).unwrap();
        store.remove(&1);
        // an in-flight user still holds the value
        assert_eq!(held.as_str(), "kept");
        assert_eq!(Arc::strong_count(&value), 2);
    }
}
