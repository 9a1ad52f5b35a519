use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

struct Inner<T> {
    entries: Mutex<QueueState<T>>,
    readable: Condvar,
}

struct QueueState<T> {
    items: VecDeque<T>,
    active: bool,
}

/// A shareable FIFO queue with blocking pop and a deactivation switch that
/// unblocks sleepers. Clones share the same underlying queue.
pub struct BasicQueue<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for BasicQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for BasicQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> BasicQueue<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: Mutex::new(QueueState {
                    items: VecDeque::new(),
                    active: true,
                }),
                readable: Condvar::new(),
            }),
        }
    }

    /// Enqueues at the tail. Returns false when the queue is deactivated.
    pub fn push(&self, item: T) -> bool {
        let mut state = self.inner.entries.lock().unwrap();
        if !state.active {
            return false;
        }
        state.items.push_back(item);
        drop(state);
        self.inner.readable.notify_one();
        true
    }

    /// Non-blocking pop from the head.
    pub fn try_pop(&self) -> Option<T> {
        let mut state = self.inner.entries.lock().unwrap();
        state.items.pop_front()
    }

    /// Blocks up to `timeout` for an entry. Returns `None` on timeout or
    /// deactivation.
    pub fn pop_wait(&self, timeout: Duration) -> Option<T> {
        let mut state = self.inner.entries.lock().unwrap();
        if !state.active {
            return state.items.pop_front();
        }
        if state.items.is_empty() {
            let (guard, _) = self
                .inner
                .readable
                .wait_timeout_while(state, timeout, |s| s.items.is_empty() && s.active)
                .unwrap();
            state = guard;
        }
        state.items.pop_front()
    }

    /// Deactivates the queue: pushes are refused and sleepers wake up.
    /// Entries already queued remain poppable.
    pub fn deactivate(&self) {
        let mut state = self.inner.entries.lock().unwrap();
        state.active = false;
        drop(state);
        self.inner.readable.notify_all();
    }

    /// Re-arms a deactivated queue (start after stop).
    pub fn reconstruct(&self) {
        let mut state = self.inner.entries.lock().unwrap();
        state.active = true;
        state.items.clear();
    }

    pub fn active(&self) -> bool {
        self.inner.entries.lock().unwrap().active
    }

    pub fn len(&self) -> usize {
        self.inner.entries.lock().unwrap().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Discards all queued entries, returning how many were dropped.
    pub fn clear(&self) -> usize {
        let mut state = self.inner.entries.lock().unwrap();
        let n = state.items.len();
        state.items.clear();
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_fifo_order() {
        let q = BasicQueue::new();
        assert!(q.push(1));
        assert!(q.push(2));
        assert!(q.push(3));
        assert_eq!(q.try_pop(), Some(1));
        assert_eq!(q.try_pop(), Some(2));
        assert_eq!(q.try_pop(), Some(3));
        assert_eq!(q.try_pop(), None);
    }

    #[test]
    fn test_deactivate_refuses_push_and_unblocks() {
        let q: BasicQueue<u32> = BasicQueue::new();
        let q2 = q.clone();
        let waiter = std::thread::spawn(move || q2.pop_wait(Duration::from_secs(30)));
        // give the waiter a moment to park
        std::thread::sleep(Duration::from_millis(20));
        q.deactivate();
        assert_eq!(waiter.join().unwrap(), None);
        assert!(!q.push(1));
    }

    #[test]
    fn test_pop_wait_times_out() {
        let q: BasicQueue<u32> = BasicQueue::new();
        assert_eq!(q.pop_wait(Duration::from_millis(10)), None);
    }

    #[test]
    fn test_reconstruct_reactivates() {
        let q: BasicQueue<u32> = BasicQueue::new();
        q.deactivate();
        q.reconstruct();
        assert!(q.push(7));
        assert_eq!(q.try_pop(), Some(7));
    }
}
