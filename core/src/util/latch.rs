use std::sync::{Condvar, Mutex};
use std::time::Duration;

struct State {
    open: bool,
    released: bool,
}

/// Latch to block the current thread and wait for another.
///
/// Created open. A thread closes it by waiting; another thread releases it
/// to wake the waiter. Release is an idempotent one-way operation: a
/// released latch never blocks again until `reset`.
pub struct Latch {
    guard: Mutex<State>,
    cv: Condvar,
}

impl Default for Latch {
    fn default() -> Self {
        Self::new()
    }
}

impl Latch {
    pub fn new() -> Self {
        Self {
            guard: Mutex::new(State {
                open: true,
                released: false,
            }),
            cv: Condvar::new(),
        }
    }

    /// Releases the latch and unblocks any waiter.
    pub fn release(&self) {
        {
            let mut state = self.guard.lock().unwrap();
            state.open = true;
            state.released = true;
        }
        self.cv.notify_all();
    }

    /// Closes the latch and waits for release. No-op if already released.
    pub fn wait(&self) {
        let mut state = self.guard.lock().unwrap();
        if state.released {
            return;
        }
        state.open = false;
        let _unused = self
            .cv
            .wait_while(state, |s| !s.open)
            .unwrap();
    }

    /// Waits with a timeout; true when the latch opened within it.
    pub fn wait_for(&self, dur: Duration) -> bool {
        let mut state = self.guard.lock().unwrap();
        if state.released {
            return true;
        }
        state.open = false;
        let (state, result) = self
            .cv
            .wait_timeout_while(state, dur, |s| !s.open)
            .unwrap();
        drop(state);
        !result.timed_out()
    }

    /// Re-opens the latch for reuse.
    pub fn reset(&self) {
        let mut state = self.guard.lock().unwrap();
        state.open = true;
        state.released = false;
    }

    pub fn released(&self) -> bool {
        self.guard.lock().unwrap().released
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_release_before_wait_does_not_block() {
        let latch = Latch::new();
        latch.release();
        latch.wait();
        assert!(latch.released());
    }

    #[test]
    fn test_release_wakes_waiter() {
        let latch = Arc::new(Latch::new());
        let l = Arc::clone(&latch);
        let waiter = std::thread::spawn(move || l.wait());
        std::thread::sleep(Duration::from_millis(20));
        latch.release();
        waiter.join().unwrap();
    }

    #[test]
    fn test_wait_for_times_out() {
        let latch = Latch::new();
        assert!(!latch.wait_for(Duration::from_millis(10)));
        latch.release();
        assert!(latch.wait_for(Duration::from_millis(10)));
    }

    #[test]
    fn test_reset_rearms() {
        let latch = Latch::new();
        latch.release();
        latch.reset();
        assert!(!latch.released());
        assert!(!latch.wait_for(Duration::from_millis(5)));
    }
}
