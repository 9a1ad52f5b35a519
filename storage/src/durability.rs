use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::Lsn;

type DurabilityCallback = Box<dyn Fn(Lsn) + Send + Sync>;

/// Tracks the committed and durable log positions and delivers durability
/// notifications from a background watcher thread, standing in for the
/// storage layer's group-commit notification.
///
/// Committed LSNs become durable after the watcher's next pass; callbacks
/// observe a monotonically non-decreasing durable LSN.
pub struct DurabilityCore {
    committed_lsn: AtomicU64,
    durable_lsn: AtomicU64,
    running: AtomicBool,
    callbacks: Mutex<Vec<DurabilityCallback>>,
    watcher: Mutex<Option<std::thread::JoinHandle<()>>>,
    durable_cv: Condvar,
    durable_guard: Mutex<()>,
}

impl DurabilityCore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            committed_lsn: AtomicU64::new(0),
            durable_lsn: AtomicU64::new(0),
            running: AtomicBool::new(false),
            callbacks: Mutex::new(Vec::new()),
            watcher: Mutex::new(None),
            durable_cv: Condvar::new(),
            durable_guard: Mutex::new(()),
        })
    }

    /// Registers a callback invoked with the durable LSN after each
    /// advance. Registration happens at engine start, before traffic.
    pub fn register_callback(&self, callback: impl Fn(Lsn) + Send + Sync + 'static) {
        self.callbacks.lock().unwrap().push(Box::new(callback));
    }

    pub(crate) fn record_committed(&self, lsn: Lsn) {
        self.committed_lsn.fetch_max(lsn, Ordering::SeqCst);
    }

    pub fn committed_lsn(&self) -> Lsn {
        self.committed_lsn.load(Ordering::SeqCst)
    }

    pub fn durable_lsn(&self) -> Lsn {
        self.durable_lsn.load(Ordering::SeqCst)
    }

    /// Starts the watcher thread. Idempotent.
    pub fn start(self: &Arc<Self>, notify_interval_ms: u64) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let this = Arc::clone(self);
        let handle = std::thread::Builder::new()
            .name("cascade-durability".to_string())
            .spawn(move || this.watch(Duration::from_millis(notify_interval_ms.max(1))))
            .expect("failed to spawn durability watcher");
        *self.watcher.lock().unwrap() = Some(handle);
        debug!("durability watcher started");
    }

    /// Stops the watcher after one final advance, so every commit that
    /// happened before the stop still gets its notification.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(handle) = self.watcher.lock().unwrap().take() {
            let _ = handle.join();
        }
        self.advance();
        debug!("durability watcher stopped");
    }

    fn watch(self: Arc<Self>, interval: Duration) {
        while self.running.load(Ordering::SeqCst) {
            self.advance();
            // sleep in small slices so stop() is not held up by a long
            // notify interval
            let started = Instant::now();
            while self.running.load(Ordering::SeqCst) && started.elapsed() < interval {
                std::thread::sleep(Duration::from_millis(1).min(interval));
            }
        }
    }

    fn advance(&self) {
        let committed = self.committed_lsn.load(Ordering::SeqCst);
        let durable = self.durable_lsn.load(Ordering::SeqCst);
        if committed <= durable {
            return;
        }
        self.durable_lsn.store(committed, Ordering::SeqCst);
        trace!(lsn = committed, "durable marker advanced");
        for cb in self.callbacks.lock().unwrap().iter() {
            cb(committed);
        }
        let _g = self.durable_guard.lock().unwrap();
        self.durable_cv.notify_all();
    }

    /// Blocks until the durable marker passes `lsn` or the timeout fires.
    /// Returns true when durable.
    pub fn wait_for_durable(&self, lsn: Lsn, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self.durable_guard.lock().unwrap();
        loop {
            if self.durable_lsn.load(Ordering::SeqCst) >= lsn {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (g, _) = self
                .durable_cv
                .wait_timeout(guard, deadline - now)
                .unwrap();
            guard = g;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_durable_follows_committed() {
        let core = DurabilityCore::new();
        core.start(1);
        core.record_committed(3);
        assert!(core.wait_for_durable(3, Duration::from_secs(5)));
        assert!(core.durable_lsn() >= 3);
        core.stop();
    }

    #[test]
    fn test_callbacks_observe_advance() {
        let core = DurabilityCore::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_ = Arc::clone(&hits);
        core.register_callback(move |lsn| {
            assert!(lsn >= 1);
            hits_.fetch_add(1, Ordering::SeqCst);
        });
        core.start(1);
        core.record_committed(1);
        assert!(core.wait_for_durable(1, Duration::from_secs(5)));
        core.stop();
        assert!(hits.load(Ordering::SeqCst) >= 1);
    }

    #[test]
    fn test_stop_flushes_pending_commits() {
        let core = DurabilityCore::new();
        core.start(1000);
        core.record_committed(7);
        core.stop();
        assert!(core.durable_lsn() >= 7);
    }

    #[test]
    fn test_wait_times_out_without_watcher() {
        let core = DurabilityCore::new();
        core.record_committed(1);
        assert!(!core.wait_for_durable(1, Duration::from_millis(20)));
    }
}
