use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::util::Latch;

/// Worker index meaning "no preference recorded yet".
pub const UNDEFINED_WORKER: usize = usize::MAX;

static JOB_ID_SOURCE: AtomicU64 = AtomicU64::new(1);

type CompletionCallback = Box<dyn FnOnce() + Send>;
type ReadinessProvider = Box<dyn Fn() -> bool + Send + Sync>;

/// Context for one scheduled execution of a graph (a job).
///
/// Tracks the in-flight task count, the teardown submission race, the
/// preferred worker hint and the completion latch the client thread waits
/// on. The completion callback runs exactly once, from the teardown task.
pub struct JobContext {
    id: u64,
    completion_latch: Latch,
    completing: AtomicBool,
    started: AtomicBool,
    task_count: AtomicU64,
    preferred_worker: AtomicUsize,
    callback: Mutex<Option<CompletionCallback>>,
    readiness: Mutex<Option<ReadinessProvider>>,
}

impl Default for JobContext {
    fn default() -> Self {
        Self::new()
    }
}

impl JobContext {
    pub fn new() -> Self {
        Self {
            id: JOB_ID_SOURCE.fetch_add(1, Ordering::Relaxed),
            completion_latch: Latch::new(),
            completing: AtomicBool::new(false),
            started: AtomicBool::new(false),
            task_count: AtomicU64::new(0),
            preferred_worker: AtomicUsize::new(UNDEFINED_WORKER),
            callback: Mutex::new(None),
            readiness: Mutex::new(None),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn completion_latch(&self) -> &Latch {
        &self.completion_latch
    }

    /// Teardown submission flag; the caller that flips it false→true owns
    /// submitting the teardown task.
    pub fn completing(&self) -> &AtomicBool {
        &self.completing
    }

    pub fn started(&self) -> &AtomicBool {
        &self.started
    }

    pub fn task_count(&self) -> u64 {
        self.task_count.load(Ordering::SeqCst)
    }

    pub fn increment_tasks(&self) {
        self.task_count.fetch_add(1, Ordering::SeqCst);
    }

    pub fn decrement_tasks(&self) {
        let prev = self.task_count.fetch_sub(1, Ordering::SeqCst);
        debug_assert!(prev > 0, "job task count underflow");
    }

    pub fn preferred_worker(&self) -> Option<usize> {
        match self.preferred_worker.load(Ordering::Relaxed) {
            UNDEFINED_WORKER => None,
            w => Some(w),
        }
    }

    /// Records the hint only when none is set yet; returns the effective
    /// one.
    pub fn record_preferred_worker(&self, worker: usize) -> usize {
        match self.preferred_worker.compare_exchange(
            UNDEFINED_WORKER,
            worker,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => worker,
            Err(existing) => existing,
        }
    }

    pub fn set_callback(&self, callback: impl FnOnce() + Send + 'static) {
        *self.callback.lock().unwrap() = Some(Box::new(callback));
    }

    /// Runs the completion callback if it has not run yet.
    pub fn invoke_callback(&self) {
        let callback = self.callback.lock().unwrap().take();
        if let Some(cb) = callback {
            cb();
        }
    }

    pub fn set_completion_readiness(&self, provider: impl Fn() -> bool + Send + Sync + 'static) {
        *self.readiness.lock().unwrap() = Some(Box::new(provider));
    }

    /// True when teardown may complete the job. Defaults to ready.
    pub fn completion_ready(&self) -> bool {
        match &*self.readiness.lock().unwrap() {
            Some(provider) => provider(),
            None => true,
        }
    }

    /// Re-arms the context for another job on the same request.
    pub fn reset(&self) {
        self.completion_latch.reset();
        self.completing.store(false, Ordering::SeqCst);
        self.started.store(false, Ordering::SeqCst);
        self.task_count.store(0, Ordering::SeqCst);
        self.preferred_worker
            .store(UNDEFINED_WORKER, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn test_callback_runs_exactly_once() {
        let job = JobContext::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_ = Arc::clone(&calls);
        job.set_callback(move || {
            calls_.fetch_add(1, Ordering::SeqCst);
        });
        job.invoke_callback();
        job.invoke_callback();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_preferred_worker_first_write_wins() {
        let job = JobContext::new();
        assert_eq!(job.preferred_worker(), None);
        assert_eq!(job.record_preferred_worker(3), 3);
        assert_eq!(job.record_preferred_worker(9), 3);
        assert_eq!(job.preferred_worker(), Some(3));
    }

    #[test]
    fn test_readiness_defaults_to_ready() {
        let job = JobContext::new();
        assert!(job.completion_ready());
        job.set_completion_readiness(|| false);
        assert!(!job.completion_ready());
    }

    #[test]
    fn test_reset_rearms() {
        let job = JobContext::new();
        job.increment_tasks();
        job.completing().store(true, Ordering::SeqCst);
        job.completion_latch().release();
        job.reset();
        assert_eq!(job.task_count(), 0);
        assert!(!job.completing().load(Ordering::SeqCst));
        assert!(!job.completion_latch().released());
    }

    #[test]
    fn test_job_ids_unique() {
        assert_ne!(JobContext::new().id(), JobContext::new().id());
    }
}
