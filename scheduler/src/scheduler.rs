use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use crate::cfg::SchedulerCfg;
use crate::queue::BasicQueue;
use crate::thread::ThreadControl;
use crate::worker::{WorkUnit, Worker, WorkerStat};

/// The stealing pool: `N` workers, each with its own FIFO queue.
///
/// Scheduling picks a worker by explicit index or round robin. Ordering is
/// FIFO within one worker's queue; stealing provides no cross-worker
/// ordering. `start`/`stop` are idempotent.
pub struct TaskSchedulerPool<T> {
    cfg: SchedulerCfg,
    queues: Vec<BasicQueue<T>>,
    stats: Vec<Arc<WorkerStat>>,
    threads: Mutex<Vec<ThreadControl>>,
    started: AtomicBool,
    round_robin: AtomicUsize,
}

impl<T: WorkUnit> TaskSchedulerPool<T> {
    pub fn new(cfg: SchedulerCfg) -> Self {
        let count = cfg.thread_count.max(1);
        let queues = (0..count).map(|_| BasicQueue::new()).collect();
        let stats = (0..count)
            .map(|_| Arc::new(WorkerStat::default()))
            .collect();
        Self {
            cfg,
            queues,
            stats,
            threads: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
            round_robin: AtomicUsize::new(0),
        }
    }

    pub fn worker_count(&self) -> usize {
        self.queues.len()
    }

    /// Spawns the workers. Calling again after a successful start is a
    /// no-op.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        if self.cfg.core_affinity {
            // pinning is recorded but not enforced; there is no portable
            // affinity API in the stack
            debug!(
                initial_core = self.cfg.initial_core,
                "core affinity requested"
            );
        }
        let mut threads = self.threads.lock().unwrap();
        for q in &self.queues {
            q.reconstruct();
        }
        for index in 0..self.queues.len() {
            let worker = Worker::new(
                index,
                self.queues.clone(),
                Arc::clone(&self.stats[index]),
                self.cfg.clone(),
            );
            let control = ThreadControl::spawn(index, "cascade-worker", move || worker.run())
                .expect("failed to spawn worker thread");
            threads.push(control);
        }
        info!(workers = self.queues.len(), "task scheduler started");
    }

    /// Deactivates queues, lets workers drain their local entries, and
    /// joins the threads. Idempotent.
    pub fn stop(&self) {
        if !self.started.swap(false, Ordering::SeqCst) {
            return;
        }
        for q in &self.queues {
            q.deactivate();
        }
        let mut threads = self.threads.lock().unwrap();
        for t in threads.iter_mut() {
            t.join();
        }
        threads.clear();
        info!("task scheduler stopped");
    }

    pub fn started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Round-robin worker selection for tasks without a placement hint.
    pub fn next_worker(&self) -> usize {
        self.round_robin.fetch_add(1, Ordering::Relaxed) % self.queues.len()
    }

    /// Index of a currently parked worker, if any. Used to steer teardown
    /// away from busy workers.
    pub fn find_suspended_worker(&self) -> Option<usize> {
        self.stats
            .iter()
            .position(|s| s.sleeping.load(Ordering::Acquire))
    }

    /// Enqueues on the chosen worker's queue.
    ///
    /// Scheduling on a stopped pool is a caller contract violation; the
    /// task is dropped with a warning.
    pub fn schedule_at(&self, worker: usize, task: T) {
        let index = worker % self.queues.len();
        if !self.queues[index].push(task) {
            warn!(worker = index, "task scheduled on stopped scheduler");
        }
    }

    pub fn schedule(&self, task: T) {
        self.schedule_at(self.next_worker(), task);
    }

    pub fn stat(&self, worker: usize) -> &WorkerStat {
        &self.stats[worker]
    }
}

impl<T> Drop for TaskSchedulerPool<T> {
    fn drop(&mut self) {
        for q in &self.queues {
            q.deactivate();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::WorkerContext;
    use crate::worker::WorkStatus;
    use std::sync::atomic::AtomicU64;
    use std::time::Duration;

    struct CountingTask {
        counter: Arc<AtomicU64>,
        remaining_yields: usize,
        delay: Duration,
    }

    impl CountingTask {
        fn quick(counter: &Arc<AtomicU64>) -> Self {
            Self {
                counter: Arc::clone(counter),
                remaining_yields: 0,
                delay: Duration::ZERO,
            }
        }
    }

    impl WorkUnit for CountingTask {
        fn run(&mut self, _ctx: &mut WorkerContext) -> WorkStatus {
            if self.remaining_yields > 0 {
                self.remaining_yields -= 1;
                return WorkStatus::Yielded;
            }
            if !self.delay.is_zero() {
                std::thread::sleep(self.delay);
            }
            self.counter.fetch_add(1, Ordering::SeqCst);
            WorkStatus::Completed
        }
    }

    fn wait_for(counter: &AtomicU64, expected: u64) {
        for _ in 0..500 {
            if counter.load(Ordering::SeqCst) == expected {
                return;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        panic!(
            "counter stuck at {} (expected {expected})",
            counter.load(Ordering::SeqCst)
        );
    }

    #[test]
    fn test_all_tasks_complete() {
        let pool = TaskSchedulerPool::new(SchedulerCfg::with_threads(3));
        pool.start();
        let counter = Arc::new(AtomicU64::new(0));
        for _ in 0..100 {
            pool.schedule(CountingTask::quick(&counter));
        }
        wait_for(&counter, 100);
        pool.stop();
    }

    #[test]
    fn test_yield_reenqueues_until_done() {
        let pool = TaskSchedulerPool::new(SchedulerCfg::with_threads(1));
        pool.start();
        let counter = Arc::new(AtomicU64::new(0));
        pool.schedule(CountingTask {
            counter: Arc::clone(&counter),
            remaining_yields: 5,
            delay: Duration::ZERO,
        });
        wait_for(&counter, 1);
        pool.stop();
        assert!(pool.stat(0).executed.load(Ordering::Relaxed) >= 6);
    }

    #[test]
    fn test_steal_drains_overloaded_worker() {
        let pool = TaskSchedulerPool::new(SchedulerCfg::with_threads(4));
        pool.start();
        let counter = Arc::new(AtomicU64::new(0));
        // pile everything on worker 0; a lone worker would need ~200ms so
        // the parked neighbors wake up and steal
        for _ in 0..200 {
            pool.schedule_at(
                0,
                CountingTask {
                    counter: Arc::clone(&counter),
                    remaining_yields: 0,
                    delay: Duration::from_millis(1),
                },
            );
        }
        wait_for(&counter, 200);
        pool.stop();
        let stolen: usize = (0..4)
            .map(|i| pool.stat(i).stolen.load(Ordering::Relaxed))
            .sum();
        assert!(stolen > 0, "expected at least one steal");
    }

    #[test]
    fn test_start_stop_idempotent() {
        let pool: TaskSchedulerPool<CountingTask> =
            TaskSchedulerPool::new(SchedulerCfg::with_threads(2));
        pool.start();
        pool.start();
        pool.stop();
        pool.stop();
        assert!(!pool.started());
    }
}
