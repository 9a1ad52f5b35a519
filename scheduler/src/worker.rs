use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::trace;

use crate::cfg::SchedulerCfg;
use crate::context::WorkerContext;
use crate::queue::BasicQueue;

/// Outcome of running a work unit once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkStatus {
    /// The unit finished; drop it.
    Completed,
    /// The unit cooperatively yielded; re-enqueue at the tail of the same
    /// worker's queue.
    Yielded,
}

/// A schedulable unit of synchronous work.
pub trait WorkUnit: Send + 'static {
    fn run(&mut self, ctx: &mut WorkerContext) -> WorkStatus;
}

/// Per-worker counters, shared with the pool for introspection.
#[derive(Debug, Default)]
pub struct WorkerStat {
    pub executed: AtomicUsize,
    pub stolen: AtomicUsize,
    /// Set while the worker is parked waiting for work.
    pub sleeping: AtomicBool,
}

/// The worker body: drains the local queue, sweeps neighbors for work, and
/// parks when a full sweep comes up empty.
pub(crate) struct Worker<T> {
    index: usize,
    queues: Vec<BasicQueue<T>>,
    stat: Arc<WorkerStat>,
    cfg: SchedulerCfg,
}

impl<T: WorkUnit> Worker<T> {
    pub(crate) fn new(
        index: usize,
        queues: Vec<BasicQueue<T>>,
        stat: Arc<WorkerStat>,
        cfg: SchedulerCfg,
    ) -> Self {
        Self {
            index,
            queues,
            stat,
            cfg,
        }
    }

    pub(crate) fn run(&self) {
        let mut ctx = WorkerContext::new(self.index);
        let local = self.queues[self.index].clone();
        while local.active() {
            if let Some(task) = local.try_pop() {
                self.execute(task, &mut ctx, &local);
                continue;
            }
            if self.cfg.stealing_enabled && self.try_steal(&mut ctx, &local) {
                continue;
            }
            std::hint::spin_loop();
            self.stat.sleeping.store(true, Ordering::Release);
            let parked = local.pop_wait(Duration::from_millis(self.cfg.park_timeout_ms));
            self.stat.sleeping.store(false, Ordering::Release);
            if let Some(task) = parked {
                self.execute(task, &mut ctx, &local);
            }
        }
        // stop requested: run down what remains in the local queue
        while let Some(task) = local.try_pop() {
            self.execute(task, &mut ctx, &local);
        }
    }

    fn execute(&self, mut task: T, ctx: &mut WorkerContext, local: &BasicQueue<T>) {
        match task.run(ctx) {
            WorkStatus::Completed => {}
            WorkStatus::Yielded => {
                // a deactivated queue refuses the re-push; the task is
                // abandoned with the rest of the drain
                let _ = local.push(task);
            }
        }
        self.stat.executed.fetch_add(1, Ordering::Relaxed);
    }

    /// One sweep over the other workers starting right of the last steal
    /// target, each visited at most once. Returns true when a stolen task
    /// was executed.
    fn try_steal(&self, ctx: &mut WorkerContext, local: &BasicQueue<T>) -> bool {
        let n = self.queues.len();
        if n <= 1 {
            return false;
        }
        let origin = ctx.last_stolen();
        let mut idx = (origin + 1) % n;
        for _ in 0..n {
            if idx != self.index {
                if let Some(task) = self.queues[idx].try_pop() {
                    trace!(from = idx, to = self.index, "task stolen");
                    ctx.set_last_stolen(idx);
                    self.stat.stolen.fetch_add(1, Ordering::Relaxed);
                    self.execute(task, ctx, local);
                    return true;
                }
            }
            idx = (idx + 1) % n;
        }
        false
    }
}
