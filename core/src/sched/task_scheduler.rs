use crate::sched::flat_task::FlatTask;
use crate::sched::job_context::JobContext;

/// Which scheduling policy is in effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerKind {
    Serial,
    Stealing,
}

/// The task scheduler boundary between the dataflow layer and the thread
/// pool. Two interchangeable policies implement it.
pub trait TaskScheduler: Send + Sync {
    /// Prepares workers; idempotent once started.
    fn start(&self);

    /// Drains queues and joins workers; idempotent.
    fn stop(&self);

    fn kind(&self) -> SchedulerKind;

    /// Enqueues the task. Placement follows, in order: the task's explicit
    /// worker hint, the job's preferred-worker hint, round robin.
    fn schedule_task(&self, task: FlatTask);

    /// Blocks the caller until the job's completion latch releases.
    fn wait_for_progress(&self, job: &JobContext);

    /// A parked worker suitable for teardown placement, when the policy
    /// tracks one.
    fn find_suspended_worker(&self) -> Option<usize> {
        None
    }
}
