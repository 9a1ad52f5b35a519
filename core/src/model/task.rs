use std::sync::atomic::{AtomicU64, Ordering};

use cascade_lib::error::EngineResult;

use crate::model::step::StepId;

pub type TaskId = u64;

/// Sentinel for a slot with no task registered yet.
pub const UNINITIALIZED_TASK_ID: TaskId = TaskId::MAX;

static TASK_ID_SOURCE: AtomicU64 = AtomicU64::new(1);

/// Allocates a process-unique task identity.
pub fn new_task_id() -> TaskId {
    TASK_ID_SOURCE.fetch_add(1, Ordering::Relaxed)
}

/// Outcome of one execution of a task body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskResult {
    /// Finished; remove the task.
    Complete,
    /// Run again immediately without re-queuing (micro-loop).
    Proceed,
    /// Re-queue at the tail of the same worker.
    Yield,
    /// Finished, and the job's teardown must be submitted.
    CompleteAndTeardown,
}

/// Whether the task body works inside the request's transaction and must
/// therefore be counted in the termination state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskTransactionKind {
    None,
    InTransaction,
}

/// A unit of work created by a step's flow. The body runs on the task
/// scheduler; its error (if any) lands in the request context and the
/// completion is reported back to the DAG controller.
pub struct StepTask {
    id: TaskId,
    step: StepId,
    transaction_kind: TaskTransactionKind,
    body: Box<dyn FnMut() -> EngineResult<TaskResult> + Send>,
}

impl StepTask {
    pub fn new(
        step: StepId,
        transaction_kind: TaskTransactionKind,
        body: impl FnMut() -> EngineResult<TaskResult> + Send + 'static,
    ) -> Self {
        Self {
            id: new_task_id(),
            step,
            transaction_kind,
            body: Box::new(body),
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn step(&self) -> StepId {
        self.step
    }

    pub fn transaction_kind(&self) -> TaskTransactionKind {
        self.transaction_kind
    }

    pub fn run(&mut self) -> EngineResult<TaskResult> {
        (self.body)()
    }
}

impl std::fmt::Debug for StepTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepTask")
            .field("id", &self.id)
            .field("step", &self.step)
            .field("transaction_kind", &self.transaction_kind)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_ids_unique() {
        let a = new_task_id();
        let b = new_task_id();
        assert_ne!(a, b);
        assert_ne!(a, UNINITIALIZED_TASK_ID);
    }

    #[test]
    fn test_task_runs_body() {
        let mut calls = 0;
        let mut task = StepTask::new(0, TaskTransactionKind::None, move || {
            calls += 1;
            Ok(if calls < 2 {
                TaskResult::Proceed
            } else {
                TaskResult::Complete
            })
        });
        assert_eq!(task.run().unwrap(), TaskResult::Proceed);
        assert_eq!(task.run().unwrap(), TaskResult::Complete);
    }
}
