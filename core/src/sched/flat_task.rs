use std::sync::Arc;

use cascade_lib::error::{EngineResult, ErrorInfo, ErrorKind};
use tracing::{error, trace};

use crate::event::Event;
use crate::model::task::{new_task_id, StepTask, TaskId, TaskResult, TaskTransactionKind};
use crate::request::RequestContext;
use crate::sched::teardown::check_or_submit_teardown;

type CustomBody = Box<dyn FnMut() -> EngineResult<TaskResult> + Send>;
type ResponseBody = Box<dyn FnOnce() + Send>;

/// The closed set of task shapes the scheduler runs.
pub enum FlatTaskBody {
    /// A step task created by a flow; completion is reported to the DAG
    /// controller.
    Wrapped(StepTask),
    /// Kicks the DAG controller: activates the graph and schedules the
    /// initial tasks.
    DagStart,
    /// Final task of a job: waits for in-flight tasks and the readiness
    /// provider, then fires the completion callback and the latch.
    Teardown,
    /// Invokes the client's commit-response callback, then tears down.
    CommitResponse(Option<ResponseBody>),
    /// Free-form body with an explicit transaction kind.
    Custom {
        transaction_kind: TaskTransactionKind,
        body: CustomBody,
    },
}

/// A schedulable task bound to its request.
pub struct FlatTask {
    id: TaskId,
    request: Arc<RequestContext>,
    body: FlatTaskBody,
    preferred_worker: Option<usize>,
    finished: bool,
}

impl FlatTask {
    pub fn new(request: Arc<RequestContext>, body: FlatTaskBody) -> Self {
        request.job().increment_tasks();
        Self {
            id: new_task_id(),
            request,
            body,
            preferred_worker: None,
            finished: false,
        }
    }

    pub fn wrapped(request: Arc<RequestContext>, task: StepTask) -> Self {
        Self::new(request, FlatTaskBody::Wrapped(task))
    }

    pub fn dag_start(request: Arc<RequestContext>) -> Self {
        Self::new(request, FlatTaskBody::DagStart)
    }

    pub fn teardown(request: Arc<RequestContext>) -> Self {
        Self::new(request, FlatTaskBody::Teardown)
    }

    pub fn commit_response(request: Arc<RequestContext>, response: impl FnOnce() + Send + 'static) -> Self {
        Self::new(request, FlatTaskBody::CommitResponse(Some(Box::new(response))))
    }

    pub fn custom(
        request: Arc<RequestContext>,
        transaction_kind: TaskTransactionKind,
        body: impl FnMut() -> EngineResult<TaskResult> + Send + 'static,
    ) -> Self {
        Self::new(
            request,
            FlatTaskBody::Custom {
                transaction_kind,
                body: Box::new(body),
            },
        )
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn request(&self) -> &Arc<RequestContext> {
        &self.request
    }

    pub fn with_preferred_worker(mut self, worker: usize) -> Self {
        self.preferred_worker = Some(worker);
        self
    }

    pub fn preferred_worker(&self) -> Option<usize> {
        self.preferred_worker
    }

    fn transaction_kind(&self) -> TaskTransactionKind {
        match &self.body {
            FlatTaskBody::Wrapped(task) => task.transaction_kind(),
            FlatTaskBody::Custom {
                transaction_kind, ..
            } => *transaction_kind,
            _ => TaskTransactionKind::None,
        }
    }

    /// Runs the task once, applying the full task-entry contract:
    /// cancellation check, termination-state gating for in-transaction
    /// bodies, `proceed` micro-loops, error capture, completion reporting
    /// and job task accounting.
    ///
    /// Returns `Complete` or `Yield`; every other [`TaskResult`] is
    /// resolved internally.
    pub fn execute(&mut self) -> TaskResult {
        let result = self.execute_body();
        match result {
            TaskResult::Complete => {
                self.mark_finished();
                TaskResult::Complete
            }
            TaskResult::Yield => TaskResult::Yield,
            other => unreachable!("unresolved task result {other:?}"),
        }
    }

    fn mark_finished(&mut self) {
        if !self.finished {
            self.finished = true;
            self.request.job().decrement_tasks();
        }
    }

    fn execute_body(&mut self) -> TaskResult {
        match &mut self.body {
            FlatTaskBody::Teardown => return self.run_teardown(),
            FlatTaskBody::CommitResponse(response) => {
                let response = response.take();
                if let Some(response) = response {
                    response();
                }
                check_or_submit_teardown(&self.request);
                return TaskResult::Complete;
            }
            _ => {}
        }

        // cancellation check at task entry
        if self.request.check_cancel() {
            // make sure the job still winds down to its callback
            match self.request.controller() {
                Some(controller) => controller.on_error(),
                None => check_or_submit_teardown(&self.request),
            }
            return self.finish_current(TaskResult::Complete);
        }

        // in-transaction bodies must hold a termination-state slot
        let rented = if self.transaction_kind() == TaskTransactionKind::InTransaction {
            match self.request.transaction() {
                Some(tx) => {
                    if !tx.try_rent_task_slot() {
                        self.request.error(ErrorInfo::new(
                            ErrorKind::InactiveTransaction(tx.transaction_id()),
                            "transaction is terminating; task not started",
                        ));
                        if self.request.controller().is_none() {
                            check_or_submit_teardown(&self.request);
                        }
                        return self.finish_current(TaskResult::Complete);
                    }
                    true
                }
                None => false,
            }
        } else {
            false
        };

        let mut outcome = self.run_once();
        // proceed micro-loop: run again immediately without re-queuing
        while outcome == TaskResult::Proceed {
            outcome = self.run_once();
        }

        if rented {
            if let Some(tx) = self.request.transaction() {
                tx.return_task_slot();
            }
        }

        match outcome {
            TaskResult::CompleteAndTeardown => {
                check_or_submit_teardown(&self.request);
                self.finish_current(TaskResult::Complete)
            }
            TaskResult::Complete => self.finish_current(TaskResult::Complete),
            TaskResult::Yield => TaskResult::Yield,
            TaskResult::Proceed => unreachable!(),
        }
    }

    fn run_once(&mut self) -> TaskResult {
        let result = match &mut self.body {
            FlatTaskBody::Wrapped(task) => task.run(),
            FlatTaskBody::DagStart => match self.request.controller() {
                Some(controller) => controller.start().map(|_| TaskResult::Complete),
                None => Ok(TaskResult::Complete),
            },
            FlatTaskBody::Custom { body, .. } => body(),
            FlatTaskBody::Teardown | FlatTaskBody::CommitResponse(_) => unreachable!(),
        };
        match result {
            Ok(r) => r,
            Err(e) => {
                error!(request = self.request.id(), error = %e, "task failed");
                self.request.error(e.into_info());
                // inside a transaction, a failed statement aborts it
                if let Some(tx) = self.request.transaction() {
                    tx.request_abort();
                }
                // wind the job down: force-complete the graph, or submit
                // the teardown directly for single-task jobs
                match self.request.controller() {
                    Some(controller) => controller.on_error(),
                    None => check_or_submit_teardown(&self.request),
                }
                TaskResult::Complete
            }
        }
    }

    /// Completion bookkeeping after the body finished: step tasks report
    /// back to the controller.
    fn finish_current(&mut self, result: TaskResult) -> TaskResult {
        if let FlatTaskBody::Wrapped(task) = &self.body {
            let step = task.step();
            let task_id = task.id();
            if let Some(controller) = self.request.controller() {
                controller.channel().push(Event::TaskCompleted {
                    target: step,
                    task: task_id,
                });
                controller.process_events();
            }
        }
        result
    }

    fn run_teardown(&mut self) -> TaskResult {
        let job = self.request.job();
        // wait for durability (or any other readiness condition)
        if !job.completion_ready() {
            trace!(job = job.id(), "teardown waiting for readiness");
            std::thread::sleep(std::time::Duration::from_millis(1));
            return TaskResult::Yield;
        }
        // wait until this is the only in-flight task of the job
        if job.task_count() > 1 {
            trace!(job = job.id(), tasks = job.task_count(), "teardown waiting for drain");
            std::thread::sleep(std::time::Duration::from_millis(1));
            return TaskResult::Yield;
        }
        if let Some(stats) = self.request.statistics() {
            stats.record_finish();
        }
        if let Some(controller) = self.request.controller() {
            controller.deactivate();
        }
        self.request.clear_controller();
        job.invoke_callback();
        job.completion_latch().release();
        trace!(job = job.id(), "job completed");
        TaskResult::Complete
    }
}

impl Drop for FlatTask {
    fn drop(&mut self) {
        // a task dropped without completing (scheduler stopped) must not
        // leave the job count dangling
        self.mark_finished();
    }
}

impl std::fmt::Debug for FlatTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.body {
            FlatTaskBody::Wrapped(_) => "wrapped",
            FlatTaskBody::DagStart => "dag_start",
            FlatTaskBody::Teardown => "teardown",
            FlatTaskBody::CommitResponse(_) => "commit_response",
            FlatTaskBody::Custom { .. } => "custom",
        };
        f.debug_struct("FlatTask")
            .field("id", &self.id)
            .field("kind", &kind)
            .field("request", &self.request.id())
            .finish()
    }
}
