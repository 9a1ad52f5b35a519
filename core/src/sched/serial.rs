use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::model::task::TaskResult;
use crate::sched::flat_task::FlatTask;
use crate::sched::job_context::JobContext;
use crate::sched::task_scheduler::{SchedulerKind, TaskScheduler};

/// The serial policy: tasks run to completion on the submitting thread in
/// FIFO order. `yield` re-enqueues at the tail; `proceed` micro-loops are
/// resolved inside the task.
///
/// Submission from within a running task only enqueues; the outermost
/// drain loop picks the new entries up, so the stack never nests tasks.
pub struct SerialTaskScheduler {
    queue: Mutex<VecDeque<FlatTask>>,
    draining: AtomicBool,
}

impl Default for SerialTaskScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl SerialTaskScheduler {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            draining: AtomicBool::new(false),
        }
    }

    fn drain(&self) {
        if self.draining.swap(true, Ordering::SeqCst) {
            return; // already inside the drain loop
        }
        let mut consecutive_yields = 0usize;
        loop {
            let task = self.queue.lock().unwrap().pop_front();
            let Some(mut task) = task else {
                self.draining.store(false, Ordering::SeqCst);
                // close the submit/drain race: someone may have enqueued
                // between the pop and the flag clear
                if self.queue.lock().unwrap().is_empty()
                    || self.draining.swap(true, Ordering::SeqCst)
                {
                    return;
                }
                continue;
            };
            match task.execute() {
                TaskResult::Complete => {
                    consecutive_yields = 0;
                }
                TaskResult::Yield => {
                    consecutive_yields += 1;
                    let mut queue = self.queue.lock().unwrap();
                    let pending = queue.len();
                    queue.push_back(task);
                    drop(queue);
                    // every queued task yielded in a row: the loop is
                    // waiting on an external condition (durability, drain)
                    if consecutive_yields > pending {
                        std::thread::sleep(Duration::from_millis(1));
                        consecutive_yields = 0;
                    }
                }
                other => unreachable!("execute returned {other:?}"),
            }
        }
    }

    pub fn queued(&self) -> usize {
        self.queue.lock().unwrap().len()
    }
}

impl TaskScheduler for SerialTaskScheduler {
    fn start(&self) {}

    fn stop(&self) {
        self.drain();
    }

    fn kind(&self) -> SchedulerKind {
        SchedulerKind::Serial
    }

    fn schedule_task(&self, task: FlatTask) {
        self.queue.lock().unwrap().push_back(task);
        self.drain();
    }

    fn wait_for_progress(&self, job: &JobContext) {
        self.drain();
        job.completion_latch().wait();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::RequestContext;
    use cascade_lib::config::Configuration;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    fn request(scheduler: &Arc<SerialTaskScheduler>) -> Arc<RequestContext> {
        Arc::new(RequestContext::new(
            Arc::new(Configuration::default()),
            Arc::clone(scheduler) as Arc<dyn TaskScheduler>,
            Arc::new(JobContext::new()),
        ))
    }

    #[test]
    fn test_tasks_run_in_submission_order() {
        let scheduler = Arc::new(SerialTaskScheduler::new());
        let request = request(&scheduler);
        let order = Arc::new(Mutex::new(Vec::new()));
        // submit from inside a task so the drain loop handles nesting
        let outer_order = Arc::clone(&order);
        let sched = Arc::clone(&scheduler);
        let req = Arc::clone(&request);
        scheduler.schedule_task(FlatTask::custom(
            Arc::clone(&request),
            crate::model::task::TaskTransactionKind::None,
            move || {
                outer_order.lock().unwrap().push(1);
                for n in [2, 3] {
                    let inner_order = Arc::clone(&outer_order);
                    sched.schedule_task(FlatTask::custom(
                        Arc::clone(&req),
                        crate::model::task::TaskTransactionKind::None,
                        move || {
                            inner_order.lock().unwrap().push(n);
                            Ok(TaskResult::Complete)
                        },
                    ));
                }
                Ok(TaskResult::Complete)
            },
        ));
        assert_eq!(*order.lock().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_yield_requeues_at_tail() {
        let scheduler = Arc::new(SerialTaskScheduler::new());
        let request = request(&scheduler);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_a = Arc::clone(&seen);
        let mut first_run = true;
        scheduler.schedule_task(FlatTask::custom(
            Arc::clone(&request),
            crate::model::task::TaskTransactionKind::None,
            move || {
                if first_run {
                    first_run = false;
                    seen_a.lock().unwrap().push("a-yield");
                    return Ok(TaskResult::Yield);
                }
                seen_a.lock().unwrap().push("a-done");
                Ok(TaskResult::Complete)
            },
        ));
        let seen_b = Arc::clone(&seen);
        scheduler.schedule_task(FlatTask::custom(
            Arc::clone(&request),
            crate::model::task::TaskTransactionKind::None,
            move || {
                seen_b.lock().unwrap().push("b");
                Ok(TaskResult::Complete)
            },
        ));
        // the first schedule_task call drained everything: a yielded once,
        // went to the tail, and finished after it was the only entry left
        assert_eq!(*seen.lock().unwrap(), vec!["a-yield", "a-done", "b"]);
    }

    #[test]
    fn test_proceed_microloop_runs_inline() {
        let scheduler = Arc::new(SerialTaskScheduler::new());
        let request = request(&scheduler);
        let runs = Arc::new(AtomicUsize::new(0));
        let runs_ = Arc::clone(&runs);
        scheduler.schedule_task(FlatTask::custom(
            Arc::clone(&request),
            crate::model::task::TaskTransactionKind::None,
            move || {
                let n = runs_.fetch_add(1, Ordering::SeqCst);
                Ok(if n < 4 {
                    TaskResult::Proceed
                } else {
                    TaskResult::Complete
                })
            },
        ));
        assert_eq!(runs.load(Ordering::SeqCst), 5);
    }
}
