use cascade_lib::config::Configuration;
use cascade_scheduler::{SchedulerCfg, TaskSchedulerPool, WorkStatus, WorkUnit, WorkerContext};

use crate::model::task::TaskResult;
use crate::sched::flat_task::FlatTask;
use crate::sched::job_context::JobContext;
use crate::sched::task_scheduler::{SchedulerKind, TaskScheduler};

impl WorkUnit for FlatTask {
    fn run(&mut self, _ctx: &mut WorkerContext) -> WorkStatus {
        match self.execute() {
            TaskResult::Complete => WorkStatus::Completed,
            TaskResult::Yield => WorkStatus::Yielded,
            other => unreachable!("execute returned {other:?}"),
        }
    }
}

/// The stealing policy: wraps the worker pool and applies the placement
/// rules (task hint, then job hint, then round robin). The first placement
/// of a job records its preferred worker so related tasks share a queue;
/// idle neighbors steal the overflow.
pub struct StealingTaskScheduler {
    pool: TaskSchedulerPool<FlatTask>,
}

impl StealingTaskScheduler {
    pub fn new(config: &Configuration) -> Self {
        let cfg = SchedulerCfg {
            thread_count: config.thread_pool_size,
            stealing_enabled: config.stealing_enabled,
            core_affinity: config.core_affinity,
            initial_core: config.initial_core,
            ..SchedulerCfg::default()
        };
        Self {
            pool: TaskSchedulerPool::new(cfg),
        }
    }

    pub fn worker_count(&self) -> usize {
        self.pool.worker_count()
    }
}

impl TaskScheduler for StealingTaskScheduler {
    fn start(&self) {
        self.pool.start();
    }

    fn stop(&self) {
        self.pool.stop();
    }

    fn kind(&self) -> SchedulerKind {
        SchedulerKind::Stealing
    }

    fn schedule_task(&self, task: FlatTask) {
        let worker = match task.preferred_worker() {
            Some(w) => w,
            None => {
                let job = task.request().job().clone();
                match job.preferred_worker() {
                    Some(w) => w,
                    None => job.record_preferred_worker(self.pool.next_worker()),
                }
            }
        };
        self.pool.schedule_at(worker, task);
    }

    fn wait_for_progress(&self, job: &JobContext) {
        job.completion_latch().wait();
    }

    fn find_suspended_worker(&self) -> Option<usize> {
        self.pool.find_suspended_worker()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::task::TaskTransactionKind;
    use crate::request::RequestContext;
    use crate::sched::teardown::check_or_submit_teardown;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn scheduler() -> Arc<StealingTaskScheduler> {
        let config = Configuration::multi_thread(3);
        let s = Arc::new(StealingTaskScheduler::new(&config));
        s.start();
        s
    }

    fn request(s: &Arc<StealingTaskScheduler>) -> Arc<RequestContext> {
        Arc::new(RequestContext::new(
            Arc::new(Configuration::multi_thread(3)),
            Arc::clone(s) as Arc<dyn TaskScheduler>,
            Arc::new(JobContext::new()),
        ))
    }

    #[test]
    fn test_job_callback_fires_once_after_tasks_drain() {
        let s = scheduler();
        let request = request(&s);
        let callbacks = Arc::new(AtomicUsize::new(0));
        let callbacks_ = Arc::clone(&callbacks);
        request.job().set_callback(move || {
            callbacks_.fetch_add(1, Ordering::SeqCst);
        });
        let executed = Arc::new(AtomicUsize::new(0));
        for _ in 0..10 {
            let executed_ = Arc::clone(&executed);
            s.schedule_task(FlatTask::custom(
                Arc::clone(&request),
                TaskTransactionKind::None,
                move || {
                    executed_.fetch_add(1, Ordering::SeqCst);
                    Ok(TaskResult::Complete)
                },
            ));
        }
        check_or_submit_teardown(&request);
        check_or_submit_teardown(&request);
        s.wait_for_progress(request.job());
        assert_eq!(executed.load(Ordering::SeqCst), 10);
        assert_eq!(callbacks.load(Ordering::SeqCst), 1);
        assert_eq!(request.job().task_count(), 0);
        s.stop();
    }

    #[test]
    fn test_teardown_waits_for_readiness_provider() {
        let s = scheduler();
        let request = request(&s);
        let ready = Arc::new(AtomicUsize::new(0));
        let ready_ = Arc::clone(&ready);
        request
            .job()
            .set_completion_readiness(move || ready_.load(Ordering::SeqCst) == 1);
        check_or_submit_teardown(&request);
        assert!(!request
            .job()
            .completion_latch()
            .wait_for(std::time::Duration::from_millis(50)));
        ready.store(1, Ordering::SeqCst);
        s.wait_for_progress(request.job());
        s.stop();
    }

    #[test]
    fn test_canceled_request_records_error_before_work() {
        let s = scheduler();
        let request = request(&s);
        request.cancel();
        let executed = Arc::new(AtomicUsize::new(0));
        let executed_ = Arc::clone(&executed);
        s.schedule_task(FlatTask::custom(
            Arc::clone(&request),
            TaskTransactionKind::None,
            move || {
                executed_.fetch_add(1, Ordering::SeqCst);
                Ok(TaskResult::Complete)
            },
        ));
        check_or_submit_teardown(&request);
        s.wait_for_progress(request.job());
        assert_eq!(executed.load(Ordering::SeqCst), 0);
        assert_eq!(
            request.status(),
            cascade_lib::error::Status::RequestCanceled
        );
        s.stop();
    }
}
