use std::sync::atomic::Ordering;
use std::sync::Arc;

use tracing::trace;

use crate::request::RequestContext;
use crate::sched::flat_task::FlatTask;

/// Races to submit the job's teardown task. Exactly one caller wins the
/// completing flag and emits the teardown; everyone else is a no-op.
pub fn check_or_submit_teardown(request: &Arc<RequestContext>) {
    let job = request.job();
    if job.completing().swap(true, Ordering::SeqCst) {
        return;
    }
    trace!(job = job.id(), "submitting teardown");
    let mut task = FlatTask::teardown(Arc::clone(request));
    if request.config().teardown_try_on_suspended_worker {
        if let Some(worker) = request.scheduler().find_suspended_worker() {
            task = task.with_preferred_worker(worker);
        }
    }
    request.scheduler().schedule_task(task);
}
