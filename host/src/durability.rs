use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::{Arc, Mutex};

use cascade_core::request::RequestContext;
use cascade_core::sched::FlatTask;
use cascade_storage::Lsn;
use tracing::debug;

type DeferredResponse = Box<dyn FnOnce() + Send>;

struct PendingCommit {
    lsn: Lsn,
    request: Arc<RequestContext>,
    response: DeferredResponse,
}

impl PartialEq for PendingCommit {
    fn eq(&self, other: &Self) -> bool {
        self.lsn == other.lsn
    }
}

impl Eq for PendingCommit {}

impl PartialOrd for PendingCommit {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PendingCommit {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.lsn.cmp(&other.lsn)
    }
}

/// Holds commits whose response waits for durability.
///
/// The storage layer's durability notification drives `on_durable`, which
/// schedules the deferred commit-response task (response callback plus
/// teardown) for every pending commit at or below the durable LSN.
#[derive(Default)]
pub struct DurabilityManager {
    pending: Mutex<BinaryHeap<Reverse<PendingCommit>>>,
}

impl DurabilityManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defers a commit response until the durable marker passes `lsn`.
    pub fn defer(
        &self,
        lsn: Lsn,
        request: Arc<RequestContext>,
        response: impl FnOnce() + Send + 'static,
    ) {
        debug!(lsn, request = request.id(), "commit response deferred for durability");
        self.pending.lock().unwrap().push(Reverse(PendingCommit {
            lsn,
            request,
            response: Box::new(response),
        }));
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    /// Durability callback: fires responses for commits whose LSN is now
    /// durable. Each response runs as a commit-response task on the
    /// request's own scheduler, which also submits the teardown.
    pub fn on_durable(&self, durable: Lsn) {
        loop {
            let ready = {
                let mut pending = self.pending.lock().unwrap();
                match pending.peek() {
                    Some(Reverse(head)) if head.lsn <= durable => pending.pop(),
                    _ => None,
                }
            };
            let Some(Reverse(commit)) = ready else {
                break;
            };
            debug!(
                lsn = commit.lsn,
                request = commit.request.id(),
                "durability reached; scheduling commit response"
            );
            let request = Arc::clone(&commit.request);
            let response = commit.response;
            request
                .scheduler()
                .clone()
                .schedule_task(FlatTask::commit_response(request, response));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_core::sched::{JobContext, SerialTaskScheduler, TaskScheduler};
    use cascade_lib::config::Configuration;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn request() -> Arc<RequestContext> {
        Arc::new(RequestContext::new(
            Arc::new(Configuration::default()),
            Arc::new(SerialTaskScheduler::new()),
            Arc::new(JobContext::new()),
        ))
    }

    #[test]
    fn test_responses_fire_in_lsn_order_up_to_durable() {
        let manager = DurabilityManager::new();
        let fired = Arc::new(AtomicUsize::new(0));
        for lsn in [3u64, 1, 2] {
            let fired_ = Arc::clone(&fired);
            manager.defer(lsn, request(), move || {
                fired_.fetch_add(1, Ordering::SeqCst);
            });
        }
        manager.on_durable(2);
        assert_eq!(fired.load(Ordering::SeqCst), 2);
        assert_eq!(manager.pending_count(), 1);
        manager.on_durable(5);
        assert_eq!(fired.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_callback_never_fires_before_durable() {
        let manager = DurabilityManager::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_ = Arc::clone(&fired);
        manager.defer(10, request(), move || {
            fired_.fetch_add(1, Ordering::SeqCst);
        });
        manager.on_durable(9);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        manager.on_durable(10);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
