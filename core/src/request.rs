use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use cascade_lib::config::Configuration;
use cascade_lib::error::{ErrorInfo, ErrorKind, Status};
use tracing::{debug, info};

use crate::dag::DagController;
use crate::io::RecordChannel;
use crate::sched::{JobContext, TaskScheduler};
use crate::stats::RequestStatistics;
use crate::transaction::TransactionContext;

static REQUEST_ID_SOURCE: AtomicU64 = AtomicU64::new(1);

/// Per-request state: the transaction, the job, the chosen scheduler, the
/// result channel and the error/cancellation surface.
///
/// Status and error info follow first-error-wins: once a non-ok status is
/// recorded, later errors are dropped (an [`ErrorKind::None`] entry is the
/// only overwritable one).
pub struct RequestContext {
    id: u64,
    session_id: u64,
    config: Arc<Configuration>,
    scheduler: Arc<dyn TaskScheduler>,
    job: Arc<JobContext>,
    transaction: Option<Arc<TransactionContext>>,
    channel: Option<Arc<dyn RecordChannel>>,
    statistics: Option<Arc<RequestStatistics>>,
    status: Mutex<Status>,
    error_info: Mutex<Option<ErrorInfo>>,
    cancel_requested: AtomicBool,
    controller: Mutex<Option<Arc<DagController>>>,
}

impl RequestContext {
    pub fn new(
        config: Arc<Configuration>,
        scheduler: Arc<dyn TaskScheduler>,
        job: Arc<JobContext>,
    ) -> Self {
        Self {
            id: REQUEST_ID_SOURCE.fetch_add(1, Ordering::Relaxed),
            session_id: 0,
            config,
            scheduler,
            job,
            transaction: None,
            channel: None,
            statistics: None,
            status: Mutex::new(Status::Ok),
            error_info: Mutex::new(None),
            cancel_requested: AtomicBool::new(false),
            controller: Mutex::new(None),
        }
    }

    pub fn with_session(mut self, session_id: u64) -> Self {
        self.session_id = session_id;
        self
    }

    pub fn with_transaction(mut self, transaction: Arc<TransactionContext>) -> Self {
        self.transaction = Some(transaction);
        self
    }

    pub fn with_channel(mut self, channel: Arc<dyn RecordChannel>) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn with_statistics(mut self, statistics: Arc<RequestStatistics>) -> Self {
        self.statistics = Some(statistics);
        self
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    pub fn config(&self) -> &Arc<Configuration> {
        &self.config
    }

    pub fn scheduler(&self) -> &Arc<dyn TaskScheduler> {
        &self.scheduler
    }

    pub fn job(&self) -> &Arc<JobContext> {
        &self.job
    }

    pub fn transaction(&self) -> Option<&Arc<TransactionContext>> {
        self.transaction.as_ref()
    }

    pub fn channel(&self) -> Option<&Arc<dyn RecordChannel>> {
        self.channel.as_ref()
    }

    pub fn statistics(&self) -> Option<&Arc<RequestStatistics>> {
        self.statistics.as_ref()
    }

    /// Records an error. The first error wins; returns whether this entry
    /// was stored.
    pub fn error(&self, info: ErrorInfo) -> bool {
        let mut status = self.status.lock().unwrap();
        let mut stored = false;
        if status.is_ok() && !info.status().is_ok() {
            *status = info.status();
            stored = true;
        }
        let mut slot = self.error_info.lock().unwrap();
        match &*slot {
            Some(existing) if !existing.overwritable() => {}
            _ => {
                debug!(request = self.id, error = %info, "error recorded");
                *slot = Some(info);
                stored = true;
            }
        }
        stored
    }

    pub fn status(&self) -> Status {
        *self.status.lock().unwrap()
    }

    pub fn error_info(&self) -> Option<ErrorInfo> {
        self.error_info.lock().unwrap().clone()
    }

    /// Flags the request canceled; observed at the next cancellation check
    /// point of any of its tasks.
    pub fn cancel(&self) {
        info!(request = self.id, "cancel requested");
        self.cancel_requested.store(true, Ordering::SeqCst);
    }

    pub fn cancel_requested(&self) -> bool {
        self.cancel_requested.load(Ordering::SeqCst)
    }

    /// The task-entry cancellation check: when the cancel flag is set,
    /// records `request_canceled` and requests the transaction abort.
    /// Returns true when the caller must stop.
    pub fn check_cancel(&self) -> bool {
        if !self.cancel_requested() {
            return false;
        }
        self.error(ErrorInfo::new(
            ErrorKind::RequestCanceled(String::new()),
            "the operation has been canceled",
        ));
        if let Some(tx) = &self.transaction {
            tx.request_abort();
        }
        true
    }

    pub fn set_controller(&self, controller: Arc<DagController>) {
        *self.controller.lock().unwrap() = Some(controller);
    }

    pub fn controller(&self) -> Option<Arc<DagController>> {
        self.controller.lock().unwrap().clone()
    }

    /// Drops the controller reference, breaking the request↔controller
    /// cycle at the end of the job.
    pub fn clear_controller(&self) {
        self.controller.lock().unwrap().take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sched::SerialTaskScheduler;

    fn context() -> RequestContext {
        RequestContext::new(
            Arc::new(Configuration::default()),
            Arc::new(SerialTaskScheduler::new()),
            Arc::new(JobContext::new()),
        )
    }

    #[test]
    fn test_first_error_wins() {
        let ctx = context();
        assert!(ctx.error(ErrorInfo::new(
            ErrorKind::NotFound("a".into()),
            "first"
        )));
        ctx.error(ErrorInfo::new(ErrorKind::IoError("b".into()), "second"));
        assert_eq!(ctx.status(), Status::NotFound);
        assert_eq!(ctx.error_info().unwrap().message(), "first");
    }

    #[test]
    fn test_none_entry_is_overwritable() {
        let ctx = context();
        ctx.error(ErrorInfo::new(ErrorKind::None, "placeholder"));
        ctx.error(ErrorInfo::new(ErrorKind::IoError(String::new()), "real"));
        assert_eq!(ctx.error_info().unwrap().message(), "real");
        assert_eq!(ctx.status(), Status::ErrIoError);
    }

    #[test]
    fn test_cancel_records_canceled_error() {
        let ctx = context();
        assert!(!ctx.check_cancel());
        ctx.cancel();
        assert!(ctx.check_cancel());
        assert_eq!(ctx.status(), Status::RequestCanceled);
        assert_eq!(
            ctx.error_info().unwrap().message(),
            "the operation has been canceled"
        );
    }

    #[test]
    fn test_request_ids_unique() {
        assert_ne!(context().id(), context().id());
    }
}
