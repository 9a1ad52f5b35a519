use std::sync::Mutex;

use cascade_lib::error::ErrorInfo;

/// Level at which the commit callback fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CommitResponseKind {
    /// Commit is visible to other transactions.
    Available,
    /// Commit is durably stored on this node.
    Stored,
    /// Commit has propagated to the replicas.
    Propagated,
}

type ResponseCallback = Box<dyn FnOnce(Result<(), ErrorInfo>) + Send>;

/// Client callback state for one commit request. The callback fires at
/// most once, at the requested durability level (or on error).
pub struct CommitContext {
    kind: CommitResponseKind,
    callback: Mutex<Option<ResponseCallback>>,
}

impl CommitContext {
    pub fn new(
        kind: CommitResponseKind,
        callback: impl FnOnce(Result<(), ErrorInfo>) + Send + 'static,
    ) -> Self {
        Self {
            kind,
            callback: Mutex::new(Some(Box::new(callback))),
        }
    }

    pub fn kind(&self) -> CommitResponseKind {
        self.kind
    }

    /// Fires the response callback; later calls are no-ops.
    pub fn respond(&self, result: Result<(), ErrorInfo>) {
        if let Some(cb) = self.callback.lock().unwrap().take() {
            cb(result);
        }
    }

    pub fn responded(&self) -> bool {
        self.callback.lock().unwrap().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_kinds_are_ordered_by_durability() {
        assert!(CommitResponseKind::Available < CommitResponseKind::Stored);
        assert!(CommitResponseKind::Stored < CommitResponseKind::Propagated);
    }

    #[test]
    fn test_respond_fires_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_ = Arc::clone(&calls);
        let ctx = CommitContext::new(CommitResponseKind::Available, move |_| {
            calls_.fetch_add(1, Ordering::SeqCst);
        });
        assert!(!ctx.responded());
        ctx.respond(Ok(()));
        ctx.respond(Ok(()));
        assert!(ctx.responded());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
