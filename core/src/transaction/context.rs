use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use cascade_lib::error::{EngineError, EngineResult, ErrorKind};
use cascade_storage::{Lsn, StorageTransaction};
use tracing::{debug, trace};

use crate::transaction::option::TransactionOption;
use crate::transaction::state::TransactionStateKind;
use crate::transaction::termination::TerminationState;

static SYSTEM_ID_SOURCE: AtomicU64 = AtomicU64::new(1);

struct Guarded {
    state: TransactionStateKind,
    termination: TerminationState,
}

/// Engine-level transaction: wraps the storage transaction and gates
/// concurrent commit/abort through the termination state word.
///
/// The termination state is the only authoritative gate for new
/// in-transaction work: tasks rent a slot before touching the storage
/// transaction and return it when done; commit and abort raise their flag
/// and wait for the count to drain.
pub struct TransactionContext {
    system_id: u64,
    option: TransactionOption,
    storage: Mutex<StorageTransaction>,
    guarded: Mutex<Guarded>,
    drained: Condvar,
    commit_lsn: AtomicU64,
    started_at: Instant,
}

impl TransactionContext {
    pub fn new(storage: StorageTransaction, option: TransactionOption) -> Self {
        Self {
            system_id: SYSTEM_ID_SOURCE.fetch_add(1, Ordering::Relaxed),
            option,
            storage: Mutex::new(storage),
            guarded: Mutex::new(Guarded {
                state: TransactionStateKind::Init,
                termination: TerminationState::new(),
            }),
            drained: Condvar::new(),
            commit_lsn: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    pub fn system_id(&self) -> u64 {
        self.system_id
    }

    /// Printable transaction id used in logs.
    pub fn transaction_id(&self) -> String {
        format!("TID-{:08x}", self.system_id)
    }

    pub fn option(&self) -> &TransactionOption {
        &self.option
    }

    pub fn label(&self) -> Option<&str> {
        self.option.label.as_deref()
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn state(&self) -> TransactionStateKind {
        self.guarded.lock().unwrap().state
    }

    pub fn set_state(&self, state: TransactionStateKind) {
        let mut guarded = self.guarded.lock().unwrap();
        trace!(tx = %self.transaction_id(), from = %guarded.state, to = %state, "transaction state");
        guarded.state = state;
    }

    pub fn is_active(&self) -> bool {
        self.state().accepts_operations()
    }

    /// Snapshot of the termination word.
    pub fn termination_state(&self) -> TerminationState {
        self.guarded.lock().unwrap().termination
    }

    /// Access to the storage transaction for the duration of one closure.
    pub fn with_storage<R>(&self, f: impl FnOnce(&mut StorageTransaction) -> R) -> R {
        let mut storage = self.storage.lock().unwrap();
        f(&mut storage)
    }

    /// Rents a task slot: fails once either going-to-* flag is up.
    pub fn try_rent_task_slot(&self) -> bool {
        let mut guarded = self.guarded.lock().unwrap();
        if guarded.termination.terminating() {
            return false;
        }
        guarded.termination.increment_task_use_count();
        true
    }

    /// Returns a rented slot; wakes a drain waiter when the count hits 0.
    pub fn return_task_slot(&self) {
        let mut guarded = self.guarded.lock().unwrap();
        guarded.termination.decrement_task_use_count();
        if guarded.termination.task_empty() {
            drop(guarded);
            self.drained.notify_all();
        }
    }

    /// Raises going-to-commit. Fails with `inactive_transaction` when the
    /// transaction is already terminating or ended (abort dominates when
    /// both were requested).
    pub fn request_commit(&self) -> EngineResult<()> {
        let mut guarded = self.guarded.lock().unwrap();
        if guarded.termination.going_to_abort() || !guarded.state.accepts_operations() {
            return Err(EngineError::new(
                ErrorKind::InactiveTransaction(self.transaction_id()),
                "commit requested on inactive transaction",
            ));
        }
        if guarded.termination.going_to_commit() {
            return Err(EngineError::new(
                ErrorKind::InactiveTransaction(self.transaction_id()),
                "commit already in progress",
            ));
        }
        guarded.termination.set_going_to_commit();
        guarded.state = TransactionStateKind::GoingToCommit;
        Ok(())
    }

    /// Raises going-to-abort. Idempotent; succeeds even while a commit is
    /// pending (abort wins).
    pub fn request_abort(&self) {
        let mut guarded = self.guarded.lock().unwrap();
        if guarded.state.ended() {
            return;
        }
        guarded.termination.set_going_to_abort();
        guarded.state = TransactionStateKind::GoingToAbort;
    }

    fn wait_drained<'a>(&'a self, mut guarded: MutexGuard<'a, Guarded>) -> MutexGuard<'a, Guarded> {
        while !guarded.termination.task_empty() {
            guarded = self.drained.wait(guarded).unwrap();
        }
        guarded
    }

    /// Completes a requested commit: waits for in-flight tasks to drain,
    /// runs the storage commit and advances the state. Returns the commit
    /// LSN.
    ///
    /// When going-to-abort was raised concurrently, the abort dominates:
    /// the storage transaction is aborted and the commit fails with
    /// `inactive_transaction`.
    pub fn complete_commit(&self) -> EngineResult<Lsn> {
        let guarded = self.guarded.lock().unwrap();
        let mut guarded = self.wait_drained(guarded);
        if guarded.termination.going_to_abort() {
            guarded.state = TransactionStateKind::Aborted;
            drop(guarded);
            self.with_storage(|tx| tx.abort());
            return Err(EngineError::new(
                ErrorKind::InactiveTransaction(self.transaction_id()),
                "transaction aborted while commit was pending",
            ));
        }
        guarded.state = TransactionStateKind::CcCommitting;
        drop(guarded);

        let result = self.with_storage(|tx| tx.commit());
        match result {
            Ok(lsn) => {
                self.commit_lsn.store(lsn, Ordering::SeqCst);
                self.set_state(TransactionStateKind::CommittedAvailable);
                debug!(tx = %self.transaction_id(), lsn, "transaction committed");
                Ok(lsn)
            }
            Err(e) => {
                self.set_state(TransactionStateKind::Aborted);
                // a validation conflict at commit surfaces as a
                // serialization failure to the client
                if matches!(e.kind(), ErrorKind::ConcurrentOperation(_)) {
                    return Err(EngineError::new(
                        ErrorKind::SerializationFailure(self.transaction_id()),
                        "transaction aborted by a conflicting concurrent operation",
                    ));
                }
                Err(e)
            }
        }
    }

    /// Completes a requested abort: waits for drain, aborts storage.
    pub fn complete_abort(&self) {
        let guarded = self.guarded.lock().unwrap();
        let mut guarded = self.wait_drained(guarded);
        if guarded.state.ended() {
            return;
        }
        guarded.state = TransactionStateKind::Aborted;
        drop(guarded);
        self.with_storage(|tx| tx.abort());
        debug!(tx = %self.transaction_id(), "transaction aborted");
    }

    /// Convenience for the cancellation path: raise abort and finish it.
    pub fn abort_now(&self) {
        self.request_abort();
        self.complete_abort();
    }

    /// LSN assigned at commit; 0 until committed.
    pub fn commit_lsn(&self) -> Lsn {
        self.commit_lsn.load(Ordering::SeqCst)
    }

    /// Marks durability reached for this transaction.
    pub fn set_stored(&self) {
        let mut guarded = self.guarded.lock().unwrap();
        if guarded.state == TransactionStateKind::CommittedAvailable {
            guarded.state = TransactionStateKind::CommittedStored;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_storage::{StorageEngine, TransactionType};

    fn occ_context() -> TransactionContext {
        let engine = StorageEngine::new();
        engine.create_storage("t").unwrap();
        TransactionContext::new(engine.begin(TransactionType::Occ), TransactionOption::occ())
    }

    #[test]
    fn test_rent_and_return_slots() {
        let ctx = occ_context();
        assert!(ctx.try_rent_task_slot());
        assert!(ctx.try_rent_task_slot());
        assert_eq!(ctx.termination_state().task_use_count(), 2);
        ctx.return_task_slot();
        ctx.return_task_slot();
        assert!(ctx.termination_state().task_empty());
    }

    #[test]
    fn test_commit_flag_blocks_new_tasks() {
        let ctx = occ_context();
        ctx.request_commit().unwrap();
        assert!(!ctx.try_rent_task_slot());
        assert_eq!(ctx.state(), TransactionStateKind::GoingToCommit);
    }

    #[test]
    fn test_commit_waits_for_drain() {
        let ctx = std::sync::Arc::new(occ_context());
        assert!(ctx.try_rent_task_slot());
        ctx.request_commit().unwrap();
        let ctx2 = std::sync::Arc::clone(&ctx);
        let committer = std::thread::spawn(move || ctx2.complete_commit());
        std::thread::sleep(Duration::from_millis(30));
        assert!(!committer.is_finished());
        ctx.return_task_slot();
        assert!(committer.join().unwrap().is_ok());
        assert_eq!(ctx.state(), TransactionStateKind::CommittedAvailable);
    }

    #[test]
    fn test_abort_dominates_pending_commit() {
        let ctx = occ_context();
        ctx.request_commit().unwrap();
        ctx.request_abort();
        let err = ctx.complete_commit().unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InactiveTransaction(_)));
        assert_eq!(ctx.state(), TransactionStateKind::Aborted);
    }

    #[test]
    fn test_commit_after_abort_rejected() {
        let ctx = occ_context();
        ctx.request_abort();
        ctx.complete_abort();
        let err = ctx.request_commit().unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InactiveTransaction(_)));
    }

    #[test]
    fn test_second_commit_request_rejected() {
        let ctx = occ_context();
        ctx.request_commit().unwrap();
        assert!(ctx.request_commit().is_err());
    }
}
