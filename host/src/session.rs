use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use cascade_core::io::{RecordChannel, ResultStoreChannel};
use cascade_core::request::RequestContext;
use cascade_core::sched::{FlatTask, JobContext};
use cascade_core::model::task::{TaskResult, TaskTransactionKind};
use cascade_core::stats::RequestStatistics;
use cascade_core::transaction::{TransactionContext, TransactionOption};
use cascade_lib::error::{EngineError, EngineResult, ErrorInfo, ErrorKind};
use cascade_lib::field_type::FieldTypeKind;
use cascade_lib::record::{Record, RecordMeta};
use cascade_storage::TransactionType;
use tracing::{debug, info};

use crate::channel::SeatedRecordChannel;
use crate::commit::{CommitContext, CommitResponseKind};
use crate::compiler::compile;
use crate::database::DatabaseInner;
use crate::params::ParameterSet;
use crate::prepared::PreparedStatement;
use crate::store::SessionElementStore;

pub type StatementHandle = u64;
pub type TransactionHandle = u64;

/// Result of one statement execution.
#[derive(Debug)]
pub struct ExecutionResult {
    pub rows: Vec<Record>,
    pub meta: Option<RecordMeta>,
    pub statistics: Arc<RequestStatistics>,
}

/// One client session: owns the prepared-statement store and the
/// transaction store, both disposed together when the session ends.
pub struct Session {
    db: Arc<DatabaseInner>,
    id: u64,
    statements: SessionElementStore<StatementHandle, PreparedStatement>,
    transactions: SessionElementStore<TransactionHandle, TransactionContext>,
    next_handle: AtomicU64,
}

impl Session {
    pub(crate) fn new(db: Arc<DatabaseInner>, id: u64) -> Self {
        Self {
            db,
            id,
            statements: SessionElementStore::new(id),
            transactions: SessionElementStore::new(id),
            next_handle: AtomicU64::new(1),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn statement_count(&self) -> usize {
        self.statements.size()
    }

    pub fn transaction_count(&self) -> usize {
        self.transactions.size()
    }

    fn allocate_handle(&self) -> u64 {
        self.next_handle.fetch_add(1, Ordering::SeqCst)
    }

    /// Compiles the statement text and caches it in the statement store.
    pub fn prepare(
        &self,
        sql: &str,
        placeholders: HashMap<String, FieldTypeKind>,
    ) -> EngineResult<StatementHandle> {
        let statement = compile(sql)?;
        let prepared = PreparedStatement::new(sql, statement, placeholders);
        let handle = self.allocate_handle();
        self.statements.put(handle, Arc::new(prepared));
        debug!(session = self.id, handle, sql, "statement prepared");
        Ok(handle)
    }

    /// Drops the statement from the store. In-flight executions holding
    /// the shared statement finish undisturbed.
    pub fn close_statement(&self, handle: StatementHandle) -> bool {
        self.statements.remove(&handle)
    }

    pub fn begin_transaction(
        &self,
        option: TransactionOption,
    ) -> EngineResult<TransactionHandle> {
        let transaction = self.build_transaction(&option)?;
        let handle = self.allocate_handle();
        self.transactions.put(handle, Arc::new(transaction));
        debug!(session = self.id, handle, "transaction started");
        Ok(handle)
    }

    fn build_transaction(&self, option: &TransactionOption) -> EngineResult<TransactionContext> {
        let transaction_type = if option.readonly {
            TransactionType::Rtx
        } else if option.is_long {
            let mut write_preserve = Vec::with_capacity(option.write_preserve.len());
            for name in &option.write_preserve {
                let table = self.db.find_table(name)?;
                let storage = self
                    .db
                    .engine
                    .get_storage(&crate::database::table_storage_name(&table.name))
                    .ok_or_else(|| {
                        EngineError::new(
                            ErrorKind::Internal(name.clone()),
                            "write-preserve storage missing",
                        )
                    })?;
                write_preserve.push(storage.id());
            }
            TransactionType::Ltx { write_preserve }
        } else {
            TransactionType::Occ
        };
        let storage_tx = self.db.engine.begin(transaction_type);
        let ctx = TransactionContext::new(storage_tx, option.clone());
        ctx.set_state(cascade_core::transaction::TransactionStateKind::Active);
        Ok(ctx)
    }

    /// Removes the transaction from the store.
    pub fn close_transaction(&self, handle: TransactionHandle) -> EngineResult<()> {
        if self.transactions.remove(&handle) {
            Ok(())
        } else {
            Err(EngineError::new(
                ErrorKind::NotFound(format!("{handle}")),
                "transaction handle not found",
            ))
        }
    }

    /// The transaction context behind a handle, if any.
    pub fn transaction_context(
        &self,
        handle: TransactionHandle,
    ) -> Option<Arc<TransactionContext>> {
        self.transactions.lookup(&handle)
    }

    /// Finds a live transaction by its engine-wide system id.
    pub fn find_transaction(&self, system_id: u64) -> Option<TransactionHandle> {
        self.transactions
            .find_by(|_, tx| tx.system_id() == system_id)
            .map(|(handle, _)| handle)
    }

    fn resolve_transaction(
        &self,
        handle: TransactionHandle,
    ) -> EngineResult<Arc<TransactionContext>> {
        self.transactions.lookup(&handle).ok_or_else(|| {
            EngineError::new(
                ErrorKind::NotFound(format!("{handle}")),
                "transaction handle not found",
            )
        })
    }

    /// Prepares and executes in one call, collecting the result rows.
    pub fn execute(
        &self,
        sql: &str,
        params: &ParameterSet,
        transaction: Option<TransactionHandle>,
    ) -> EngineResult<ExecutionResult> {
        let handle = self.prepare(sql, HashMap::new())?;
        let result = self.execute_statement(handle, params, transaction);
        self.close_statement(handle);
        result
    }

    /// Resolves the prepared statement against the parameter set and runs
    /// it, writing result records into an internal channel.
    pub fn execute_statement(
        &self,
        handle: StatementHandle,
        params: &ParameterSet,
        transaction: Option<TransactionHandle>,
    ) -> EngineResult<ExecutionResult> {
        let channel = Arc::new(ResultStoreChannel::new());
        let statistics =
            self.execute_with_channel(handle, params, channel.clone(), transaction)?;
        Ok(ExecutionResult {
            rows: channel.rows(),
            meta: channel.meta(),
            statistics,
        })
    }

    /// Statement execution against a caller-provided record channel.
    pub fn execute_with_channel(
        &self,
        handle: StatementHandle,
        params: &ParameterSet,
        channel: Arc<dyn RecordChannel>,
        transaction: Option<TransactionHandle>,
    ) -> EngineResult<Arc<RequestStatistics>> {
        let prepared = self.statements.lookup(&handle).ok_or_else(|| {
            EngineError::new(
                ErrorKind::InvalidArgument(format!("{handle}")),
                "statement handle not found",
            )
        })?;
        validate_parameter_kinds(&prepared, params)?;

        let (tx, implicit) = match transaction {
            Some(handle) => {
                let tx = self.resolve_transaction(handle)?;
                if !tx.is_active() {
                    return Err(EngineError::new(
                        ErrorKind::InactiveTransaction(tx.transaction_id()),
                        "transaction already ended",
                    ));
                }
                (tx, false)
            }
            None => {
                let tx = Arc::new(self.build_transaction(&TransactionOption::occ())?);
                (tx, true)
            }
        };

        let statistics = Arc::new(RequestStatistics::new());
        let job = Arc::new(JobContext::new());
        // result writers come out of a fixed seat pool over the client's
        // channel
        let seated = Arc::new(SeatedRecordChannel::new(
            channel,
            self.db.config.writer_pool_capacity,
        ));
        let request = Arc::new(
            RequestContext::new(
                Arc::clone(&self.db.config),
                Arc::clone(&self.db.scheduler),
                Arc::clone(&job),
            )
            .with_session(self.id)
            .with_transaction(Arc::clone(&tx))
            .with_channel(Arc::clone(&seated) as Arc<dyn RecordChannel>)
            .with_statistics(Arc::clone(&statistics)),
        );
        info!(
            session = self.id,
            request = request.id(),
            job = %hex::encode(job.id().to_be_bytes()),
            kind = prepared.statement().kind_name(),
            "request accepted"
        );

        debug!(
            session = self.id,
            request = request.id(),
            "request submitting"
        );
        if let Err(e) =
            self.db
                .submit_statement(&request, prepared.statement().clone(), params.clone())
        {
            tx.request_abort();
            tx.complete_abort();
            return Err(e);
        }
        self.db.scheduler.wait_for_progress(&job);
        if let Err(e) = seated.release_pool() {
            request.error(e.into_info());
        }

        let status = request.status();
        if !status.is_ok() {
            let info = request.error_info().unwrap_or_else(|| {
                ErrorInfo::new(ErrorKind::Internal(String::new()), "execution failed")
            });
            // a failed statement leaves the transaction unusable
            tx.request_abort();
            tx.complete_abort();
            info!(
                session = self.id,
                request = request.id(),
                error = %info,
                "request finished with error"
            );
            return Err(info.into());
        }

        if implicit {
            tx.request_commit()?;
            tx.complete_commit()?;
        }
        info!(
            session = self.id,
            request = request.id(),
            "request finished"
        );
        Ok(statistics)
    }

    /// Requests a commit; the callback fires at the chosen durability
    /// level. Returns immediately after scheduling.
    pub fn commit_async(
        &self,
        handle: TransactionHandle,
        kind: CommitResponseKind,
        callback: impl FnOnce(Result<(), ErrorInfo>) + Send + 'static,
    ) -> EngineResult<Arc<JobContext>> {
        let tx = self.resolve_transaction(handle)?;
        let commit_ctx = Arc::new(CommitContext::new(kind, callback));

        let job = Arc::new(JobContext::new());
        let request = Arc::new(
            RequestContext::new(
                Arc::clone(&self.db.config),
                Arc::clone(&self.db.scheduler),
                Arc::clone(&job),
            )
            .with_session(self.id)
            .with_transaction(Arc::clone(&tx)),
        );

        // raise the commit flag first so no new task slips in
        if let Err(e) = tx.request_commit() {
            commit_ctx.respond(Err(e.info().clone()));
            return Err(e);
        }

        let db = Arc::clone(&self.db);
        let request_ = Arc::clone(&request);
        let tx_ = Arc::clone(&tx);
        let commit_ctx_ = Arc::clone(&commit_ctx);
        let task = FlatTask::custom(
            Arc::clone(&request),
            TaskTransactionKind::None,
            move || {
                match tx_.complete_commit() {
                    Ok(lsn) => {
                        if commit_ctx_.kind() == CommitResponseKind::Available {
                            commit_ctx_.respond(Ok(()));
                            return Ok(TaskResult::CompleteAndTeardown);
                        }
                        // stored/propagated: the response waits for the
                        // durability notification
                        let durable_core = Arc::clone(db.engine.durability());
                        request_.job().set_completion_readiness({
                            let durable_core = Arc::clone(&durable_core);
                            move || durable_core.durable_lsn() >= lsn
                        });
                        let tx_done = Arc::clone(&tx_);
                        let commit_ctx_done = Arc::clone(&commit_ctx_);
                        db.durability.defer(lsn, Arc::clone(&request_), move || {
                            tx_done.set_stored();
                            commit_ctx_done.respond(Ok(()));
                        });
                        // flush in case the marker already passed the lsn
                        db.durability.on_durable(durable_core.durable_lsn());
                        Ok(TaskResult::Complete)
                    }
                    Err(e) => {
                        request_.error(e.info().clone());
                        commit_ctx_.respond(Err(e.info().clone()));
                        Ok(TaskResult::CompleteAndTeardown)
                    }
                }
            },
        );
        self.db.scheduler.schedule_task(task);
        Ok(job)
    }

    /// Commit and wait for the callback at the chosen level.
    pub fn commit(
        &self,
        handle: TransactionHandle,
        kind: CommitResponseKind,
    ) -> EngineResult<()> {
        let outcome: Arc<Mutex<Option<Result<(), ErrorInfo>>>> = Arc::new(Mutex::new(None));
        let outcome_ = Arc::clone(&outcome);
        let job = self.commit_async(handle, kind, move |result| {
            *outcome_.lock().unwrap() = Some(result);
        })?;
        self.db.scheduler.wait_for_progress(&job);
        let result = outcome.lock().unwrap().take();
        match result {
            Some(Ok(())) => Ok(()),
            Some(Err(info)) => Err(info.into()),
            None => Err(EngineError::new(
                ErrorKind::Internal(String::new()),
                "commit finished without a response",
            )),
        }
    }

    /// Aborts the transaction; safe to call on an already-ended one.
    pub fn abort(&self, handle: TransactionHandle) -> EngineResult<()> {
        let tx = self.resolve_transaction(handle)?;
        tx.request_abort();
        tx.complete_abort();
        Ok(())
    }

    /// Disposes both stores and deregisters the session. Called exactly
    /// once when the session ends.
    pub fn dispose(&self) {
        let statements = self.statements.dispose();
        let transactions = self.transactions.dispose();
        if statements || transactions {
            self.db.deregister_session(self.id);
            info!(session = self.id, "session disposed");
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Checks bound parameters against the declared placeholder kinds.
/// Integer kinds are interchangeable (values narrow at use sites), as are
/// the float kinds; NULL binds to anything.
fn validate_parameter_kinds(
    prepared: &PreparedStatement,
    params: &ParameterSet,
) -> EngineResult<()> {
    fn family(kind: FieldTypeKind) -> FieldTypeKind {
        match kind {
            FieldTypeKind::Int1 | FieldTypeKind::Int2 | FieldTypeKind::Int4 => {
                FieldTypeKind::Int8
            }
            FieldTypeKind::Float4 => FieldTypeKind::Float8,
            other => other,
        }
    }
    for (name, value) in params.iter() {
        let Some(declared) = prepared.placeholder_kind(name) else {
            continue;
        };
        let Some(bound) = value.kind() else {
            continue; // NULL is assignable to any declared kind
        };
        if family(bound) != family(declared) {
            return Err(EngineError::new(
                ErrorKind::InvalidArgument(name.to_string()),
                format!(
                    "placeholder ':{name}' declared as {} but bound to {}",
                    declared.name(),
                    bound.name()
                ),
            ));
        }
    }
    Ok(())
}
