use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use cascade_core::dag::DagController;
use cascade_core::executor::exchange::{
    AggregateColumn, AggregateSpec, ExchangeKind, ExchangeSpec, GroupSpec,
};
use cascade_core::executor::function::{AggregateFunctionKind, FunctionRegistry};
use cascade_core::executor::process::{EmitLogic, ProcessSpec};
use cascade_core::model::{Graph, StepSpec};
use cascade_core::model::task::{TaskResult, TaskTransactionKind};
use cascade_core::request::RequestContext;
use cascade_core::sched::{
    FlatTask, SerialTaskScheduler, StealingTaskScheduler, TaskScheduler,
};
use cascade_core::stats::CounterKind;
use cascade_lib::config::Configuration;
use cascade_lib::error::{EngineError, EngineResult, ErrorKind};
use cascade_lib::field_type::FieldTypeKind;
use cascade_lib::record::{Field, RecordMeta};
use cascade_lib::value::Value;
use cascade_storage::{
    PutMode, SequenceRepository, StorageEngine, StorageManager,
};
use dashmap::DashMap;
use tracing::{debug, info};

use crate::durability::DurabilityManager;
use crate::dto::DescribeTableDto;
use crate::executor::{
    coerce_value, encode_row, encode_row_key, resolve_scalar, CompiledCondition, ProjectionItem,
    ScanLogic,
};
use crate::metadata::{IndexDef, MetadataStore, TableMetadata};
use crate::params::ParameterSet;
use crate::plan::{CreateIndex, CreateTable, Insert, Projection, Query, Statement};
use crate::session::Session;

pub(crate) fn table_storage_name(table: &str) -> String {
    format!("__table_{table}")
}

fn rowid_sequence_name(table: &str) -> String {
    format!("__rowid_{table}")
}

pub(crate) struct DatabaseInner {
    pub(crate) config: Arc<Configuration>,
    pub(crate) engine: Arc<StorageEngine>,
    pub(crate) scheduler: Arc<dyn TaskScheduler>,
    pub(crate) storage_manager: Arc<StorageManager>,
    pub(crate) sequences: SequenceRepository,
    pub(crate) functions: Arc<FunctionRegistry>,
    pub(crate) metadata_store: MetadataStore,
    pub(crate) tables: DashMap<String, Arc<TableMetadata>>,
    pub(crate) durability: Arc<DurabilityManager>,
    pub(crate) sessions: DashMap<u64, ()>,
    next_session: AtomicU64,
    started: AtomicBool,
}

/// The embedded database engine: the entry point the hosting server talks
/// to. All process-wide state (storage manager, function registries,
/// durability watcher) is created at `start` and torn down at `shutdown`.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

impl Database {
    /// Builds and starts the engine with the given configuration.
    pub fn start(config: Configuration) -> EngineResult<Self> {
        let config = Arc::new(config);
        let engine = StorageEngine::new();
        let scheduler: Arc<dyn TaskScheduler> = if config.single_thread {
            Arc::new(SerialTaskScheduler::new())
        } else {
            Arc::new(StealingTaskScheduler::new(&config))
        };
        scheduler.start();
        engine.start(config.durability_notify_interval_ms);

        let sequences = SequenceRepository::open(&engine);
        let metadata_store = MetadataStore::new(Arc::clone(&engine));
        let storage_manager = Arc::new(StorageManager::new());
        let tables = DashMap::new();
        for metadata in metadata_store.load_all() {
            // recreate runtime state for tables persisted by an earlier run
            let storage = engine.get_or_create_storage(&table_storage_name(&metadata.name));
            storage_manager.add_entry(storage.id());
            for index in &metadata.indexes {
                engine.get_or_create_storage(&index.storage_name(&metadata.name));
            }
            tables.insert(metadata.name.to_ascii_uppercase(), Arc::new(metadata));
        }

        let durability = Arc::new(DurabilityManager::new());
        let durability_ = Arc::clone(&durability);
        engine
            .durability()
            .register_callback(move |lsn| durability_.on_durable(lsn));

        info!(
            serial = config.single_thread,
            workers = config.thread_pool_size,
            "database started"
        );
        Ok(Self {
            inner: Arc::new(DatabaseInner {
                config,
                engine,
                scheduler,
                storage_manager,
                sequences,
                functions: FunctionRegistry::builtin(),
                metadata_store,
                tables,
                durability,
                sessions: DashMap::new(),
                next_session: AtomicU64::new(1),
                started: AtomicBool::new(true),
            }),
        })
    }

    /// Stops the scheduler and the durability watcher. Idempotent.
    pub fn shutdown(&self) {
        if !self.inner.started.swap(false, Ordering::SeqCst) {
            return;
        }
        self.inner.scheduler.stop();
        self.inner.engine.shutdown();
        info!("database stopped");
    }

    /// Opens a session and registers it in the global directory.
    pub fn create_session(&self) -> Session {
        let id = self.inner.next_session.fetch_add(1, Ordering::SeqCst);
        self.inner.sessions.insert(id, ());
        debug!(session = id, "session opened");
        Session::new(Arc::clone(&self.inner), id)
    }

    pub fn session_count(&self) -> usize {
        self.inner.sessions.len()
    }

    pub fn describe_table(&self, name: &str) -> EngineResult<DescribeTableDto> {
        let metadata = self.inner.find_table(name)?;
        Ok(DescribeTableDto::from_metadata(&metadata))
    }

    pub fn config(&self) -> &Configuration {
        &self.inner.config
    }
}

impl DatabaseInner {
    pub(crate) fn deregister_session(&self, id: u64) {
        self.sessions.remove(&id);
        debug!(session = id, "session deregistered");
    }

    pub(crate) fn find_table(&self, name: &str) -> EngineResult<Arc<TableMetadata>> {
        self.tables
            .get(&name.to_ascii_uppercase())
            .map(|e| Arc::clone(e.value()))
            .ok_or_else(|| {
                EngineError::new(
                    ErrorKind::NotFound(name.to_string()),
                    format!("table '{name}' not found"),
                )
            })
    }

    /// DDL admission per transaction mode: read-only transactions cannot
    /// define, and long transactions need the modifies-definitions flag.
    fn check_ddl_gate(
        &self,
        transaction: &cascade_core::transaction::TransactionContext,
    ) -> EngineResult<()> {
        let option = transaction.option();
        if option.readonly {
            return Err(EngineError::new(
                ErrorKind::WriteByRtx(String::new()),
                "DDL attempted under a read-only transaction",
            ));
        }
        if option.is_long && !option.modifies_definitions {
            return Err(EngineError::new(
                ErrorKind::LtxWriteWithoutWritePreserve(String::new()),
                "DDL under a long transaction requires modifies-definitions",
            ));
        }
        Ok(())
    }

    /// Schedules one statement onto the request's scheduler. The caller
    /// waits on the job latch.
    pub(crate) fn submit_statement(
        self: &Arc<Self>,
        request: &Arc<RequestContext>,
        statement: Statement,
        params: ParameterSet,
    ) -> EngineResult<()> {
        match statement {
            Statement::Query(query) => self.submit_query(request, &query, &params),
            other => {
                let db = Arc::clone(self);
                let request_ = Arc::clone(request);
                let mut work = Some((other, params));
                let kind = TaskTransactionKind::InTransaction;
                let task = FlatTask::custom(Arc::clone(request), kind, move || {
                    let (statement, params) = work.take().expect("statement body runs once");
                    db.run_common_statement(&request_, statement, params)?;
                    Ok(TaskResult::CompleteAndTeardown)
                });
                request.scheduler().schedule_task(task);
                Ok(())
            }
        }
    }

    /// Executes a DDL or write statement as a single common step.
    fn run_common_statement(
        &self,
        request: &Arc<RequestContext>,
        statement: Statement,
        params: ParameterSet,
    ) -> EngineResult<()> {
        let transaction = request
            .transaction()
            .expect("common statements run inside a transaction");
        if statement.is_ddl() {
            self.check_ddl_gate(transaction)?;
        }
        match statement {
            Statement::CreateTable(ct) => self.create_table(&ct),
            Statement::CreateIndex(ci) => self.create_index(request, &ci),
            Statement::DropTable { name } => self.drop_table(&name),
            Statement::Insert(insert) => self.run_insert(request, &insert, &params),
            Statement::Query(_) => unreachable!("queries build a dataflow graph"),
        }
    }

    fn create_table(&self, ct: &CreateTable) -> EngineResult<()> {
        let key = ct.name.to_ascii_uppercase();
        if self.tables.contains_key(&key) {
            return Err(EngineError::new(
                ErrorKind::TargetAlreadyExists(ct.name.clone()),
                format!("table '{}' already exists", ct.name),
            ));
        }
        let mut primary_key: Vec<usize> = Vec::new();
        for (i, column) in ct.columns.iter().enumerate() {
            if column.primary_key {
                primary_key.push(i);
            }
        }
        for name in &ct.primary_key {
            let index = ct
                .columns
                .iter()
                .position(|c| c.name.eq_ignore_ascii_case(name))
                .ok_or_else(|| {
                    EngineError::new(
                        ErrorKind::CompileError(name.clone()),
                        format!("primary key column '{name}' not declared"),
                    )
                })?;
            primary_key.push(index);
        }
        let fields = ct
            .columns
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let mut field = Field::new(c.name.clone(), c.field_type);
                if c.not_null || primary_key.contains(&i) {
                    field = field.not_null();
                }
                field
            })
            .collect();
        let metadata = TableMetadata::new(ct.name.clone(), RecordMeta::new(fields), primary_key);

        let storage = self
            .engine
            .create_storage(&table_storage_name(&metadata.name))?;
        self.storage_manager.add_entry(storage.id());
        if metadata.primary_key.is_empty() {
            self.sequences
                .create_sequence(&rowid_sequence_name(&metadata.name))?;
        }
        self.metadata_store.persist(&metadata)?;
        self.tables.insert(key, Arc::new(metadata));
        info!(table = %ct.name, "table created");
        Ok(())
    }

    fn create_index(
        &self,
        request: &Arc<RequestContext>,
        ci: &CreateIndex,
    ) -> EngineResult<()> {
        let table = self.find_table(&ci.table)?;
        if table.index(&ci.name).is_some() {
            return Err(EngineError::new(
                ErrorKind::TargetAlreadyExists(ci.name.clone()),
                format!("index '{}' already exists", ci.name),
            ));
        }
        for column in &ci.columns {
            table.column_index(column)?;
        }
        let storage = self.table_storage(&table)?;
        // index creation needs exclusive access to the table's storage
        let _lock = self
            .storage_manager
            .lock_exclusive(vec![storage.id()])
            .ok_or_else(|| {
                EngineError::new(
                    ErrorKind::SerializationFailure(String::new()),
                    "storage is busy; index creation needs exclusive access",
                )
            })?;
        let transaction = request.transaction().expect("DDL runs in a transaction");
        let row_count =
            transaction.with_storage(|tx| tx.full_scan(&storage).len());
        if row_count > 0 {
            return Err(EngineError::new(
                ErrorKind::UnsupportedRuntimeFeature(format!(
                    "index creation on non-empty table '{}'",
                    ci.table
                )),
                "secondary indexes cannot be backfilled from existing rows",
            ));
        }
        let index = IndexDef {
            name: ci.name.clone(),
            columns: ci.columns.clone(),
        };
        self.engine
            .create_storage(&index.storage_name(&table.name))?;
        let mut updated = (*table).clone();
        updated.indexes.push(index);
        self.metadata_store.persist(&updated)?;
        self.tables
            .insert(table.name.to_ascii_uppercase(), Arc::new(updated));
        info!(index = %ci.name, table = %ci.table, "index created");
        Ok(())
    }

    fn drop_table(&self, name: &str) -> EngineResult<()> {
        let table = self.find_table(name)?;
        let storage = self.table_storage(&table)?;
        let _lock = self
            .storage_manager
            .lock_exclusive(vec![storage.id()])
            .ok_or_else(|| {
                EngineError::new(
                    ErrorKind::SerializationFailure(String::new()),
                    "storage is busy; drop needs exclusive access",
                )
            })?;
        for index in &table.indexes {
            let _ = self.engine.drop_storage(&index.storage_name(&table.name));
        }
        self.engine.drop_storage(&table_storage_name(&table.name))?;
        self.storage_manager.remove_entry(storage.id());
        if table.primary_key.is_empty() {
            self.sequences
                .remove_sequence(&rowid_sequence_name(&table.name));
        }
        self.metadata_store.remove(&table.name);
        self.tables.remove(&table.name.to_ascii_uppercase());
        info!(table = %table.name, "table dropped");
        Ok(())
    }

    fn table_storage(&self, table: &TableMetadata) -> EngineResult<Arc<cascade_storage::Storage>> {
        self.engine
            .get_storage(&table_storage_name(&table.name))
            .ok_or_else(|| {
                EngineError::new(
                    ErrorKind::Internal(table.name.clone()),
                    "table storage missing",
                )
            })
    }

    fn run_insert(
        &self,
        request: &Arc<RequestContext>,
        insert: &Insert,
        params: &ParameterSet,
    ) -> EngineResult<()> {
        let table = self.find_table(&insert.table)?;
        let storage = self.table_storage(&table)?;
        let _lock = self
            .storage_manager
            .lock_shared(vec![storage.id()])
            .ok_or_else(|| {
                EngineError::new(
                    ErrorKind::SerializationFailure(String::new()),
                    "storage locked for definition change",
                )
            })?;
        let transaction = request.transaction().expect("insert runs in a transaction");

        // map the written columns onto the declared order
        let column_indices: Vec<usize> = if insert.columns.is_empty() {
            (0..table.columns.field_count()).collect()
        } else {
            insert
                .columns
                .iter()
                .map(|name| table.column_index(name))
                .collect::<EngineResult<_>>()?
        };

        let index_storages: Vec<(IndexDef, Arc<cascade_storage::Storage>)> = table
            .indexes
            .iter()
            .map(|index| {
                self.engine
                    .get_storage(&index.storage_name(&table.name))
                    .map(|s| (index.clone(), s))
                    .ok_or_else(|| {
                        EngineError::new(
                            ErrorKind::Internal(index.name.clone()),
                            "index storage missing",
                        )
                    })
            })
            .collect::<EngineResult<_>>()?;

        for row_exprs in &insert.rows {
            if row_exprs.len() != column_indices.len() {
                return Err(EngineError::new(
                    ErrorKind::CompileError(String::new()),
                    "insert value count does not match the column list",
                ));
            }
            let mut values = vec![Value::Null; table.columns.field_count()];
            for (expr, &target) in row_exprs.iter().zip(column_indices.iter()) {
                let raw = resolve_scalar(expr, params)?;
                values[target] =
                    coerce_value(&raw, &table.columns.field(target).field_type)?;
            }
            for (i, field) in table.columns.fields().iter().enumerate() {
                if !field.nullable && values[i].is_null() {
                    return Err(EngineError::new(
                        ErrorKind::ConstraintViolation(field.name.clone()),
                        format!("column '{}' must not be null", field.name),
                    ));
                }
            }

            let key = if table.primary_key.is_empty() {
                let rowid = self
                    .sequences
                    .next_value(&rowid_sequence_name(&table.name))?;
                rowid.to_be_bytes().to_vec()
            } else {
                encode_row_key(&values, &table.primary_key)?
            };
            let record = cascade_lib::record::Record::new(values);
            let encoded = encode_row(&record)?;

            let result = transaction.with_storage(|tx| {
                if insert.upsert {
                    // replacing a row must also retire its index entries
                    if !index_storages.is_empty() {
                        if let Some(old_bytes) = tx.get(&storage, &key) {
                            let old_row = crate::executor::decode_row(&old_bytes);
                            for (index, index_storage) in &index_storages {
                                let old_key =
                                    index_entry_key(&table, index, old_row.values(), &key)?;
                                tx.remove(index_storage, old_key)?;
                            }
                        }
                    }
                    tx.put(&storage, key.clone(), encoded.clone(), PutMode::Overwrite)
                } else {
                    tx.put(&storage, key.clone(), encoded.clone(), PutMode::Create)
                }
            });
            result.map_err(|e| match e.kind() {
                ErrorKind::TargetAlreadyExists(_) => EngineError::new(
                    ErrorKind::UniqueConstraintViolation(table.name.clone()),
                    format!("duplicate primary key in table '{}'", table.name),
                ),
                _ => e,
            })?;

            for (index, index_storage) in &index_storages {
                let index_key = index_entry_key(&table, index, record.values(), &key)?;
                transaction.with_storage(|tx| {
                    tx.put(index_storage, index_key.clone(), Vec::new(), PutMode::Overwrite)
                })?;
            }
            if let Some(stats) = request.statistics() {
                if insert.upsert {
                    stats.count(CounterKind::Merged, 1);
                } else {
                    stats.count(CounterKind::Inserted, 1);
                }
            }
        }
        Ok(())
    }

    /// Builds the dataflow graph for a query and kicks the controller.
    fn submit_query(
        self: &Arc<Self>,
        request: &Arc<RequestContext>,
        query: &Query,
        params: &ParameterSet,
    ) -> EngineResult<()> {
        let table = self.find_table(&query.table)?;
        let storage = self.table_storage(&table)?;
        let lock = self
            .storage_manager
            .lock_shared(vec![storage.id()])
            .ok_or_else(|| {
                EngineError::new(
                    ErrorKind::SerializationFailure(String::new()),
                    "storage locked for definition change",
                )
            })?;

        let filter = query
            .filter
            .iter()
            .map(|c| CompiledCondition::compile(c, &table, params))
            .collect::<EngineResult<Vec<_>>>()?;

        let mut graph = Graph::new();
        if query.has_aggregates() {
            self.build_aggregate_query(&mut graph, query, &table, storage, filter)?;
        } else if !query.order_by.is_empty() {
            self.build_ordered_query(&mut graph, query, &table, storage, filter)?;
        } else {
            self.build_plain_query(&mut graph, query, &table, storage, filter)?;
        }

        let controller = DagController::new(Arc::clone(request), Arc::new(graph));
        // hold the shared storage lock for the lifetime of the job
        let lock_holder = std::sync::Mutex::new(Some(lock));
        request.job().set_callback({
            move || {
                lock_holder.lock().unwrap().take();
            }
        });
        let _ = controller;
        request
            .scheduler()
            .schedule_task(FlatTask::dag_start(Arc::clone(request)));
        Ok(())
    }

    fn compile_projections(
        &self,
        query: &Query,
        table: &TableMetadata,
    ) -> EngineResult<(Vec<ProjectionItem>, Vec<Field>)> {
        let mut items = Vec::new();
        let mut fields = Vec::new();
        for projection in &query.projections {
            match projection {
                Projection::Star => {
                    for (i, field) in table.columns.fields().iter().enumerate() {
                        items.push(ProjectionItem::Column(i));
                        fields.push(field.clone());
                    }
                }
                Projection::Column(name) => {
                    let index = table.column_index(name)?;
                    items.push(ProjectionItem::Column(index));
                    fields.push(table.columns.field(index).clone());
                }
                Projection::Scalar { function, column } => {
                    let kind = self.functions.scalar().find(function).ok_or_else(|| {
                        EngineError::new(
                            ErrorKind::CompileError(function.clone()),
                            format!("unknown function '{function}'"),
                        )
                    })?;
                    let index = table.column_index(column)?;
                    items.push(ProjectionItem::Scalar {
                        function: kind,
                        column: index,
                    });
                    fields.push(Field::new(
                        format!("{function}({column})"),
                        table.columns.field(index).field_type,
                    ));
                }
                Projection::Aggregate { .. } => {
                    return Err(EngineError::new(
                        ErrorKind::CompileError(String::new()),
                        "aggregates cannot mix with a plain projection here",
                    ))
                }
            }
        }
        Ok((items, fields))
    }

    fn build_plain_query(
        &self,
        graph: &mut Graph,
        query: &Query,
        table: &TableMetadata,
        storage: Arc<cascade_storage::Storage>,
        filter: Vec<CompiledCondition>,
    ) -> EngineResult<()> {
        let (items, fields) = self.compile_projections(query, table)?;
        let meta = RecordMeta::new(fields);
        // single scan partition: the storage scan order is the key order
        // and a lone forward lane preserves it
        let scan = graph.insert(StepSpec::Process(ProcessSpec::new(
            1,
            Arc::new(ScanLogic::new(storage, filter, items, 1)),
        )));
        let forward = graph.insert(StepSpec::Exchange(ExchangeSpec::new(
            ExchangeKind::Forward,
            meta.clone(),
        )));
        let emit = graph.insert(StepSpec::Process(ProcessSpec::new(
            1,
            Arc::new(EmitLogic::new(meta)),
        )));
        graph.connect(scan, forward);
        graph.connect(forward, emit);
        Ok(())
    }

    fn build_ordered_query(
        &self,
        graph: &mut Graph,
        query: &Query,
        table: &TableMetadata,
        storage: Arc<cascade_storage::Storage>,
        filter: Vec<CompiledCondition>,
    ) -> EngineResult<()> {
        let (items, fields) = self.compile_projections(query, table)?;
        let meta = RecordMeta::new(fields);
        let mut key_indices = Vec::new();
        for order in &query.order_by {
            if order.descending {
                return Err(EngineError::new(
                    ErrorKind::UnsupportedRuntimeFeature("descending order".into()),
                    "ORDER BY ... DESC is not supported",
                ));
            }
            // a star projection lays the declared columns out in order,
            // so the order key is the column's declared index
            let position = if matches!(query.projections.as_slice(), [Projection::Star]) {
                table.column_index(&order.column)?
            } else {
                query
                    .projections
                    .iter()
                    .position(|p| {
                        matches!(p, Projection::Column(c) if c.eq_ignore_ascii_case(&order.column))
                    })
                    .ok_or_else(|| {
                        EngineError::new(
                            ErrorKind::CompileError(order.column.clone()),
                            "ORDER BY column must appear in the projection",
                        )
                    })?
            };
            key_indices.push(position);
        }
        let partitions = self.config.default_scan_partitions.max(1);
        let scan = graph.insert(StepSpec::Process(ProcessSpec::new(
            partitions,
            Arc::new(ScanLogic::new(storage, filter, items, partitions)),
        )));
        let group = graph.insert(StepSpec::Exchange(ExchangeSpec::new(
            ExchangeKind::Group(GroupSpec { key_indices }),
            meta.clone(),
        )));
        let emit = graph.insert(StepSpec::Process(ProcessSpec::new(
            1,
            Arc::new(EmitLogic::new(meta)),
        )));
        graph.connect(scan, group);
        graph.connect(group, emit);
        Ok(())
    }

    fn build_aggregate_query(
        &self,
        graph: &mut Graph,
        query: &Query,
        table: &TableMetadata,
        storage: Arc<cascade_storage::Storage>,
        filter: Vec<CompiledCondition>,
    ) -> EngineResult<()> {
        // the scan emits full rows; keys and arguments address the
        // declared column indices
        let mut key_indices = Vec::new();
        for name in &query.group_by {
            key_indices.push(table.column_index(name)?);
        }
        let mut columns = Vec::new();
        let mut fields = Vec::new();
        let mut seen_keys = 0usize;
        for projection in &query.projections {
            match projection {
                Projection::Column(name) => {
                    let index = table.column_index(name)?;
                    if key_indices.get(seen_keys) != Some(&index) {
                        return Err(EngineError::new(
                            ErrorKind::CompileError(name.clone()),
                            "non-aggregated columns must mirror GROUP BY order",
                        ));
                    }
                    seen_keys += 1;
                    fields.push(table.columns.field(index).clone());
                }
                Projection::Aggregate { function, argument } => {
                    let kind = match (function.as_str(), argument) {
                        ("count", None) => AggregateFunctionKind::CountRows,
                        _ => self.functions.aggregate().find(function).ok_or_else(|| {
                            EngineError::new(
                                ErrorKind::CompileError(function.clone()),
                                format!("unknown aggregate '{function}'"),
                            )
                        })?,
                    };
                    let argument_index = argument
                        .as_ref()
                        .map(|name| table.column_index(name))
                        .transpose()?;
                    columns.push(AggregateColumn {
                        function: kind,
                        argument: argument_index,
                    });
                    let output_type = match kind {
                        AggregateFunctionKind::Count | AggregateFunctionKind::CountRows => {
                            FieldTypeKind::Int8.into()
                        }
                        AggregateFunctionKind::Avg => FieldTypeKind::Float8.into(),
                        _ => argument_index
                            .map(|i| table.columns.field(i).field_type)
                            .unwrap_or_else(|| FieldTypeKind::Int8.into()),
                    };
                    fields.push(Field::new(
                        format!("{function}"),
                        output_type,
                    ));
                }
                Projection::Star | Projection::Scalar { .. } => {
                    return Err(EngineError::new(
                        ErrorKind::CompileError(String::new()),
                        "unsupported projection in an aggregate query",
                    ))
                }
            }
        }
        if seen_keys != key_indices.len() {
            return Err(EngineError::new(
                ErrorKind::CompileError(String::new()),
                "every GROUP BY column must appear in the projection",
            ));
        }

        let scan_items: Vec<ProjectionItem> = (0..table.columns.field_count())
            .map(ProjectionItem::Column)
            .collect();
        let partitions = self.config.default_scan_partitions.max(1);
        let scan = graph.insert(StepSpec::Process(ProcessSpec::new(
            partitions,
            Arc::new(ScanLogic::new(storage, filter, scan_items, partitions)),
        )));
        let meta = RecordMeta::new(fields);
        let aggregate = graph.insert(StepSpec::Exchange(ExchangeSpec::new(
            ExchangeKind::Aggregate(AggregateSpec {
                key_indices,
                columns,
            }),
            table.columns.clone(),
        )));
        let emit = graph.insert(StepSpec::Process(ProcessSpec::new(
            1,
            Arc::new(EmitLogic::new(meta)),
        )));
        graph.connect(scan, aggregate);
        graph.connect(aggregate, emit);
        Ok(())
    }
}

fn index_entry_key(
    table: &TableMetadata,
    index: &IndexDef,
    row: &[Value],
    primary_key: &[u8],
) -> EngineResult<Vec<u8>> {
    let mut indices = Vec::with_capacity(index.columns.len());
    for column in &index.columns {
        indices.push(table.column_index(column)?);
    }
    let mut key = encode_row_key(row, &indices)?;
    key.extend_from_slice(primary_key);
    Ok(key)
}
