//! End-to-end graph executions through the DAG controller: producer
//! processes feeding exchanges feeding an emit process, on both scheduler
//! policies.

use std::sync::Arc;

use cascade_core::executor::exchange::{
    AggregateColumn, AggregateSpec, ExchangeKind, ExchangeSpec, GroupSpec,
};
use cascade_core::executor::function::AggregateFunctionKind;
use cascade_core::executor::process::{EmitLogic, ProcessContext, ProcessLogic, ProcessSpec};
use cascade_core::dag::DagController;
use cascade_core::io::{RecordChannel, ResultStoreChannel};
use cascade_core::model::{Graph, StepSpec};
use cascade_core::request::RequestContext;
use cascade_core::sched::{
    FlatTask, JobContext, SerialTaskScheduler, StealingTaskScheduler, TaskScheduler,
};
use cascade_lib::config::Configuration;
use cascade_lib::error::EngineResult;
use cascade_lib::field_type::FieldTypeKind;
use cascade_lib::record::{Field, Record, RecordMeta};
use cascade_lib::value::Value;

fn meta2() -> RecordMeta {
    RecordMeta::new(vec![
        Field::new("k", FieldTypeKind::Int4),
        Field::new("v", FieldTypeKind::Int4),
    ])
}

/// Emits a fixed per-partition batch into every output.
struct Producer {
    rows_per_partition: Vec<Vec<(i32, i32)>>,
}

impl ProcessLogic for Producer {
    fn run(&self, ctx: &mut ProcessContext<'_>) -> EngineResult<()> {
        for (k, v) in &self.rows_per_partition[ctx.partition()] {
            let record = Record::new(vec![Value::Int4(*k), Value::Int4(*v)]);
            for output in 0..ctx.output_count() {
                ctx.output(output).write(record.clone())?;
            }
        }
        Ok(())
    }
}

/// Counts the records loaded from its sub-input and emits the count.
struct SideDataCounter;

impl ProcessLogic for SideDataCounter {
    fn run(&self, ctx: &mut ProcessContext<'_>) -> EngineResult<()> {
        let count = ctx.sub_input(0).len() as i32;
        let record = Record::new(vec![Value::Int4(count), Value::Int4(0)]);
        for output in 0..ctx.output_count() {
            ctx.output(output).write(record.clone())?;
        }
        Ok(())
    }
}

struct Harness {
    scheduler: Arc<dyn TaskScheduler>,
    request: Arc<RequestContext>,
    channel: Arc<ResultStoreChannel>,
}

fn harness(scheduler: Arc<dyn TaskScheduler>) -> Harness {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
    scheduler.start();
    let channel = Arc::new(ResultStoreChannel::new());
    let request = Arc::new(
        RequestContext::new(
            Arc::new(Configuration::default()),
            Arc::clone(&scheduler),
            Arc::new(JobContext::new()),
        )
        .with_channel(channel.clone() as Arc<dyn RecordChannel>),
    );
    Harness {
        scheduler,
        request,
        channel,
    }
}

fn run(h: &Harness, graph: Graph) -> Vec<(i64, i64)> {
    let _controller = DagController::new(Arc::clone(&h.request), Arc::new(graph));
    h.scheduler
        .schedule_task(FlatTask::dag_start(Arc::clone(&h.request)));
    h.scheduler.wait_for_progress(h.request.job());
    h.channel
        .rows()
        .into_iter()
        .map(|r| {
            (
                r.value(0).as_int().unwrap(),
                r.value(1).as_int().unwrap_or(0),
            )
        })
        .collect()
}

fn forward_graph() -> Graph {
    let mut graph = Graph::new();
    let producer = graph.insert(StepSpec::Process(ProcessSpec::new(
        2,
        Arc::new(Producer {
            rows_per_partition: vec![vec![(1, 10), (2, 20)], vec![(3, 30)]],
        }),
    )));
    let forward = graph.insert(StepSpec::Exchange(ExchangeSpec::new(
        ExchangeKind::Forward,
        meta2(),
    )));
    let emit = graph.insert(StepSpec::Process(ProcessSpec::new(
        1,
        Arc::new(EmitLogic::new(meta2())),
    )));
    graph.connect(producer, forward);
    graph.connect(forward, emit);
    graph
}

#[test]
fn test_forward_pipeline_serial() {
    let h = harness(Arc::new(SerialTaskScheduler::new()));
    let mut rows = run(&h, forward_graph());
    rows.sort();
    assert_eq!(rows, vec![(1, 10), (2, 20), (3, 30)]);
    assert!(h.request.status().is_ok());
}

#[test]
fn test_forward_pipeline_stealing() {
    let h = harness(Arc::new(StealingTaskScheduler::new(
        &Configuration::multi_thread(3),
    )));
    let mut rows = run(&h, forward_graph());
    rows.sort();
    assert_eq!(rows, vec![(1, 10), (2, 20), (3, 30)]);
    h.scheduler.stop();
}

#[test]
fn test_group_exchange_orders_by_key() {
    let h = harness(Arc::new(SerialTaskScheduler::new()));
    let mut graph = Graph::new();
    let producer = graph.insert(StepSpec::Process(ProcessSpec::new(
        2,
        Arc::new(Producer {
            rows_per_partition: vec![vec![(3, 30), (1, 10)], vec![(2, 20), (1, 11)]],
        }),
    )));
    let group = graph.insert(StepSpec::Exchange(ExchangeSpec::new(
        ExchangeKind::Group(GroupSpec {
            key_indices: vec![0],
        }),
        meta2(),
    )));
    let emit = graph.insert(StepSpec::Process(ProcessSpec::new(
        1,
        Arc::new(EmitLogic::new(meta2())),
    )));
    graph.connect(producer, group);
    graph.connect(group, emit);
    let rows = run(&h, graph);
    assert_eq!(rows, vec![(1, 10), (1, 11), (2, 20), (3, 30)]);
}

#[test]
fn test_aggregate_exchange_sums_groups() {
    let h = harness(Arc::new(SerialTaskScheduler::new()));
    let mut graph = Graph::new();
    let producer = graph.insert(StepSpec::Process(ProcessSpec::new(
        2,
        Arc::new(Producer {
            rows_per_partition: vec![vec![(1, 10), (2, 20)], vec![(1, 5), (2, 1)]],
        }),
    )));
    let aggregate = graph.insert(StepSpec::Exchange(ExchangeSpec::new(
        ExchangeKind::Aggregate(AggregateSpec {
            key_indices: vec![0],
            columns: vec![AggregateColumn {
                function: AggregateFunctionKind::Sum,
                argument: Some(1),
            }],
        }),
        meta2(),
    )));
    let emit = graph.insert(StepSpec::Process(ProcessSpec::new(
        1,
        Arc::new(EmitLogic::new(meta2())),
    )));
    graph.connect(producer, aggregate);
    graph.connect(aggregate, emit);
    let rows = run(&h, graph);
    assert_eq!(rows, vec![(1, 15), (2, 21)]);
}

#[test]
fn test_broadcast_feeds_sub_input_through_pretask() {
    let h = harness(Arc::new(SerialTaskScheduler::new()));
    let mut graph = Graph::new();
    let producer = graph.insert(StepSpec::Process(ProcessSpec::new(
        1,
        Arc::new(Producer {
            rows_per_partition: vec![vec![(1, 1), (2, 2), (3, 3)]],
        }),
    )));
    let broadcast = graph.insert(StepSpec::Exchange(ExchangeSpec::new(
        ExchangeKind::Broadcast,
        meta2(),
    )));
    let counter = graph.insert(StepSpec::Process(ProcessSpec::new(
        1,
        Arc::new(SideDataCounter),
    )));
    let forward = graph.insert(StepSpec::Exchange(ExchangeSpec::new(
        ExchangeKind::Forward,
        meta2(),
    )));
    let emit = graph.insert(StepSpec::Process(ProcessSpec::new(
        1,
        Arc::new(EmitLogic::new(meta2())),
    )));
    graph.connect(producer, broadcast);
    graph.connect_sub(broadcast, counter);
    graph.connect(counter, forward);
    graph.connect(forward, emit);
    let rows = run(&h, graph);
    assert_eq!(rows, vec![(3, 0)]);
}

#[test]
fn test_job_callback_runs_once_on_completion() {
    let h = harness(Arc::new(SerialTaskScheduler::new()));
    let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let calls_ = Arc::clone(&calls);
    h.request.job().set_callback(move || {
        calls_.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    });
    run(&h, forward_graph());
    assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert_eq!(h.request.job().task_count(), 0);
}

#[test]
fn test_empty_graph_completes_immediately() {
    let h = harness(Arc::new(SerialTaskScheduler::new()));
    let rows = run(&h, Graph::new());
    assert!(rows.is_empty());
    assert!(h.request.job().completion_latch().released());
}

#[test]
fn test_cancellation_surfaces_request_canceled() {
    let h = harness(Arc::new(SerialTaskScheduler::new()));
    h.request.cancel();
    run(&h, forward_graph());
    assert_eq!(
        h.request.status(),
        cascade_lib::error::Status::RequestCanceled
    );
}
