use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use cascade_lib::error::EngineResult;
use tracing::{debug, trace};

use crate::dag::step_state::{StepStateKind, TaskKind, TaskStateKind};
use crate::dag::step_state_table::StepStateTable;
use crate::event::Event;
use crate::event_channel::EventChannel;
use crate::executor::exchange::flow::ExchangeFlow;
use crate::executor::flow::{Flow, FlowRepository};
use crate::executor::process::context::{InputHandle, OutputHandle, ProcessContext};
use crate::executor::process::flow::ProcessFlow;
use crate::model::graph::Graph;
use crate::model::port::PortKind;
use crate::model::step::{StepId, StepSpec};
use crate::model::task::{StepTask, TaskResult, TaskTransactionKind};
use crate::request::RequestContext;
use crate::sched::flat_task::FlatTask;
use crate::sched::teardown::check_or_submit_teardown;

struct Inner {
    tables: Vec<StepStateTable>,
    flows: FlowRepository,
    /// Base sink index of each upstream process within an exchange:
    /// (exchange, upstream process) → offset.
    sink_offsets: HashMap<(StepId, StepId), usize>,
    done: bool,
}

/// Drives one graph: reacts to events from the channel, advances step
/// states, schedules follow-on tasks and submits the teardown when the
/// graph completes.
///
/// Internal events (activate, prepare, consume, deactivate,
/// propagate-downstream-completing) execute synchronously on the thread
/// that processes the triggering event.
pub struct DagController {
    request: Arc<RequestContext>,
    graph: Arc<Graph>,
    channel: EventChannel,
    inner: Mutex<Inner>,
}

impl DagController {
    pub fn new(request: Arc<RequestContext>, graph: Arc<Graph>) -> Arc<Self> {
        let size = graph.size();
        let controller = Arc::new(Self {
            request: Arc::clone(&request),
            graph,
            channel: EventChannel::new(),
            inner: Mutex::new(Inner {
                tables: (0..size).map(|_| StepStateTable::default()).collect(),
                flows: FlowRepository::new(size),
                sink_offsets: HashMap::new(),
                done: false,
            }),
        });
        request.set_controller(Arc::clone(&controller));
        controller
    }

    pub fn channel(&self) -> &EventChannel {
        &self.channel
    }

    pub fn graph(&self) -> &Arc<Graph> {
        &self.graph
    }

    pub fn step_state(&self, step: StepId) -> StepStateKind {
        self.inner.lock().unwrap().tables[step].state
    }

    /// Activates every step, runs the prepare phase and schedules the
    /// initial tasks of the source steps.
    pub fn start(&self) -> EngineResult<()> {
        let mut pending = Vec::new();
        let mut teardown = false;
        {
            let mut inner = self.inner.lock().unwrap();
            if self.graph.is_empty() {
                inner.done = true;
                teardown = true;
            } else {
                self.activate_all(&mut inner);
                self.prepare_all(&mut inner, &mut pending);
                // source steps have no main inputs and start consuming
                // right away
                for id in 0..self.graph.size() {
                    let step = self.graph.step(id);
                    if matches!(step.spec(), StepSpec::Process(_))
                        && step.main_inputs().is_empty()
                        && inner.tables[id].state == StepStateKind::Prepared
                    {
                        self.consume(&mut inner, id, &mut pending);
                    }
                }
            }
        }
        self.dispatch(pending, teardown);
        Ok(())
    }

    /// Drains and handles every queued event.
    pub fn process_events(&self) {
        while let Some(event) = self.channel.try_pop() {
            let mut pending = Vec::new();
            let mut teardown = false;
            {
                let mut inner = self.inner.lock().unwrap();
                self.handle_event(&mut inner, event, &mut pending, &mut teardown);
            }
            self.dispatch(pending, teardown);
        }
    }

    /// Requests early completion of the whole graph.
    pub fn request_completion_instructed(&self) {
        self.channel.push(Event::CompletionInstructed);
        self.process_events();
    }

    /// Error path: force-complete the graph so the job can tear down.
    pub fn on_error(&self) {
        self.request_completion_instructed();
    }

    /// Releases flows after the job completed.
    pub fn deactivate(&self) {
        let mut inner = self.inner.lock().unwrap();
        for table in &mut inner.tables {
            if table.state == StepStateKind::Completed {
                table.state = StepStateKind::Deactivated;
            }
        }
        inner.flows.clear();
        self.channel.close();
    }

    fn dispatch(&self, pending: Vec<FlatTask>, teardown: bool) {
        for task in pending {
            self.request.scheduler().schedule_task(task);
        }
        if teardown {
            check_or_submit_teardown(&self.request);
        }
    }

    // ---- internal events -------------------------------------------------

    fn activate_all(&self, inner: &mut Inner) {
        for id in 0..self.graph.size() {
            let step = self.graph.step(id);
            match step.spec() {
                StepSpec::Process(spec) => {
                    let flow = Arc::new(ProcessFlow::new(spec.partitions(), spec.logic().clone()));
                    inner.flows.set(id, Flow::Process(flow));
                    inner.tables[id].assign_slot(TaskKind::Main, spec.partitions());
                    if step.has_sub_inputs() {
                        inner.tables[id].assign_slot(TaskKind::Pre, step.sub_inputs().len());
                    }
                }
                StepSpec::Exchange(spec) => {
                    let mut input_partitions = 0usize;
                    for upstream in self.graph.upstreams(id) {
                        inner.sink_offsets.insert((id, upstream), input_partitions);
                        input_partitions += self.process_partitions(upstream);
                    }
                    let output_partitions = self
                        .main_downstream_process(id)
                        .map(|d| self.process_partitions(d))
                        .unwrap_or(1);
                    let flow = Arc::new(ExchangeFlow::new(
                        spec.clone(),
                        input_partitions,
                        output_partitions,
                    ));
                    inner.flows.set(id, Flow::Exchange(flow));
                }
            }
            inner.tables[id].state = StepStateKind::Activated;
            trace!(step = id, kind = %step.kind(), "step activated");
        }
    }

    fn prepare_all(&self, inner: &mut Inner, pending: &mut Vec<FlatTask>) {
        for id in 0..self.graph.size() {
            let step = self.graph.step(id);
            if matches!(step.spec(), StepSpec::Process(_)) && step.has_sub_inputs() {
                inner.tables[id].state = StepStateKind::Preparing;
                self.create_pretasks(inner, id, pending);
            } else {
                inner.tables[id].state = StepStateKind::Prepared;
            }
        }
    }

    fn create_pretasks(&self, inner: &mut Inner, id: StepId, pending: &mut Vec<FlatTask>) {
        let process = inner.flows.flow(id).as_process().expect("process flow");
        let sub_upstreams = self.graph.sub_upstreams(id);
        for (index, upstream) in sub_upstreams.into_iter().enumerate() {
            let exchange = inner
                .flows
                .flow(upstream)
                .as_exchange()
                .expect("sub input comes from an exchange");
            let process = Arc::clone(&process);
            let task = StepTask::new(id, self.transaction_kind(), move || {
                if !exchange.transferred() {
                    // the side data is not available yet; back off briefly
                    // instead of spinning through the queue
                    std::thread::sleep(std::time::Duration::from_millis(1));
                    return Ok(TaskResult::Yield);
                }
                let mut reader = exchange.reader(0);
                let mut records = Vec::new();
                while let Some(record) = reader.next_record() {
                    records.push(record);
                }
                process.store_side_data(index, records);
                Ok(TaskResult::Complete)
            });
            inner.tables[id].register_task(TaskKind::Pre, index, task.id());
            pending.push(FlatTask::wrapped(Arc::clone(&self.request), task));
        }
    }

    /// Creates and schedules the main tasks of a process step.
    fn consume(&self, inner: &mut Inner, id: StepId, pending: &mut Vec<FlatTask>) {
        let process = inner.flows.flow(id).as_process().expect("process flow");
        let step = self.graph.step(id);
        let partitions = process.partitions();

        let input_flows: Vec<Arc<ExchangeFlow>> = step
            .main_inputs()
            .iter()
            .flat_map(|port| port.opposites())
            .map(|opp| {
                inner
                    .flows
                    .flow(opp.step)
                    .as_exchange()
                    .expect("main input comes from an exchange")
            })
            .collect();
        let output_targets: Vec<(Arc<ExchangeFlow>, usize)> = step
            .outputs()
            .iter()
            .flat_map(|port| port.opposites())
            .filter(|opp| {
                // emit-style steps write to the record channel, not to an
                // exchange; sub consumers pull through pre-tasks
                self.port_kind_of(opp.step, id) == PortKind::Main
            })
            .map(|opp| {
                let offset = *inner
                    .sink_offsets
                    .get(&(opp.step, id))
                    .expect("offset registered at activation");
                let exchange = inner
                    .flows
                    .flow(opp.step)
                    .as_exchange()
                    .expect("outputs connect to exchanges");
                (exchange, offset)
            })
            .collect();

        for partition in 0..partitions {
            let request = Arc::clone(&self.request);
            let process = Arc::clone(&process);
            let inputs: Vec<InputHandle> = input_flows
                .iter()
                .map(|flow| InputHandle::new(Arc::clone(flow), partition))
                .collect();
            let outputs: Vec<OutputHandle> = output_targets
                .iter()
                .map(|(flow, offset)| OutputHandle::new(Arc::clone(flow), offset + partition))
                .collect();
            let mut slots = Some((inputs, outputs));
            let task = StepTask::new(id, self.transaction_kind(), move || {
                let (inputs, outputs) = slots.take().expect("task body runs once");
                let logic = process.logic();
                let mut ctx = ProcessContext::new(&request, &process, partition, inputs, outputs);
                logic.run(&mut ctx)?;
                Ok(TaskResult::Complete)
            });
            inner.tables[id].register_task(TaskKind::Main, partition, task.id());
            pending.push(FlatTask::wrapped(Arc::clone(&self.request), task));
        }
        inner.tables[id].state = StepStateKind::Running;
        trace!(step = id, partitions, "step running");
    }

    /// All main tasks of `id` finished: transition through completing,
    /// propagate to downstream exchanges and check graph completion.
    fn complete_step(
        &self,
        inner: &mut Inner,
        id: StepId,
        pending: &mut Vec<FlatTask>,
        teardown: &mut bool,
    ) {
        inner.tables[id].state = StepStateKind::Completing;
        self.propagate_downstream_completing(inner, id, pending);
        inner.tables[id].state = StepStateKind::Completed;
        trace!(step = id, "step completed");
        self.check_graph_completed(inner, teardown);
    }

    /// Transfers every downstream exchange whose upstreams all completed
    /// and wakes their consumers with providing events.
    fn propagate_downstream_completing(
        &self,
        inner: &mut Inner,
        id: StepId,
        _pending: &mut Vec<FlatTask>,
    ) {
        for exchange_id in self.graph.downstreams(id) {
            let Some(exchange) = inner.flows.flow(exchange_id).as_exchange() else {
                continue;
            };
            let upstreams_done = self
                .graph
                .upstreams(exchange_id)
                .into_iter()
                .all(|u| u == id || inner.tables[u].state == StepStateKind::Completed);
            if !upstreams_done {
                continue;
            }
            exchange.transfer();
            inner.tables[exchange_id].state = StepStateKind::Completed;
            trace!(step = exchange_id, "exchange transferred");
            for consumer in self.graph.downstreams(exchange_id) {
                if self.port_kind_of(consumer, exchange_id) == PortKind::Main {
                    self.channel.push(Event::Providing {
                        target: consumer,
                        source_port_kind: PortKind::Main,
                        source_port_index: 0,
                    });
                }
            }
        }
    }

    fn handle_event(
        &self,
        inner: &mut Inner,
        event: Event,
        pending: &mut Vec<FlatTask>,
        teardown: &mut bool,
    ) {
        if inner.done {
            return;
        }
        match event {
            Event::TaskCompleted { target, task } => {
                let Some(kind) =
                    inner.tables[target].record_task_state(task, TaskStateKind::Completed)
                else {
                    return;
                };
                match kind {
                    TaskKind::Main => {
                        if inner.tables[target].completed(TaskKind::Main)
                            && inner.tables[target].state == StepStateKind::Running
                        {
                            self.complete_step(inner, target, pending, teardown);
                        }
                    }
                    TaskKind::Pre => {
                        if inner.tables[target].completed(TaskKind::Pre)
                            && inner.tables[target].state == StepStateKind::Preparing
                        {
                            inner.tables[target].state = StepStateKind::Prepared;
                            if self.main_inputs_ready(inner, target) {
                                self.consume(inner, target, pending);
                            }
                        }
                    }
                }
            }
            Event::Providing { target, .. } => {
                if inner.tables[target].state == StepStateKind::Prepared
                    && self.main_inputs_ready(inner, target)
                {
                    self.consume(inner, target, pending);
                }
            }
            Event::CompletionInstructed => {
                debug!(request = self.request.id(), "completion instructed");
                inner.done = true;
                for table in &mut inner.tables {
                    if !matches!(
                        table.state,
                        StepStateKind::Completed | StepStateKind::Deactivated
                    ) {
                        table.state = StepStateKind::Completed;
                    }
                }
                *teardown = true;
            }
        }
    }

    fn check_graph_completed(&self, inner: &mut Inner, teardown: &mut bool) {
        if inner
            .tables
            .iter()
            .all(|t| t.state == StepStateKind::Completed)
        {
            debug!(request = self.request.id(), "graph completed");
            inner.done = true;
            *teardown = true;
        }
    }

    /// Every main input exchange has transferred.
    fn main_inputs_ready(&self, inner: &Inner, id: StepId) -> bool {
        self.graph
            .upstreams(id)
            .into_iter()
            .all(|u| inner.tables[u].state == StepStateKind::Completed)
    }

    fn transaction_kind(&self) -> TaskTransactionKind {
        if self.request.transaction().is_some() {
            TaskTransactionKind::InTransaction
        } else {
            TaskTransactionKind::None
        }
    }

    fn process_partitions(&self, id: StepId) -> usize {
        match self.graph.step(id).spec() {
            StepSpec::Process(spec) => spec.partitions(),
            StepSpec::Exchange(_) => 1,
        }
    }

    /// First main-edge downstream process of an exchange, if any.
    fn main_downstream_process(&self, exchange: StepId) -> Option<StepId> {
        self.graph
            .downstreams(exchange)
            .into_iter()
            .find(|d| self.port_kind_of(*d, exchange) == PortKind::Main)
    }

    /// Kind of the input port on `downstream` fed by `upstream`.
    fn port_kind_of(&self, downstream: StepId, upstream: StepId) -> PortKind {
        let step = self.graph.step(downstream);
        for port in step.sub_inputs() {
            if port.opposites().iter().any(|o| o.step == upstream) {
                return PortKind::Sub;
            }
        }
        PortKind::Main
    }
}
