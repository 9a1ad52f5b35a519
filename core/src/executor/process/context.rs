use std::sync::Arc;

use cascade_lib::error::EngineResult;
use cascade_lib::record::Record;

use crate::executor::exchange::flow::ExchangeFlow;
use crate::executor::exchange::reader::ExchangeReader;
use crate::executor::process::flow::ProcessFlow;
use crate::request::RequestContext;

/// Read handle bound to one output partition of an upstream exchange.
pub struct InputHandle {
    flow: Arc<ExchangeFlow>,
    partition: usize,
}

impl InputHandle {
    pub fn new(flow: Arc<ExchangeFlow>, partition: usize) -> Self {
        Self { flow, partition }
    }

    pub fn reader(&self) -> ExchangeReader {
        self.flow.reader(self.partition)
    }
}

/// Write handle bound to one sink of a downstream exchange.
pub struct OutputHandle {
    flow: Arc<ExchangeFlow>,
    sink: usize,
}

impl OutputHandle {
    pub fn new(flow: Arc<ExchangeFlow>, sink: usize) -> Self {
        Self { flow, sink }
    }

    pub fn write(&self, record: Record) -> EngineResult<()> {
        self.flow.write(self.sink, record)
    }
}

/// Execution context of one process task.
pub struct ProcessContext<'a> {
    request: &'a Arc<RequestContext>,
    process: &'a ProcessFlow,
    partition: usize,
    inputs: Vec<InputHandle>,
    outputs: Vec<OutputHandle>,
}

impl<'a> ProcessContext<'a> {
    pub fn new(
        request: &'a Arc<RequestContext>,
        process: &'a ProcessFlow,
        partition: usize,
        inputs: Vec<InputHandle>,
        outputs: Vec<OutputHandle>,
    ) -> Self {
        Self {
            request,
            process,
            partition,
            inputs,
            outputs,
        }
    }

    pub fn request(&self) -> &Arc<RequestContext> {
        self.request
    }

    pub fn partition(&self) -> usize {
        self.partition
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    pub fn input(&self, index: usize) -> &InputHandle {
        &self.inputs[index]
    }

    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }

    pub fn output(&self, index: usize) -> &OutputHandle {
        &self.outputs[index]
    }

    /// Records loaded from a sub-input by the prepare-phase task.
    pub fn sub_input(&self, index: usize) -> Vec<Record> {
        self.process.side_data(index)
    }
}
