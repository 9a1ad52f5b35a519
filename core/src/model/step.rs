use crate::executor::exchange::{ExchangeKind, ExchangeSpec};
use crate::executor::process::ProcessSpec;
use crate::model::port::{Port, PortDirection, PortKind};

pub type StepId = usize;

/// Node kind in the dataflow graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Process,
    Forward,
    Group,
    Aggregate,
    Broadcast,
}

impl StepKind {
    pub fn is_exchange(&self) -> bool {
        !matches!(self, StepKind::Process)
    }
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StepKind::Process => "process",
            StepKind::Forward => "forward",
            StepKind::Group => "group",
            StepKind::Aggregate => "aggregate",
            StepKind::Broadcast => "broadcast",
        };
        f.write_str(name)
    }
}

/// Definition of what a step computes; the runtime flow object is built
/// from this at activation.
pub enum StepSpec {
    Process(ProcessSpec),
    Exchange(ExchangeSpec),
}

impl StepSpec {
    pub fn kind(&self) -> StepKind {
        match self {
            StepSpec::Process(_) => StepKind::Process,
            StepSpec::Exchange(e) => match e.kind {
                ExchangeKind::Forward => StepKind::Forward,
                ExchangeKind::Group(_) => StepKind::Group,
                ExchangeKind::Aggregate(_) => StepKind::Aggregate,
                ExchangeKind::Broadcast => StepKind::Broadcast,
            },
        }
    }
}

/// A node in the dataflow graph. Owned exclusively by its graph; identity
/// equals its insertion position.
pub struct Step {
    id: StepId,
    kind: StepKind,
    spec: StepSpec,
    main_inputs: Vec<Port>,
    sub_inputs: Vec<Port>,
    outputs: Vec<Port>,
}

impl Step {
    pub(crate) fn new(id: StepId, spec: StepSpec) -> Self {
        let kind = spec.kind();
        Self {
            id,
            kind,
            spec,
            main_inputs: Vec::new(),
            sub_inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn id(&self) -> StepId {
        self.id
    }

    pub fn kind(&self) -> StepKind {
        self.kind
    }

    pub fn spec(&self) -> &StepSpec {
        &self.spec
    }

    pub fn main_inputs(&self) -> &[Port] {
        &self.main_inputs
    }

    pub fn sub_inputs(&self) -> &[Port] {
        &self.sub_inputs
    }

    pub fn outputs(&self) -> &[Port] {
        &self.outputs
    }

    pub fn has_sub_inputs(&self) -> bool {
        !self.sub_inputs.is_empty()
    }

    pub(crate) fn add_main_input(&mut self) -> usize {
        self.main_inputs
            .push(Port::new(PortDirection::Input, PortKind::Main, self.id));
        self.main_inputs.len() - 1
    }

    pub(crate) fn add_sub_input(&mut self) -> usize {
        assert!(
            !self.kind.is_exchange(),
            "exchange steps never have subinputs"
        );
        self.sub_inputs
            .push(Port::new(PortDirection::Input, PortKind::Sub, self.id));
        self.sub_inputs.len() - 1
    }

    pub(crate) fn add_output(&mut self) -> usize {
        self.outputs
            .push(Port::new(PortDirection::Output, PortKind::Main, self.id));
        self.outputs.len() - 1
    }

    pub(crate) fn main_input_mut(&mut self, index: usize) -> &mut Port {
        &mut self.main_inputs[index]
    }

    pub(crate) fn sub_input_mut(&mut self, index: usize) -> &mut Port {
        &mut self.sub_inputs[index]
    }

    pub(crate) fn output_mut(&mut self, index: usize) -> &mut Port {
        &mut self.outputs[index]
    }
}

impl std::fmt::Debug for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Step")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("main_inputs", &self.main_inputs.len())
            .field("sub_inputs", &self.sub_inputs.len())
            .field("outputs", &self.outputs.len())
            .finish()
    }
}
