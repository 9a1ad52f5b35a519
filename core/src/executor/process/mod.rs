pub mod context;
pub mod emit;
pub mod flow;

pub use context::{InputHandle, OutputHandle, ProcessContext};
pub use emit::EmitLogic;
pub use flow::ProcessFlow;

use std::sync::Arc;

use cascade_lib::error::EngineResult;

/// User-defined body of a process step. One invocation per partition; the
/// context exposes the request, the exchange readers/writers and any
/// side data loaded by pre-tasks.
pub trait ProcessLogic: Send + Sync {
    fn run(&self, ctx: &mut ProcessContext<'_>) -> EngineResult<()>;
}

/// Static definition of a process step.
pub struct ProcessSpec {
    partitions: usize,
    logic: Arc<dyn ProcessLogic>,
}

impl ProcessSpec {
    pub fn new(partitions: usize, logic: Arc<dyn ProcessLogic>) -> Self {
        assert!(partitions > 0, "process needs at least one partition");
        Self { partitions, logic }
    }

    pub fn partitions(&self) -> usize {
        self.partitions
    }

    pub fn logic(&self) -> &Arc<dyn ProcessLogic> {
        &self.logic
    }
}

/// A process body that does nothing; useful as a placeholder in tests.
pub struct NoopLogic;

impl ProcessLogic for NoopLogic {
    fn run(&self, _ctx: &mut ProcessContext<'_>) -> EngineResult<()> {
        Ok(())
    }
}
