use std::sync::Arc;

use crate::executor::exchange::flow::ExchangeFlow;
use crate::executor::exchange::ExchangeKind;
use crate::executor::process::flow::ProcessFlow;
use crate::model::step::StepKind;

/// Per-step runtime object, created during activation. Holds the shared
/// inner flow so task bodies can keep handles across threads.
pub enum Flow {
    Process(Arc<ProcessFlow>),
    Exchange(Arc<ExchangeFlow>),
}

impl Flow {
    pub fn kind(&self) -> StepKind {
        match self {
            Flow::Process(_) => StepKind::Process,
            Flow::Exchange(e) => match e.kind() {
                ExchangeKind::Forward => StepKind::Forward,
                ExchangeKind::Group(_) => StepKind::Group,
                ExchangeKind::Aggregate(_) => StepKind::Aggregate,
                ExchangeKind::Broadcast => StepKind::Broadcast,
            },
        }
    }

    pub fn as_process(&self) -> Option<Arc<ProcessFlow>> {
        match self {
            Flow::Process(p) => Some(Arc::clone(p)),
            Flow::Exchange(_) => None,
        }
    }

    pub fn as_exchange(&self) -> Option<Arc<ExchangeFlow>> {
        match self {
            Flow::Exchange(e) => Some(Arc::clone(e)),
            Flow::Process(_) => None,
        }
    }
}

/// Per-graph array of flows indexed by step identity. Written only during
/// activation; read-only afterwards.
#[derive(Default)]
pub struct FlowRepository {
    flows: Vec<Option<Flow>>,
}

impl FlowRepository {
    pub fn new(size: usize) -> Self {
        Self {
            flows: (0..size).map(|_| None).collect(),
        }
    }

    pub fn set(&mut self, step: usize, flow: Flow) {
        assert!(self.flows[step].is_none(), "flow already registered");
        self.flows[step] = Some(flow);
    }

    pub fn get(&self, step: usize) -> Option<&Flow> {
        self.flows.get(step).and_then(|f| f.as_ref())
    }

    pub fn flow(&self, step: usize) -> &Flow {
        self.flows[step].as_ref().expect("step is activated")
    }

    pub fn clear(&mut self) {
        for slot in &mut self.flows {
            slot.take();
        }
    }

    pub fn size(&self) -> usize {
        self.flows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::process::NoopLogic;

    #[test]
    fn test_repository_set_get_clear() {
        let mut repo = FlowRepository::new(2);
        assert!(repo.get(0).is_none());
        repo.set(
            0,
            Flow::Process(Arc::new(ProcessFlow::new(1, Arc::new(NoopLogic)))),
        );
        assert!(repo.get(0).is_some());
        assert_eq!(repo.flow(0).kind(), StepKind::Process);
        assert!(repo.flow(0).as_process().is_some());
        assert!(repo.flow(0).as_exchange().is_none());
        repo.clear();
        assert!(repo.get(0).is_none());
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn test_double_registration_panics() {
        let mut repo = FlowRepository::new(1);
        repo.set(
            0,
            Flow::Process(Arc::new(ProcessFlow::new(1, Arc::new(NoopLogic)))),
        );
        repo.set(
            0,
            Flow::Process(Arc::new(ProcessFlow::new(1, Arc::new(NoopLogic)))),
        );
    }
}
