use crate::model::port::PortKind;
use crate::model::step::StepId;
use crate::model::task::TaskId;

/// External events handled by the DAG controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// An upstream step started providing data to the target step.
    Providing,
    /// A task of the target step completed.
    TaskCompleted,
    /// Early completion has been requested for the whole graph.
    CompletionInstructed,
}

/// An external event carrying its target step and payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Providing {
        target: StepId,
        source_port_kind: PortKind,
        source_port_index: usize,
    },
    TaskCompleted {
        target: StepId,
        task: TaskId,
    },
    CompletionInstructed,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Providing { .. } => EventKind::Providing,
            Event::TaskCompleted { .. } => EventKind::TaskCompleted,
            Event::CompletionInstructed => EventKind::CompletionInstructed,
        }
    }

    pub fn target(&self) -> Option<StepId> {
        match self {
            Event::Providing { target, .. } | Event::TaskCompleted { target, .. } => Some(*target),
            Event::CompletionInstructed => None,
        }
    }
}

/// Internal events computed and executed synchronously by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InternalEventKind {
    Activate,
    Prepare,
    Consume,
    Deactivate,
    PropagateDownstreamCompleting,
}

impl InternalEventKind {
    pub fn name(&self) -> &'static str {
        match self {
            InternalEventKind::Activate => "activate",
            InternalEventKind::Prepare => "prepare",
            InternalEventKind::Consume => "consume",
            InternalEventKind::Deactivate => "deactivate",
            InternalEventKind::PropagateDownstreamCompleting => {
                "propagate_downstream_completing"
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_and_target() {
        let e = Event::TaskCompleted { target: 3, task: 7 };
        assert_eq!(e.kind(), EventKind::TaskCompleted);
        assert_eq!(e.target(), Some(3));
        assert_eq!(Event::CompletionInstructed.target(), None);
    }
}
