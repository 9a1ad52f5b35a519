use crate::model::step::StepId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortDirection {
    Input,
    Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortKind {
    Main,
    Sub,
}

/// Address of a port on another step. Opposite resolution goes through the
/// owning graph, which avoids direct cyclic references between steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRef {
    pub step: StepId,
    pub port_index: usize,
}

/// A connection point on a step.
#[derive(Debug, Clone)]
pub struct Port {
    direction: PortDirection,
    kind: PortKind,
    owner: StepId,
    opposites: Vec<PortRef>,
}

impl Port {
    pub fn new(direction: PortDirection, kind: PortKind, owner: StepId) -> Self {
        Self {
            direction,
            kind,
            owner,
            opposites: Vec::new(),
        }
    }

    pub fn direction(&self) -> PortDirection {
        self.direction
    }

    pub fn kind(&self) -> PortKind {
        self.kind
    }

    pub fn owner(&self) -> StepId {
        self.owner
    }

    pub fn opposites(&self) -> &[PortRef] {
        &self.opposites
    }

    pub(crate) fn add_opposite(&mut self, opposite: PortRef) {
        self.opposites.push(opposite);
    }
}
