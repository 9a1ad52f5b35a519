use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::model::port::{PortKind, PortRef};
use crate::model::step::{Step, StepId, StepSpec};

/// Ordered container of steps. Steps receive their identity on insertion
/// (0..N-1) and must be inserted in topological order: edges only connect
/// an earlier step to a later one.
#[derive(Default)]
pub struct Graph {
    steps: Vec<Step>,
}

static UNDEFINED: Lazy<Arc<Graph>> = Lazy::new(|| Arc::new(Graph::new()));

impl Graph {
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    /// The process-wide empty graph used where a null graph is needed.
    pub fn undefined() -> Arc<Graph> {
        Arc::clone(&UNDEFINED)
    }

    pub fn insert(&mut self, spec: StepSpec) -> StepId {
        let id = self.steps.len();
        self.steps.push(Step::new(id, spec));
        id
    }

    pub fn reserve(&mut self, n: usize) {
        self.steps.reserve(n);
    }

    pub fn find_step(&self, id: StepId) -> Option<&Step> {
        self.steps.get(id)
    }

    pub fn step(&self, id: StepId) -> &Step {
        &self.steps[id]
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn size(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn clear(&mut self) {
        self.steps.clear();
    }

    /// Connects `upstream`'s new output port to a new main input port of
    /// `downstream`. Both opposite lists are updated.
    pub fn connect(&mut self, upstream: StepId, downstream: StepId) {
        self.connect_ports(upstream, downstream, PortKind::Main);
    }

    /// Connects to a new sub-input port of `downstream` instead.
    pub fn connect_sub(&mut self, upstream: StepId, downstream: StepId) {
        self.connect_ports(upstream, downstream, PortKind::Sub);
    }

    fn connect_ports(&mut self, upstream: StepId, downstream: StepId, kind: PortKind) {
        assert!(
            upstream < downstream,
            "edges must go from an earlier step to a later one (cycle-free by construction)"
        );
        assert!(downstream < self.steps.len(), "unknown downstream step");
        let out_index = self.steps[upstream].add_output();
        let in_index = match kind {
            PortKind::Main => self.steps[downstream].add_main_input(),
            PortKind::Sub => self.steps[downstream].add_sub_input(),
        };
        self.steps[upstream].output_mut(out_index).add_opposite(PortRef {
            step: downstream,
            port_index: in_index,
        });
        let input = match kind {
            PortKind::Main => self.steps[downstream].main_input_mut(in_index),
            PortKind::Sub => self.steps[downstream].sub_input_mut(in_index),
        };
        input.add_opposite(PortRef {
            step: upstream,
            port_index: out_index,
        });
    }

    /// Steps reachable over one main output edge.
    pub fn downstreams(&self, id: StepId) -> Vec<StepId> {
        let mut out = Vec::new();
        for port in self.steps[id].outputs() {
            for opp in port.opposites() {
                out.push(opp.step);
            }
        }
        out
    }

    /// Steps feeding this step's main inputs.
    pub fn upstreams(&self, id: StepId) -> Vec<StepId> {
        let mut out = Vec::new();
        for port in self.steps[id].main_inputs() {
            for opp in port.opposites() {
                out.push(opp.step);
            }
        }
        out
    }

    /// Steps feeding this step's sub inputs, in subinput order.
    pub fn sub_upstreams(&self, id: StepId) -> Vec<StepId> {
        let mut out = Vec::new();
        for port in self.steps[id].sub_inputs() {
            for opp in port.opposites() {
                out.push(opp.step);
            }
        }
        out
    }
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph").field("steps", &self.steps).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::exchange::{ExchangeKind, ExchangeSpec};
    use crate::executor::process::{NoopLogic, ProcessSpec};
    use cascade_lib::record::RecordMeta;
    use std::sync::Arc;

    fn process_spec() -> StepSpec {
        StepSpec::Process(ProcessSpec::new(1, Arc::new(NoopLogic)))
    }

    fn forward_spec() -> StepSpec {
        StepSpec::Exchange(ExchangeSpec::new(ExchangeKind::Forward, RecordMeta::default()))
    }

    #[test]
    fn test_identities_follow_insertion_order() {
        let mut g = Graph::new();
        assert_eq!(g.insert(process_spec()), 0);
        assert_eq!(g.insert(forward_spec()), 1);
        assert_eq!(g.insert(process_spec()), 2);
        assert_eq!(g.size(), 3);
        assert_eq!(g.step(1).id(), 1);
    }

    #[test]
    fn test_connect_links_both_sides() {
        let mut g = Graph::new();
        let a = g.insert(process_spec());
        let b = g.insert(forward_spec());
        g.connect(a, b);
        let out = &g.step(a).outputs()[0];
        assert_eq!(out.opposites(), &[PortRef { step: b, port_index: 0 }]);
        let inp = &g.step(b).main_inputs()[0];
        assert_eq!(inp.opposites(), &[PortRef { step: a, port_index: 0 }]);
        assert_eq!(g.downstreams(a), vec![b]);
        assert_eq!(g.upstreams(b), vec![a]);
    }

    #[test]
    #[should_panic(expected = "earlier step")]
    fn test_backward_edge_rejected() {
        let mut g = Graph::new();
        let a = g.insert(process_spec());
        let b = g.insert(process_spec());
        g.connect(b, a);
    }

    #[test]
    #[should_panic(expected = "exchange steps never have subinputs")]
    fn test_sub_input_on_exchange_rejected() {
        let mut g = Graph::new();
        let a = g.insert(process_spec());
        let b = g.insert(forward_spec());
        g.connect_sub(a, b);
    }

    #[test]
    fn test_undefined_graph_is_empty_singleton() {
        let u1 = Graph::undefined();
        let u2 = Graph::undefined();
        assert!(u1.is_empty());
        assert!(Arc::ptr_eq(&u1, &u2));
    }
}
