pub mod controller;
pub mod step_state;
pub mod step_state_table;

pub use controller::DagController;
pub use step_state::{StepStateKind, TaskKind, TaskStateKind};
pub use step_state_table::StepStateTable;
