pub mod context;
pub mod option;
pub mod state;
pub mod termination;

pub use context::TransactionContext;
pub use option::TransactionOption;
pub use state::TransactionStateKind;
pub use termination::TerminationState;
