//! The dataflow execution runtime: graph model, DAG controller, flat
//! tasks, scheduler policies, request/job/transaction contexts, exchanges
//! and process steps.
//!
//! A compiled statement becomes a [`model::Graph`] of steps. The
//! [`dag::DagController`] activates the steps, schedules their tasks
//! through one of the [`sched`] policies and reacts to completion events
//! until the sink completes, at which point the job's teardown task fires
//! the completion callback exactly once.

pub mod dag;
pub mod event;
pub mod event_channel;
pub mod executor;
pub mod io;
pub mod model;
pub mod request;
pub mod sched;
pub mod stats;
pub mod transaction;
pub mod util;

pub use event::{Event, EventKind};
pub use event_channel::EventChannel;
pub use request::RequestContext;
pub use transaction::{TransactionContext, TransactionOption, TransactionStateKind};
