//! A small work-stealing thread pool for synchronous tasks.
//!
//! Each worker owns a FIFO queue. Submission targets a specific worker or
//! falls back to round robin; an idle worker sweeps its neighbors to the
//! right (wrap-around) and steals at most once per sweep before pausing.
//! The pool is generic over the work unit so upper layers can run their own
//! task representation without boxing through trait objects.

pub mod cfg;
pub mod context;
pub mod queue;
pub mod scheduler;
pub mod thread;
pub mod worker;

pub use cfg::SchedulerCfg;
pub use context::WorkerContext;
pub use queue::BasicQueue;
pub use scheduler::TaskSchedulerPool;
pub use worker::{WorkStatus, WorkUnit, WorkerStat};
