pub mod flat_task;
pub mod job_context;
pub mod serial;
pub mod stealing;
pub mod task_scheduler;
pub mod teardown;

pub use flat_task::{FlatTask, FlatTaskBody};
pub use job_context::JobContext;
pub use serial::SerialTaskScheduler;
pub use stealing::StealingTaskScheduler;
pub use task_scheduler::{SchedulerKind, TaskScheduler};
pub use teardown::check_or_submit_teardown;
