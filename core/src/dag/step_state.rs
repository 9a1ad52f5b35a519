/// Primary state of a step during graph execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StepStateKind {
    #[default]
    Created,
    Activated,
    /// Pre-phase tasks are running.
    Preparing,
    /// Ready to run once inputs start providing.
    Prepared,
    /// Main tasks are running.
    Running,
    /// All main tasks completed; downstream propagation in progress.
    Completing,
    Completed,
    Deactivated,
}

impl StepStateKind {
    pub fn name(&self) -> &'static str {
        match self {
            StepStateKind::Created => "created",
            StepStateKind::Activated => "activated",
            StepStateKind::Preparing => "preparing",
            StepStateKind::Prepared => "prepared",
            StepStateKind::Running => "running",
            StepStateKind::Completing => "completing",
            StepStateKind::Completed => "completed",
            StepStateKind::Deactivated => "deactivated",
        }
    }
}

impl std::fmt::Display for StepStateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Task phase a slot belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Main,
    Pre,
}

/// Recorded state of one scheduled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStateKind {
    Init,
    Running,
    Completed,
    Yielded,
    Canceled,
}
