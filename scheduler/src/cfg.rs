/// Static configuration for the stealing pool.
#[derive(Debug, Clone)]
pub struct SchedulerCfg {
    /// Number of worker threads.
    pub thread_count: usize,
    /// Allow idle workers to steal from their neighbors.
    pub stealing_enabled: bool,
    /// Pin workers to cores starting at `initial_core` (best effort; a
    /// no-op on platforms where pinning is unavailable).
    pub core_affinity: bool,
    pub initial_core: usize,
    /// How long a worker parks before re-running its steal sweep.
    pub park_timeout_ms: u64,
}

impl Default for SchedulerCfg {
    fn default() -> Self {
        Self {
            thread_count: 5,
            stealing_enabled: true,
            core_affinity: false,
            initial_core: 1,
            park_timeout_ms: 10,
        }
    }
}

impl SchedulerCfg {
    pub fn with_threads(thread_count: usize) -> Self {
        Self {
            thread_count,
            ..Self::default()
        }
    }
}
