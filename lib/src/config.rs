/// Engine configuration. Plain data with defaults; cloned into the parts
/// that need it at `start()`.
#[derive(Debug, Clone)]
pub struct Configuration {
    /// Run the serial (single-thread, synchronous) task scheduler instead
    /// of the work-stealing pool.
    pub single_thread: bool,
    /// Worker count for the stealing scheduler.
    pub thread_pool_size: usize,
    /// Default partition count for exchange steps.
    pub default_partitions: usize,
    /// Default partition count for scan process steps.
    pub default_scan_partitions: usize,
    /// Pin workers to cores starting at `initial_core` (best effort).
    pub core_affinity: bool,
    pub initial_core: usize,
    /// Allow workers to steal from their neighbors.
    pub stealing_enabled: bool,
    /// Prefer placing the teardown task on a suspended worker so a busy
    /// worker is not blocked on the readiness wait.
    pub teardown_try_on_suspended_worker: bool,
    /// Remap storage `concurrent_operation` on point reads to `not_found`.
    pub point_read_concurrent_operation_as_not_found: bool,
    /// Remap storage `concurrent_operation` on scans to `not_found`.
    pub scan_concurrent_operation_as_not_found: bool,
    /// Seats in the result-channel writer pool.
    pub writer_pool_capacity: usize,
    /// Interval of the durability watcher between durable-marker advances.
    pub durability_notify_interval_ms: u64,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            single_thread: true,
            thread_pool_size: 5,
            default_partitions: 5,
            default_scan_partitions: 5,
            core_affinity: false,
            initial_core: 1,
            stealing_enabled: true,
            teardown_try_on_suspended_worker: true,
            point_read_concurrent_operation_as_not_found: true,
            scan_concurrent_operation_as_not_found: true,
            writer_pool_capacity: 16,
            durability_notify_interval_ms: 5,
        }
    }
}

impl Configuration {
    /// Configuration for the stealing scheduler with the given pool size.
    pub fn multi_thread(threads: usize) -> Self {
        Self {
            single_thread: false,
            thread_pool_size: threads,
            ..Self::default()
        }
    }
}
