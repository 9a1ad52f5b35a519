use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};

/// Per-request execution counters, one slot per modification kind plus
/// fetched rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CounterKind {
    Inserted,
    Updated,
    Merged,
    Deleted,
    Fetched,
}

const COUNTER_SLOTS: usize = 5;

/// Statistics attached to a request context when the client asked for
/// them. Counters are updated from task bodies, so they are atomics.
#[derive(Debug)]
pub struct RequestStatistics {
    counters: [AtomicI64; COUNTER_SLOTS],
    started_at: DateTime<Utc>,
    finished_at: Mutex<Option<DateTime<Utc>>>,
}

impl Default for RequestStatistics {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestStatistics {
    pub fn new() -> Self {
        Self {
            counters: Default::default(),
            started_at: Utc::now(),
            finished_at: Mutex::new(None),
        }
    }

    pub fn count(&self, kind: CounterKind, delta: i64) {
        self.counters[kind as usize].fetch_add(delta, Ordering::Relaxed);
    }

    pub fn counter(&self, kind: CounterKind) -> i64 {
        self.counters[kind as usize].load(Ordering::Relaxed)
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn record_finish(&self) {
        let mut finished = self.finished_at.lock().unwrap();
        if finished.is_none() {
            *finished = Some(Utc::now());
        }
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        *self.finished_at.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let stats = RequestStatistics::new();
        stats.count(CounterKind::Inserted, 3);
        stats.count(CounterKind::Inserted, 2);
        stats.count(CounterKind::Fetched, 10);
        assert_eq!(stats.counter(CounterKind::Inserted), 5);
        assert_eq!(stats.counter(CounterKind::Fetched), 10);
        assert_eq!(stats.counter(CounterKind::Deleted), 0);
    }

    #[test]
    fn test_finish_recorded_once() {
        let stats = RequestStatistics::new();
        assert!(stats.finished_at().is_none());
        stats.record_finish();
        let first = stats.finished_at().unwrap();
        stats.record_finish();
        assert_eq!(stats.finished_at().unwrap(), first);
    }
}
