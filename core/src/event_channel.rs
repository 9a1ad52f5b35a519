use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

use crate::event::Event;

struct ChannelState {
    events: VecDeque<Event>,
    closed: bool,
}

/// Communication channel between tasks and the DAG controller.
///
/// Concurrent multi-producer multi-consumer queue. A closed channel
/// refuses pushes and unblocks pending pops.
pub struct EventChannel {
    state: Mutex<ChannelState>,
    readable: Condvar,
}

impl Default for EventChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl EventChannel {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ChannelState {
                events: VecDeque::new(),
                closed: false,
            }),
            readable: Condvar::new(),
        }
    }

    /// Pushes an event; silently dropped when the channel is closed.
    pub fn push(&self, event: Event) {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return;
        }
        state.events.push_back(event);
        drop(state);
        self.readable.notify_one();
    }

    /// Non-blocking pop.
    pub fn try_pop(&self) -> Option<Event> {
        self.state.lock().unwrap().events.pop_front()
    }

    /// Blocking pop; `None` once the channel is closed and drained.
    pub fn pop(&self) -> Option<Event> {
        let mut state = self.state.lock().unwrap();
        loop {
            if let Some(e) = state.events.pop_front() {
                return Some(e);
            }
            if state.closed {
                return None;
            }
            state = self.readable.wait(state).unwrap();
        }
    }

    /// Blocking pop with timeout.
    pub fn pop_wait(&self, timeout: Duration) -> Option<Event> {
        let mut state = self.state.lock().unwrap();
        if state.events.is_empty() && !state.closed {
            let (guard, _) = self
                .readable
                .wait_timeout_while(state, timeout, |s| s.events.is_empty() && !s.closed)
                .unwrap();
            state = guard;
        }
        state.events.pop_front()
    }

    /// Closes the channel and wakes pending pops.
    pub fn close(&self) {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return;
        }
        state.closed = true;
        drop(state);
        self.readable.notify_all();
    }

    pub fn closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_push_pop_fifo() {
        let ch = EventChannel::new();
        ch.push(Event::TaskCompleted { target: 0, task: 1 });
        ch.push(Event::TaskCompleted { target: 0, task: 2 });
        assert_eq!(ch.try_pop(), Some(Event::TaskCompleted { target: 0, task: 1 }));
        assert_eq!(ch.try_pop(), Some(Event::TaskCompleted { target: 0, task: 2 }));
        assert_eq!(ch.try_pop(), None);
    }

    #[test]
    fn test_closed_channel_refuses_push_and_unblocks_pop() {
        let ch = Arc::new(EventChannel::new());
        let ch2 = Arc::clone(&ch);
        let waiter = std::thread::spawn(move || ch2.pop());
        std::thread::sleep(Duration::from_millis(20));
        ch.close();
        assert_eq!(waiter.join().unwrap(), None);
        ch.push(Event::CompletionInstructed);
        assert!(ch.is_empty());
    }

    #[test]
    fn test_pop_returns_queued_before_close_signal() {
        let ch = EventChannel::new();
        ch.push(Event::CompletionInstructed);
        ch.close();
        assert_eq!(ch.pop(), Some(Event::CompletionInstructed));
        assert_eq!(ch.pop(), None);
    }
}
