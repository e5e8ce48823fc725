use std::time::{Duration, Instant};

/// Handle for cancelling a scheduled event
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimerId(u64);

/// Deadline queue for presentational callbacks, polled by the frame loop.
/// Time is always passed in so tests can drive it.
pub struct Timers<T> {
    next_id: u64,
    pending: Vec<(TimerId, Instant, T)>,
}

impl<T> Timers<T> {
    pub fn new() -> Self {
        Self {
            next_id: 0,
            pending: Vec::new(),
        }
    }

    pub fn schedule(&mut self, now: Instant, delay: Duration, event: T) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.pending.push((id, now + delay, event));
        id
    }

    /// Drop a pending event; false if it already fired or was cancelled
    pub fn cancel(&mut self, id: TimerId) -> bool {
        let before = self.pending.len();
        self.pending.retain(|(pending, _, _)| *pending != id);
        self.pending.len() != before
    }

    /// Remove and return every event due at `now`, earliest first
    pub fn drain_due(&mut self, now: Instant) -> Vec<T> {
        let (mut due, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(|(_, deadline, _)| *deadline <= now);
        self.pending = rest;
        due.sort_by_key(|(id, deadline, _)| (*deadline, id.0));
        due.into_iter().map(|(_, _, event)| event).collect()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl<T> Default for Timers<T> {
    fn default() -> Self {
        Self::new()
    }
}
