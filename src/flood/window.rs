//! Per-identity call window.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Timestamps of the calls admitted for one identity, oldest first.
///
/// Timestamps are only ever appended at the current instant, so the deque
/// stays in chronological order and trimming only needs to look at the front.
#[derive(Debug, Default, Clone)]
pub struct CallWindow {
    calls: VecDeque<Instant>,
}

impl CallWindow {
    /// Create an empty window.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every call older than `period` relative to `now`.
    ///
    /// A call exactly `period` old is kept. Returns the number of calls removed.
    pub fn trim(&mut self, now: Instant, period: Duration) -> usize {
        let mut removed = 0;
        while self
            .calls
            .front()
            .is_some_and(|oldest| now.saturating_duration_since(*oldest) > period)
        {
            self.calls.pop_front();
            removed += 1;
        }
        removed
    }

    /// Record a call admitted at `now`.
    ///
    /// `now` must not be earlier than the last recorded call.
    pub fn record(&mut self, now: Instant) {
        self.calls.push_back(now);
    }

    /// Number of calls currently held.
    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// The oldest call still held, if any.
    pub fn oldest(&self) -> Option<Instant> {
        self.calls.front().copied()
    }

    /// How long until the oldest held call stops counting.
    ///
    /// Only meaningful after [`trim`](Self::trim) with the same `now` and `period`.
    pub fn retry_after(&self, now: Instant, period: Duration) -> Duration {
        match self.oldest() {
            Some(oldest) => period.saturating_sub(now.saturating_duration_since(oldest)),
            None => Duration::ZERO,
        }
    }
}
