//! Time measurement and cooperative cancellation helpers
//!
//! The engine never cancels work on its own. Long carving sweeps poll a
//! caller-supplied predicate between cube classifications; [`Deadline`] is
//! the stock wall-clock predicate.

use std::time::{Duration, Instant};

/// Simple stopwatch for measuring build and sweep durations
#[derive(Debug, Clone, Copy)]
pub struct Stopwatch {
    start_time: Instant,
}

impl Stopwatch {
    /// Create a new stopwatch and start it immediately
    pub fn start_new() -> Self {
        Self {
            start_time: Instant::now(),
        }
    }

    /// Get the elapsed time
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Get the elapsed time in milliseconds
    pub fn elapsed_millis(&self) -> f32 {
        self.elapsed().as_secs_f32() * 1000.0
    }
}

/// Wall-clock budget usable as a cancellation predicate
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    expires_at: Option<Instant>,
}

impl Deadline {
    /// A deadline `budget` from now
    pub fn after(budget: Duration) -> Self {
        Self {
            expires_at: Instant::now().checked_add(budget),
        }
    }

    /// A deadline that never expires
    pub fn never() -> Self {
        Self { expires_at: None }
    }

    /// True once the budget is spent
    pub fn expired(&self) -> bool {
        self.expires_at.is_some_and(|t| Instant::now() >= t)
    }
}
