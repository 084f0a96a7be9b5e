//! Cancellable deadline owned by one accumulator.
//!
//! Re-arming replaces the previous instant, so "new data pushes the deadline
//! back" is a single assignment on the owning task.

use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    /// A deadline that is not armed.
    pub const fn disarmed() -> Self {
        Self { at: None }
    }

    /// Arm (or re-arm) to fire `after` from `now`.
    pub fn arm(&mut self, now: Instant, after: Duration) {
        self.at = Some(now + after);
    }

    pub fn cancel(&mut self) {
        self.at = None;
    }

    /// Instant at which the deadline fires, if armed.
    pub fn at(&self) -> Option<Instant> {
        self.at
    }

    pub fn is_armed(&self) -> bool {
        self.at.is_some()
    }

    /// Armed and reached at `now`.
    pub fn is_expired(&self, now: Instant) -> bool {
        self.at.is_some_and(|at| now >= at)
    }
}

/// Earliest of two optional instants.
pub(crate) fn earliest(a: Option<Instant>, b: Option<Instant>) -> Option<Instant> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, None) => a,
        (None, b) => b,
    }
}
