//! Latency budget tracking.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Wall-clock allowance for one resolution.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct LatencyBudget(Duration);

impl LatencyBudget {
    pub const DEFAULT: LatencyBudget = LatencyBudget(Duration::from_millis(250));

    pub fn new(limit: Duration) -> Self {
        Self(limit)
    }

    pub fn from_millis(millis: u64) -> Self {
        Self(Duration::from_millis(millis))
    }

    /// A budget that never runs out in practice.
    pub fn unbounded() -> Self {
        Self(Duration::from_secs(60 * 60 * 24))
    }

    pub fn limit(&self) -> Duration {
        self.0
    }

    /// Start the clock.
    pub fn start(self) -> Deadline {
        Deadline {
            started: Instant::now(),
            limit: self.0,
        }
    }
}

impl Default for LatencyBudget {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// A running budget.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    limit: Duration,
}

impl Deadline {
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn remaining(&self) -> Duration {
        self.limit.saturating_sub(self.elapsed())
    }

    /// A zero budget is expired from the start.
    pub fn expired(&self) -> bool {
        self.remaining().is_zero()
    }

    /// The smaller of `timeout` and what is left of the budget.
    pub fn bound(&self, timeout: Duration) -> Duration {
        timeout.min(self.remaining())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_budget_is_expired_immediately() {
        let deadline = LatencyBudget::from_millis(0).start();
        assert!(deadline.expired());
        assert_eq!(deadline.bound(Duration::from_secs(1)), Duration::ZERO);
    }

    #[test]
    fn test_bound_takes_the_smaller_limit() {
        let deadline = LatencyBudget::unbounded().start();
        assert!(!deadline.expired());
        assert_eq!(
            deadline.bound(Duration::from_millis(40)),
            Duration::from_millis(40)
        );
    }
}
