use std::time::{Duration, Instant};

/// What to do with a job after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Put the job back in the queue at its current priority.
    Requeue,
    /// Stop: the job has used its whole attempt budget.
    Exhausted,
}

/// Attempt budget and cool-down between attempts of the same job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of failed attempts (including the first) before giving up.
    pub max_attempts: u32,
    /// Minimum time between a failure and the next attempt of that job.
    pub cooldown: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            cooldown: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Decision after the `failures`-th failed attempt (1-based).
    pub fn decide(&self, failures: u32) -> RetryDecision {
        if failures >= self.max_attempts.max(1) {
            RetryDecision::Exhausted
        } else {
            RetryDecision::Requeue
        }
    }

    /// How much longer a job that last failed at `last_failure` must wait
    /// before it may be attempted at `now`. `None` means it may go now.
    pub fn cooldown_remaining(
        &self,
        last_failure: Option<Instant>,
        now: Instant,
    ) -> Option<Duration> {
        let since = now.saturating_duration_since(last_failure?);
        let remaining = self.cooldown.saturating_sub(since);
        if remaining.is_zero() {
            None
        } else {
            Some(remaining)
        }
    }
}
