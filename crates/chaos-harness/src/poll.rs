//! Convergence polling for timing-dependent assertions.
//!
//! The control plane propagates writes to its backends asynchronously, so
//! every assertion about observable state is a bounded wait: probe, evaluate a
//! stop condition, sleep, repeat. Every wait in the harness ("status reaches
//! one of these values", "resource answers 404", "resolver stops answering")
//! is the same loop with a different stop predicate.

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, Instant};

use common::error::{HarnessError, Result};

/// How a poll run ended.
///
/// Probe failure is a first-class outcome, not an unwound error: some call
/// sites (down-detection) treat an unreachable target as the expected terminal
/// condition, so the caller decides what a failed probe means.
#[derive(Debug)]
pub enum PollOutcome<T, E> {
    /// The stop predicate accepted an observation.
    Satisfied { observation: T, elapsed: Duration },
    /// The deadline passed; `last` is the final observation made.
    TimedOut { last: T, elapsed: Duration },
    /// The probe itself failed (connection error, malformed response,
    /// resolver timeout).
    ProbeFailed { error: E, elapsed: Duration },
}

impl<T, E> PollOutcome<T, E> {
    pub fn is_satisfied(&self) -> bool {
        matches!(self, PollOutcome::Satisfied { .. })
    }

    /// The last observation, when one was made.
    pub fn observation(&self) -> Option<&T> {
        match self {
            PollOutcome::Satisfied { observation, .. } => Some(observation),
            PollOutcome::TimedOut { last, .. } => Some(last),
            PollOutcome::ProbeFailed { .. } => None,
        }
    }

    pub fn elapsed(&self) -> Duration {
        match self {
            PollOutcome::Satisfied { elapsed, .. }
            | PollOutcome::TimedOut { elapsed, .. }
            | PollOutcome::ProbeFailed { elapsed, .. } => *elapsed,
        }
    }
}

/// A fixed-interval, deadline-bounded poller.
#[derive(Debug, Clone, Copy)]
pub struct Poller {
    interval: Duration,
    timeout: Duration,
}

impl Poller {
    /// # Errors
    ///
    /// Rejects a zero interval with `InvalidArgument` (a zero timeout is
    /// valid: exactly one probe, then timeout).
    pub fn new(interval: Duration, timeout: Duration) -> Result<Self> {
        if interval.is_zero() {
            return Err(HarnessError::InvalidArgument(
                "poll interval must be > 0".to_string(),
            ));
        }
        Ok(Self { interval, timeout })
    }

    /// Same interval, different deadline. Used for short down-detection
    /// windows next to long convergence waits.
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            interval: self.interval,
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Probe until `stop` accepts an observation or the deadline expires.
    ///
    /// The first probe runs immediately (no initial sleep). A satisfying
    /// observation returns at once with no trailing sleep. The deadline is
    /// checked after the stop predicate and before sleeping, and each sleep
    /// is capped at the time remaining to the deadline, so the run
    /// overshoots `timeout` by at most one in-flight probe. Termination is
    /// guaranteed for every `timeout >= 0`.
    pub async fn run<T, E, F, Fut, S>(&self, mut probe: F, mut stop: S) -> PollOutcome<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        S: FnMut(&T) -> bool,
    {
        let start = Instant::now();
        let deadline = start + self.timeout;

        loop {
            let observation = match probe().await {
                Ok(observation) => observation,
                Err(error) => {
                    return PollOutcome::ProbeFailed {
                        error,
                        elapsed: start.elapsed(),
                    }
                }
            };

            if stop(&observation) {
                return PollOutcome::Satisfied {
                    observation,
                    elapsed: start.elapsed(),
                };
            }

            let now = Instant::now();
            if now >= deadline {
                return PollOutcome::TimedOut {
                    last: observation,
                    elapsed: start.elapsed(),
                };
            }

            // cap at the remaining time so a long interval cannot push the
            // run past the deadline
            sleep(self.interval.min(deadline - now)).await;
        }
    }
}
