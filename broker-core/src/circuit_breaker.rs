//! Per-upstream circuit breaker: closed / open / half-open.
//!
//! State transitions are serialized through `broker_common::StateMachine`,
//! a generic mutex-wrapper shared across per-entity state machines in
//! this workspace.

use broker_common::StateMachine;
use std::time::{Duration, Instant};

use crate::constants::{CIRCUIT_BREAKER_COOLDOWN, CIRCUIT_BREAKER_FAILURE_THRESHOLD};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

struct Breaker {
    state: BreakerState,
    consecutive_failures: u32,
    next_attempt_at: Option<Instant>,
    total_failures: u64,
    total_successes: u64,
}

impl Breaker {
    fn new() -> Self {
        Self {
            state: BreakerState::Closed,
            consecutive_failures: 0,
            next_attempt_at: None,
            total_failures: 0,
            total_successes: 0,
        }
    }
}

/// Snapshot used by health/metrics reporting.
#[derive(Debug, Clone, Copy)]
pub struct BreakerSnapshot {
    pub state: BreakerState,
    pub consecutive_failures: u32,
    pub total_failures: u64,
    pub total_successes: u64,
}

pub struct CircuitBreaker {
    server: String,
    failure_threshold: u32,
    cooldown: Duration,
    inner: StateMachine<Breaker>,
}

/// Outcome of asking the breaker whether a call may proceed.
pub enum Admission {
    Allowed,
    Denied { retry_after: Duration },
}

impl CircuitBreaker {
    pub fn new(server: impl Into<String>) -> Self {
        Self::with_params(server, CIRCUIT_BREAKER_FAILURE_THRESHOLD, CIRCUIT_BREAKER_COOLDOWN)
    }

    pub fn with_params(server: impl Into<String>, failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            server: server.into(),
            failure_threshold,
            cooldown,
            inner: StateMachine::new(Breaker::new()),
        }
    }

    /// Check whether a call is allowed right now. In the `open` state this
    /// also performs the open→half-open transition once the cooldown has
    /// elapsed, so callers only need to call this once per request.
    pub fn admit(&self) -> Admission {
        self.inner.transition(|b| match b.state {
            BreakerState::Closed | BreakerState::HalfOpen => Admission::Allowed,
            BreakerState::Open => {
                let next = b.next_attempt_at.unwrap_or_else(Instant::now);
                if Instant::now() >= next {
                    b.state = BreakerState::HalfOpen;
                    Admission::Allowed
                } else {
                    Admission::Denied {
                        retry_after: next.saturating_duration_since(Instant::now()),
                    }
                }
            }
        })
    }

    /// Returns the "circuit open" error for a denied admission, formatted
    /// per §4.F.
    pub fn open_error(&self, retry_after: Duration) -> Error {
        Error::CircuitOpen {
            server: self.server.clone(),
            retry_after_secs: retry_after.as_secs(),
        }
    }

    pub fn record_success(&self) {
        self.inner.transition(|b| {
            b.total_successes += 1;
            b.consecutive_failures = 0;
            b.state = BreakerState::Closed;
            b.next_attempt_at = None;
        });
    }

    pub fn record_failure(&self) {
        self.inner.transition(|b| {
            b.total_failures += 1;
            match b.state {
                BreakerState::HalfOpen => {
                    b.state = BreakerState::Open;
                    b.next_attempt_at = Some(Instant::now() + self.cooldown);
                }
                BreakerState::Closed | BreakerState::Open => {
                    b.consecutive_failures += 1;
                    if b.consecutive_failures >= self.failure_threshold {
                        b.state = BreakerState::Open;
                        b.next_attempt_at = Some(Instant::now() + self.cooldown);
                    }
                }
            }
        });
    }

    /// Run a fallible async call under this breaker: admit, run with a
    /// timeout, record the outcome. A call exceeding `timeout` counts as a
    /// failure, same as any other error.
    pub async fn guard<F, Fut, T>(&self, timeout: Duration, call: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        match self.admit() {
            Admission::Denied { retry_after } => return Err(self.open_error(retry_after)),
            Admission::Allowed => {}
        }

        match tokio::time::timeout(timeout, call()).await {
            Ok(Ok(value)) => {
                self.record_success();
                Ok(value)
            }
            Ok(Err(err)) => {
                self.record_failure();
                Err(err)
            }
            Err(_) => {
                self.record_failure();
                Err(Error::Timeout(timeout))
            }
        }
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        self.inner.transition(|b| BreakerSnapshot {
            state: b.state,
            consecutive_failures: b.consecutive_failures,
            total_failures: b.total_failures,
            total_successes: b.total_successes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_on_exactly_nth_consecutive_failure() {
        let breaker = CircuitBreaker::with_params("zen", 5, Duration::from_secs(30));
        for _ in 0..4 {
            breaker.record_failure();
            assert_eq!(breaker.snapshot().state, BreakerState::Closed);
        }
        breaker.record_failure();
        assert_eq!(breaker.snapshot().state, BreakerState::Open);
    }

    #[test]
    fn success_resets_consecutive_failures_in_closed_state() {
        let breaker = CircuitBreaker::with_params("zen", 5, Duration::from_secs(30));
        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        assert_eq!(breaker.snapshot().consecutive_failures, 0);
        assert_eq!(breaker.snapshot().state, BreakerState::Closed);
    }

    #[test]
    fn open_denies_until_cooldown_elapses() {
        let breaker = CircuitBreaker::with_params("zen", 1, Duration::from_millis(20));
        breaker.record_failure();
        assert_eq!(breaker.snapshot().state, BreakerState::Open);

        match breaker.admit() {
            Admission::Denied { .. } => {}
            Admission::Allowed => panic!("expected denial while cooling down"),
        }

        std::thread::sleep(Duration::from_millis(25));

        match breaker.admit() {
            Admission::Allowed => {}
            Admission::Denied { .. } => panic!("expected half-open probe to be admitted"),
        }
        assert_eq!(breaker.snapshot().state, BreakerState::HalfOpen);
    }

    #[test]
    fn half_open_failure_reopens_with_fresh_cooldown() {
        let breaker = CircuitBreaker::with_params("zen", 1, Duration::from_millis(10));
        breaker.record_failure();
        std::thread::sleep(Duration::from_millis(15));
        assert!(matches!(breaker.admit(), Admission::Allowed));
        assert_eq!(breaker.snapshot().state, BreakerState::HalfOpen);

        breaker.record_failure();
        assert_eq!(breaker.snapshot().state, BreakerState::Open);
    }

    #[test]
    fn half_open_success_closes() {
        let breaker = CircuitBreaker::with_params("zen", 1, Duration::from_millis(10));
        breaker.record_failure();
        std::thread::sleep(Duration::from_millis(15));
        assert!(matches!(breaker.admit(), Admission::Allowed));

        breaker.record_success();
        assert_eq!(breaker.snapshot().state, BreakerState::Closed);
    }

    #[tokio::test]
    async fn call_exceeding_timeout_counts_as_failure() {
        let breaker = CircuitBreaker::with_params("zen", 1, Duration::from_secs(30));
        let result: Result<()> = breaker
            .guard(Duration::from_millis(10), || async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(())
            })
            .await;
        assert!(result.is_err());
        assert_eq!(breaker.snapshot().state, BreakerState::Open);
    }
}
