//! Bounded retry for subprocess-backed operations

use crate::log::EventSink;
use crate::Result;
use std::future::Future;
use std::time::Duration;

use crate::config::{DEFAULT_PULL_ATTEMPTS, DEFAULT_RETRY_DELAY};

/// How the delay grows between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay before every retry
    Fixed,
    /// Delay doubles after each failed attempt
    Exponential,
}

/// Retry budget and pacing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
    backoff: Backoff,
}

/// Outcome of a retried operation
#[derive(Debug)]
pub struct Attempted<T> {
    pub result: Result<T>,
    /// Attempts actually made, 1..=max_attempts
    pub attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_PULL_ATTEMPTS, DEFAULT_RETRY_DELAY)
    }
}

impl RetryPolicy {
    /// Fixed-delay policy; at least one attempt is always made
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            backoff: Backoff::Fixed,
        }
    }

    /// Single attempt, no retries
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay to wait after `failed_attempt` (1-based) before the next one
    pub fn delay_after(&self, failed_attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.delay,
            Backoff::Exponential => {
                let factor = 1u32 << failed_attempt.saturating_sub(1).min(16);
                self.delay.saturating_mul(factor)
            }
        }
    }

    /// Run `op` until it succeeds or the budget is spent.
    ///
    /// `op` receives the 1-based attempt number. Every failed attempt is
    /// reported to `sink`; the final error is returned, not logged again.
    pub async fn run<T, F, Fut>(&self, label: &str, sink: &dyn EventSink, mut op: F) -> Attempted<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => {
                    return Attempted {
                        result: Ok(value),
                        attempts: attempt,
                    }
                }
                Err(e) => {
                    sink.error(&format!(
                        "Attempt {}/{} to {} failed: {}",
                        attempt, self.max_attempts, label, e
                    ));
                    if attempt >= self.max_attempts {
                        return Attempted {
                            result: Err(e),
                            attempts: attempt,
                        };
                    }
                    let delay = self.delay_after(attempt);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::{LogLevel, RunLog};
    use crate::OicError;
    use std::cell::Cell;

    fn failing(attempt: u32) -> OicError {
        OicError::Tool {
            program: "docker".to_string(),
            command: "image pull x:1".to_string(),
            code: Some(1),
            stderr: format!("boom {}", attempt),
        }
    }

    #[tokio::test]
    async fn test_exhausts_budget_on_persistent_failure() {
        let log = RunLog::in_memory();
        let calls = Cell::new(0);
        let policy = RetryPolicy::new(3, Duration::ZERO);

        let outcome: Attempted<()> = policy
            .run("pull x:1", &log, |attempt| {
                calls.set(calls.get() + 1);
                async move { Err(failing(attempt)) }
            })
            .await;

        assert!(outcome.result.is_err());
        assert_eq!(outcome.attempts, 3);
        assert_eq!(calls.get(), 3);

        let entries = log.entries();
        assert_eq!(entries.len(), 3);
        assert!(entries.iter().all(|e| e.level == LogLevel::Error));
        assert!(entries[1].message.starts_with("Attempt 2/3 to pull x:1 failed"));
    }

    #[tokio::test]
    async fn test_stops_at_first_success() {
        let log = RunLog::in_memory();
        let calls = Cell::new(0);
        let policy = RetryPolicy::new(3, Duration::ZERO);

        let outcome = policy
            .run("pull x:1", &log, |attempt| {
                calls.set(calls.get() + 1);
                async move {
                    if attempt < 2 {
                        Err(failing(attempt))
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;

        assert_eq!(outcome.result.unwrap(), 2);
        assert_eq!(outcome.attempts, 2);
        assert_eq!(calls.get(), 2);
        assert_eq!(log.entries().len(), 1);
    }

    #[tokio::test]
    async fn test_zero_budget_still_attempts_once() {
        let log = RunLog::in_memory();
        let outcome = RetryPolicy::new(0, Duration::ZERO)
            .run("noop", &log, |_| async { Ok(()) })
            .await;
        assert!(outcome.result.is_ok());
        assert_eq!(outcome.attempts, 1);
    }

    #[test]
    fn test_backoff_delays() {
        let fixed = RetryPolicy::new(3, Duration::from_secs(5));
        assert_eq!(fixed.delay_after(1), Duration::from_secs(5));
        assert_eq!(fixed.delay_after(2), Duration::from_secs(5));

        let exponential = fixed.with_backoff(Backoff::Exponential);
        assert_eq!(exponential.delay_after(1), Duration::from_secs(5));
        assert_eq!(exponential.delay_after(2), Duration::from_secs(10));
        assert_eq!(exponential.delay_after(3), Duration::from_secs(20));
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.delay_after(1), Duration::from_secs(5));
    }
}
