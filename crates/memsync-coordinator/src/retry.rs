//! Exponential-backoff retry for individual store calls.

use std::future::Future;
use std::time::Duration;
use tracing::{error, warn};

use crate::types::StoreKind;

/// How many times a store call is attempted and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first; 0 behaves like 1
    pub max_attempts: u32,
    /// Delay after the first failure; doubled after each further failure
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
        }
    }
}

/// Final outcome of a retried call and the number of attempts it took.
#[derive(Debug)]
pub struct Retried<T> {
    pub outcome: anyhow::Result<T>,
    pub attempts: u32,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff: Duration) -> Self {
        Self {
            max_attempts,
            initial_backoff,
        }
    }

    /// Retry immediately, without sleeping between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO)
    }

    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        self.initial_backoff
            .saturating_mul(2u32.saturating_pow(exponent))
    }

    /// Run `call` until it succeeds or the attempt budget is exhausted.
    pub async fn run<T, F, Fut>(&self, store: StoreKind, operation: &str, mut call: F) -> Retried<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let max_attempts = self.attempts();
        let mut attempt = 1;

        loop {
            match call().await {
                Ok(value) => {
                    return Retried {
                        outcome: Ok(value),
                        attempts: attempt,
                    }
                }
                Err(e) if attempt < max_attempts => {
                    let delay = self.delay_after(attempt);
                    warn!(
                        "{} store {} failed (attempt {}/{}), retrying in {:?}: {:#}",
                        store, operation, attempt, max_attempts, delay, e
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
                Err(e) => {
                    error!(
                        "{} store {} failed after {} attempt(s): {:#}",
                        store, operation, attempt, e
                    );
                    return Retried {
                        outcome: Err(e),
                        attempts: attempt,
                    };
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn backoff_doubles_per_attempt() {
        let policy = RetryPolicy::new(4, Duration::from_millis(100));
        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
        assert_eq!(policy.delay_after(3), Duration::from_millis(400));
    }

    #[test]
    fn zero_attempts_still_tries_once() {
        assert_eq!(RetryPolicy::immediate(0).attempts(), 1);
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::immediate(3);

        let retried = policy
            .run(StoreKind::Vector, "insert", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    anyhow::bail!("connection reset");
                }
                Ok("done")
            })
            .await;

        assert_eq!(retried.outcome.unwrap(), "done");
        assert_eq!(retried.attempts, 3);
    }

    #[tokio::test]
    async fn gives_up_after_budget() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::immediate(2);

        let retried: Retried<()> = policy
            .run(StoreKind::Graph, "add", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                anyhow::bail!("graph down")
            })
            .await;

        assert!(retried.outcome.is_err());
        assert_eq!(retried.attempts, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn sleeps_between_attempts() {
        let policy = RetryPolicy::new(3, Duration::from_secs(1));
        let started = tokio::time::Instant::now();

        let retried: Retried<()> = policy
            .run(StoreKind::Vector, "delete", || async { anyhow::bail!("busy") })
            .await;

        assert_eq!(retried.attempts, 3);
        // 1s after the first failure, 2s after the second
        assert!(started.elapsed() >= Duration::from_secs(3));
    }
}
