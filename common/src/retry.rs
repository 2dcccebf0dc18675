//! Bounded retry with exponential backoff.
//!
//! Transient pod I/O (network hiccups, throttling) is retried a fixed number
//! of times before the error surfaces. Not-found conditions are never
//! retried; the caller decides what counts as transient.

use std::future::Future;
use std::time::Duration;

/// Retry policy: `attempts` total tries, sleeping `base * 2^n` between them.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    pub attempts: u32,
    pub base: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            attempts: 3,
            base: Duration::from_millis(100),
        }
    }
}

impl Backoff {
    /// Runs `op` until it succeeds, the error is not retryable, or the
    /// attempt budget is exhausted.
    pub async fn run<T, E, F, Fut, R>(&self, mut op: F, retryable: R) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        R: Fn(&E) -> bool,
    {
        let mut delay = self.base;
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < self.attempts && retryable(&err) => {
                    tracing::debug!(attempt, "retrying after transient error");
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn should_return_first_success() {
        // given
        let calls = AtomicU32::new(0);

        // when
        let result: Result<u32, ()> = Backoff::default()
            .run(
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Ok(7) }
                },
                |_| true,
            )
            .await;

        // then
        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn should_retry_transient_errors_up_to_budget() {
        // given
        let calls = AtomicU32::new(0);
        let backoff = Backoff {
            attempts: 3,
            base: Duration::from_millis(1),
        };

        // when
        let result: Result<(), &str> = backoff
            .run(
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err("flaky") }
                },
                |_| true,
            )
            .await;

        // then
        assert_eq!(result, Err("flaky"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn should_not_retry_permanent_errors() {
        // given
        let calls = AtomicU32::new(0);

        // when
        let result: Result<(), &str> = Backoff::default()
            .run(
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err("not found") }
                },
                |_| false,
            )
            .await;

        // then
        assert_eq!(result, Err("not found"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn should_succeed_after_transient_failures() {
        // given
        let calls = AtomicU32::new(0);
        let backoff = Backoff {
            attempts: 3,
            base: Duration::from_millis(1),
        };

        // when
        let result: Result<u32, &str> = backoff
            .run(
                || {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if n < 2 {
                            Err("flaky")
                        } else {
                            Ok(42)
                        }
                    }
                },
                |_| true,
            )
            .await;

        // then
        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
