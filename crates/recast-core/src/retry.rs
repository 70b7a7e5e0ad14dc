//! Bounded retry combinator and backoff schedules.
//!
//! Two consumers share these schedules:
//!
//! - Object storage transfers retry throttled calls with a [`Backoff::Fixed`]
//!   pause under a small attempt budget ([`RetryPolicy::transfer`]).
//! - The query waiter polls with a [`Backoff::LinearCapped`] schedule, where
//!   the delay grows by one step per poll until it reaches the cap.
//!
//! Schedules are pure: `delay(attempt)` depends only on the attempt number,
//! so a fresh wait or retry always starts from the smallest delay.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Default attempt budget for transient storage failures.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default pause between storage retry attempts.
pub const DEFAULT_RETRY_PAUSE: Duration = Duration::from_secs(1);

/// Delay schedule between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// The same pause before every retry.
    Fixed(Duration),
    /// `step * attempt`, never exceeding `max`.
    LinearCapped {
        /// Increment added per attempt.
        step: Duration,
        /// Upper bound on any single delay.
        max: Duration,
    },
}

impl Backoff {
    /// Returns the delay to apply after the given attempt (1-indexed).
    ///
    /// Attempt `0` always yields a zero delay.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        match *self {
            Self::Fixed(pause) => pause,
            Self::LinearCapped { step, max } => step.saturating_mul(attempt).min(max),
        }
    }

    /// Returns an endless iterator over successive delays, starting at attempt 1.
    #[must_use]
    pub const fn schedule(self) -> Schedule {
        Schedule {
            backoff: self,
            attempt: 0,
        }
    }
}

/// Iterator over the delays of a [`Backoff`].
#[derive(Debug, Clone)]
pub struct Schedule {
    backoff: Backoff,
    attempt: u32,
}

impl Iterator for Schedule {
    type Item = Duration;

    fn next(&mut self) -> Option<Self::Item> {
        self.attempt = self.attempt.saturating_add(1);
        Some(self.backoff.delay(self.attempt))
    }
}

/// How many times to try an operation and how long to pause in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Pause schedule between attempts.
    pub backoff: Backoff,
}

impl RetryPolicy {
    /// Creates a new retry policy.
    #[must_use]
    pub const fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    /// Policy for object storage transfers: 5 attempts, 1 second apart.
    #[must_use]
    pub const fn transfer() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, Backoff::Fixed(DEFAULT_RETRY_PAUSE))
    }

    /// Policy that never retries.
    #[must_use]
    pub const fn none() -> Self {
        Self::new(1, Backoff::Fixed(Duration::ZERO))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::transfer()
    }
}

/// Runs `op` until it succeeds, fails with a non-retryable error, or the
/// attempt budget is spent.
///
/// When the budget is exhausted the last error is returned unchanged.
///
/// # Errors
///
/// Returns the error of the final attempt.
pub async fn retry<T, E, F, Fut, P>(policy: &RetryPolicy, is_retryable: P, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(error) if attempt < max_attempts && is_retryable(&error) => {
                let delay = policy.backoff.delay(attempt);
                tracing::warn!(
                    attempt,
                    max_attempts,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %error,
                    "retrying after transient failure"
                );
                tokio::time::sleep(delay).await;
            }
            Err(error) => return Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn linear_capped_grows_then_plateaus() {
        let backoff = Backoff::LinearCapped {
            step: Duration::from_secs(1),
            max: Duration::from_secs(3),
        };
        let delays: Vec<u64> = backoff.schedule().take(6).map(|d| d.as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 3, 3, 3, 3]);
    }

    #[test]
    fn fixed_backoff_is_constant() {
        let backoff = Backoff::Fixed(Duration::from_millis(250));
        assert_eq!(backoff.delay(0), Duration::ZERO);
        assert_eq!(backoff.delay(1), Duration::from_millis(250));
        assert_eq!(backoff.delay(9), Duration::from_millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_recovers_from_transient_failures() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, Error> = retry(&RetryPolicy::transfer(), Error::is_retryable, || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    Err(Error::transient("SlowDown"))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.expect("third attempt succeeds"), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_gives_up_after_budget() {
        let calls = AtomicU32::new(0);
        let started = tokio::time::Instant::now();
        let result: Result<(), Error> = retry(&RetryPolicy::transfer(), Error::is_retryable, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::transient("503 Service Unavailable")) }
        })
        .await;

        assert!(matches!(result, Err(Error::Transient { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), DEFAULT_MAX_ATTEMPTS);
        // Four pauses of one second between five attempts.
        assert_eq!(started.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test]
    async fn retry_does_not_repeat_fatal_errors() {
        let calls = AtomicU32::new(0);
        let result: Result<(), Error> = retry(&RetryPolicy::transfer(), Error::is_retryable, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::storage("access denied")) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
