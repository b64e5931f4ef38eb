// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded retry with configurable backoff.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};
use zapline_config::model::{BackoffStrategy, CredentialsConfig, DispatcherConfig};
use zapline_core::ZaplineError;

/// How many times to try an operation and how long to wait in between.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero is treated as one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff: BackoffStrategy,
    /// Scale each delay by a random factor in `[0.5, 1.0]`.
    pub jitter: bool,
}

impl RetryPolicy {
    /// Policy for durable credential saves and restores.
    pub fn from_credentials(config: &CredentialsConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            backoff: config.backoff,
            jitter: config.jitter,
        }
    }

    /// Policy for recording job outcomes.
    pub fn from_dispatcher(config: &DispatcherConfig) -> Self {
        let base_delay = Duration::from_millis(config.store_base_delay_ms);
        Self {
            max_attempts: config.store_max_attempts,
            base_delay,
            max_delay: base_delay * 8,
            backoff: BackoffStrategy::Exponential,
            jitter: false,
        }
    }

    /// Delay before retry number `attempt` (1-based: the wait after the first failure is `delay_for(1)`).
    ///
    /// Jitter is not applied here so the schedule stays inspectable.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let raw = match self.backoff {
            BackoffStrategy::Linear => self.base_delay.saturating_mul(attempt),
            BackoffStrategy::Exponential => {
                let factor = 2u32.checked_pow(attempt - 1).unwrap_or(u32::MAX);
                self.base_delay.saturating_mul(factor)
            }
            BackoffStrategy::Fixed => self.base_delay,
        };
        raw.min(self.max_delay)
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if !self.jitter || delay.is_zero() {
            return delay;
        }
        let factor = rand::random::<f64>() * 0.5 + 0.5;
        delay.mul_f64(factor)
    }
}

/// Run `f` until it succeeds, returns a non-retryable error, or the policy
/// is exhausted. The last error is returned on exhaustion.
///
/// Only errors for which [`ZaplineError::is_retryable`] holds are retried.
pub async fn retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut f: F,
) -> Result<T, ZaplineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ZaplineError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match f().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(operation, attempt, "succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                let delay = policy.jittered(policy.delay_for(attempt));
                warn!(
                    operation,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                if e.is_retryable() {
                    warn!(operation, attempts = attempt, error = %e, "giving up after retries");
                }
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(backoff: BackoffStrategy) -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(250),
            backoff,
            jitter: false,
        }
    }

    fn storage_err() -> ZaplineError {
        ZaplineError::Storage {
            source: Box::new(std::io::Error::other("database is locked")),
        }
    }

    #[test]
    fn linear_delays_grow_and_cap() {
        let p = policy(BackoffStrategy::Linear);
        assert_eq!(p.delay_for(1), Duration::from_millis(100));
        assert_eq!(p.delay_for(2), Duration::from_millis(200));
        assert_eq!(p.delay_for(3), Duration::from_millis(250));
    }

    #[test]
    fn exponential_delays_double_and_cap() {
        let p = policy(BackoffStrategy::Exponential);
        assert_eq!(p.delay_for(1), Duration::from_millis(100));
        assert_eq!(p.delay_for(2), Duration::from_millis(200));
        assert_eq!(p.delay_for(3), Duration::from_millis(250));
        assert_eq!(p.delay_for(60), Duration::from_millis(250));
    }

    #[test]
    fn fixed_delay_is_constant() {
        let p = policy(BackoffStrategy::Fixed);
        assert_eq!(p.delay_for(1), p.delay_for(5));
    }

    #[test]
    fn jitter_stays_within_half_to_full() {
        let mut p = policy(BackoffStrategy::Fixed);
        p.jitter = true;
        for _ in 0..50 {
            let d = p.jittered(Duration::from_millis(100));
            assert!(d >= Duration::from_millis(50) && d <= Duration::from_millis(100));
        }
    }

    #[test]
    fn credentials_config_maps_to_policy() {
        let config = CredentialsConfig::default();
        let p = RetryPolicy::from_credentials(&config);
        assert_eq!(p.max_attempts, config.max_attempts);
        assert_eq!(p.base_delay, Duration::from_millis(config.base_delay_ms));
        assert_eq!(p.backoff, BackoffStrategy::Linear);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_errors_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let start = tokio::time::Instant::now();

        let result = retry(&policy(BackoffStrategy::Linear), "save", move || {
            let c = Arc::clone(&c);
            async move {
                if c.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(storage_err())
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 100ms after the first failure, 200ms after the second.
        assert_eq!(start.elapsed(), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_returns_last_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);

        let result: Result<(), _> = retry(&policy(BackoffStrategy::Fixed), "restore", move || {
            let c = Arc::clone(&c);
            async move {
                let n = c.fetch_add(1, Ordering::SeqCst);
                Err(ZaplineError::transport(format!("failure {n}")))
            }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result.unwrap_err() {
            ZaplineError::Transport { message, .. } => assert_eq!(message, "failure 2"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_error_fails_fast() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);

        let result: Result<(), _> = retry(&policy(BackoffStrategy::Linear), "save", move || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(ZaplineError::InvalidInput("empty blob".into()))
            }
        })
        .await;

        assert!(matches!(result, Err(ZaplineError::InvalidInput(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_attempts_still_runs_once() {
        let mut p = policy(BackoffStrategy::Linear);
        p.max_attempts = 0;
        let result = retry(&p, "noop", || async { Ok::<_, ZaplineError>("done") }).await;
        assert_eq!(result.unwrap(), "done");
    }
}
