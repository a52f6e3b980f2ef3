//! `with_retry` — exponential backoff retry, grounded in
//! `original_source/src/core/utils/error_recovery.py`'s `with_retry`.

use std::time::Duration;

use tracing::warn;

use crate::error::CoreError;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub exponential_base: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            exponential_base: 2.0,
        }
    }
}

impl RetryPolicy {
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let scaled = self.base_delay.as_secs_f64() * self.exponential_base.powi(attempt as i32 - 1);
        Duration::from_secs_f64(scaled.min(self.max_delay.as_secs_f64()))
    }
}

/// Retry `f` under `policy`. `f` is retried on every `Err` it returns
/// (callers filter non-retryable failures out before calling this, since
/// `CoreError` doesn't distinguish retryability itself). On exhaustion,
/// returns `RetryExhausted` wrapping the last failure.
pub fn with_retry<T>(policy: RetryPolicy, mut f: impl FnMut() -> Result<T, CoreError>) -> Result<T, CoreError> {
    let mut last_err = None;
    for attempt in 1..=policy.max_attempts {
        match f() {
            Ok(v) => return Ok(v),
            Err(e) => {
                if attempt == policy.max_attempts {
                    return Err(CoreError::RetryExhausted {
                        attempts: policy.max_attempts,
                        source: anyhow::anyhow!(e),
                    });
                }
                let delay = policy.delay_for_attempt(attempt);
                warn!(attempt, max_attempts = policy.max_attempts, ?delay, error = %e, "retrying");
                last_err = Some(e);
                std::thread::sleep(delay);
            }
        }
    }
    // Unreachable when max_attempts >= 1, kept for totality.
    Err(CoreError::RetryExhausted {
        attempts: policy.max_attempts,
        source: anyhow::anyhow!(last_err.map(|e| e.to_string()).unwrap_or_default()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn succeeds_without_retry_when_first_attempt_ok() {
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            ..Default::default()
        };
        let result = with_retry(policy, || Ok::<_, CoreError>(42));
        assert_eq!(result.unwrap(), 42);
    }

    #[test]
    fn retries_until_success() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            exponential_base: 2.0,
        };
        let result = with_retry(policy, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(CoreError::ConfigInvalid("transient".into()))
            } else {
                Ok(n)
            }
        });
        assert_eq!(result.unwrap(), 2);
    }

    #[test]
    fn exhaustion_wraps_last_failure() {
        let policy = RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            exponential_base: 2.0,
        };
        let result: Result<(), _> = with_retry(policy, || Err(CoreError::ConfigInvalid("nope".into())));
        assert!(matches!(result, Err(CoreError::RetryExhausted { attempts: 2, .. })));
    }

    #[test]
    fn delay_is_capped_at_max_delay() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(4),
            exponential_base: 10.0,
        };
        assert_eq!(policy.delay_for_attempt(5), Duration::from_secs(4));
    }
}
