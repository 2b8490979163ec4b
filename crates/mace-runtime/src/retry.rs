//! Retry policies and async retry helper used by the submit service for
//! bounded `JobSubmissionError` backoff (spec §4.2/§7).

use mace_core::error::{MaceError, MaceResult};
use std::future::Future;
use std::time::Duration;

/// Delay strategy between retry attempts.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RetryPolicy {
    /// Same delay every attempt.
    Fixed { delay_ms: u64 },
    /// Delay increases linearly: `base_ms * attempt`.
    Linear { base_ms: u64 },
    /// Exponential backoff capped at `max_ms`, with optional deterministic
    /// jitter (a ±12.5% alternation — avoids every retrying caller waking
    /// on the exact same tick without pulling in a randomness dependency).
    ExponentialBackoff { base_ms: u64, max_ms: u64, jitter: bool },
}

impl RetryPolicy {
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let ms = match self {
            RetryPolicy::Fixed { delay_ms } => *delay_ms,
            RetryPolicy::Linear { base_ms } => base_ms.saturating_mul((attempt + 1) as u64),
            RetryPolicy::ExponentialBackoff { base_ms, max_ms, jitter } => {
                let exp = 1u64
                    .checked_shl(attempt as u32)
                    .and_then(|s| base_ms.checked_mul(s))
                    .unwrap_or(*max_ms);
                let capped = exp.min(*max_ms);
                if *jitter {
                    let eighth = capped / 8;
                    if attempt % 2 == 0 {
                        capped.saturating_add(eighth).min(*max_ms)
                    } else {
                        capped.saturating_sub(eighth)
                    }
                } else {
                    capped
                }
            }
        };
        Duration::from_millis(ms)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::Fixed { delay_ms: 60_000 }
    }
}

/// How many attempts to make and which [`RetryPolicy`] to use.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RetryConfig {
    pub max_attempts: usize,
    pub policy: RetryPolicy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_attempts: 1, policy: RetryPolicy::default() }
    }
}

impl RetryConfig {
    /// The submit-service default: 3 attempts, 60-second fixed delay (spec §4.2).
    pub fn submit_default() -> Self {
        Self { max_attempts: 3, policy: RetryPolicy::Fixed { delay_ms: 60_000 } }
    }
}

/// Retry `f` up to `config.max_attempts` times, honoring `is_retryable` to
/// abort early on non-transient errors.
pub async fn retry_with_policy<F, Fut, T>(
    config: &RetryConfig,
    is_retryable: impl Fn(&MaceError) -> bool,
    mut f: F,
) -> MaceResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = MaceResult<T>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut last_err = None;

    for attempt in 0..max_attempts {
        if attempt > 0 {
            tokio::time::sleep(config.policy.delay_for(attempt - 1)).await;
        }
        match f().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                if !is_retryable(&e) {
                    return Err(e);
                }
                last_err = Some(e);
            }
        }
    }

    Err(last_err.unwrap_or_else(|| MaceError::JobSubmission("no attempts made".into())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn fixed_policy_delay_is_constant() {
        let p = RetryPolicy::Fixed { delay_ms: 500 };
        assert_eq!(p.delay_for(0), Duration::from_millis(500));
        assert_eq!(p.delay_for(5), Duration::from_millis(500));
    }

    #[test]
    fn exponential_policy_caps_at_max() {
        let p = RetryPolicy::ExponentialBackoff { base_ms: 100, max_ms: 800, jitter: false };
        assert_eq!(p.delay_for(0), Duration::from_millis(100));
        assert_eq!(p.delay_for(1), Duration::from_millis(200));
        assert_eq!(p.delay_for(3), Duration::from_millis(800));
    }

    #[tokio::test]
    async fn succeeds_on_second_attempt() {
        let call_count = Arc::new(AtomicUsize::new(0));
        let cc = call_count.clone();
        let config = RetryConfig { max_attempts: 3, policy: RetryPolicy::Fixed { delay_ms: 0 } };

        let result = retry_with_policy(
            &config,
            |_e| true,
            || {
                let cc = cc.clone();
                async move {
                    let n = cc.fetch_add(1, Ordering::SeqCst);
                    if n == 0 {
                        Err(MaceError::JobSubmission("busy".into()))
                    } else {
                        Ok(42u32)
                    }
                }
            },
        )
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(call_count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn aborts_immediately_on_non_retryable() {
        let call_count = Arc::new(AtomicUsize::new(0));
        let cc = call_count.clone();
        let config = RetryConfig { max_attempts: 5, policy: RetryPolicy::Fixed { delay_ms: 0 } };

        let result: MaceResult<u32> = retry_with_policy(
            &config,
            |_e| false,
            || {
                let cc = cc.clone();
                async move {
                    cc.fetch_add(1, Ordering::SeqCst);
                    Err(MaceError::Configuration("bad config".into()))
                }
            },
        )
        .await;

        assert!(result.is_err());
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }
}
