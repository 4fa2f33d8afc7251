//! Shared retry/backoff primitive: one policy, parameterized by a
//! classifier, reused by the object-store client, the source-DB adapter,
//! and the lock manager. It never retries a permanent error class.

use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub cap: Duration,
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(2),
            cap: Duration::from_secs(30),
            max_attempts: 3,
        }
    }
}

impl BackoffPolicy {
    /// Exponential backoff with full jitter, clamped to `cap`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = self.base.as_millis().saturating_mul(1u128 << attempt.min(20));
        let capped = exp.min(self.cap.as_millis());
        let jittered = rand::thread_rng().gen_range(0..=capped.max(1));
        Duration::from_millis(jittered as u64)
    }
}

/// Whether an error class should be retried at all. Transient classes
/// (network, timeout, deadlock, slow-down, lost heartbeat) retry; permanent
/// classes never do, regardless of remaining budget.
pub trait RetryClassifier<E> {
    fn is_transient(&self, error: &E) -> bool;
}

/// Runs `op` under `policy`, calling `classifier` to decide whether a
/// failure is worth retrying. Returns the last error once attempts are
/// exhausted or the classifier reports a permanent failure.
pub async fn retry_async<T, E, F, Fut, C>(
    policy: BackoffPolicy,
    classifier: &C,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    C: RetryClassifier<E>,
{
    let mut attempt = 0;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt + 1 >= policy.max_attempts || !classifier.is_transient(&err) {
                    return Err(err);
                }
                tokio::time::sleep(policy.delay_for_attempt(attempt)).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysTransient;
    impl RetryClassifier<&'static str> for AlwaysTransient {
        fn is_transient(&self, _error: &&'static str) -> bool {
            true
        }
    }

    struct NeverTransient;
    impl RetryClassifier<&'static str> for NeverTransient {
        fn is_transient(&self, _error: &&'static str) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn retries_up_to_max_attempts() {
        let mut calls = 0;
        let policy = BackoffPolicy {
            base: Duration::from_millis(1),
            cap: Duration::from_millis(5),
            max_attempts: 3,
        };
        let result: Result<(), &'static str> =
            retry_async(policy, &AlwaysTransient, |_attempt| {
                calls += 1;
                async { Err("boom") }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn permanent_errors_never_retry() {
        let mut calls = 0;
        let policy = BackoffPolicy::default();
        let result: Result<(), &'static str> =
            retry_async(policy, &NeverTransient, |_attempt| {
                calls += 1;
                async { Err("fatal") }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn succeeds_without_retry_when_first_attempt_ok() {
        let policy = BackoffPolicy::default();
        let result = retry_async(policy, &AlwaysTransient, |attempt| async move {
            if attempt == 0 {
                Ok::<_, &'static str>(42)
            } else {
                Err("unreachable")
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
    }
}
