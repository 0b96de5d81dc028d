//! Retry of transient storage failures.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::config::RetryPolicy;
use crate::error::Error;

/// Run `attempt` until it succeeds, fails permanently or the policy's
/// attempts are used up. Only transient errors are retried, and only when
/// `enabled`.
pub(crate) async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    enabled: bool,
    mut attempt: F,
) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Error>>,
{
    let max_attempts = if enabled { policy.max_attempts.max(1) } else { 1 };
    let mut tries = 1;
    loop {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && tries < max_attempts => {
                let delay = jittered(policy.backoff(tries));
                tracing::warn!(
                    attempt = tries,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
                tries += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// `delay` plus up to half of it again, at random.
fn jittered(delay: Duration) -> Duration {
    let spread = delay.as_millis() as u64 / 2;
    if spread == 0 {
        return delay;
    }
    delay + Duration::from_millis(rand::thread_rng().gen_range(0..=spread))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{MutationError, StorageError};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_backoff: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_retries_transient_until_success() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&fast_policy(), true, || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(Error::from(StorageError::Busy("locked".into())))
            } else {
                Ok(7)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), Error> = with_retry(&fast_policy(), true, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(StorageError::Deadlock("cycle".into()).into())
        })
        .await;
        assert!(result.unwrap_err().is_transient());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_no_retry_when_disabled_or_permanent() {
        let calls = AtomicU32::new(0);
        let _: Result<(), Error> = with_retry(&fast_policy(), false, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(StorageError::Busy("locked".into()).into())
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let calls = AtomicU32::new(0);
        let _: Result<(), Error> = with_retry(&fast_policy(), true, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(MutationError::LimitWithoutOrder { entity: "Entry".into() }.into())
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_jitter_bounds() {
        let base = Duration::from_millis(40);
        for _ in 0..20 {
            let delay = jittered(base);
            assert!(delay >= base && delay <= Duration::from_millis(60));
        }
        assert_eq!(jittered(Duration::from_millis(1)), Duration::from_millis(1));
    }
}
