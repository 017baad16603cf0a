//! Bounded retry for transient failures.

use crate::config::RetryPolicy;
use crate::error::Result;
use std::future::Future;
use tracing::warn;

/// Run `operation` until it succeeds, fails permanently, or runs out of
/// retries. `attempts` is set to the number of tries made.
pub async fn retry_transient<T, F, Fut>(
    policy: &RetryPolicy,
    what: &str,
    attempts: &mut u32,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut retry = 0;
    loop {
        *attempts = retry + 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && retry < policy.max_retries => {
                retry += 1;
                let delay = policy.backoff_for(retry);
                warn!(
                    "{} failed ({}), retry {}/{} in {:?}",
                    what, e, retry, policy.max_retries, delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, SnowexError};
    use std::time::Duration;

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            backoff_ms: 1,
            max_backoff_ms: 4,
        }
    }

    fn transient() -> SnowexError {
        SnowexError::Timeout {
            operation: "test".to_string(),
            elapsed: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let mut calls = 0;
        let mut attempts = 0;
        let result = retry_transient(&policy(3), "op", &mut attempts, || {
            calls += 1;
            let fail = calls < 3;
            async move { if fail { Err(transient()) } else { Ok(calls) } }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let mut attempts = 0;
        let err = retry_transient(&policy(2), "op", &mut attempts, || async {
            Err::<(), _>(transient())
        })
        .await
        .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn test_permanent_errors_are_not_retried() {
        let mut attempts = 0;
        let err = retry_transient(&policy(5), "op", &mut attempts, || async {
            Err::<(), _>(SnowexError::fatal("constraint"))
        })
        .await
        .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::PersistenceFatalError);
        assert_eq!(attempts, 1);
    }
}
