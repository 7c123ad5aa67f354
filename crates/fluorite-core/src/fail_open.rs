//! Fail-open utilities for graceful degradation
//!
//! One provider being down must never take the dashboard with it. These helpers
//! run an operation, log its failure via `tracing::warn!`, and hand back `None`
//! so the caller can carry on with the remaining services.
//!
//! Do not use them where the caller needs the error itself (direct adapter
//! calls, configuration validation); those should propagate with `?`.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::Result;

/// Execute an operation that should fail open
///
/// ```no_run
/// use fluorite_core::fail_open::fail_open;
/// use fluorite_core::Result;
///
/// async fn warm_up_cache() -> Result<()> {
///     Ok(())
/// }
///
/// async fn example() {
///     let warmed = fail_open("cache warm-up", || warm_up_cache()).await;
///     // warmed is None if warm_up_cache() failed
/// }
/// ```
pub async fn fail_open<F, Fut, T>(operation_name: &str, f: F) -> Option<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match f().await {
        Ok(val) => Some(val),
        Err(e) => {
            warn!("{} failed (fail-open): {}", operation_name, e);
            None
        }
    }
}

/// Like [`fail_open`] but retries with a linear backoff of `base_delay * attempt`
pub async fn fail_open_with_retries<F, Fut, T>(
    operation_name: &str,
    mut f: F,
    max_retries: usize,
    base_delay: Duration,
) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    for attempt in 1..=max_retries {
        match f().await {
            Ok(val) => return Some(val),
            Err(e) if attempt == max_retries => {
                warn!(
                    "{} failed after {} attempts (fail-open): {}",
                    operation_name, max_retries, e
                );
            }
            Err(e) => {
                warn!(
                    "{} failed (attempt {}/{}): {}",
                    operation_name, attempt, max_retries, e
                );
                tokio::time::sleep(base_delay * attempt as u32).await;
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FluoriteError;

    #[tokio::test]
    async fn test_fail_open_success() {
        let result = fail_open("op", || async { Ok::<_, FluoriteError>(42) }).await;
        assert_eq!(result, Some(42));
    }

    #[tokio::test]
    async fn test_fail_open_failure() {
        let result = fail_open("op", || async {
            Err::<i32, _>(FluoriteError::provider("vercel", "503 Service Unavailable"))
        })
        .await;
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let mut attempts = 0;
        let result = fail_open_with_retries(
            "op",
            || {
                attempts += 1;
                let current = attempts;
                async move {
                    if current < 2 {
                        Err(FluoriteError::Other("transient".to_string()))
                    } else {
                        Ok(current)
                    }
                }
            },
            3,
            Duration::from_millis(1),
        )
        .await;
        assert_eq!(result, Some(2));
        assert_eq!(attempts, 2);
    }

    #[tokio::test]
    async fn test_retries_exhausted() {
        let mut attempts = 0;
        let result = fail_open_with_retries(
            "op",
            || {
                attempts += 1;
                async move { Err::<i32, _>(FluoriteError::Other("persistent".to_string())) }
            },
            3,
            Duration::from_millis(1),
        )
        .await;
        assert_eq!(result, None);
        assert_eq!(attempts, 3);
    }
}
