//! A single retry policy shared by every "wait until eventually available" loop in the
//! provisioner stack: invoke a fallible async callback immediately, then on a fixed period until
//! either it succeeds or the caller's [`CancellationToken`] fires.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Default period between retries when none is given.
pub const DEFAULT_PERIOD: Duration = Duration::from_secs(1);

/// Error returned by [`retry_forever`] when the cancellation token fires before `f` succeeds.
#[derive(Debug, thiserror::Error)]
#[error("retry cancelled after {attempts} attempt(s); last error: {last_error}")]
pub struct Cancelled<E: fmt::Display> {
    pub attempts: u64,
    pub last_error: E,
}

/// Invokes `f` immediately; if it returns `Err`, waits `period` and retries until `f` returns
/// `Ok` or `token` is cancelled. On cancellation, returns [`Cancelled`] carrying the most recent
/// callback error so the caller can still classify the failure.
pub async fn retry_forever<F, Fut, T, E>(
    token: &CancellationToken,
    period: Duration,
    mut f: F,
) -> Result<T, Cancelled<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    let mut attempts: u64 = 0;
    let mut last_error: Option<E> = None;
    loop {
        attempts += 1;
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                debug!(attempts, error = %e, "retry_forever: attempt failed, will retry");
                last_error = Some(e);
            }
        }

        tokio::select! {
            _ = token.cancelled() => {
                return Err(Cancelled {
                    attempts,
                    // last_error is always populated by this point
                    last_error: last_error.expect("at least one attempt was made"),
                });
            }
            _ = tokio::time::sleep(period) => {}
        }
    }
}

/// Convenience wrapper over [`retry_forever`] using [`DEFAULT_PERIOD`].
pub async fn retry_forever_default<F, Fut, T, E>(
    token: &CancellationToken,
    f: F,
) -> Result<T, Cancelled<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    retry_forever(token, DEFAULT_PERIOD, f).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn succeeds_on_first_try() {
        let token = CancellationToken::new();
        let result = retry_forever(&token, Duration::from_millis(1), || async { Ok::<_, String>(42) })
            .await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn retries_until_success() {
        let token = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));
        let result = retry_forever(&token, Duration::from_millis(1), || {
            let calls = calls.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 3 {
                    Err("not yet".to_string())
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn cancellation_carries_last_error() {
        let token = CancellationToken::new();
        let token_clone = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            token_clone.cancel();
        });

        let result = retry_forever(&token, Duration::from_millis(50), || async {
            Err::<(), _>("still broken")
        })
        .await;

        let err = result.unwrap_err();
        assert_eq!(err.last_error, "still broken");
        assert!(err.attempts >= 1);
    }
}
