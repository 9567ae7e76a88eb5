use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;

use crate::errors::RelqError;

/// Runs `f` until it succeeds or `max_attempts` total calls have failed,
/// sleeping `delay` between attempts.
///
/// The count includes the first call: `max_attempts = 3` means three calls,
/// not one plus three retries. The final failure is wrapped into
/// [`RelqError::MaxRetries`] carrying the last error's message.
pub async fn retry<F, Fut, T, E>(
    mut f: F,
    max_attempts: u32,
    delay: Duration,
) -> Result<T, RelqError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempt = 0;

    loop {
        attempt += 1;

        match f().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt >= max_attempts => {
                return Err(RelqError::MaxRetries {
                    attempts: max_attempts,
                    message: e.to_string(),
                });
            }
            Err(_) => sleep(delay).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn returns_the_first_success_without_further_calls() {
        let calls = AtomicU32::new(0);

        let result = retry(
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(42)
            },
            3,
            Duration::ZERO,
        )
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn keeps_trying_until_an_attempt_succeeds() {
        let calls = AtomicU32::new(0);

        let result = retry(
            || async {
                let call = calls.fetch_add(1, Ordering::SeqCst);
                if call < 2 {
                    Err("not yet".to_string())
                } else {
                    Ok(call)
                }
            },
            5,
            Duration::ZERO,
        )
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn max_attempts_counts_total_calls_and_wraps_the_last_error() {
        let calls = AtomicU32::new(0);

        let result = retry(
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>("boom".to_string())
            },
            3,
            Duration::ZERO,
        )
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let error = result.unwrap_err();
        assert_eq!(
            error.to_string(),
            "Function failed after 3 retries: boom"
        );
    }

    #[tokio::test]
    async fn single_attempt_fails_without_sleeping() {
        let result = retry(
            || async { Err::<(), _>("boom") },
            1,
            Duration::from_secs(3600),
        )
        .await;

        assert_eq!(
            result.unwrap_err().to_string(),
            "Function failed after 1 retries: boom"
        );
    }
}
