// ABOUTME: Bounded exponential backoff for collaborator calls.
// ABOUTME: Only transient errors are retried; fatal ones return immediately.

use std::fmt::Display;
use std::future::Future;
use tracing::warn;

use crate::config::RetryConfig;
use crate::router::RoutingError;
use crate::scheduler::SchedulerError;

use super::signal::CancelSignal;

/// Errors that say whether repeating the call could help.
pub(crate) trait Transient {
    fn is_transient(&self) -> bool;
}

impl Transient for SchedulerError {
    fn is_transient(&self) -> bool {
        SchedulerError::is_transient(self)
    }
}

impl Transient for RoutingError {
    fn is_transient(&self) -> bool {
        RoutingError::is_transient(self)
    }
}

#[derive(Debug)]
pub(crate) enum RetryError<E> {
    Fatal(E),
    Exhausted { attempts: u32, last: E },
    Cancelled,
}

/// Run `op` until it succeeds, fails fatally, or runs out of attempts.
/// A cancellation signal, when given, interrupts the wait between attempts.
pub(crate) async fn with_backoff<T, E, F, Fut>(
    retry: &RetryConfig,
    cancel: Option<&CancelSignal>,
    operation: &str,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Transient + Display,
{
    let mut attempt = 1;
    loop {
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        if !err.is_transient() {
            return Err(RetryError::Fatal(err));
        }
        if attempt >= retry.max_attempts {
            return Err(RetryError::Exhausted {
                attempts: attempt,
                last: err,
            });
        }

        let delay = retry.backoff(attempt);
        warn!(
            operation,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "transient failure, retrying"
        );
        match cancel {
            Some(cancel) => {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            None => tokio::time::sleep(delay).await,
        }
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio::time::Instant;

    fn retry(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let start = Instant::now();
        let result: Result<u32, RetryError<SchedulerError>> =
            with_backoff(&retry(5), None, "poll", || async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(SchedulerError::Unavailable("throttled".into()))
                } else {
                    Ok(n)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 1s then 2s of backoff
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), RetryError<SchedulerError>> =
            with_backoff(&retry(5), None, "launch", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(SchedulerError::ImageNotFound("app:v9".into()))
            })
            .await;

        assert!(matches!(result, Err(RetryError::Fatal(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_reports_attempts() {
        let result: Result<(), RetryError<RoutingError>> =
            with_backoff(&retry(3), None, "promote", || async {
                Err(RoutingError::Unavailable("503".into()))
            })
            .await;

        match result {
            Err(RetryError::Exhausted { attempts, .. }) => assert_eq!(attempts, 3),
            other => panic!("expected exhaustion, got {other:?}"),
        }
    }
}
