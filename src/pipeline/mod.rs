//! Pipeline stages.
//!
//! Each stage is its own module with one job:
//!
//! * [`input`] — resolve paths, validate PDFs, read bytes
//! * [`parse`] — parsing-service client (PDF bytes → markup)
//! * [`nlp`] — conversion-service client (markup → natural language)
//! * [`store`] — artifact persistence
//!
//! The orchestrator in [`crate::process`] wires these together per document.

pub mod input;
pub mod nlp;
pub mod parse;
pub mod store;

use crate::error::ServiceError;
use std::future::Future;
use tokio::time::{sleep, Duration};
use tracing::warn;

/// Run a remote call with bounded exponential backoff.
///
/// Both service boundaries retry the same way: up to `max_retries` additional
/// attempts on retryable errors, waiting `backoff_ms * 2^(attempt-1)` between
/// them (or the server-specified `Retry-After`, when a rate limit supplies
/// one). Non-retryable errors (auth, malformed response) fail immediately.
///
/// Returns the successful value, or `(attempts_made, last_error)` so callers
/// can record how hard they tried.
pub(crate) async fn with_retries<T, F, Fut>(
    max_retries: u32,
    backoff_ms: u64,
    what: &str,
    mut call: F,
) -> Result<T, (u32, ServiceError)>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ServiceError>>,
{
    let mut last_err: Option<ServiceError> = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = match &last_err {
                Some(ServiceError::RateLimit {
                    retry_after_secs: Some(secs),
                }) => Duration::from_secs(*secs),
                _ => Duration::from_millis(backoff_ms * 2u64.pow(attempt - 1)),
            };
            warn!(
                "{what}: retry {attempt}/{max_retries} after {}ms",
                delay.as_millis()
            );
            sleep(delay).await;
        }

        match call().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                warn!("{what}: attempt {} failed — {e}", attempt + 1);
                let retryable = e.is_retryable();
                last_err = Some(e);
                if !retryable {
                    return Err((attempt + 1, last_err.expect("just set")));
                }
            }
        }
    }

    Err((max_retries + 1, last_err.expect("at least one attempt ran")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_first_try_without_sleeping() {
        let calls = AtomicU32::new(0);
        let out: Result<u32, _> = with_retries(3, 1, "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(42u32) }
        })
        .await;
        assert_eq!(out.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_transient_errors_until_success() {
        let calls = AtomicU32::new(0);
        let out: Result<&str, _> = with_retries(3, 1, "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(ServiceError::Timeout { elapsed_ms: 5 })
                } else {
                    Ok("done")
                }
            }
        })
        .await;
        assert_eq!(out.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_fails_immediately() {
        let calls = AtomicU32::new(0);
        let out: Result<(), _> = with_retries(5, 1, "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(ServiceError::Auth {
                    detail: "bad key".into(),
                })
            }
        })
        .await;
        let (attempts, err) = out.unwrap_err();
        assert_eq!(attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err, ServiceError::Auth { .. }));
    }

    #[tokio::test]
    async fn exhausts_attempts_and_reports_count() {
        let calls = AtomicU32::new(0);
        let out: Result<(), _> = with_retries(2, 1, "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(ServiceError::Transport {
                    detail: "reset".into(),
                })
            }
        })
        .await;
        let (attempts, _) = out.unwrap_err();
        assert_eq!(attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
