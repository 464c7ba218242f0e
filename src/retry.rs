//! Retry logic with exponential backoff
//!
//! Transient transfer failures are retried with an exponentially growing delay
//! plus random jitter, so that many clients interrupted by the same origin do
//! not all come back at the same instant.
//!
//! # Example
//!
//! ```no_run
//! use myrient_dl::retry::{IsRetryable, download_with_retry};
//! use myrient_dl::config::RetryConfig;
//!
//! #[derive(Debug)]
//! enum MyError {
//!     Transient,
//!     Permanent,
//! }
//!
//! impl std::fmt::Display for MyError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{:?}", self)
//!     }
//! }
//!
//! impl IsRetryable for MyError {
//!     fn is_retryable(&self) -> bool {
//!         matches!(self, MyError::Transient)
//!     }
//! }
//!
//! # async fn example() -> Result<(), MyError> {
//! let config = RetryConfig::default();
//! let cancel = tokio_util::sync::CancellationToken::new();
//! download_with_retry(&config, &cancel, |_attempt| async {
//!     Ok::<_, MyError>(())
//! }).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::{DownloadError, Error};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (timeouts, truncated bodies, bad statuses) return `true`.
/// Permanent failures (bad configuration, disk errors, cancellation) return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Network(e) => {
                e.is_timeout() || e.is_connect() || e.is_request() || e.is_body() || e.is_decode()
            }
            Error::Download(e) => match e {
                // Any bad status may be a passing server hiccup; attempts bound the retries
                DownloadError::UnexpectedStatus { .. }
                | DownloadError::Truncated { .. }
                | DownloadError::Stalled { .. } => true,
                DownloadError::MissingLength { .. } | DownloadError::LocalLarger { .. } => false,
            },
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::UnexpectedEof
                    | std::io::ErrorKind::Interrupted
            ),
            // Cancellation, configuration, queue state, tool and archive failures are final
            Error::Config { .. }
            | Error::Extraction { .. }
            | Error::Tool(_)
            | Error::MissingArtifact { .. }
            | Error::UnknownCatalog(_)
            | Error::QueueBusy
            | Error::Cancelled
            | Error::ShuttingDown
            | Error::Serialization(_) => false,
        }
    }
}

/// Delay to wait after failed attempt `attempt` (0-indexed)
///
/// `initial_delay * (backoff_multiplier^attempt + jitter)` with jitter drawn
/// from `[0, 1)`, capped at `max_delay`. With the default configuration the
/// result lies in `[2^attempt, 2^attempt + 1)` seconds.
pub fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let jitter = if config.jitter {
        rand::thread_rng().gen_range(0.0..1.0)
    } else {
        0.0
    };
    backoff_delay_with_jitter(config, attempt, jitter)
}

fn backoff_delay_with_jitter(config: &RetryConfig, attempt: u32, jitter: f64) -> Duration {
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let units = config.backoff_multiplier.powi(exponent) + jitter;
    let secs = config.initial_delay.as_secs_f64() * units;
    if !secs.is_finite() || secs >= config.max_delay.as_secs_f64() {
        return config.max_delay;
    }
    Duration::from_secs_f64(secs)
}

/// Execute an async operation with exponential backoff retry logic
///
/// The closure receives the 0-indexed attempt number. `config.max_attempts`
/// bounds the total number of calls; the last error is returned when they are
/// exhausted or when an error is not retryable.
///
/// Backoff waits end early when `cancel` fires. No further attempt is made and
/// the last error is returned; callers check the token to tell the two apart.
pub async fn download_with_retry<F, Fut, T, E>(
    config: &RetryConfig,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match operation(attempt).await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(attempts = attempt + 1, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempt + 1 < max_attempts => {
                let delay = backoff_delay(config, attempt);

                tracing::warn!(
                    error = %e,
                    attempt = attempt + 1,
                    max_attempts,
                    delay_ms = delay.as_millis(),
                    "Download interrupted, retrying"
                );

                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::info!(error = %e, "Retry abandoned, cancellation requested");
                        return Err(e);
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
                attempt += 1;
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::error!(
                        error = %e,
                        attempts = attempt + 1,
                        "Operation failed after all retry attempts exhausted"
                    );
                } else {
                    tracing::error!(error = %e, "Operation failed with non-retryable error");
                }
                return Err(e);
            }
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    enum TestError {
        Transient,
        Permanent,
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                TestError::Transient => write!(f, "transient error"),
                TestError::Permanent => write!(f, "permanent error"),
            }
        }
    }

    impl IsRetryable for TestError {
        fn is_retryable(&self) -> bool {
            matches!(self, TestError::Transient)
        }
    }

    fn fast_config(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            jitter: false,
        }
    }

    #[test]
    fn default_backoff_lies_in_expected_window() {
        let config = RetryConfig::default();
        for attempt in 0..8 {
            let lower = 2f64.powi(attempt as i32);
            for _ in 0..20 {
                let delay = backoff_delay(&config, attempt).as_secs_f64();
                assert!(
                    delay >= lower && delay < lower + 1.0,
                    "attempt {} delay {} outside [{}, {})",
                    attempt,
                    delay,
                    lower,
                    lower + 1.0
                );
            }
        }
    }

    #[test]
    fn backoff_edges_of_jitter_window() {
        let config = RetryConfig::default();
        assert_eq!(
            backoff_delay_with_jitter(&config, 3, 0.0),
            Duration::from_secs(8)
        );
        let almost = backoff_delay_with_jitter(&config, 3, 0.999);
        assert!(almost < Duration::from_secs(9));
    }

    #[test]
    fn backoff_is_capped() {
        let config = RetryConfig::default();
        assert_eq!(backoff_delay(&config, 20), config.max_delay);
        assert_eq!(backoff_delay(&config, u32::MAX), config.max_delay);
    }

    #[tokio::test]
    async fn success_does_not_retry() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = download_with_retry(&fast_config(3), &CancellationToken::new(), |_| {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, TestError>(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transient_then_success() {
        let result = download_with_retry(&fast_config(5), &CancellationToken::new(), |attempt| async move {
            if attempt < 2 {
                Err(TestError::Transient)
            } else {
                Ok(attempt)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2, "third attempt should succeed");
    }

    #[tokio::test]
    async fn max_attempts_bounds_total_calls() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = download_with_retry(&fast_config(3), &CancellationToken::new(), |_| {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<i32, _>(TestError::Transient)
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_error_is_not_retried() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = download_with_retry(&fast_config(5), &CancellationToken::new(), |_| {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<i32, _>(TestError::Permanent)
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn waits_between_attempts() {
        let start = std::time::Instant::now();
        let _ = download_with_retry(&fast_config(3), &CancellationToken::new(), |_| async {
            Err::<(), _>(TestError::Transient)
        })
        .await;

        // 5ms + 10ms between three attempts
        assert!(start.elapsed() >= Duration::from_millis(15));
    }

    #[tokio::test]
    async fn cancellation_cuts_backoff_short() {
        let config = RetryConfig {
            max_attempts: 5,
            initial_delay: Duration::from_secs(30),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter: false,
        };
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();
        let start = std::time::Instant::now();
        let result = download_with_retry(&config, &cancel, |_| {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(TestError::Transient)
            }
        })
        .await;

        assert!(matches!(result, Err(TestError::Transient)));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn error_classification() {
        let truncated = Error::Download(DownloadError::Truncated {
            received: 1,
            total: 2,
        });
        let not_found = Error::Download(DownloadError::UnexpectedStatus {
            status: 404,
            url: "u".into(),
        });
        let busy = Error::Download(DownloadError::UnexpectedStatus {
            status: 503,
            url: "u".into(),
        });
        let local_larger = Error::Download(DownloadError::LocalLarger {
            local: 2,
            remote: 1,
            url: "u".into(),
        });
        assert!(truncated.is_retryable());
        assert!(busy.is_retryable());
        assert!(not_found.is_retryable());
        assert!(!local_larger.is_retryable());
        assert!(!Error::Cancelled.is_retryable());
        assert!(Error::Io(std::io::Error::from(std::io::ErrorKind::TimedOut)).is_retryable());
        assert!(!Error::Io(std::io::Error::from(std::io::ErrorKind::NotFound)).is_retryable());
    }
}
