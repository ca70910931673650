//! Shared retry utilities for backend operations.
//!
//! Two policies live here: an exponential backoff for transient failures
//! (network errors, remote-side throttling) built on `backon`, and the bounded
//! ladder used when a write is rejected because its version token is stale.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use serde::Deserialize;

/// Initial delay before retrying a transient failure.
pub const TRANSIENT_INITIAL_BACKOFF_MS: u64 = 500;

/// Maximum delay between transient retries.
pub const TRANSIENT_MAX_BACKOFF_MS: u64 = 5_000;

/// Retries for a transient failure before it is surfaced.
pub const TRANSIENT_MAX_RETRIES: usize = 2;

/// First delay of the version-conflict ladder.
pub const CONFLICT_BASE_DELAY_MS: u64 = 1_000;

/// Growth factor of the version-conflict ladder.
pub const CONFLICT_BACKOFF_FACTOR: u32 = 3;

/// Upper bound for a single version-conflict delay.
pub const CONFLICT_MAX_DELAY_MS: u64 = 9_000;

/// Write attempts (first try included) before a conflict becomes terminal.
pub const MAX_WRITE_ATTEMPTS: u32 = 3;

/// Configuration for transient retries.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Minimum delay between retries.
    pub min_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Maximum number of retry attempts.
    pub max_retries: usize,
    /// Whether to add jitter to delays.
    pub with_jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_millis(TRANSIENT_INITIAL_BACKOFF_MS),
            max_delay: Duration::from_millis(TRANSIENT_MAX_BACKOFF_MS),
            max_retries: TRANSIENT_MAX_RETRIES,
            with_jitter: true,
        }
    }
}

impl RetryConfig {
    /// Create a new retry configuration with custom values.
    #[must_use]
    pub fn new(min_delay: Duration, max_delay: Duration, max_retries: usize) -> Self {
        Self {
            min_delay,
            max_delay,
            max_retries,
            with_jitter: true,
        }
    }

    /// Set whether to use jitter.
    #[must_use]
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.with_jitter = jitter;
        self
    }

    /// Build an exponential backoff strategy from this configuration.
    #[must_use]
    pub fn into_backoff(self) -> ExponentialBuilder {
        let mut builder = ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_retries);

        if self.with_jitter {
            builder = builder.with_jitter();
        }

        builder
    }
}

/// Build the default exponential backoff strategy for transient failures.
///
/// # Example
///
/// ```ignore
/// use backon::Retryable;
/// use semsync::retry::default_backoff;
///
/// let result = operation
///     .retry(default_backoff())
///     .when(|e| e.is_transient())
///     .await;
/// ```
#[must_use]
pub fn default_backoff() -> ExponentialBuilder {
    RetryConfig::default().into_backoff()
}

/// Execute an operation, retrying errors `is_retryable` accepts.
///
/// # Arguments
///
/// * `operation` - The async operation to retry.
/// * `is_retryable` - Decides whether an error is transient.
/// * `short_message` - Extracts a short error message for logging.
/// * `label` - What is being retried (usually a path), for logs.
/// * `config` - Backoff settings.
pub async fn with_retry<T, E, F, Fut, IsRetryable, ShortMsg>(
    mut operation: F,
    is_retryable: IsRetryable,
    short_message: ShortMsg,
    label: &str,
    config: RetryConfig,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::error::Error + Send + Sync + 'static,
    IsRetryable: Fn(&E) -> bool + Send + Sync + 'static,
    ShortMsg: Fn(&E) -> String + Send + Sync + 'static,
{
    let label = label.to_string();

    // Track attempt number for logging
    let attempt = AtomicU32::new(0);

    let retry_op = || {
        attempt.fetch_add(1, Ordering::SeqCst);
        operation()
    };

    retry_op
        .retry(config.into_backoff())
        .notify(|err, dur| {
            tracing::debug!(
                path = %label,
                attempt = attempt.load(Ordering::SeqCst),
                delay_ms = dur.as_millis() as u64,
                "Transient failure, retrying: {}",
                short_message(err)
            );
        })
        .when(is_retryable)
        .await
}

/// Delay ladder applied when a write is rejected for a stale version token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ConflictBackoff {
    pub base_delay_ms: u64,
    pub factor: u32,
    pub max_delay_ms: u64,
    pub max_attempts: u32,
}

impl Default for ConflictBackoff {
    fn default() -> Self {
        Self {
            base_delay_ms: CONFLICT_BASE_DELAY_MS,
            factor: CONFLICT_BACKOFF_FACTOR,
            max_delay_ms: CONFLICT_MAX_DELAY_MS,
            max_attempts: MAX_WRITE_ATTEMPTS,
        }
    }
}

impl ConflictBackoff {
    /// Delay after the `attempt`-th rejected write (1-based):
    /// `min(cap, base * factor^(attempt - 1))`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let multiplier = u64::from(self.factor).saturating_pow(exponent);
        let ms = self
            .base_delay_ms
            .saturating_mul(multiplier)
            .min(self.max_delay_ms);
        Duration::from_millis(ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_retry_config_default() {
        let config = RetryConfig::default();

        assert_eq!(config.min_delay, Duration::from_millis(TRANSIENT_INITIAL_BACKOFF_MS));
        assert_eq!(config.max_delay, Duration::from_millis(TRANSIENT_MAX_BACKOFF_MS));
        assert_eq!(config.max_retries, TRANSIENT_MAX_RETRIES);
        assert!(config.with_jitter);
    }

    #[test]
    fn test_retry_config_custom() {
        let config = RetryConfig::new(Duration::from_secs(2), Duration::from_secs(30), 3)
            .with_jitter(false);

        assert_eq!(config.min_delay, Duration::from_secs(2));
        assert_eq!(config.max_retries, 3);
        assert!(!config.with_jitter);
    }

    #[test]
    fn test_conflict_ladder_delays() {
        let ladder = ConflictBackoff::default();
        assert_eq!(ladder.delay_for(1), Duration::from_secs(1));
        assert_eq!(ladder.delay_for(2), Duration::from_secs(3));
        assert_eq!(ladder.delay_for(3), Duration::from_secs(9));
        assert_eq!(ladder.delay_for(4), Duration::from_secs(9));
        assert_eq!(ladder.delay_for(40), Duration::from_secs(9));
        assert_eq!(ladder.max_attempts, 3);
    }

    #[derive(Debug, Clone)]
    struct TestError {
        message: &'static str,
        transient: bool,
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{}", self.message)
        }
    }

    impl std::error::Error for TestError {}

    #[tokio::test(start_paused = true)]
    async fn with_retry_retries_transient_errors() {
        let calls = Arc::new(AtomicU32::new(0));

        // Operation: fail twice with a transient error, then succeed.
        let calls_capture = Arc::clone(&calls);
        let mut operation = move || {
            let calls_capture = Arc::clone(&calls_capture);
            async move {
                let n = calls_capture.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(TestError {
                        message: "connection reset",
                        transient: true,
                    })
                } else {
                    Ok(42u32)
                }
            }
        };

        let result = with_retry(
            &mut operation,
            |e: &TestError| e.transient,
            |e: &TestError| e.to_string(),
            "vocabulary/concepts/a.ttl",
            RetryConfig::default(),
        )
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn with_retry_does_not_retry_permanent_errors() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_capture = Arc::clone(&calls);

        let mut operation = move || {
            let calls_capture = Arc::clone(&calls_capture);
            async move {
                calls_capture.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(TestError {
                    message: "boom",
                    transient: false,
                })
            }
        };

        let err = with_retry(
            &mut operation,
            |e: &TestError| e.transient,
            |e: &TestError| e.to_string(),
            "a.ttl",
            RetryConfig::default(),
        )
        .await
        .expect_err("expected error");

        assert_eq!(err.to_string(), "boom");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
