//! Retry and backoff logic for tablesnap record store adapters
//!
//! Store adapters wrap each remote call in [`with_backoff`] so that throttling
//! and transport hiccups are absorbed below the backup/restore core, which
//! never retries on its own.

use backoff::ExponentialBackoffBuilder;
use futures::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

pub use backoff::backoff::Backoff;
pub use backoff::ExponentialBackoff;

/// Attempts made by [`with_backoff`] before giving up
pub const DEFAULT_MAX_ATTEMPTS: usize = 5;

/// Common retry error types
#[derive(Error, Debug)]
pub enum RetryError {
    #[error("Operation '{operation}' failed after {attempts} attempts: {source}")]
    MaxRetriesExceeded {
        operation: &'static str,
        attempts: usize,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("Permanent error in '{operation}': {source}")]
    Permanent {
        operation: &'static str,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Result type for retry operations
pub type RetryResult<T> = std::result::Result<T, RetryError>;

/// Trait for categorizing errors as transient or permanent
pub trait RetryableError: std::error::Error + Send + Sync + 'static {
    /// Returns true if the error is transient and the operation should be retried
    fn is_transient(&self) -> bool;

    /// Returns true if the error is permanent and retries should stop
    fn is_permanent(&self) -> bool {
        !self.is_transient()
    }
}

/// Execute an operation with the default backoff policy and attempt limit
pub async fn with_backoff<F, Fut, T, E>(op_name: &'static str, f: F) -> RetryResult<T>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: RetryableError,
{
    with_custom_backoff(op_name, default_backoff_policy(), DEFAULT_MAX_ATTEMPTS, f).await
}

/// Execute an operation with a custom backoff policy
///
/// The closure receives the 1-based attempt number. Permanent errors stop
/// immediately; transient errors are retried until either `max_attempts` is
/// reached or the policy's elapsed-time budget runs out.
pub async fn with_custom_backoff<F, Fut, T, E>(
    op_name: &'static str,
    mut policy: ExponentialBackoff,
    max_attempts: usize,
    mut f: F,
) -> RetryResult<T>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: RetryableError,
{
    policy.reset();
    let mut attempt = 1;

    loop {
        debug!("Attempting operation '{}' (attempt {})", op_name, attempt);

        match f(attempt).await {
            Ok(result) => {
                if attempt > 1 {
                    debug!(
                        "Operation '{}' succeeded after {} attempts",
                        op_name, attempt
                    );
                }
                return Ok(result);
            }
            Err(err) if err.is_permanent() => {
                warn!(
                    "Operation '{}' failed permanently on attempt {}: {}",
                    op_name, attempt, err
                );
                return Err(RetryError::Permanent {
                    operation: op_name,
                    source: Box::new(err),
                });
            }
            Err(err) => {
                warn!(
                    "Operation '{}' failed on attempt {}: {}",
                    op_name, attempt, err
                );

                let delay = match policy.next_backoff() {
                    Some(delay) if attempt < max_attempts => delay,
                    _ => {
                        return Err(RetryError::MaxRetriesExceeded {
                            operation: op_name,
                            attempts: attempt,
                            source: Box::new(err),
                        })
                    }
                };

                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Default backoff policy for general operations
pub fn default_backoff_policy() -> ExponentialBackoff {
    ExponentialBackoffBuilder::new()
        .with_initial_interval(Duration::from_millis(100))
        .with_max_interval(Duration::from_secs(5))
        .with_max_elapsed_time(Some(Duration::from_secs(30)))
        .with_multiplier(2.0)
        .build()
}

/// Backoff policy for throttled table writes, where the store keeps asking
/// for a slower pace rather than failing outright
pub fn throughput_backoff_policy() -> ExponentialBackoff {
    ExponentialBackoffBuilder::new()
        .with_initial_interval(Duration::from_millis(500))
        .with_max_interval(Duration::from_secs(10))
        .with_max_elapsed_time(Some(Duration::from_secs(120)))
        .with_multiplier(1.5)
        .build()
}
