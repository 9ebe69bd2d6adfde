//! Fixed-delay retry for side-effecting calls.
//!
//! An attempt succeeds when its outcome carries no HTTP status or a status
//! below 400. Failed outcomes and transport errors are retried after a fixed
//! delay. When attempts run out the last outcome is handed back unchanged, so
//! callers must inspect its status themselves.

use std::future::Future;
use std::time::Duration;

use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, warn};

use super::error::{ApiError, Result};
use super::reply::Reply;

/// Status at and above which an outcome counts as a failure.
pub const FAILURE_THRESHOLD: u16 = 400;

/// Attempt count and delay for [`with_retry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first.
    pub attempts: u32,
    /// Delay between attempts.
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(1000))
    }
}

/// Outcomes that may carry an HTTP status.
pub trait Retryable {
    fn status_code(&self) -> Option<u16>;

    fn is_failure(&self) -> bool {
        self.status_code()
            .map(|status| status >= FAILURE_THRESHOLD)
            .unwrap_or(false)
    }
}

impl Retryable for Reply {
    fn status_code(&self) -> Option<u16> {
        Some(self.status())
    }
}

impl Retryable for Value {
    /// Reads the numeric `statusCode` field of an envelope.
    fn status_code(&self) -> Option<u16> {
        self.get("statusCode")
            .and_then(Value::as_u64)
            .and_then(|code| u16::try_from(code).ok())
    }
}

/// Run `work` until it succeeds or `policy.attempts` is exhausted.
///
/// Returns the first accepted outcome, otherwise the last one obtained. If
/// every attempt failed with an error, the last error is returned.
pub async fn with_retry<F, Fut, T>(policy: &RetryPolicy, operation: &str, mut work: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    T: Retryable,
{
    let attempts = policy.attempts.max(1);
    let mut last = None;

    for attempt in 1..=attempts {
        match work().await {
            Ok(outcome) if !outcome.is_failure() => return Ok(outcome),
            Ok(outcome) => {
                warn!(
                    operation,
                    attempt,
                    status = outcome.status_code().unwrap_or_default(),
                    "Attempt failed"
                );
                last = Some(Ok(outcome));
            }
            Err(e) => {
                warn!(operation, attempt, "Attempt errored: {}", e);
                last = Some(Err(e));
            }
        }

        if attempt < attempts {
            debug!(operation, "Retrying in {:?}", policy.delay);
            sleep(policy.delay).await;
        }
    }

    // attempts >= 1, so the loop ran at least once
    last.unwrap_or_else(|| {
        Err(ApiError::InvalidResponse(format!(
            "{}: no attempt was made",
            operation
        )))
    })
}
