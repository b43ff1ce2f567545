//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap each transport attempt with a deadline
//! - Report an expired deadline as a distinct, retryable `Timeout`
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities; the inner future is dropped on expiry
//! - Applies per attempt, never across retries or backoff

use std::future::Future;
use std::time::Duration;

use tokio::time::timeout;

use crate::error::{GovernorError, GovernorResult};

/// Run `fut` with a deadline, mapping expiry to [`GovernorError::Timeout`].
pub async fn with_deadline<F, T>(url: &str, deadline: Duration, fut: F) -> GovernorResult<T>
where
    F: Future<Output = GovernorResult<T>>,
{
    match timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(url = %url, timeout_ms = deadline.as_millis() as u64, "Transport deadline exceeded");
            Err(GovernorError::Timeout {
                url: url.to_string(),
                timeout: deadline,
            })
        }
    }
}
