//! Retry logic.
//!
//! # Responsibilities
//! - Classify raw transport outcomes into [`GovernorError`] variants
//! - Gate every attempt on a rate limiter permit
//! - Retry retryable failures with exponential backoff
//! - Abort promptly when the caller cancels
//!
//! # Design Decisions
//! - Only this module looks at raw status codes
//! - Network errors, timeouts, 429 and 5xx are retryable; other 4xx are not
//! - A request the transport could not issue at all is not retried
//! - Backoff sleeps never consume a permit; the next attempt does
//! - The final error is returned unchanged, never wrapped as "exhausted"

use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::config::RetryConfig;
use crate::error::{CancelStage, GovernorError, GovernorResult};
use crate::observability::metrics;
use crate::resilience::backoff::calculate_backoff;
use crate::resilience::rate_limiter::RateLimiter;
use crate::resilience::timeouts::with_deadline;
use crate::transport::{Transport, TransportError, TransportRequest, TransportResponse};

/// Per-call retry policy.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first. Must be at least 1.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter_ratio: f64,
}

impl RetryPolicy {
    /// Policy with the given attempts and base delay, default cap and no jitter.
    ///
    /// The cap is raised to `base_delay` when the default would undercut it.
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        let defaults = Self::default();
        Self {
            max_attempts,
            base_delay,
            max_delay: defaults.max_delay.max(base_delay),
            jitter_ratio: defaults.jitter_ratio,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            jitter_ratio: config.jitter_ratio,
        }
    }

    /// A single attempt, no retries.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn validate(&self) -> GovernorResult<()> {
        if self.max_attempts == 0 {
            return Err(GovernorError::InvalidRetryPolicy {
                reason: "max_attempts must be at least 1".to_string(),
            });
        }
        if self.max_delay < self.base_delay {
            return Err(GovernorError::InvalidRetryPolicy {
                reason: format!(
                    "max_delay {:?} is below base_delay {:?}",
                    self.max_delay, self.base_delay
                ),
            });
        }
        Ok(())
    }

    /// Delay before the attempt following failed attempt `attempt`.
    ///
    /// A `Retry-After` hint stretches the delay but never past `max_delay`.
    pub fn delay_after(&self, attempt: u32, error: &GovernorError) -> Duration {
        let backoff = calculate_backoff(attempt, self.base_delay, self.max_delay, self.jitter_ratio);
        match error.retry_after() {
            Some(hint) => backoff.max(hint.min(self.max_delay)),
            None => backoff,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// Turn a raw response into the decoded body or a classified error.
pub fn classify_response(url: &str, response: TransportResponse) -> GovernorResult<Value> {
    let status = response.status;
    match status {
        200..=299 => serde_json::from_str(&response.body).map_err(|e| GovernorError::InvalidResponse {
            url: url.to_string(),
            message: e.to_string(),
        }),
        429 => Err(GovernorError::RateLimitExceeded {
            url: url.to_string(),
            retry_after: response.header("retry-after").and_then(parse_retry_after),
        }),
        404 => Err(GovernorError::NotFound {
            target: url.to_string(),
        }),
        500..=599 => Err(GovernorError::ServerError {
            url: url.to_string(),
            status,
        }),
        _ => Err(GovernorError::ClientError {
            url: url.to_string(),
            status,
        }),
    }
}

/// Classify a connection-level failure.
pub fn classify_transport_error(url: &str, error: TransportError) -> GovernorError {
    match error {
        TransportError::Timeout(timeout) => GovernorError::Timeout {
            url: url.to_string(),
            timeout,
        },
        TransportError::Connect(message) | TransportError::Interrupted(message) => GovernorError::NetworkError {
            url: url.to_string(),
            message,
        },
        TransportError::Other(message) => GovernorError::RequestFailed {
            url: url.to_string(),
            message,
        },
    }
}

/// `Retry-After` in delta-seconds form. HTTP-date values are ignored.
fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// Issues one logical call with permits, classification and backoff.
///
/// Borrows the limiter and transport for the duration of a call; owns nothing.
pub struct RetryingExecutor<'a, T: Transport + ?Sized> {
    transport: &'a T,
    limiter: &'a RateLimiter,
    attempt_timeout: Duration,
}

impl<'a, T: Transport + ?Sized> RetryingExecutor<'a, T> {
    pub fn new(transport: &'a T, limiter: &'a RateLimiter, attempt_timeout: Duration) -> Self {
        Self {
            transport,
            limiter,
            attempt_timeout,
        }
    }

    /// Run `request` under `policy` until success, a permanent failure,
    /// exhaustion, or cancellation.
    pub async fn run(
        &self,
        request: &TransportRequest,
        policy: &RetryPolicy,
        cancel: &CancellationToken,
    ) -> GovernorResult<Value> {
        policy.validate()?;
        let url = request.path.as_str();

        for attempt in 0..policy.max_attempts {
            let error = match self.attempt(request, cancel).await {
                Ok(body) => {
                    if attempt > 0 {
                        tracing::info!(url = %url, attempts = attempt + 1, "Request succeeded after retry");
                    }
                    return Ok(body);
                }
                Err(e) => e,
            };

            let last_attempt = attempt + 1 == policy.max_attempts;
            if !error.is_retryable() || last_attempt {
                tracing::warn!(
                    url = %url,
                    attempt = attempt + 1,
                    kind = %error.kind(),
                    retryable = error.is_retryable(),
                    error = %error,
                    "Request failed"
                );
                return Err(error);
            }

            let delay = policy.delay_after(attempt, &error);
            tracing::info!(
                url = %url,
                attempt = attempt + 1,
                delay = ?delay,
                kind = %error.kind(),
                "Retrying request"
            );
            metrics::record_retry(error.kind().as_str());

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(GovernorError::Cancelled { stage: CancelStage::Backoff });
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }

        // max_attempts >= 1 was validated, so the loop always returns.
        Err(GovernorError::InvalidRetryPolicy {
            reason: "retry loop ended without an attempt".to_string(),
        })
    }

    async fn attempt(&self, request: &TransportRequest, cancel: &CancellationToken) -> GovernorResult<Value> {
        let url = request.path.as_str();

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(GovernorError::Cancelled { stage: CancelStage::AwaitingPermit });
            }
            _ = self.limiter.acquire() => {}
        }

        let call = async {
            match self.transport.send(request).await {
                Ok(response) => classify_response(url, response),
                Err(e) => Err(classify_transport_error(url, e)),
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(GovernorError::Cancelled { stage: CancelStage::Transport }),
            result = with_deadline(url, self.attempt_timeout, call) => result,
        }
    }
}
