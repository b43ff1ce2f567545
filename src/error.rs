//! Classified errors produced by the governance layer.
//!
//! Every failure that leaves the crate is a [`GovernorError`]. Raw HTTP
//! status codes and transport failures are turned into variants exactly once,
//! at the transport/classifier boundary (see [`crate::resilience::retries`]);
//! everything above that boundary only looks at the variant.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::governor::Resource;

/// Stable, serializable error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    RateLimitExceeded,
    ServerError,
    NetworkError,
    Timeout,
    NotFound,
    ClientError,
    PaginationLimitExceeded,
    Cancelled,
    InvalidRetryPolicy,
    InvalidResponse,
    RequestFailed,
}

impl ErrorKind {
    /// Label used for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::RateLimitExceeded => "rate_limit_exceeded",
            ErrorKind::ServerError => "server_error",
            ErrorKind::NetworkError => "network_error",
            ErrorKind::Timeout => "timeout",
            ErrorKind::NotFound => "not_found",
            ErrorKind::ClientError => "client_error",
            ErrorKind::PaginationLimitExceeded => "pagination_limit_exceeded",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::InvalidRetryPolicy => "invalid_retry_policy",
            ErrorKind::InvalidResponse => "invalid_response",
            ErrorKind::RequestFailed => "request_failed",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pagination parameter that violated a ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PaginationField {
    Offset,
    Limit,
}

impl fmt::Display for PaginationField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaginationField::Offset => f.write_str("offset"),
            PaginationField::Limit => f.write_str("limit"),
        }
    }
}

/// Suspension point at which a caller abandoned a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelStage {
    AwaitingPermit,
    Transport,
    Backoff,
}

impl fmt::Display for CancelStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelStage::AwaitingPermit => f.write_str("awaiting a rate limit permit"),
            CancelStage::Transport => f.write_str("awaiting the transport"),
            CancelStage::Backoff => f.write_str("backing off between attempts"),
        }
    }
}

/// Errors that can occur while governing a request.
#[derive(Debug, Clone, Error)]
pub enum GovernorError {
    /// Upstream answered 429.
    #[error("rate limit exceeded calling {url}")]
    RateLimitExceeded {
        url: String,
        /// Hint parsed from the `Retry-After` header.
        retry_after: Option<Duration>,
    },

    /// Upstream answered 5xx.
    #[error("server error {status} from {url}")]
    ServerError { url: String, status: u16 },

    /// Connection-level failure (DNS, refused, reset).
    #[error("network error calling {url}: {message}")]
    NetworkError { url: String, message: String },

    /// Transport deadline exceeded.
    #[error("request to {url} timed out after {}ms", .timeout.as_millis())]
    Timeout { url: String, timeout: Duration },

    /// Upstream answered 404, or a single-record lookup came back empty.
    #[error("resource not found: {target}")]
    NotFound { target: String },

    /// Upstream answered some other 4xx.
    #[error("client error {status} from {url}")]
    ClientError { url: String, status: u16 },

    /// Rejected before dispatch.
    #[error("{field} {value} exceeds the maximum of {max} for {resource} searches")]
    PaginationLimitExceeded {
        resource: Resource,
        field: PaginationField,
        value: u64,
        max: u64,
    },

    /// The caller cancelled the request.
    #[error("request cancelled while {stage}")]
    Cancelled { stage: CancelStage },

    /// The retry policy cannot be executed (e.g. zero attempts).
    #[error("invalid retry policy: {reason}")]
    InvalidRetryPolicy { reason: String },

    /// A successful status carried a body that could not be decoded.
    #[error("invalid response from {url}: {message}")]
    InvalidResponse { url: String, message: String },

    /// The transport could not issue the request at all (bad URL, client misconfiguration).
    #[error("request to {url} could not be sent: {message}")]
    RequestFailed { url: String, message: String },
}

/// Result type for governed operations.
pub type GovernorResult<T> = Result<T, GovernorError>;

impl GovernorError {
    /// Taxonomy kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            GovernorError::RateLimitExceeded { .. } => ErrorKind::RateLimitExceeded,
            GovernorError::ServerError { .. } => ErrorKind::ServerError,
            GovernorError::NetworkError { .. } => ErrorKind::NetworkError,
            GovernorError::Timeout { .. } => ErrorKind::Timeout,
            GovernorError::NotFound { .. } => ErrorKind::NotFound,
            GovernorError::ClientError { .. } => ErrorKind::ClientError,
            GovernorError::PaginationLimitExceeded { .. } => ErrorKind::PaginationLimitExceeded,
            GovernorError::Cancelled { .. } => ErrorKind::Cancelled,
            GovernorError::InvalidRetryPolicy { .. } => ErrorKind::InvalidRetryPolicy,
            GovernorError::InvalidResponse { .. } => ErrorKind::InvalidResponse,
            GovernorError::RequestFailed { .. } => ErrorKind::RequestFailed,
        }
    }

    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::RateLimitExceeded
                | ErrorKind::ServerError
                | ErrorKind::NetworkError
                | ErrorKind::Timeout
        )
    }

    /// Server-provided delay hint, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            GovernorError::RateLimitExceeded { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// HTTP status associated with the error, if it came from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            GovernorError::RateLimitExceeded { .. } => Some(429),
            GovernorError::ServerError { status, .. } | GovernorError::ClientError { status, .. } => {
                Some(*status)
            }
            GovernorError::NotFound { .. } => Some(404),
            _ => None,
        }
    }

    /// Structured context for rendering.
    pub fn details(&self) -> Value {
        match self {
            GovernorError::RateLimitExceeded { url, retry_after } => json!({
                "url": url,
                "status": 429,
                "retry_after_secs": retry_after.map(|d| d.as_secs()),
            }),
            GovernorError::ServerError { url, status } | GovernorError::ClientError { url, status } => {
                json!({ "url": url, "status": status })
            }
            GovernorError::NetworkError { url, message }
            | GovernorError::InvalidResponse { url, message }
            | GovernorError::RequestFailed { url, message } => {
                json!({ "url": url, "cause": message })
            }
            GovernorError::Timeout { url, timeout } => json!({
                "url": url,
                "timeout_ms": timeout.as_millis() as u64,
            }),
            GovernorError::NotFound { target } => json!({ "target": target, "status": 404 }),
            GovernorError::PaginationLimitExceeded { resource, field, value, max } => json!({
                "resource": resource,
                "field": field,
                "value": value,
                "max": max,
            }),
            GovernorError::Cancelled { stage } => json!({ "stage": stage }),
            GovernorError::InvalidRetryPolicy { reason } => json!({ "reason": reason }),
        }
    }

    /// Render into a payload for the outer shell.
    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            code: self.kind(),
            message: self.to_string(),
            retryable: self.is_retryable(),
            details: self.details(),
        }
    }
}

/// Serializable rendering of a [`GovernorError`].
#[derive(Debug, Clone, Serialize)]
pub struct ErrorReport {
    pub code: ErrorKind,
    pub message: String,
    pub retryable: bool,
    pub details: Value,
}
