//! Transport boundary.
//!
//! # Data Flow
//! ```text
//! RetryingExecutor
//!     → Transport::send(TransportRequest)        (one attempt, no policy)
//!     → TransportResponse { status, headers, body } | TransportError
//!     → resilience::retries classifies into GovernorError
//! ```
//!
//! # Design Decisions
//! - Transports report raw outcomes only; they never retry or classify
//! - Response bodies stay raw text until the classifier decodes them

pub mod http;

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub use http::HttpTransport;

/// HTTP method of an outbound call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => f.write_str("GET"),
            Method::Post => f.write_str("POST"),
        }
    }
}

/// One outbound call, relative to the transport's base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
}

impl TransportRequest {
    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            body: Some(body),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            body: None,
        }
    }
}

/// Raw response as received from the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    /// Header names are stored lowercased.
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    /// Response with a JSON body.
    pub fn json(status: u16, body: &Value) -> Self {
        Self::new(status, body.to_string())
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

/// Connection-level failures. HTTP error statuses are not errors at this layer.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TransportError {
    /// DNS failure, refused or reset connection.
    #[error("connection failed: {0}")]
    Connect(String),

    /// The transport's own deadline fired.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The exchange started but broke off (reset mid-request, body read failure).
    #[error("exchange interrupted: {0}")]
    Interrupted(String),

    /// The request could not be issued at all (bad URL, client misconfiguration).
    #[error("transport failure: {0}")]
    Other(String),
}

/// Performs single HTTP-like calls against the remote API.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &TransportRequest) -> Result<TransportResponse, TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    async fn send(&self, request: &TransportRequest) -> Result<TransportResponse, TransportError> {
        (**self).send(request).await
    }
}
