//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the governor.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the request governor.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct GovernorConfig {
    /// Remote search API settings.
    pub api: ApiConfig,

    /// Outbound rate limiting.
    pub rate_limit: RateLimitConfig,

    /// Response cache settings.
    pub cache: CacheConfig,

    /// Default retry policy.
    pub retries: RetryConfig,

    /// Per-resource pagination ceilings.
    pub pagination: PaginationConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Remote API configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the search API.
    pub base_url: String,

    /// Per-attempt transport deadline in milliseconds.
    pub timeout_ms: u64,

    /// User-Agent header sent with every request.
    pub user_agent: String,
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.reporter.nih.gov".to_string(),
            timeout_ms: 30_000,
            user_agent: concat!("search-governor/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Token bucket configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Sustained requests per second (refill rate).
    pub requests_per_second: f64,

    /// Burst capacity.
    pub burst_capacity: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 1.0,
            burst_capacity: 5,
        }
    }
}

/// Response cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable the response cache.
    pub enabled: bool,

    /// Maximum number of entries before LRU eviction.
    pub max_entries: usize,

    /// Default entry TTL in milliseconds.
    pub ttl_ms: u64,

    /// Re-anchor an entry's expiry on every successful read.
    pub sliding_expiration: bool,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 1000,
            ttl_ms: 3_600_000, // 1 hour
            sliding_expiration: false,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one.
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,

    /// Jitter added on top of each delay, as a fraction of it (0.0 disables).
    pub jitter_ratio: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            jitter_ratio: 0.0,
        }
    }
}

/// Offset/limit ceilings for one logical resource.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub struct PageLimits {
    /// Highest offset the endpoint accepts.
    pub max_offset: u64,

    /// Highest page size the endpoint accepts.
    pub max_limit: u64,
}

/// Pagination ceilings per resource type.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct PaginationConfig {
    /// Primary records (project search).
    pub projects: PageLimits,

    /// Linked records (publication search).
    pub publications: PageLimits,

    /// Page size used when a request does not name one.
    pub default_limit: u64,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            projects: PageLimits {
                max_offset: 14_999,
                max_limit: 500,
            },
            publications: PageLimits {
                max_offset: 9_999,
                max_limit: 500,
            },
            default_limit: 500,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON log lines instead of the human-readable format.
    pub json_logs: bool,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
