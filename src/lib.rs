//! Request governance for a rate-limited search API.
//!
//! Outbound searches pass through a [`RequestGovernor`], which combines a
//! token-bucket [`RateLimiter`], an LRU/TTL [`ResponseCache`] and a
//! [`RetryingExecutor`] in front of a pluggable [`Transport`].

// Core subsystems
pub mod cache;
pub mod governor;
pub mod transport;

// Cross-cutting concerns
pub mod config;
pub mod error;
pub mod observability;
pub mod resilience;

pub use cache::{CacheStats, ResponseCache};
pub use config::GovernorConfig;
pub use error::{ErrorKind, ErrorReport, GovernorError, GovernorResult};
pub use governor::{RequestGovernor, Resource, SearchRequest};
pub use resilience::{LimiterState, RateLimiter, RetryPolicy, RetryingExecutor};
pub use transport::{HttpTransport, Transport};
