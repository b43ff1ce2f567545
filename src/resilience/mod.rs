//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! One logical call:
//!     → rate_limiter.rs (wait for a permit, FIFO)
//!     → timeouts.rs (bound the transport attempt)
//!     → retries.rs (classify; retry retryable failures)
//!     → backoff.rs (exponential delay, capped, optional jitter)
//! ```
//!
//! # Design Decisions
//! - Every transport attempt has a deadline and costs one permit
//! - Backoff sleeps cost nothing
//! - Cancellation is honoured at every suspension point

pub mod backoff;
pub mod rate_limiter;
pub mod retries;
pub mod timeouts;

pub use rate_limiter::{LimiterState, RateLimiter, RateLimiterError};
pub use retries::{RetryPolicy, RetryingExecutor};
