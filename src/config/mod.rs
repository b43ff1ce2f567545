//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → environment overrides (SEARCH_API_*, RATE_LIMIT_*, CACHE_*)
//!     → validation.rs (semantic checks)
//!     → GovernorConfig (validated, immutable)
//!     → handed to RequestGovernor::new
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; the governor is rebuilt to change it
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, load_config_or_default, ConfigError};
pub use schema::{
    ApiConfig, CacheConfig, GovernorConfig, ObservabilityConfig, PageLimits, PaginationConfig,
    RateLimitConfig, RetryConfig,
};
pub use validation::{validate_config, ValidationError};
