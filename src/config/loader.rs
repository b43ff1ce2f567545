//! Configuration loading from disk and the environment.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::GovernorConfig;
use crate::config::validation::{validate_config, ValidationError};
use crate::resilience::rate_limiter::RateLimiterError;

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value {value:?} in environment variable {var}")]
    Env { var: &'static str, value: String },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),

    #[error("Rate limiter: {0}")]
    RateLimiter(#[from] RateLimiterError),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file, applying environment overrides.
pub fn load_config(path: &Path) -> Result<GovernorConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: GovernorConfig = toml::from_str(&content)?;
    finalize(config)
}

/// Load from `path` when given, otherwise start from defaults.
pub fn load_config_or_default(path: Option<&Path>) -> Result<GovernorConfig, ConfigError> {
    match path {
        Some(path) => load_config(path),
        None => finalize(GovernorConfig::default()),
    }
}

fn finalize(mut config: GovernorConfig) -> Result<GovernorConfig, ConfigError> {
    apply_overrides(&mut config, |var| std::env::var(var).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Apply environment overrides using `lookup` to resolve variables.
pub fn apply_overrides<F>(config: &mut GovernorConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = lookup("SEARCH_API_BASE_URL") {
        config.api.base_url = url;
    }
    if let Some(v) = lookup("SEARCH_API_TIMEOUT_MS") {
        config.api.timeout_ms = parse_var("SEARCH_API_TIMEOUT_MS", v)?;
    }
    if let Some(v) = lookup("RATE_LIMIT_REQUESTS_PER_SECOND") {
        config.rate_limit.requests_per_second = parse_var("RATE_LIMIT_REQUESTS_PER_SECOND", v)?;
    }
    if let Some(v) = lookup("RATE_LIMIT_BURST_CAPACITY") {
        config.rate_limit.burst_capacity = parse_var("RATE_LIMIT_BURST_CAPACITY", v)?;
    }
    if let Some(v) = lookup("CACHE_ENABLED") {
        // Anything but an explicit "false" keeps the cache on.
        config.cache.enabled = !v.trim().eq_ignore_ascii_case("false");
    }
    if let Some(v) = lookup("CACHE_MAX_SIZE") {
        config.cache.max_entries = parse_var("CACHE_MAX_SIZE", v)?;
    }
    if let Some(v) = lookup("CACHE_TTL_MS") {
        config.cache.ttl_ms = parse_var("CACHE_TTL_MS", v)?;
    }
    Ok(())
}

fn parse_var<T: std::str::FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Env { var, value })
}
