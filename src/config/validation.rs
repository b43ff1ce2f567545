//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (rates > 0, capacities >= 1, timeouts > 0)
//! - Check the base URL parses
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GovernorConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;

use crate::config::schema::{GovernorConfig, PageLimits};

/// A single semantic problem with a configuration value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field (e.g. `rate_limit.burst_capacity`).
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Validate a parsed configuration.
pub fn validate_config(config: &GovernorConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Err(e) = url::Url::parse(&config.api.base_url) {
        errors.push(ValidationError::new("api.base_url", format!("invalid URL: {}", e)));
    }
    if config.api.timeout_ms == 0 {
        errors.push(ValidationError::new("api.timeout_ms", "must be greater than 0"));
    }

    let rps = config.rate_limit.requests_per_second;
    if !rps.is_finite() || rps <= 0.0 {
        errors.push(ValidationError::new(
            "rate_limit.requests_per_second",
            "must be a finite number greater than 0",
        ));
    }
    if config.rate_limit.burst_capacity == 0 {
        errors.push(ValidationError::new("rate_limit.burst_capacity", "must be at least 1"));
    }

    if config.cache.max_entries == 0 {
        errors.push(ValidationError::new("cache.max_entries", "must be at least 1"));
    }
    if config.cache.ttl_ms == 0 {
        errors.push(ValidationError::new("cache.ttl_ms", "must be greater than 0"));
    }

    if config.retries.max_attempts == 0 {
        errors.push(ValidationError::new("retries.max_attempts", "must be at least 1"));
    }
    if config.retries.max_delay_ms < config.retries.base_delay_ms {
        errors.push(ValidationError::new(
            "retries.max_delay_ms",
            "must not be smaller than retries.base_delay_ms",
        ));
    }
    let jitter = config.retries.jitter_ratio;
    if !(0.0..=1.0).contains(&jitter) {
        errors.push(ValidationError::new("retries.jitter_ratio", "must be between 0.0 and 1.0"));
    }

    check_page_limits("pagination.projects", &config.pagination.projects, &mut errors);
    check_page_limits("pagination.publications", &config.pagination.publications, &mut errors);
    if config.pagination.default_limit == 0 {
        errors.push(ValidationError::new("pagination.default_limit", "must be at least 1"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_page_limits(prefix: &str, limits: &PageLimits, errors: &mut Vec<ValidationError>) {
    if limits.max_limit == 0 {
        errors.push(ValidationError::new(format!("{}.max_limit", prefix), "must be at least 1"));
    }
}
