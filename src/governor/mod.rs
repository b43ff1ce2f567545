//! Request governance: the single entry point for outbound searches.
//!
//! # Data Flow
//! ```text
//! SearchRequest
//!     → pagination.rs (resolve page, enforce ceilings; never dispatched on failure)
//!     → fingerprint (resource + canonical body)
//!     → ResponseCache lookup (hit returns without limiter or transport)
//!     → RetryingExecutor (permit → transport → classify → backoff)
//!     → ResponseCache store (success only)
//! ```
//!
//! # Design Decisions
//! - The governor owns its limiter, cache and transport; no globals
//! - Failures are never cached
//! - Each call runs in a span tagged with a fresh request ID

pub mod pagination;
pub mod request;

use std::time::{Duration, Instant};

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::cache::{canonical_json, fingerprint, CacheStats, ResponseCache};
use crate::config::{validate_config, ConfigError, GovernorConfig, PaginationConfig};
use crate::error::{GovernorError, GovernorResult};
use crate::observability::metrics;
use crate::resilience::rate_limiter::{LimiterState, RateLimiter};
use crate::resilience::retries::{RetryPolicy, RetryingExecutor};
use crate::transport::{Transport, TransportRequest};

pub use pagination::{resolve_page, Page};
pub use request::{Resource, SearchRequest};

/// Rate-limited, cached, retrying access to the search API.
pub struct RequestGovernor<T> {
    transport: T,
    limiter: RateLimiter,
    cache: ResponseCache<Value>,
    pagination: PaginationConfig,
    attempt_timeout: Duration,
}

impl<T: Transport> RequestGovernor<T> {
    /// Validate `config` and build a governor around `transport`.
    pub fn new(config: &GovernorConfig, transport: T) -> Result<Self, ConfigError> {
        validate_config(config).map_err(ConfigError::Validation)?;

        let limiter = RateLimiter::from_config(&config.rate_limit)?;
        let cache = ResponseCache::new(&config.cache);

        tracing::info!(
            requests_per_second = config.rate_limit.requests_per_second,
            burst_capacity = config.rate_limit.burst_capacity,
            cache_enabled = config.cache.enabled,
            cache_max_entries = config.cache.max_entries,
            "Request governor ready"
        );

        Ok(Self {
            transport,
            limiter,
            cache,
            pagination: config.pagination.clone(),
            attempt_timeout: config.api.timeout(),
        })
    }

    /// Execute `request`, serving from cache when possible.
    pub async fn execute(&self, request: &SearchRequest, policy: &RetryPolicy) -> GovernorResult<Value> {
        self.execute_with_cancel(request, policy, &CancellationToken::new())
            .await
    }

    /// Like [`execute`](Self::execute), abandoning the call once `cancel` fires.
    pub async fn execute_with_cancel(
        &self,
        request: &SearchRequest,
        policy: &RetryPolicy,
        cancel: &CancellationToken,
    ) -> GovernorResult<Value> {
        let span = tracing::info_span!(
            "governed_request",
            request_id = %Uuid::new_v4(),
            resource = %request.resource,
        );
        self.dispatch(request, policy, cancel).instrument(span).await
    }

    /// Fetch the first record matching `criteria`.
    ///
    /// Searches with a page size of one; an empty result set is `NotFound`.
    pub async fn fetch_one(
        &self,
        resource: Resource,
        criteria: Value,
        policy: &RetryPolicy,
    ) -> GovernorResult<Value> {
        let request = SearchRequest::new(resource, criteria).limit(1);
        let response = self.execute(&request, policy).await?;

        response
            .get("results")
            .and_then(Value::as_array)
            .and_then(|results| results.first())
            .cloned()
            .ok_or_else(|| GovernorError::NotFound {
                target: format!("{} matching {}", resource, canonical_json(&request.criteria)),
            })
    }

    /// Drop the cached response for `request`. Returns whether one was present.
    pub fn invalidate(&self, request: &SearchRequest) -> bool {
        match self.cache_key(request) {
            Ok(key) => self.cache.delete(&key),
            Err(_) => false,
        }
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn limiter_state(&self) -> LimiterState {
        self.limiter.state()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    async fn dispatch(
        &self,
        request: &SearchRequest,
        policy: &RetryPolicy,
        cancel: &CancellationToken,
    ) -> GovernorResult<Value> {
        let start = Instant::now();
        let resource = request.resource.as_str();

        let prepared = policy
            .validate()
            .and_then(|()| resolve_page(request, &self.pagination));
        let page = match prepared {
            Ok(page) => page,
            Err(e) => {
                tracing::warn!(error = %e, "Request rejected before dispatch");
                metrics::record_request(resource, "rejected", start);
                return Err(e);
            }
        };

        let body = request.body(page);
        let key = fingerprint(resource, &body);

        if let Some(cached) = self.cache.get(&key) {
            metrics::record_request(resource, "cache_hit", start);
            return Ok(cached);
        }

        let transport_request = TransportRequest::post(request.resource.path(), body);
        let executor = RetryingExecutor::new(&self.transport, &self.limiter, self.attempt_timeout);

        match executor.run(&transport_request, policy, cancel).await {
            Ok(response) => {
                self.cache.set(&key, response.clone(), None);
                metrics::record_request(resource, "success", start);
                tracing::debug!(
                    offset = page.offset,
                    limit = page.limit,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Request completed"
                );
                Ok(response)
            }
            Err(e) => {
                metrics::record_request(resource, e.kind().as_str(), start);
                Err(e)
            }
        }
    }

    fn cache_key(&self, request: &SearchRequest) -> GovernorResult<String> {
        let page = resolve_page(request, &self.pagination)?;
        Ok(fingerprint(request.resource.as_str(), &request.body(page)))
    }
}

impl<T> std::fmt::Debug for RequestGovernor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestGovernor")
            .field("limiter", &self.limiter)
            .field("cache", &self.cache)
            .field("attempt_timeout", &self.attempt_timeout)
            .finish()
    }
}
