//! End-to-end behaviour of the governor over a scripted transport.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use search_governor::error::{CancelStage, ErrorKind, GovernorError};
use search_governor::transport::TransportResponse;
use search_governor::{RequestGovernor, Resource, RetryPolicy, SearchRequest};

mod common;
use common::{fast_config, ok, status, ScriptedTransport};

fn retry(max_attempts: u32, base_ms: u64) -> RetryPolicy {
    RetryPolicy::new(max_attempts, Duration::from_millis(base_ms))
}

fn governor(transport: &Arc<ScriptedTransport>) -> RequestGovernor<Arc<ScriptedTransport>> {
    RequestGovernor::new(&fast_config(), transport.clone()).unwrap()
}

#[tokio::test]
async fn test_key_order_does_not_defeat_cache() {
    let transport = ScriptedTransport::new(vec![ok(json!({"results": [{"id": 1}]}))]);
    let gov = governor(&transport);

    let a: Value = serde_json::from_str(r#"{"org_names":["MIT"],"fiscal_years":[2023,2024]}"#).unwrap();
    let b: Value = serde_json::from_str(r#"{"fiscal_years":[2023,2024],"org_names":["MIT"]}"#).unwrap();

    let first = gov
        .execute(&SearchRequest::new(Resource::Projects, a).limit(50), &retry(1, 0))
        .await
        .unwrap();
    let second = gov
        .execute(&SearchRequest::new(Resource::Projects, b).limit(50), &retry(1, 0))
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(transport.calls(), 1);

    let stats = gov.cache_stats();
    assert_eq!((stats.hits, stats.misses, stats.sets), (1, 1, 1));
}

#[tokio::test]
async fn test_cache_hit_skips_limiter() {
    let transport = ScriptedTransport::new(vec![]);
    let gov = governor(&transport);
    let request = SearchRequest::new(Resource::Publications, json!({"pmids": [123]}));

    gov.execute(&request, &retry(1, 0)).await.unwrap();
    let before = gov.limiter_state().tokens;
    for _ in 0..10 {
        gov.execute(&request, &retry(1, 0)).await.unwrap();
    }

    assert_eq!(transport.calls(), 1);
    assert!(gov.limiter_state().tokens >= before);
}

#[tokio::test]
async fn test_failure_is_not_cached() {
    let transport = ScriptedTransport::new(vec![status(404), ok(json!({"results": [1]}))]);
    let gov = governor(&transport);
    let request = SearchRequest::new(Resource::Projects, json!({"project_nums": ["X"]}));

    let err = gov.execute(&request, &retry(3, 1)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(transport.calls(), 1, "404 is not retried");
    assert_eq!(gov.cache_stats().size, 0);

    let response = gov.execute(&request, &retry(3, 1)).await.unwrap();
    assert_eq!(response, json!({"results": [1]}));
    assert_eq!(transport.calls(), 2);
}

#[tokio::test]
async fn test_pagination_violation_never_dispatched() {
    let transport = ScriptedTransport::new(vec![]);
    let gov = governor(&transport);

    let over_offset = SearchRequest::new(Resource::Publications, json!({})).offset(10_000);
    let err = gov.execute(&over_offset, &retry(3, 1)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PaginationLimitExceeded);

    let over_limit = SearchRequest::new(Resource::Projects, json!({})).limit(501);
    let err = gov.execute(&over_limit, &retry(3, 1)).await.unwrap_err();
    assert_eq!(err.report().details["field"], "limit");

    // Same offset is fine for the other resource.
    gov.execute(
        &SearchRequest::new(Resource::Projects, json!({})).offset(10_000),
        &retry(1, 0),
    )
    .await
    .unwrap();

    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn test_server_errors_retry_with_backoff() {
    let transport = ScriptedTransport::new(vec![status(503), status(502), ok(json!({"results": []}))]);
    let gov = governor(&transport);

    gov.execute(&SearchRequest::new(Resource::Projects, json!({})), &retry(3, 20))
        .await
        .unwrap();

    let times = transport.call_times();
    assert_eq!(times.len(), 3);
    assert!(times[1] - times[0] >= Duration::from_millis(20));
    assert!(times[2] - times[1] >= Duration::from_millis(40));
}

#[tokio::test]
async fn test_exhaustion_returns_last_error() {
    let transport = ScriptedTransport::new(vec![status(500), status(500), status(503)]);
    let gov = governor(&transport);

    let err = gov
        .execute(&SearchRequest::new(Resource::Projects, json!({})), &retry(3, 1))
        .await
        .unwrap_err();

    assert!(matches!(err, GovernorError::ServerError { status: 503, .. }));
    assert!(err.is_retryable());
    assert_eq!(transport.calls(), 3);
}

#[tokio::test]
async fn test_request_body_and_path() {
    let transport = ScriptedTransport::new(vec![]);
    let gov = governor(&transport);

    gov.execute(
        &SearchRequest::new(Resource::Publications, json!({"pmids": [1]})).offset(20),
        &retry(1, 0),
    )
    .await
    .unwrap();

    let sent = &transport.requests()[0];
    assert_eq!(sent.path, "/v2/publications/search");
    assert_eq!(
        sent.body,
        Some(json!({"criteria": {"pmids": [1]}, "offset": 20, "limit": 500}))
    );
}

#[tokio::test]
async fn test_fetch_one_uses_single_row_page() {
    let transport = ScriptedTransport::new(vec![ok(json!({"results": [{"appl_id": 42}]}))]);
    let gov = governor(&transport);

    let record = gov
        .fetch_one(Resource::Projects, json!({"appl_ids": [42]}), &retry(1, 0))
        .await
        .unwrap();

    assert_eq!(record["appl_id"], 42);
    assert_eq!(transport.requests()[0].body.as_ref().unwrap()["limit"], 1);
}

#[tokio::test]
async fn test_disabled_cache_always_dispatches() {
    let transport = ScriptedTransport::new(vec![]);
    let mut config = fast_config();
    config.cache.enabled = false;
    let gov = RequestGovernor::new(&config, transport.clone()).unwrap();
    let request = SearchRequest::new(Resource::Projects, json!({}));

    gov.execute(&request, &retry(1, 0)).await.unwrap();
    gov.execute(&request, &retry(1, 0)).await.unwrap();

    assert_eq!(transport.calls(), 2);
    let stats = gov.cache_stats();
    assert!(!stats.enabled);
    assert_eq!((stats.hits, stats.misses, stats.size), (0, 0, 0));
}

#[tokio::test]
async fn test_limiter_paces_distinct_requests() {
    let transport = ScriptedTransport::new(vec![]);
    let mut config = fast_config();
    config.rate_limit.burst_capacity = 2;
    config.rate_limit.requests_per_second = 20.0;
    let gov = RequestGovernor::new(&config, transport.clone()).unwrap();

    let start = Instant::now();
    for page in 0..4 {
        gov.execute(
            &SearchRequest::new(Resource::Projects, json!({})).offset(page * 10),
            &retry(1, 0),
        )
        .await
        .unwrap();
    }

    // Two from the burst, then one every 50ms.
    assert!(start.elapsed() >= Duration::from_millis(90));
    assert_eq!(transport.calls(), 4);
    assert_eq!(gov.limiter_state().queue_length, 0);
}

#[tokio::test]
async fn test_retry_after_stretches_backoff() {
    let transport = ScriptedTransport::new(vec![
        Ok(TransportResponse::new(429, "").with_header("Retry-After", "1")),
        ok(json!({"results": []})),
    ]);
    let gov = governor(&transport);

    gov.execute(&SearchRequest::new(Resource::Projects, json!({})), &retry(2, 10))
        .await
        .unwrap();

    let times = transport.call_times();
    assert!(times[1] - times[0] >= Duration::from_secs(1));
}

#[tokio::test]
async fn test_retry_after_capped_by_max_delay() {
    let transport = ScriptedTransport::new(vec![
        Ok(TransportResponse::new(429, "").with_header("Retry-After", "120")),
        ok(json!({"results": []})),
    ]);
    let gov = governor(&transport);
    let policy = retry(2, 10).with_max_delay(Duration::from_millis(100));

    let start = Instant::now();
    gov.execute(&SearchRequest::new(Resource::Projects, json!({})), &policy)
        .await
        .unwrap();
    assert!(start.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_cancel_during_backoff() {
    let transport = ScriptedTransport::new(vec![status(503)]);
    let gov = governor(&transport);
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let err = gov
        .execute_with_cancel(
            &SearchRequest::new(Resource::Projects, json!({})),
            &retry(3, 5_000),
            &cancel,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, GovernorError::Cancelled { stage: CancelStage::Backoff }));
    assert!(!err.is_retryable());
    assert_eq!(transport.calls(), 1);
    assert_eq!(gov.cache_stats().size, 0);
}

#[tokio::test]
async fn test_cancel_during_transport() {
    let transport = ScriptedTransport::slow(Duration::from_secs(5));
    let gov = governor(&transport);
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let start = Instant::now();
    let err = gov
        .execute_with_cancel(
            &SearchRequest::new(Resource::Projects, json!({})),
            &retry(3, 10),
            &cancel,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, GovernorError::Cancelled { stage: CancelStage::Transport }));
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn test_cancel_while_awaiting_permit() {
    let transport = ScriptedTransport::new(vec![]);
    let mut config = fast_config();
    config.rate_limit.burst_capacity = 1;
    config.rate_limit.requests_per_second = 0.1;
    let gov = RequestGovernor::new(&config, transport.clone()).unwrap();

    gov.execute(&SearchRequest::new(Resource::Projects, json!({})), &retry(1, 0))
        .await
        .unwrap();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let err = gov
        .execute_with_cancel(
            &SearchRequest::new(Resource::Projects, json!({})).offset(1),
            &retry(1, 0),
            &cancel,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, GovernorError::Cancelled { stage: CancelStage::AwaitingPermit }));
    assert_eq!(transport.calls(), 1);
    assert_eq!(gov.limiter_state().queue_length, 0);
}
