//! Unit tests for the lifecycle trigger endpoint

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use pg_bootstrap::controller::Context;
use pg_bootstrap::health::HealthState;
use pg_bootstrap::trigger::create_trigger_router;

use crate::common::*;

async fn context_for(cluster: &MockCluster, health_state: Arc<HealthState>) -> Arc<Context> {
    health_state.set_ready(true).await;
    let initializer = initializer_for(cluster).with_health_state(health_state.clone());
    Arc::new(
        Context::new(Arc::new(initializer), "cluster.internal", 5432, "main")
            .with_health_state(health_state),
    )
}

async fn post(ctx: Arc<Context>, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri("/lifecycle")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();

    let response = create_trigger_router(ctx).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn test_create_returns_connection_details() {
    let cluster = MockCluster::new();
    let state = Arc::new(HealthState::new());

    let (status, body) = post(
        context_for(&cluster, state.clone()).await,
        json!({ "RequestType": "Create", "ResourceProperties": {} }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["PhysicalResourceId"], "db-init");
    assert_eq!(body["Data"]["Status"], "Success");
    assert_eq!(body["Data"]["DatabaseCreated"], true);
    assert_eq!(body["Data"]["Connection"]["host"], "cluster.internal");
    assert_eq!(body["Data"]["Connection"]["secondaryDatabaseName"], "pgvector");
    assert!(
        state
            .metrics
            .encode()
            .contains("request_type=\"Create\",status=\"Success\"")
    );
}

#[tokio::test]
async fn test_delete_is_acknowledged_without_calls() {
    let cluster = MockCluster::new();

    let (status, body) = post(
        context_for(&cluster, Arc::new(HealthState::new())).await,
        json!({ "RequestType": "Delete" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["Data"]["Status"], "Deleted");
    assert_eq!(cluster.total_calls(), 0);
}

#[tokio::test]
async fn test_failure_returns_server_error_with_reason() {
    let cluster = MockCluster::new().rejecting_extension("vector");

    let (status, body) = post(
        context_for(&cluster, Arc::new(HealthState::new())).await,
        json!({ "RequestType": "Update" }),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["Status"], "FAILED");
    assert!(body["Reason"].as_str().unwrap().contains("vector"));
}

#[tokio::test]
async fn test_malformed_event_is_rejected() {
    let cluster = MockCluster::new();

    let (status, _) = post(
        context_for(&cluster, Arc::new(HealthState::new())).await,
        json!({ "RequestType": "Rollback" }),
    )
    .await;

    assert!(status.is_client_error());
    assert_eq!(cluster.total_calls(), 0);
}

#[tokio::test]
async fn test_events_rejected_while_not_ready() {
    let cluster = MockCluster::new();
    let state = Arc::new(HealthState::new());
    let ctx = context_for(&cluster, state.clone()).await;
    state.set_ready(false).await;

    let (status, body) = post(ctx, json!({ "RequestType": "Create" })).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["Status"], "FAILED");
    assert_eq!(cluster.total_calls(), 0);
}

#[tokio::test]
async fn test_delete_acknowledged_while_not_ready() {
    let cluster = MockCluster::new().hanging();
    let state = Arc::new(HealthState::new());
    let ctx = context_for(&cluster, state.clone()).await;
    state.set_ready(false).await;

    let (status, body) = post(ctx, json!({ "RequestType": "Delete" })).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["PhysicalResourceId"], "db-init");
    assert_eq!(body["Data"]["Status"], "Deleted");
    assert_eq!(cluster.total_calls(), 0);
}

#[tokio::test]
async fn test_event_without_request_type_runs_create() {
    let cluster = MockCluster::new();

    let (status, body) = post(
        context_for(&cluster, Arc::new(HealthState::new())).await,
        json!({ "ResourceProperties": {} }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["Data"]["Status"], "Success");
    assert!(cluster.has_extension("pgvector", "vector"));
}
