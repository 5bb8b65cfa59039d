//! Health server for probes and Prometheus metrics
//!
//! Provides HTTP endpoints for:
//! - `/healthz` - Liveness probe (is the process alive?)
//! - `/readyz` - Readiness probe (is the service accepting lifecycle events?)
//! - `/metrics` - Prometheus metrics

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::RwLock;

use crate::model::OutcomeStatus;

/// Default port for the health server
pub const HEALTH_PORT: u16 = 8080;

/// Labels for lifecycle event metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct LifecycleLabels {
    pub request_type: String,
    pub status: String,
}

impl prometheus_client::encoding::EncodeLabelSet for LifecycleLabels {
    fn encode(
        &self,
        mut encoder: prometheus_client::encoding::LabelSetEncoder<'_>,
    ) -> Result<(), std::fmt::Error> {
        use prometheus_client::encoding::EncodeLabel;
        ("request_type", self.request_type.as_str()).encode(encoder.encode_label())?;
        ("status", self.status.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Labels for step metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct StepLabels {
    pub status: String,
}

impl prometheus_client::encoding::EncodeLabelSet for StepLabels {
    fn encode(
        &self,
        mut encoder: prometheus_client::encoding::LabelSetEncoder<'_>,
    ) -> Result<(), std::fmt::Error> {
        use prometheus_client::encoding::EncodeLabel;
        ("status", self.status.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Shared metrics state
pub struct Metrics {
    /// Lifecycle events handled, by request type and outcome
    pub lifecycle_events_total: Family<LifecycleLabels, Counter>,
    /// Initialization steps executed, by result
    pub steps_total: Family<StepLabels, Counter>,
    /// Step duration histogram
    pub step_duration_seconds: Histogram,

    registry: Registry,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let lifecycle_events_total = Family::<LifecycleLabels, Counter>::default();
        registry.register(
            "pg_bootstrap_lifecycle_events",
            "Total number of lifecycle events handled",
            lifecycle_events_total.clone(),
        );

        let steps_total = Family::<StepLabels, Counter>::default();
        registry.register(
            "pg_bootstrap_steps",
            "Total number of initialization steps executed",
            steps_total.clone(),
        );

        let step_duration_seconds = Histogram::new(exponential_buckets(0.001, 2.0, 15));
        registry.register(
            "pg_bootstrap_step_duration_seconds",
            "Duration of initialization steps in seconds",
            step_duration_seconds.clone(),
        );

        Self {
            lifecycle_events_total,
            steps_total,
            step_duration_seconds,
            registry,
        }
    }

    /// Record a handled lifecycle event
    pub fn record_lifecycle(&self, request_type: &str, status: OutcomeStatus) {
        let labels = LifecycleLabels {
            request_type: request_type.to_string(),
            status: status.to_string(),
        };
        self.lifecycle_events_total.get_or_create(&labels).inc();
    }

    /// Record an executed step
    pub fn record_step(&self, succeeded: bool, duration_secs: f64) {
        let labels = StepLabels {
            status: if succeeded { "succeeded" } else { "failed" }.to_string(),
        };
        self.steps_total.get_or_create(&labels).inc();
        self.step_duration_seconds.observe(duration_secs);
    }

    /// Encode metrics to Prometheus text format
    ///
    /// Returns an empty string if encoding fails.
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        if let Err(e) = encode(&mut buffer, &self.registry) {
            tracing::error!("Failed to encode metrics: {}", e);
            return String::new();
        }
        buffer
    }
}

/// Shared state for the health server
pub struct HealthState {
    /// Whether the service is accepting lifecycle events
    pub ready: RwLock<bool>,
    pub metrics: Metrics,
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthState {
    pub fn new() -> Self {
        Self {
            ready: RwLock::new(false),
            metrics: Metrics::new(),
        }
    }

    pub async fn set_ready(&self, ready: bool) {
        *self.ready.write().await = ready;
    }

    pub async fn is_ready(&self) -> bool {
        *self.ready.read().await
    }
}

/// Liveness probe handler
async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Readiness probe handler
///
/// Returns 503 Service Unavailable until the service is marked ready.
async fn readyz(State(state): State<Arc<HealthState>>) -> Response {
    if state.is_ready().await {
        (StatusCode::OK, "ready").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready").into_response()
    }
}

/// Prometheus metrics handler
async fn metrics(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    let body = state.metrics.encode();
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

/// Create the health server router
pub fn create_router(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Run the health server on `0.0.0.0:port`
pub async fn run_health_server(state: Arc<HealthState>, port: u16) -> Result<(), std::io::Error> {
    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Health server listening on {}", addr);

    axum::serve(listener, app).await
}
