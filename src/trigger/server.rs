//! Lifecycle trigger HTTP server
//!
//! `POST /lifecycle` accepts a lifecycle event and replies with the
//! custom-resource response shape. Events are handled one at a time.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::post};
use tracing::{error, info};

use crate::controller::Context;
use crate::model::{LifecycleEvent, LifecycleFailure, LifecycleResponse, RequestType};

/// Default port for the lifecycle trigger server
pub const TRIGGER_PORT: u16 = 8443;

/// Create the lifecycle trigger router
pub fn create_trigger_router(ctx: Arc<Context>) -> Router {
    Router::new()
        .route("/lifecycle", post(handle_lifecycle))
        .with_state(ctx)
}

/// Lifecycle event handler
pub(crate) async fn handle_lifecycle(
    State(ctx): State<Arc<Context>>,
    Json(event): Json<LifecycleEvent>,
) -> impl IntoResponse {
    let request_type = event.request_type();

    // Not ready means starting or draining; the trigger layer will redeliver.
    // Delete needs no cluster access and is always acknowledged.
    if request_type != RequestType::Delete
        && let Some(state) = &ctx.health_state
        && !state.is_ready().await
    {
        info!(request_type = %request_type, "Rejecting lifecycle event while not ready");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(LifecycleFailure::new("service is not ready")),
        )
            .into_response();
    }

    let _guard = ctx.in_flight.lock().await;

    info!(request_type = %request_type, "Processing lifecycle event");

    let outcome = ctx.initializer.invoke(&event).await;
    let connection = ctx.connection_info(event.properties());

    match LifecycleResponse::from_outcome(&outcome, Some(connection)) {
        Some(response) => {
            info!(request_type = %request_type, status = %outcome.status, "Lifecycle event handled");
            (StatusCode::OK, Json(response)).into_response()
        }
        None => {
            let reason = outcome
                .detail
                .error
                .unwrap_or_else(|| "Database initialization failed".to_string());
            error!(request_type = %request_type, reason = %reason, "Lifecycle event failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(LifecycleFailure::new(reason)),
            )
                .into_response()
        }
    }
}

/// Errors that can occur when running the trigger server
#[derive(Debug, thiserror::Error)]
pub enum TriggerError {
    #[error("TLS configuration error: {0}")]
    TlsConfig(String),

    #[error("Trigger server error: {0}")]
    Server(#[from] std::io::Error),
}

/// Run the trigger server on `0.0.0.0:port`
///
/// Serves TLS when both `cert_path` and `key_path` exist, plain HTTP otherwise.
pub async fn run_trigger_server(
    ctx: Arc<Context>,
    port: u16,
    cert_path: &Path,
    key_path: &Path,
) -> Result<(), TriggerError> {
    use axum_server::tls_rustls::RustlsConfig;

    let app = create_trigger_router(ctx);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    if cert_path.exists() && key_path.exists() {
        let config = RustlsConfig::from_pem_file(cert_path, key_path)
            .await
            .map_err(|e| TriggerError::TlsConfig(e.to_string()))?;

        info!("Lifecycle trigger server listening on {} with TLS", addr);
        axum_server::bind_rustls(addr, config)
            .serve(app.into_make_service())
            .await?;
    } else {
        info!(
            "TLS certificates not found at {} and {}, lifecycle trigger server listening on {} without TLS",
            cert_path.display(),
            key_path.display(),
            addr
        );
        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;
    }

    Ok(())
}
