use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use helpdesk_shared::{HealthCheck, HealthResponse, HealthStatus};
use std::sync::Arc;

use crate::AppState;

/// Liveness plus a round trip to the store.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Response {
    let store = match state.store.ping() {
        Ok(()) => HealthCheck::healthy("store"),
        Err(e) => {
            tracing::warn!(error = %e, "store health check failed");
            HealthCheck::failing("store", HealthStatus::Unhealthy, e.to_string())
        }
    };

    let response = HealthResponse::healthy("helpdesk-messaging", env!("CARGO_PKG_VERSION"))
        .with_checks(vec![store]);

    let status = match response.status {
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };

    (status, Json(response)).into_response()
}

/// Returns Prometheus metrics.
pub async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    match &state.metrics_handle {
        Some(handle) => handle.render().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
