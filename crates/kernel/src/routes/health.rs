//! Health check endpoint.
//!
//! Returns 200 OK if the option store and, when configured, Redis are
//! reachable; 503 Service Unavailable otherwise.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    store: bool,
    /// Absent when no Redis tier is configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    redis: Option<bool>,
}

/// Health check handler.
async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let (store, redis) = tokio::join!(state.store_healthy(), state.redis_healthy());
    let healthy = store && redis.unwrap_or(true);

    let (status_code, status) = if healthy {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    };

    (
        status_code,
        Json(HealthResponse {
            status,
            store,
            redis,
        }),
    )
}

/// Create the health check router.
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
