//! Prometheus metrics endpoint.

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;

use crate::state::AppState;

/// Content type of the Prometheus text exposition format.
pub const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Create the metrics router.
pub fn router() -> Router<AppState> {
    Router::new().route("/metrics", get(metrics))
}

/// Prometheus metrics endpoint.
async fn metrics(State(state): State<AppState>) -> Response {
    let output = state.metrics().encode();

    (
        StatusCode::OK,
        [("content-type", PROMETHEUS_CONTENT_TYPE)],
        output,
    )
        .into_response()
}
