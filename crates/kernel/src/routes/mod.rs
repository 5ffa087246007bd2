//! HTTP route handlers.

pub mod admin;
pub mod events;
pub mod filter;
pub mod health;
pub mod metrics;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// The full service router.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(filter::router())
        .merge(events::router())
        .merge(admin::router())
        .merge(health::router())
        .merge(metrics::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
