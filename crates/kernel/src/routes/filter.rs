//! Filter endpoint.
//!
//! The host posts its active roster and a request snapshot and gets back the
//! list to load. Calls carrying the same `x-request-id` share one
//! re-entrancy token, so a nested call made while the outer pass runs gets
//! the roster back unchanged.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;

use crate::engine::{FilterOutcome, FilterResult, ReentrancyToken};
use crate::plugin::ActivePluginSet;
use crate::request::RequestContext;
use crate::state::AppState;

/// Header naming the host request a filter call belongs to.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Debug, Deserialize)]
pub struct FilterRequest {
    /// Active plugin paths in load order.
    pub active: Vec<String>,
    #[serde(default)]
    pub context: RequestContext,
}

/// Create the filter router.
pub fn router() -> Router<AppState> {
    Router::new().route("/filter", post(filter))
}

/// POST /filter
async fn filter(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<FilterRequest>,
) -> Json<FilterResult> {
    let active = ActivePluginSet::from_paths(body.active);
    let ctx = body.context.with_uri_query();

    let request_id = headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty());

    let result = match request_id {
        Some(id) => {
            let token = state.pass_token(id);
            let result = state.engine().filter(&token, &ctx, &active).await;
            if result.outcome != FilterOutcome::Reentered {
                state.finish_pass(id);
            }
            result
        }
        None => {
            state
                .engine()
                .filter(&ReentrancyToken::new(), &ctx, &active)
                .await
        }
    };

    Json(result)
}
