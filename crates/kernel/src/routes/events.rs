//! Host lifecycle events that invalidate cached signals.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::engine::GraphSummary;
use crate::error::AppResult;
use crate::plugin::ActivePluginSet;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct RosterChanged {
    /// The new roster; needed only when the graph is rebuilt on change.
    #[serde(default)]
    pub active: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct RosterChangedResponse {
    pub url_cache_cleared: bool,
    /// Present when the dependency graph was rebuilt.
    pub graph: Option<GraphSummary>,
}

/// Create the events router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/events/roster-changed", post(roster_changed))
        .route("/events/content-saved/{id}", post(content_saved))
}

/// POST /events/roster-changed
async fn roster_changed(
    State(state): State<AppState>,
    Json(body): Json<RosterChanged>,
) -> AppResult<Json<RosterChangedResponse>> {
    state.engine().on_roster_changed().await;

    let graph = if state.rebuild_on_roster_change() && !body.active.is_empty() {
        let active = ActivePluginSet::from_paths(body.active);
        match state.engine().rebuild_graph(&active, state.source()).await {
            Ok(summary) => Some(summary),
            Err(e) => {
                warn!(error = %e, "graph rebuild after roster change failed");
                None
            }
        }
    } else {
        None
    };

    Ok(Json(RosterChangedResponse {
        url_cache_cleared: true,
        graph,
    }))
}

/// POST /events/content-saved/{id}
async fn content_saved(State(state): State<AppState>, Path(id): Path<String>) -> StatusCode {
    state.engine().on_content_saved(&id).await;
    StatusCode::NO_CONTENT
}
