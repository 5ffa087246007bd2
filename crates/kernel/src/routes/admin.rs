//! Operator endpoints: graph, essentials, cache statistics and the
//! decision log.

use std::collections::BTreeSet;

use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::cache::CacheStats;
use crate::engine::{FilterDecision, GraphSummary};
use crate::error::{AppError, AppResult};
use crate::plugin::{ActivePluginSet, PluginId};
use crate::state::AppState;

/// Default number of decisions returned by the log endpoint.
const DEFAULT_LOG_LIMIT: usize = 50;

#[derive(Debug, Deserialize)]
pub struct RebuildRequest {
    pub active: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct GraphResponse {
    /// `[child, parent]` pairs.
    pub edges: Vec<(PluginId, PluginId)>,
}

#[derive(Debug, Serialize)]
pub struct EssentialsResponse {
    /// Essentials from configuration and the rules file.
    pub fixed: BTreeSet<PluginId>,
    /// Operator-managed list.
    pub stored: BTreeSet<PluginId>,
}

#[derive(Debug, Deserialize)]
pub struct EssentialsUpdate {
    pub plugins: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub cache: CacheStats,
    pub edges: usize,
    pub extractors: Vec<&'static str>,
    pub min_plugins: usize,
    pub logged_decisions: usize,
    pub log_capacity: usize,
    pub passes_in_flight: usize,
}

#[derive(Debug, Deserialize)]
pub struct LogQuery {
    pub limit: Option<usize>,
}

/// Create the admin router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/admin/graph", get(graph))
        .route("/admin/graph/rebuild", post(rebuild_graph))
        .route("/admin/essentials", get(essentials).put(update_essentials))
        .route("/admin/stats", get(stats))
        .route("/admin/log", get(decision_log))
}

/// GET /admin/graph
async fn graph(State(state): State<AppState>) -> Json<GraphResponse> {
    Json(GraphResponse {
        edges: state.engine().graph().edges(),
    })
}

/// POST /admin/graph/rebuild
async fn rebuild_graph(
    State(state): State<AppState>,
    Json(body): Json<RebuildRequest>,
) -> AppResult<Json<GraphSummary>> {
    if body.active.is_empty() {
        return Err(AppError::BadRequest("active roster is empty".to_string()));
    }
    let active = ActivePluginSet::from_paths(body.active);
    let summary = state.engine().rebuild_graph(&active, state.source()).await?;
    Ok(Json(summary))
}

/// GET /admin/essentials
async fn essentials(State(state): State<AppState>) -> Json<EssentialsResponse> {
    let engine = state.engine();
    Json(EssentialsResponse {
        fixed: engine.fixed_essentials().clone(),
        stored: engine.stored_essentials(),
    })
}

/// PUT /admin/essentials
async fn update_essentials(
    State(state): State<AppState>,
    Json(body): Json<EssentialsUpdate>,
) -> AppResult<Json<EssentialsResponse>> {
    let ids: BTreeSet<PluginId> = body
        .plugins
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .map(PluginId::from)
        .collect();

    state.engine().set_essentials(ids).await?;
    Ok(essentials(State(state)).await)
}

/// GET /admin/stats
async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let engine = state.engine();
    Json(StatsResponse {
        cache: engine.cache().stats().await,
        edges: engine.graph().edge_count(),
        extractors: engine.extractors().names(),
        min_plugins: engine.gate().min_plugins(),
        logged_decisions: engine.log().len(),
        log_capacity: engine.log().capacity(),
        passes_in_flight: state.passes_in_flight(),
    })
}

/// GET /admin/log
async fn decision_log(
    State(state): State<AppState>,
    Query(query): Query<LogQuery>,
) -> Json<Vec<FilterDecision>> {
    let limit = query.limit.unwrap_or(DEFAULT_LOG_LIMIT);
    Json(state.engine().log().recent(limit))
}
