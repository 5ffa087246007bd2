//! Application state shared across all handlers.

use std::sync::Arc;

use anyhow::{Context, Result};
use dashmap::DashMap;
use redis::Client as RedisClient;
use tracing::{info, warn};

use crate::cache::CacheLayer;
use crate::config::Config;
use crate::engine::{Engine, ReentrancyToken};
use crate::metrics::Metrics;
use crate::plugin::{FsPluginSource, PluginSource};
use crate::rules::RuleSet;
use crate::store::{MemoryOptionStore, OptionStore, PgOptionStore};

/// Shared application state.
///
/// Wrapped in Arc internally so Clone is cheap.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// The filter engine.
    engine: Engine,

    /// Reads plugin main files for graph inference.
    source: Arc<dyn PluginSource>,

    /// Re-infer the graph on roster change events.
    rebuild_on_roster_change: bool,

    /// Tokens of passes in flight, by host request id.
    passes: DashMap<String, ReentrancyToken>,
}

impl AppState {
    /// Create new application state, connecting to configured backends.
    pub async fn new(config: &Config) -> Result<Self> {
        let store: Arc<dyn OptionStore> = match &config.database_url {
            Some(url) => {
                let store = PgOptionStore::connect(url, config.database_max_connections).await?;
                info!("using PostgreSQL option store");
                Arc::new(store)
            }
            None => {
                warn!("DATABASE_URL not set, options are kept in memory");
                Arc::new(MemoryOptionStore::new())
            }
        };

        let redis = config
            .redis_url
            .as_deref()
            .map(RedisClient::open)
            .transpose()
            .context("failed to create Redis client")?;

        let rules = RuleSet::load(config.rules_file.as_deref())
            .context("failed to load detection rules")?;

        let cache = CacheLayer::new(Arc::clone(&store), redis);
        let engine = Engine::new(
            &rules,
            config.engine.clone(),
            store,
            cache,
            Arc::new(Metrics::new()),
        )
        .context("failed to build filter engine")?;

        if let Err(e) = engine.load_persisted().await {
            warn!(error = %e, "failed to load persisted engine state, using declared rules");
        }

        info!(
            extractors = ?engine.extractors().names(),
            edges = engine.graph().edge_count(),
            "filter engine ready"
        );

        Ok(Self::from_parts(
            engine,
            Arc::new(FsPluginSource::new(config.plugins_dir.clone())),
            config.rebuild_on_roster_change,
        ))
    }

    /// Assemble state from an already-built engine.
    pub fn from_parts(
        engine: Engine,
        source: Arc<dyn PluginSource>,
        rebuild_on_roster_change: bool,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                engine,
                source,
                rebuild_on_roster_change,
                passes: DashMap::new(),
            }),
        }
    }

    /// Get the filter engine.
    pub fn engine(&self) -> &Engine {
        &self.inner.engine
    }

    /// Get the metrics registry.
    pub fn metrics(&self) -> &Metrics {
        self.inner.engine.metrics()
    }

    /// Get the plugin source used for inference.
    pub fn source(&self) -> &dyn PluginSource {
        self.inner.source.as_ref()
    }

    pub fn rebuild_on_roster_change(&self) -> bool {
        self.inner.rebuild_on_roster_change
    }

    /// Token shared by every filter call carrying the same host request id.
    pub fn pass_token(&self, request_id: &str) -> ReentrancyToken {
        self.inner
            .passes
            .entry(request_id.to_string())
            .or_default()
            .clone()
    }

    /// Forget the token of a finished outermost pass.
    pub fn finish_pass(&self, request_id: &str) {
        self.inner
            .passes
            .remove_if(request_id, |_, token| !token.is_held());
    }

    /// Number of host requests with a pass in flight.
    pub fn passes_in_flight(&self) -> usize {
        self.inner.passes.len()
    }

    /// Check if the option store is reachable.
    pub async fn store_healthy(&self) -> bool {
        self.inner.engine.store().healthy().await
    }

    /// Check Redis; None when no Redis tier is configured.
    pub async fn redis_healthy(&self) -> Option<bool> {
        self.inner.engine.cache().redis_healthy().await
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("engine", &self.inner.engine)
            .finish()
    }
}
