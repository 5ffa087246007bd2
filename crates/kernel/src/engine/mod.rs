//! The filter engine.
//!
//! One pass turns a request snapshot and the host's active roster into the
//! list of plugins to load:
//!
//! 1. Run the signal extractors. URL and content signals come from the
//!    cache when fresh; per-user signals are always computed.
//! 2. Union the signals with the essential plugins into the seed set.
//! 3. Close the seeds over the dependency graph.
//! 4. Pass the required set through the safety gate.
//!
//! Every failure inside a pass degrades to the unfiltered roster.

mod error;
mod guard;
mod history;

use std::collections::BTreeSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures_util::FutureExt;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub use error::{EngineError, EngineResult};
pub use guard::{PassGuard, ReentrancyToken};
pub use history::{DEFAULT_LOG_CAPACITY, DecisionLog, FilterDecision};

use crate::cache::{CacheDomain, CacheLayer, CacheTtl};
use crate::extract::{ExtractorSet, SignalDomain};
use crate::graph::{DependencyGraph, GraphInference};
use crate::metrics::Metrics;
use crate::plugin::{ActivePluginSet, PluginId, PluginSource};
use crate::request::RequestContext;
use crate::resolve::{ClosureResolver, DEFAULT_MIN_PLUGINS, GateOutcome, SafetyGate};
use crate::rules::RuleSet;
use crate::store::{DEPENDENCY_MAP_KEY, ESSENTIAL_PLUGINS_KEY, OptionStore};

/// Path prefixes served unfiltered by default.
pub const DEFAULT_BYPASS_PATHS: &[&str] = &[
    "/wp-admin/",
    "/wp-login.php",
    "/wp-json/",
    "/wp-cron.php",
    "/xmlrpc.php",
];

/// Query parameters that mark a request as unfilterable by default.
pub const DEFAULT_BYPASS_QUERIES: &[&str] = &["doing_ajax"];

/// Engine tuning.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// When false every pass returns the roster unchanged.
    pub enabled: bool,
    pub min_plugins: usize,
    /// Keep active dependents of required plugins.
    pub reverse_expansion: bool,
    /// Always seeded, in addition to the persisted list.
    pub essential: Vec<PluginId>,
    pub bypass_paths: Vec<String>,
    pub bypass_queries: Vec<String>,
    pub cache_ttl: CacheTtl,
    pub log_capacity: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            min_plugins: DEFAULT_MIN_PLUGINS,
            reverse_expansion: true,
            essential: Vec::new(),
            bypass_paths: DEFAULT_BYPASS_PATHS.iter().map(|p| p.to_string()).collect(),
            bypass_queries: DEFAULT_BYPASS_QUERIES
                .iter()
                .map(|q| q.to_string())
                .collect(),
            cache_ttl: CacheTtl::default(),
            log_capacity: DEFAULT_LOG_CAPACITY,
        }
    }
}

/// Why a pass produced the list it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOutcome {
    /// The roster was narrowed to the required set.
    Filtered,
    /// Required set smaller than the minimum.
    BelowMinimum,
    /// Filtering would have left nothing.
    EmptyResult,
    /// A pass was already running for this request.
    Reentered,
    /// An internal failure was contained.
    FailOpen,
    /// Request matched a bypass rule.
    Bypassed,
    /// Engine switched off.
    Disabled,
}

impl FilterOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Filtered => "filtered",
            Self::BelowMinimum => "below_minimum",
            Self::EmptyResult => "empty_result",
            Self::Reentered => "reentered",
            Self::FailOpen => "fail_open",
            Self::Bypassed => "bypassed",
            Self::Disabled => "disabled",
        }
    }

    /// Whether the host received fewer plugins than it offered.
    pub fn is_filtered(self) -> bool {
        self == Self::Filtered
    }
}

impl From<GateOutcome> for FilterOutcome {
    fn from(outcome: GateOutcome) -> Self {
        match outcome {
            GateOutcome::Filtered => Self::Filtered,
            GateOutcome::BelowMinimum => Self::BelowMinimum,
            GateOutcome::EmptyResult => Self::EmptyResult,
        }
    }
}

/// Result of one pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterResult {
    /// Plugin paths to load, in roster order.
    pub plugins: Vec<String>,
    pub outcome: FilterOutcome,
    /// Active seed identifiers the closure started from.
    pub seeds: Vec<PluginId>,
    /// Size of the required set after closure.
    pub required: usize,
}

impl FilterResult {
    fn unchanged(active: &ActivePluginSet, outcome: FilterOutcome) -> Self {
        Self {
            plugins: active.paths(),
            outcome,
            seeds: Vec::new(),
            required: 0,
        }
    }
}

/// Outcome of a dependency graph rebuild.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphSummary {
    /// Edges found by inference over the roster.
    pub inferred_edges: usize,
    /// Edges in the graph now in use.
    pub total_edges: usize,
}

/// The plugin filter.
pub struct Engine {
    settings: EngineSettings,
    extractors: ExtractorSet,
    inference: GraphInference,
    /// Edges declared by the rule set; every graph starts from these.
    declared: DependencyGraph,
    graph: RwLock<Arc<DependencyGraph>>,
    gate: SafetyGate,
    cache: CacheLayer,
    store: Arc<dyn OptionStore>,
    /// Essentials from configuration and the rule set.
    fixed_essentials: BTreeSet<PluginId>,
    /// Operator-managed essentials, persisted in the option store.
    essentials: RwLock<BTreeSet<PluginId>>,
    metrics: Arc<Metrics>,
    log: DecisionLog,
}

impl Engine {
    /// Build an engine from a rule set.
    ///
    /// Fails only if the rules carry an invalid URL pattern.
    pub fn new(
        rules: &RuleSet,
        settings: EngineSettings,
        store: Arc<dyn OptionStore>,
        cache: CacheLayer,
        metrics: Arc<Metrics>,
    ) -> EngineResult<Self> {
        let extractors = ExtractorSet::from_rules(rules)?;
        let declared = DependencyGraph::from_rules(rules);
        let log = DecisionLog::new(settings.log_capacity);
        let fixed_essentials = settings
            .essential
            .iter()
            .chain(&rules.essential)
            .cloned()
            .collect();

        Ok(Self {
            gate: SafetyGate::new(settings.min_plugins),
            settings,
            extractors,
            inference: GraphInference::from_rules(rules),
            graph: RwLock::new(Arc::new(declared.clone())),
            declared,
            cache,
            store,
            fixed_essentials,
            essentials: RwLock::new(BTreeSet::new()),
            metrics,
            log,
        })
    }

    /// Replace the extractors built from the rule set.
    pub fn with_extractors(mut self, extractors: ExtractorSet) -> Self {
        self.extractors = extractors;
        self
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn extractors(&self) -> &ExtractorSet {
        &self.extractors
    }

    pub fn cache(&self) -> &CacheLayer {
        &self.cache
    }

    pub fn gate(&self) -> &SafetyGate {
        &self.gate
    }

    pub fn store(&self) -> &Arc<dyn OptionStore> {
        &self.store
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn log(&self) -> &DecisionLog {
        &self.log
    }

    /// Snapshot of the graph in use.
    pub fn graph(&self) -> Arc<DependencyGraph> {
        Arc::clone(&self.graph.read())
    }

    /// Load the persisted dependency map and essentials list.
    ///
    /// Missing options are not an error. A corrupt dependency map is logged
    /// and the declared graph stays in use; the essentials still load.
    pub async fn load_persisted(&self) -> EngineResult<()> {
        if let Some(json) = self.store.get_option(DEPENDENCY_MAP_KEY).await? {
            match DependencyGraph::from_json(&json) {
                Ok(persisted) => {
                    let mut graph = self.declared.clone();
                    let added = graph.merge(&persisted);
                    *self.graph.write() = Arc::new(graph);
                    info!(edges = added, "loaded persisted dependency map");
                }
                Err(e) => warn!(error = %e, "ignoring corrupt dependency map"),
            }
        }

        if let Some(json) = self.store.get_option(ESSENTIAL_PLUGINS_KEY).await? {
            match serde_json::from_str::<Vec<PluginId>>(&json) {
                Ok(ids) => *self.essentials.write() = ids.into_iter().collect(),
                Err(e) => warn!(error = %e, "ignoring malformed essential plugin list"),
            }
        }

        Ok(())
    }

    /// Essential plugins: configured ones plus the persisted list.
    pub fn essentials(&self) -> BTreeSet<PluginId> {
        let mut all = self.fixed_essentials.clone();
        all.extend(self.essentials.read().iter().cloned());
        all
    }

    /// Essentials from configuration and the rule set.
    pub fn fixed_essentials(&self) -> &BTreeSet<PluginId> {
        &self.fixed_essentials
    }

    /// The persisted, operator-managed part of the essentials.
    pub fn stored_essentials(&self) -> BTreeSet<PluginId> {
        self.essentials.read().clone()
    }

    /// Replace the persisted essentials list.
    pub async fn set_essentials(&self, ids: BTreeSet<PluginId>) -> EngineResult<()> {
        let json = serde_json::to_string(&ids)
            .map_err(|e| EngineError::store("set_option", e))?;
        self.store.set_option(ESSENTIAL_PLUGINS_KEY, &json).await?;
        info!(count = ids.len(), "essential plugins updated");
        *self.essentials.write() = ids;
        Ok(())
    }

    /// Filter the active roster for one request.
    ///
    /// Never fails: every problem, including a panic anywhere in the pass,
    /// yields `active` unchanged with an outcome saying why.
    pub async fn filter(
        &self,
        token: &ReentrancyToken,
        ctx: &RequestContext,
        active: &ActivePluginSet,
    ) -> FilterResult {
        let Some(_guard) = token.enter() else {
            debug!(uri = %ctx.uri, "nested filter call, returning roster unchanged");
            self.metrics
                .record_filter(FilterOutcome::Reentered.as_str(), 0.0, active.len(), active.len());
            return FilterResult::unchanged(active, FilterOutcome::Reentered);
        };

        let started = Instant::now();
        let path = ctx.normalized_path();

        let result = if !self.settings.enabled {
            FilterResult::unchanged(active, FilterOutcome::Disabled)
        } else if self.is_bypassed(&path, ctx) {
            debug!(path = %path, "bypassed request");
            FilterResult::unchanged(active, FilterOutcome::Bypassed)
        } else {
            let pass = AssertUnwindSafe(self.run_pass(ctx, active)).catch_unwind();
            match pass.await.unwrap_or(Err(EngineError::Aborted { stage: "filter pass" })) {
                Ok(result) => result,
                Err(e) => {
                    warn!(error = %e, path = %path, "filter pass failed, loading all plugins");
                    FilterResult::unchanged(active, FilterOutcome::FailOpen)
                }
            }
        };

        let elapsed = started.elapsed();
        self.record(&path, active, &result, elapsed);
        result
    }

    async fn run_pass(
        &self,
        ctx: &RequestContext,
        active: &ActivePluginSet,
    ) -> EngineResult<FilterResult> {
        let mut seeds = self.domain_seeds(SignalDomain::Url, ctx).await?;
        if SignalDomain::Content.available_in(ctx.phase) {
            seeds.extend(self.domain_seeds(SignalDomain::Content, ctx).await?);
        }
        seeds.extend(
            self.extractors
                .extract_domain(SignalDomain::Live, ctx, active)
                .seeds(),
        );
        seeds.extend(self.essentials());

        let seeds = active.retain_active(seeds);

        let graph = self.graph();
        let (required, decision) = contained("resolution", || {
            let required = ClosureResolver::new(&graph)
                .with_reverse_expansion(self.settings.reverse_expansion)
                .resolve(&seeds, active);
            (required.len(), self.gate.apply(&required, active))
        })?;

        debug!(
            seeds = seeds.len(),
            required,
            active = active.len(),
            loaded = decision.plugins.len(),
            outcome = FilterOutcome::from(decision.outcome).as_str(),
            "filter pass complete"
        );

        Ok(FilterResult {
            plugins: decision.plugins,
            outcome: decision.outcome.into(),
            seeds: seeds.into_iter().collect(),
            required,
        })
    }

    /// Raw seeds of a cacheable domain, from cache when fresh.
    async fn domain_seeds(
        &self,
        domain: SignalDomain,
        ctx: &RequestContext,
    ) -> EngineResult<BTreeSet<PluginId>> {
        let Some((cache_domain, key)) = cache_key(domain, ctx) else {
            if domain == SignalDomain::Content && ctx.content.is_none() {
                return Ok(BTreeSet::new());
            }
            return Ok(self.extractors.domain_seeds(domain, ctx));
        };

        let label = match cache_domain {
            CacheDomain::Url => "url",
            CacheDomain::Content => "content",
        };

        if let Some(entry) = self.cache.get(&key).await {
            self.metrics.record_cache(label, true);
            return Ok(entry.plugins);
        }
        self.metrics.record_cache(label, false);

        let seeds = self.extractors.domain_seeds(domain, ctx);
        self.cache
            .set(&key, seeds.clone(), self.settings.cache_ttl.for_domain(cache_domain))
            .await;
        Ok(seeds)
    }

    fn is_bypassed(&self, path: &str, ctx: &RequestContext) -> bool {
        self.settings
            .bypass_paths
            .iter()
            .any(|prefix| path.starts_with(&prefix.to_lowercase()))
            || self.settings.bypass_queries.iter().any(|q| ctx.has_query(q))
    }

    fn record(
        &self,
        path: &str,
        active: &ActivePluginSet,
        result: &FilterResult,
        elapsed: Duration,
    ) {
        self.metrics.record_filter(
            result.outcome.as_str(),
            elapsed.as_secs_f64(),
            result.plugins.len(),
            active.len(),
        );
        self.log.record(FilterDecision {
            at: Utc::now(),
            path: path.to_string(),
            outcome: result.outcome,
            active: active.len(),
            loaded: result.plugins.len(),
            seeds: result.seeds.len(),
            duration_us: u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX),
        });
    }

    /// The roster changed: every URL-domain entry is stale.
    pub async fn on_roster_changed(&self) {
        self.cache.invalidate_domain(CacheDomain::Url).await;
        info!("plugin roster changed, URL cache cleared");
    }

    /// A content entity was saved: drop its cached signals.
    pub async fn on_content_saved(&self, content_id: &str) {
        self.cache
            .invalidate(&CacheDomain::content_key(content_id))
            .await;
        debug!(content_id = %content_id, "content cache entry cleared");
    }

    /// Infer edges from the roster, persist them and swap the graph in use.
    pub async fn rebuild_graph(
        &self,
        active: &ActivePluginSet,
        source: &dyn PluginSource,
    ) -> EngineResult<GraphSummary> {
        let inferred = self.inference.infer(active, source);
        let mut graph = self.declared.clone();
        graph.merge(&inferred);

        self.store
            .set_option(DEPENDENCY_MAP_KEY, &graph.to_json()?)
            .await?;

        let summary = GraphSummary {
            inferred_edges: inferred.edge_count(),
            total_edges: graph.edge_count(),
        };
        *self.graph.write() = Arc::new(graph);
        self.metrics.record_graph_rebuild();

        info!(
            plugins = active.len(),
            inferred = summary.inferred_edges,
            total = summary.total_edges,
            "dependency graph rebuilt"
        );
        Ok(summary)
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("settings", &self.settings)
            .field("extractors", &self.extractors)
            .field("edges", &self.graph.read().edge_count())
            .finish()
    }
}

/// Cache key for a domain's signals, if that domain is cacheable here.
fn cache_key(domain: SignalDomain, ctx: &RequestContext) -> Option<(CacheDomain, String)> {
    match domain {
        SignalDomain::Url => Some((
            CacheDomain::Url,
            CacheDomain::url_key(&ctx.normalized_path()),
        )),
        SignalDomain::Content => ctx
            .content
            .as_ref()
            .filter(|c| !c.id.is_empty())
            .map(|c| (CacheDomain::Content, CacheDomain::content_key(&c.id))),
        SignalDomain::Live => None,
    }
}

/// Run a synchronous pipeline stage, turning a panic into an error.
fn contained<T>(stage: &'static str, f: impl FnOnce() -> T) -> EngineResult<T> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|_| EngineError::Aborted { stage })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::request::ContentEntity;
    use crate::store::MemoryOptionStore;

    fn engine(settings: EngineSettings) -> Engine {
        let store: Arc<dyn OptionStore> = Arc::new(MemoryOptionStore::new());
        let cache = CacheLayer::new(Arc::clone(&store), None);
        Engine::new(
            &RuleSet::builtin(),
            settings,
            store,
            cache,
            Arc::new(Metrics::new()),
        )
        .unwrap()
    }

    fn roster() -> ActivePluginSet {
        ActivePluginSet::from_paths([
            "akismet/akismet.php",
            "woocommerce/woocommerce.php",
            "contact-form-7/wp-contact-form-7.php",
            "elementor/elementor.php",
            "wordpress-seo/wp-seo-premium.php",
            "bbpress/bbpress.php",
        ])
    }

    #[test]
    fn outcome_labels_match_serde() {
        for outcome in [
            FilterOutcome::Filtered,
            FilterOutcome::BelowMinimum,
            FilterOutcome::EmptyResult,
            FilterOutcome::Reentered,
            FilterOutcome::FailOpen,
            FilterOutcome::Bypassed,
            FilterOutcome::Disabled,
        ] {
            let json = serde_json::to_string(&outcome).unwrap();
            assert_eq!(json, format!("\"{}\"", outcome.as_str()));
        }
    }

    #[test]
    fn contained_converts_panics() {
        let err = contained("test", || -> usize { panic!("boom") }).unwrap_err();
        assert!(matches!(err, EngineError::Aborted { stage: "test" }));
        assert_eq!(contained("test", || 7).unwrap(), 7);
    }

    #[test]
    fn live_domain_is_never_cached() {
        let ctx = RequestContext::new("/shop/");
        assert!(cache_key(SignalDomain::Live, &ctx).is_none());
        assert!(cache_key(SignalDomain::Content, &ctx).is_none());
        let (domain, key) = cache_key(SignalDomain::Url, &ctx).unwrap();
        assert_eq!(domain, CacheDomain::Url);
        assert!(key.starts_with("sieve:url:"));
    }

    #[tokio::test]
    async fn disabled_engine_returns_roster() {
        let engine = engine(EngineSettings {
            enabled: false,
            ..EngineSettings::default()
        });
        let active = roster();
        let result = engine
            .filter(&ReentrancyToken::new(), &RequestContext::new("/cart/"), &active)
            .await;
        assert_eq!(result.outcome, FilterOutcome::Disabled);
        assert_eq!(result.plugins, active.paths());
    }

    #[tokio::test]
    async fn held_token_short_circuits() {
        let engine = engine(EngineSettings::default());
        let token = ReentrancyToken::new();
        let _outer = token.enter().unwrap();
        let active = roster();
        let result = engine
            .filter(&token, &RequestContext::new("/cart/"), &active)
            .await;
        assert_eq!(result.outcome, FilterOutcome::Reentered);
        assert_eq!(result.plugins, active.paths());
        assert!(engine.log().is_empty());
    }

    #[tokio::test]
    async fn admin_paths_bypass() {
        let engine = engine(EngineSettings::default());
        let active = roster();
        for uri in ["/wp-admin/options.php", "/wp-login.php", "/shop/?doing_ajax=1"] {
            let result = engine
                .filter(&ReentrancyToken::new(), &RequestContext::new(uri), &active)
                .await;
            assert_eq!(result.outcome, FilterOutcome::Bypassed, "{uri}");
        }
    }

    #[tokio::test]
    async fn essentials_are_seeded_and_persisted() {
        let engine = engine(EngineSettings {
            essential: vec![PluginId::new("akismet")],
            ..EngineSettings::default()
        });
        engine
            .set_essentials(BTreeSet::from([PluginId::new("wordpress-seo")]))
            .await
            .unwrap();

        let essentials = engine.essentials();
        assert!(essentials.contains("akismet"));
        assert!(essentials.contains("wordpress-seo"));

        let stored = engine
            .store()
            .get_option(ESSENTIAL_PLUGINS_KEY)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored, r#"["wordpress-seo"]"#);
    }

    #[tokio::test]
    async fn content_signals_skipped_in_early_phase() {
        let engine = engine(EngineSettings {
            min_plugins: 1,
            ..EngineSettings::default()
        });
        let content = ContentEntity {
            id: "42".into(),
            body: "[contact-form-7 id=\"1\"]".into(),
            ..ContentEntity::default()
        };
        let ctx = RequestContext::new("/about/").with_content(content);
        let active = roster();

        let full = engine.filter(&ReentrancyToken::new(), &ctx, &active).await;
        assert!(full.seeds.iter().any(|id| id.as_str() == "contact-form-7"));

        let early = ctx.with_phase(crate::request::Phase::Early);
        let early = engine.filter(&ReentrancyToken::new(), &early, &active).await;
        assert!(!early.seeds.iter().any(|id| id.as_str() == "contact-form-7"));
    }
}
