//! Signal extractors.
//!
//! Each extractor inspects one facet of a [`RequestContext`] and names the
//! plugins it believes the request needs. Extractors are pure and never
//! fail: anything they cannot make sense of yields an empty set.
//!
//! Extractors are grouped by [`SignalDomain`] so the engine can cache the
//! URL-derived and content-derived signals separately and always compute
//! the per-user signals live.

mod builder;
mod content;
mod post_type;
mod query;
mod role;
mod url;

use std::collections::{BTreeMap, BTreeSet};
use std::panic::{self, AssertUnwindSafe};

use tracing::{trace, warn};

pub use builder::{BuilderExtractor, MAX_BUILDER_DEPTH};
pub use content::ContentExtractor;
pub use post_type::PostTypeExtractor;
pub use query::QueryExtractor;
pub use role::RoleExtractor;
pub use url::UrlExtractor;

use crate::engine::EngineResult;
use crate::plugin::{ActivePluginSet, PluginId};
use crate::request::{Phase, RequestContext};
use crate::rules::RuleSet;

/// Which cache domain an extractor's output belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SignalDomain {
    /// Depends only on the normalized request path.
    Url,
    /// Depends only on the matched content entity.
    Content,
    /// Depends on per-request state (query, user); never cached.
    Live,
}

impl SignalDomain {
    /// Whether signals of this domain are available in a phase.
    pub fn available_in(self, phase: Phase) -> bool {
        match self {
            Self::Url | Self::Live => true,
            Self::Content => phase == Phase::Full,
        }
    }
}

/// Trait for signal extractors.
pub trait SignalExtractor: Send + Sync {
    /// Extractor name for logs and debug output.
    fn name(&self) -> &'static str;

    /// Cache domain of this extractor's output.
    fn domain(&self) -> SignalDomain;

    /// Plugins the request appears to need. Must not panic or fail.
    fn extract(&self, ctx: &RequestContext) -> BTreeSet<PluginId>;
}

/// Per-extractor output of one pass, restricted to active plugins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Signals {
    pub by_extractor: BTreeMap<&'static str, BTreeSet<PluginId>>,
}

impl Signals {
    /// Union of every extractor's output.
    pub fn seeds(&self) -> BTreeSet<PluginId> {
        self.by_extractor.values().flatten().cloned().collect()
    }
}

/// The ordered list of extractors the engine runs.
pub struct ExtractorSet {
    extractors: Vec<Box<dyn SignalExtractor>>,
}

impl ExtractorSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self {
            extractors: Vec::new(),
        }
    }

    /// Add an extractor.
    pub fn add<E: SignalExtractor + 'static>(mut self, extractor: E) -> Self {
        self.extractors.push(Box::new(extractor));
        self
    }

    /// The standard extractors configured from a rule set.
    ///
    /// Fails only if a URL rule carries an invalid regex.
    pub fn from_rules(rules: &RuleSet) -> EngineResult<Self> {
        Ok(Self::new()
            .add(UrlExtractor::from_rules(&rules.url)?)
            .add(QueryExtractor::new(rules.query.clone()))
            .add(ContentExtractor::new(
                rules.shortcodes.clone(),
                rules.blocks.clone(),
            ))
            .add(BuilderExtractor::new(&rules.widgets))
            .add(PostTypeExtractor::new(
                rules.post_types.clone(),
                rules.taxonomies.clone(),
            ))
            .add(RoleExtractor::new(
                rules.roles.clone(),
                rules.logged_in_always.clone(),
            )))
    }

    /// Names of the configured extractors, in run order.
    pub fn names(&self) -> Vec<&'static str> {
        self.extractors.iter().map(|e| e.name()).collect()
    }

    /// Run every extractor of `domain`, keeping only active plugins.
    pub fn extract_domain(
        &self,
        domain: SignalDomain,
        ctx: &RequestContext,
        active: &ActivePluginSet,
    ) -> Signals {
        let mut signals = Signals::default();

        for extractor in self.extractors.iter().filter(|e| e.domain() == domain) {
            let found = active.retain_active(run(extractor.as_ref(), ctx));
            trace!(extractor = extractor.name(), found = found.len(), "extracted signals");
            signals
                .by_extractor
                .entry(extractor.name())
                .or_default()
                .extend(found);
        }

        signals
    }

    /// Union of every `domain` extractor's raw output.
    ///
    /// Not restricted to the roster; this is the form the cache stores, so
    /// an entry stays valid when plugins are deactivated.
    pub fn domain_seeds(&self, domain: SignalDomain, ctx: &RequestContext) -> BTreeSet<PluginId> {
        self.extractors
            .iter()
            .filter(|e| e.domain() == domain)
            .flat_map(|e| run(e.as_ref(), ctx))
            .collect()
    }
}

/// Run one extractor. A panic costs only that extractor's signals.
fn run(extractor: &dyn SignalExtractor, ctx: &RequestContext) -> BTreeSet<PluginId> {
    panic::catch_unwind(AssertUnwindSafe(|| extractor.extract(ctx))).unwrap_or_else(|_| {
        warn!(extractor = extractor.name(), uri = %ctx.uri, "extractor panicked, ignoring its signals");
        BTreeSet::new()
    })
}

impl Default for ExtractorSet {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ExtractorSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractorSet")
            .field("extractors", &self.names())
            .finish()
    }
}

/// Collect the plugins a token maps to into `out`.
fn collect(out: &mut BTreeSet<PluginId>, plugins: &[PluginId]) {
    out.extend(plugins.iter().cloned());
}
