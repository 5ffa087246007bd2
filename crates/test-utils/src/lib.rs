//! Sieve test utilities.
//!
//! Helpers for integration testing: roster and content fixtures, an
//! in-memory plugin source, and an engine builder wired to the memory
//! option store.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Value as JsonValue, json};

use sieve_kernel::cache::CacheLayer;
use sieve_kernel::engine::{Engine, EngineSettings};
use sieve_kernel::metrics::Metrics;
use sieve_kernel::plugin::{ActivePlugin, ActivePluginSet, PluginSource};
use sieve_kernel::request::ContentEntity;
use sieve_kernel::rules::RuleSet;
use sieve_kernel::state::AppState;
use sieve_kernel::store::{MemoryOptionStore, OptionStore};

/// Roster from plugin paths, in load order.
pub fn roster(paths: &[&str]) -> ActivePluginSet {
    ActivePluginSet::from_paths(paths.iter().copied())
}

/// A typical shop site roster.
pub fn shop_roster() -> ActivePluginSet {
    roster(&[
        "akismet/akismet.php",
        "woocommerce/woocommerce.php",
        "woocommerce-payments/woocommerce-payments.php",
        "contact-form-7/wp-contact-form-7.php",
        "elementor/elementor.php",
        "elementor-pro/elementor-pro.php",
        "jet-engine/jet-engine.php",
        "jet-menu/jet-menu.php",
        "wordpress-seo/wp-seo.php",
        "bbpress/bbpress.php",
        "wp-statistics/wp-statistics.php",
    ])
}

/// A content entity with a body and no builder data.
pub fn page(id: &str, body: &str) -> ContentEntity {
    ContentEntity {
        id: id.to_string(),
        post_type: "page".to_string(),
        body: body.to_string(),
        ..ContentEntity::default()
    }
}

/// A content entity whose layout is builder data.
pub fn builder_page(id: &str, builder_data: impl Into<String>) -> ContentEntity {
    ContentEntity {
        builder_data: Some(builder_data.into()),
        ..page(id, "")
    }
}

/// Serialized builder tree: one section holding the given widgets.
pub fn builder_data(widget_types: &[&str]) -> String {
    let widgets: Vec<JsonValue> = widget_types
        .iter()
        .map(|w| json!({ "elType": "widget", "widgetType": w, "elements": [] }))
        .collect();
    json!([{ "elType": "section", "elements": widgets }]).to_string()
}

/// Plugin source serving main files from memory, keyed by plugin path.
#[derive(Debug, Clone, Default)]
pub struct MapSource {
    files: HashMap<String, String>,
}

impl MapSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a main file.
    pub fn with_file(mut self, path: &str, contents: &str) -> Self {
        self.files.insert(path.to_string(), contents.to_string());
        self
    }
}

impl PluginSource for MapSource {
    fn read_main_file(&self, plugin: &ActivePlugin, max_bytes: usize) -> Option<String> {
        self.files.get(&plugin.path).map(|contents| {
            let mut end = contents.len().min(max_bytes);
            while !contents.is_char_boundary(end) {
                end -= 1;
            }
            contents[..end].to_string()
        })
    }
}

/// Builder for engines backed by the memory option store.
#[derive(Debug, Clone)]
pub struct TestEngine {
    rules: RuleSet,
    settings: EngineSettings,
    store: Option<Arc<MemoryOptionStore>>,
}

impl Default for TestEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TestEngine {
    /// Built-in rules and default settings.
    pub fn new() -> Self {
        Self {
            rules: RuleSet::builtin(),
            settings: EngineSettings::default(),
            store: None,
        }
    }

    /// Replace the rule set.
    pub fn with_rules(mut self, rules: RuleSet) -> Self {
        self.rules = rules;
        self
    }

    /// Start from empty rules with only the given dependency edges.
    pub fn with_edges(mut self, edges: &[(&str, &str)]) -> Self {
        let mut rules = RuleSet::default();
        for (child, parent) in edges {
            rules
                .dependencies
                .entry((*child).to_string())
                .or_default()
                .push((*parent).into());
        }
        self.rules = rules;
        self
    }

    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn min_plugins(mut self, min: usize) -> Self {
        self.settings.min_plugins = min;
        self
    }

    pub fn reverse_expansion(mut self, enabled: bool) -> Self {
        self.settings.reverse_expansion = enabled;
        self
    }

    /// Share an option store, e.g. to inspect persisted values.
    pub fn with_store(mut self, store: Arc<MemoryOptionStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Build the engine.
    ///
    /// # Panics
    ///
    /// Panics if the rule set carries an invalid URL pattern.
    #[allow(clippy::expect_used)]
    pub fn build(self) -> Engine {
        let store: Arc<dyn OptionStore> = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryOptionStore::new()));
        let cache = CacheLayer::new(Arc::clone(&store), None);
        Engine::new(
            &self.rules,
            self.settings,
            store,
            cache,
            Arc::new(Metrics::new()),
        )
        .expect("test rules are valid")
    }

    /// Build application state around the engine.
    pub fn build_state(self, source: MapSource, rebuild_on_roster_change: bool) -> AppState {
        AppState::from_parts(self.build(), Arc::new(source), rebuild_on_roster_change)
    }
}
