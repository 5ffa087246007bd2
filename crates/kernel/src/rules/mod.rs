//! Static rule tables that drive detection and dependency closure.
//!
//! A [`RuleSet`] is built once (from [`RuleSet::builtin`], optionally merged
//! with a TOML rules file) and injected into the engine. Nothing here is a
//! process-wide static.
//!
//! Rules file layout:
//!
//! ```toml
//! replace_builtin = false
//! essential = ["my-theme-helper"]
//! logged_in_always = ["wp-statistics"]
//!
//! [[url]]
//! pattern = "re:^/events/\\d{4}/"
//! plugins = ["the-events-calendar"]
//!
//! [shortcodes]
//! my_gallery = ["my-gallery"]
//!
//! [widgets]
//! "my-addon-*" = ["my-addon"]
//!
//! [dependencies]
//! my-addon = ["elementor"]
//! ```

mod builtin;

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::engine::{EngineError, EngineResult};
use crate::plugin::PluginId;

/// Lookup table from a token (shortcode, role, post type, ...) to plugins.
pub type TokenTable = BTreeMap<String, Vec<PluginId>>;

/// Sentinel suffix marking a widget table key as a prefix rule.
pub const PREFIX_SENTINEL: char = '*';

/// Prefix on a URL pattern marking it as a regex instead of a substring.
pub const REGEX_PREFIX: &str = "re:";

/// One row of the URL pattern table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UrlRule {
    /// Substring of the normalized path, or a regex when prefixed with `re:`.
    pub pattern: String,
    pub plugins: Vec<PluginId>,
}

/// A known marker string found in plugin source that implies a dependency.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MarkerRule {
    /// Class name, constant, or hook prefix to look for.
    pub marker: String,
    /// Plugin that defines the marker.
    pub plugin: PluginId,
}

/// Vendor prefix convention: plugins named `<prefix>...` depend on `hub`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HubRule {
    pub prefix: String,
    pub hub: PluginId,
}

/// Every static table the engine consults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuleSet {
    /// When set in a rules file, the file replaces the built-in tables
    /// instead of extending them.
    pub replace_builtin: bool,

    /// Plugins seeded on every request.
    pub essential: Vec<PluginId>,

    /// Plugins added whenever the user holds any role.
    pub logged_in_always: Vec<PluginId>,

    /// Ordered URL pattern table.
    pub url: Vec<UrlRule>,

    /// Query parameter name → plugins.
    pub query: TokenTable,

    /// Shortcode name → plugins.
    pub shortcodes: TokenTable,

    /// Block name (`namespace/name`) or bare namespace → plugins.
    pub blocks: TokenTable,

    /// Page-builder widget type → plugins. Keys ending in `*` are prefixes.
    pub widgets: TokenTable,

    /// Content post type → plugins.
    pub post_types: TokenTable,

    /// Taxonomy name → plugins.
    pub taxonomies: TokenTable,

    /// User role → plugins.
    pub roles: TokenTable,

    /// Child plugin → parents it cannot function without.
    pub dependencies: TokenTable,

    /// Source markers used by heuristic dependency inference.
    pub markers: Vec<MarkerRule>,

    /// Vendor-prefix hubs used by heuristic dependency inference.
    pub hubs: Vec<HubRule>,
}

impl RuleSet {
    /// The rule tables shipped with Sieve.
    pub fn builtin() -> Self {
        builtin::rules()
    }

    /// Parse a rules file from a TOML string.
    pub fn parse_str(content: &str, path: &Path) -> EngineResult<Self> {
        let rules: RuleSet = toml::from_str(content).map_err(|e| EngineError::InvalidRules {
            path: path.display().to_string(),
            details: e.to_string(),
        })?;
        Ok(rules.normalized())
    }

    /// Read and parse a rules file.
    pub fn load_file(path: &Path) -> EngineResult<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| EngineError::RulesUnreadable {
                path: path.display().to_string(),
                details: e.to_string(),
            })?;
        Self::parse_str(&content, path)
    }

    /// Built-in rules, extended or replaced by an optional rules file.
    pub fn load(path: Option<&Path>) -> EngineResult<Self> {
        let Some(path) = path else {
            return Ok(Self::builtin());
        };

        let file = Self::load_file(path)?;
        info!(
            path = %path.display(),
            replace = file.replace_builtin,
            "loaded rules file"
        );

        if file.replace_builtin {
            Ok(file)
        } else {
            let mut rules = Self::builtin();
            rules.merge(file);
            Ok(rules)
        }
    }

    /// Merge another rule set into this one.
    ///
    /// Merging is additive: table rows are unioned, list entries appended
    /// without duplicates. Nothing already present is removed.
    pub fn merge(&mut self, other: RuleSet) {
        extend_unique(&mut self.essential, other.essential);
        extend_unique(&mut self.logged_in_always, other.logged_in_always);
        extend_unique(&mut self.url, other.url);
        merge_table(&mut self.query, other.query);
        merge_table(&mut self.shortcodes, other.shortcodes);
        merge_table(&mut self.blocks, other.blocks);
        merge_table(&mut self.widgets, other.widgets);
        merge_table(&mut self.post_types, other.post_types);
        merge_table(&mut self.taxonomies, other.taxonomies);
        merge_table(&mut self.roles, other.roles);
        merge_table(&mut self.dependencies, other.dependencies);
        extend_unique(&mut self.markers, other.markers);
        extend_unique(&mut self.hubs, other.hubs);
    }

    /// All `(child, parent)` pairs declared in the dependency table.
    pub fn dependency_pairs(&self) -> impl Iterator<Item = (PluginId, PluginId)> + '_ {
        self.dependencies.iter().flat_map(|(child, parents)| {
            let child = PluginId::from_path(child);
            parents.iter().map(move |p| (child.clone(), p.clone()))
        })
    }

    /// Re-normalize identifiers that came in as paths (`woocommerce/woocommerce.php`).
    fn normalized(mut self) -> Self {
        let fix = |ids: &mut Vec<PluginId>| {
            for id in ids.iter_mut() {
                *id = PluginId::from_path(id.as_str());
            }
        };
        fix(&mut self.essential);
        fix(&mut self.logged_in_always);
        for rule in &mut self.url {
            fix(&mut rule.plugins);
        }
        for table in [
            &mut self.query,
            &mut self.shortcodes,
            &mut self.blocks,
            &mut self.widgets,
            &mut self.post_types,
            &mut self.taxonomies,
            &mut self.roles,
            &mut self.dependencies,
        ] {
            table.values_mut().for_each(fix);
        }
        for marker in &mut self.markers {
            marker.plugin = PluginId::from_path(marker.plugin.as_str());
        }
        for hub in &mut self.hubs {
            hub.hub = PluginId::from_path(hub.hub.as_str());
        }
        self
    }
}

fn extend_unique<T: PartialEq>(target: &mut Vec<T>, items: Vec<T>) {
    for item in items {
        if !target.contains(&item) {
            target.push(item);
        }
    }
}

fn merge_table(target: &mut TokenTable, other: TokenTable) {
    for (key, plugins) in other {
        extend_unique(target.entry(key).or_default(), plugins);
    }
}

/// Look up a token and return the plugins it maps to.
pub(crate) fn lookup<'a>(table: &'a TokenTable, token: &str) -> &'a [PluginId] {
    table.get(token).map(Vec::as_slice).unwrap_or(&[])
}
