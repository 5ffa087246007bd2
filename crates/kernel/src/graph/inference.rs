//! Heuristic dependency inference from installed plugin files.
//!
//! Three lower-confidence signals, unioned per plugin:
//! 1. The header's `Requires Plugins` field.
//! 2. Known marker strings (class names, constants, hook names) of another
//!    plugin appearing in the first [`SOURCE_SCAN_BYTES`] of source.
//! 3. Vendor naming: `jet-foo` depends on the `jet-` hub `jet-engine`.

use tracing::{debug, info};

use super::DependencyGraph;
use crate::plugin::{
    ActivePluginSet, HEADER_SCAN_BYTES, PluginHeader, PluginSource, truncate_to_boundary,
};
use crate::rules::{HubRule, MarkerRule, RuleSet};

/// Bytes of each plugin's main file scanned for marker strings.
pub const SOURCE_SCAN_BYTES: usize = 64 * 1024;

/// Infers dependency edges for active plugins.
#[derive(Debug, Clone)]
pub struct GraphInference {
    markers: Vec<MarkerRule>,
    hubs: Vec<HubRule>,
}

impl GraphInference {
    pub fn new(markers: Vec<MarkerRule>, hubs: Vec<HubRule>) -> Self {
        Self { markers, hubs }
    }

    pub fn from_rules(rules: &RuleSet) -> Self {
        Self::new(rules.markers.clone(), rules.hubs.clone())
    }

    /// Infer edges for every active plugin.
    pub fn infer(&self, active: &ActivePluginSet, source: &dyn PluginSource) -> DependencyGraph {
        let mut graph = DependencyGraph::new();

        for plugin in active.iter() {
            let id = &plugin.id;

            for hub in &self.hubs {
                if id.as_str().starts_with(hub.prefix.as_str()) && *id != hub.hub {
                    graph.add_edge(id.clone(), hub.hub.clone());
                }
            }

            let Some(text) = source.read_main_file(plugin, SOURCE_SCAN_BYTES) else {
                continue;
            };

            let header = PluginHeader::parse_str(truncate_to_boundary(&text, HEADER_SCAN_BYTES));
            if !header.requires.is_empty() {
                debug!(
                    plugin = %id,
                    name = header.name.as_deref().unwrap_or("-"),
                    version = header.version.as_deref().unwrap_or("-"),
                    requires = header.requires.len(),
                    "header declares requirements"
                );
            }
            for parent in header.requires {
                graph.add_edge(id.clone(), parent);
            }

            for rule in &self.markers {
                if rule.plugin != *id && text.contains(rule.marker.as_str()) {
                    debug!(plugin = %id, marker = %rule.marker, parent = %rule.plugin, "marker match");
                    graph.add_edge(id.clone(), rule.plugin.clone());
                }
            }
        }

        info!(
            plugins = active.len(),
            edges = graph.edge_count(),
            "inferred dependency edges"
        );
        graph
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::collections::{BTreeSet, HashMap};

    use super::*;
    use crate::plugin::{ActivePlugin, PluginId};

    struct MapSource(HashMap<&'static str, &'static str>);

    impl PluginSource for MapSource {
        fn read_main_file(&self, plugin: &ActivePlugin, max_bytes: usize) -> Option<String> {
            self.0
                .get(plugin.path.as_str())
                .map(|s| truncate_to_boundary(s, max_bytes).to_string())
        }
    }

    fn inference() -> GraphInference {
        GraphInference::from_rules(&RuleSet::builtin())
    }

    #[test]
    fn header_requires_field() {
        let source = MapSource(HashMap::from([(
            "custom/custom.php",
            "<?php\n/*\n * Plugin Name: Custom\n * Requires Plugins: woocommerce\n */",
        )]));
        let active = ActivePluginSet::from_paths(["custom/custom.php"]);

        let graph = inference().infer(&active, &source);
        assert!(graph.has_edge("custom", "woocommerce"));
    }

    #[test]
    fn marker_strings_imply_dependency() {
        let source = MapSource(HashMap::from([
            (
                "shop-extras/shop-extras.php",
                "<?php if ( class_exists( 'WooCommerce' ) ) { add_action('init', 'x'); }",
            ),
            ("woocommerce/woocommerce.php", "<?php define('WC_VERSION', '9.0');"),
        ]));
        let active =
            ActivePluginSet::from_paths(["shop-extras/shop-extras.php", "woocommerce/woocommerce.php"]);

        let graph = inference().infer(&active, &source);
        assert!(graph.has_edge("shop-extras", "woocommerce"));
        assert!(graph.forward("woocommerce").is_empty());
    }

    #[test]
    fn vendor_prefix_implies_hub_but_not_for_hub_itself() {
        let source = MapSource(HashMap::new());
        let active = ActivePluginSet::from_paths(["jet-blog/jet-blog.php", "jet-engine/jet-engine.php"]);

        let graph = inference().infer(&active, &source);
        assert!(graph.has_edge("jet-blog", "jet-engine"));
        assert!(graph.forward("jet-engine").is_empty());
    }

    #[test]
    fn unreadable_sources_still_get_naming_edges() {
        let source = MapSource(HashMap::new());
        let active = ActivePluginSet::from_paths(["elementor-addons/main.php"]);

        let graph = inference().infer(&active, &source);
        assert_eq!(graph.forward("elementor-addons"), &BTreeSet::from([PluginId::new("elementor")]));
    }
}
