//! Page-builder extractor.
//!
//! Builder metadata is a JSON tree of elements. Each node may carry a
//! `widgetType` and an `elements` array of children:
//!
//! ```json
//! [{"elType":"section","elements":[
//!     {"elType":"widget","widgetType":"jet-listing-grid","elements":[]}
//! ]}]
//! ```

use std::collections::{BTreeSet, HashMap};

use serde_json::Value;
use tracing::debug;

use super::{SignalDomain, SignalExtractor, collect};
use crate::plugin::PluginId;
use crate::request::RequestContext;
use crate::rules::{PREFIX_SENTINEL, TokenTable};

/// Deepest element nesting that is walked.
pub const MAX_BUILDER_DEPTH: usize = 64;

/// Maps builder widget types to plugins.
///
/// An exact table entry wins; otherwise the longest matching prefix rule
/// (a table key ending in `*`) applies.
#[derive(Debug, Clone)]
pub struct BuilderExtractor {
    exact: HashMap<String, Vec<PluginId>>,
    /// Sorted longest prefix first.
    prefixes: Vec<(String, Vec<PluginId>)>,
}

impl BuilderExtractor {
    pub fn new(widgets: &TokenTable) -> Self {
        let mut exact = HashMap::new();
        let mut prefixes = Vec::new();

        for (key, plugins) in widgets {
            match key.strip_suffix(PREFIX_SENTINEL) {
                Some(prefix) => prefixes.push((prefix.to_string(), plugins.clone())),
                None => {
                    exact.insert(key.clone(), plugins.clone());
                }
            }
        }
        prefixes.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));

        Self { exact, prefixes }
    }

    /// Plugins for one widget type.
    pub fn plugins_for(&self, widget_type: &str) -> &[PluginId] {
        if let Some(plugins) = self.exact.get(widget_type) {
            return plugins;
        }
        self.prefixes
            .iter()
            .find(|(prefix, _)| widget_type.starts_with(prefix.as_str()))
            .map(|(_, plugins)| plugins.as_slice())
            .unwrap_or(&[])
    }

    /// Decode and walk serialized builder data.
    ///
    /// Undecodable data is treated as absent.
    pub fn scan(&self, data: &str) -> BTreeSet<PluginId> {
        let mut out = BTreeSet::new();
        if data.trim().is_empty() {
            return out;
        }

        match serde_json::from_str::<Value>(data) {
            Ok(tree) => self.walk(&tree, 0, &mut out),
            Err(e) => debug!(error = %e, "builder data is not valid JSON; ignoring"),
        }
        out
    }

    fn walk(&self, node: &Value, depth: usize, out: &mut BTreeSet<PluginId>) {
        if depth > MAX_BUILDER_DEPTH {
            debug!(depth, "builder tree too deep; truncating walk");
            return;
        }

        match node {
            Value::Array(items) => {
                for item in items {
                    self.walk(item, depth + 1, out);
                }
            }
            Value::Object(map) => {
                if let Some(widget_type) = map.get("widgetType").and_then(Value::as_str) {
                    collect(out, self.plugins_for(widget_type));
                }
                if let Some(children) = map.get("elements") {
                    self.walk(children, depth + 1, out);
                }
            }
            _ => {}
        }
    }
}

impl SignalExtractor for BuilderExtractor {
    fn name(&self) -> &'static str {
        "builder"
    }

    fn domain(&self) -> SignalDomain {
        SignalDomain::Content
    }

    fn extract(&self, ctx: &RequestContext) -> BTreeSet<PluginId> {
        ctx.content
            .as_ref()
            .and_then(|c| c.builder_data.as_deref())
            .map(|data| self.scan(data))
            .unwrap_or_default()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn extractor() -> BuilderExtractor {
        let mut widgets = TokenTable::new();
        widgets.insert("form".into(), vec![PluginId::new("elementor-pro")]);
        widgets.insert("jet-*".into(), vec![PluginId::new("jet-elements")]);
        widgets.insert("jet-menu*".into(), vec![PluginId::new("jet-menu")]);
        BuilderExtractor::new(&widgets)
    }

    #[test]
    fn exact_and_prefix_rules() {
        let ex = extractor();
        assert_eq!(ex.plugins_for("form"), &[PluginId::new("elementor-pro")]);
        assert_eq!(ex.plugins_for("jet-menu-mega"), &[PluginId::new("jet-menu")]);
        assert_eq!(ex.plugins_for("jet-carousel"), &[PluginId::new("jet-elements")]);
        assert!(ex.plugins_for("heading").is_empty());
    }

    #[test]
    fn walks_nested_elements() {
        let data = r#"[
            {"elType":"section","elements":[
                {"elType":"column","elements":[
                    {"elType":"widget","widgetType":"form","elements":[]},
                    {"elType":"widget","widgetType":"jet-menu","elements":[]}
                ]}
            ]}
        ]"#;
        assert_eq!(
            extractor().scan(data),
            BTreeSet::from([PluginId::new("elementor-pro"), PluginId::new("jet-menu")])
        );
    }

    #[test]
    fn single_root_object_is_accepted() {
        let data = r#"{"widgetType":"form"}"#;
        assert_eq!(extractor().scan(data), BTreeSet::from([PluginId::new("elementor-pro")]));
    }

    #[test]
    fn malformed_data_is_empty() {
        assert!(extractor().scan("a:1:{s:4:\"form\";}").is_empty());
        assert!(extractor().scan("[{\"widgetType\":").is_empty());
        assert!(extractor().scan("").is_empty());
    }

    #[test]
    fn depth_is_bounded() {
        let mut data = String::from(r#"{"widgetType":"form"}"#);
        // Each wrap adds two levels; stays under serde_json's own recursion limit.
        for _ in 0..(MAX_BUILDER_DEPTH / 2 + 5) {
            data = format!(r#"{{"elements":[{data}]}}"#);
        }
        assert!(extractor().scan(&data).is_empty());
    }
}
