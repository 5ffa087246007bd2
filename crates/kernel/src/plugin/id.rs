//! Plugin identifiers and the host's ordered active-plugin roster.
//!
//! The host hands us plugin *paths* (`jet-engine/jet-engine.php`), while every
//! rules table and dependency edge speaks in *identifiers* (`jet-engine`).
//! [`PluginId::from_path`] is the single normalization point between the two.

use std::borrow::Borrow;
use std::collections::{BTreeSet, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique slug naming an installable plugin.
///
/// Equality is case-sensitive and exact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PluginId(String);

impl PluginId {
    /// Wrap an already-normalized identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Normalize a host plugin path into its identifier.
    ///
    /// `vendor/main-file.php` yields `vendor`; a single-file plugin
    /// `hello.php` yields `hello`. Backslash separators are accepted.
    pub fn from_path(path: &str) -> Self {
        let trimmed = path.trim().trim_start_matches(['/', '\\']);

        if let Some((dir, _)) = trimmed.split_once(['/', '\\']) {
            return Self(dir.to_string());
        }

        let stem = match trimmed.rsplit_once('.') {
            Some((stem, _ext)) if !stem.is_empty() => stem,
            _ => trimmed,
        };
        Self(stem.to_string())
    }

    /// Borrow the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Vendor prefix up to and including the first `-`, if any.
    pub fn vendor_prefix(&self) -> Option<&str> {
        self.0.find('-').map(|idx| &self.0[..=idx])
    }
}

impl fmt::Display for PluginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for PluginId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PluginId {
    fn from(value: &str) -> Self {
        Self::from_path(value)
    }
}

impl From<String> for PluginId {
    fn from(value: String) -> Self {
        Self::from_path(&value)
    }
}

/// One entry of the active roster: the host path plus its identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivePlugin {
    pub path: String,
    pub id: PluginId,
}

/// Ordered sequence of active plugin paths as supplied by the host.
///
/// Order is load order and is preserved by every filtered output.
#[derive(Debug, Clone, Default)]
pub struct ActivePluginSet {
    plugins: Vec<ActivePlugin>,
    ids: HashSet<PluginId>,
}

impl ActivePluginSet {
    /// Build the roster from host paths, keeping their order.
    pub fn from_paths<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let plugins: Vec<ActivePlugin> = paths
            .into_iter()
            .map(Into::into)
            .map(|path| {
                let id = PluginId::from_path(&path);
                ActivePlugin { path, id }
            })
            .collect();
        let ids = plugins.iter().map(|p| p.id.clone()).collect();

        Self { plugins, ids }
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Whether an identifier is active.
    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ActivePlugin> {
        self.plugins.iter()
    }

    /// Identifiers in load order.
    pub fn ids(&self) -> impl Iterator<Item = &PluginId> {
        self.plugins.iter().map(|p| &p.id)
    }

    /// Host paths in load order.
    pub fn paths(&self) -> Vec<String> {
        self.plugins.iter().map(|p| p.path.clone()).collect()
    }

    /// Keep only identifiers that are active.
    pub fn retain_active(&self, ids: BTreeSet<PluginId>) -> BTreeSet<PluginId> {
        ids.into_iter().filter(|id| self.contains(id.as_str())).collect()
    }

    /// Host paths whose identifier is in `required`, in load order.
    pub fn paths_within(&self, required: &BTreeSet<PluginId>) -> Vec<String> {
        self.plugins
            .iter()
            .filter(|p| required.contains(&p.id))
            .map(|p| p.path.clone())
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn from_path_takes_directory() {
        assert_eq!(PluginId::from_path("jet-engine/jet-engine.php").as_str(), "jet-engine");
        assert_eq!(PluginId::from_path("/woocommerce/woocommerce.php").as_str(), "woocommerce");
        assert_eq!(PluginId::from_path("elementor\\elementor.php").as_str(), "elementor");
    }

    #[test]
    fn from_path_single_file_plugin() {
        assert_eq!(PluginId::from_path("hello.php").as_str(), "hello");
        assert_eq!(PluginId::from_path("hello").as_str(), "hello");
        assert_eq!(PluginId::from_path(".hidden").as_str(), ".hidden");
    }

    #[test]
    fn identifier_equality_is_case_sensitive() {
        assert_ne!(PluginId::new("Elementor"), PluginId::new("elementor"));
    }

    #[test]
    fn vendor_prefix() {
        assert_eq!(PluginId::new("jet-menu").vendor_prefix(), Some("jet-"));
        assert_eq!(PluginId::new("woocommerce").vendor_prefix(), None);
    }

    #[test]
    fn roster_preserves_order_and_membership() {
        let set = ActivePluginSet::from_paths(["b/b.php", "a/a.php", "c.php"]);
        let ids: Vec<&str> = set.ids().map(PluginId::as_str).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
        assert!(set.contains("c"));
        assert!(!set.contains("c.php"));
    }

    #[test]
    fn paths_within_keeps_load_order() {
        let set = ActivePluginSet::from_paths(["p1/p.php", "p2/p.php", "p3/p.php"]);
        let required: BTreeSet<PluginId> = BTreeSet::from([PluginId::new("p3"), PluginId::new("p1")]);
        assert_eq!(set.paths_within(&required), vec!["p1/p.php", "p3/p.php"]);
    }
}
