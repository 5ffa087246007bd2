//! Plugin dependency graph.
//!
//! Edges are `(child, parent)`: the child cannot function without the parent
//! being loaded. The graph is indexed both ways so the resolver can ask
//! "what does X need" and "what needs X" in O(1).
//!
//! The static table from the rule set is the baseline. [`GraphInference`]
//! adds heuristic edges, and [`DependencyGraph::merge`] only ever adds.

mod inference;

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use inference::{GraphInference, SOURCE_SCAN_BYTES};

use crate::engine::{EngineError, EngineResult};
use crate::plugin::PluginId;
use crate::rules::RuleSet;

static NO_EDGES: BTreeSet<PluginId> = BTreeSet::new();

/// Directed dependency graph over plugin identifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    forward: HashMap<PluginId, BTreeSet<PluginId>>,
    backward: HashMap<PluginId, BTreeSet<PluginId>>,
}

/// On-disk form of a graph, stored in the option store.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedGraph {
    generated_at: DateTime<Utc>,
    /// Child → parents.
    edges: BTreeMap<PluginId, BTreeSet<PluginId>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the graph from a rule set's static dependency table.
    pub fn from_rules(rules: &RuleSet) -> Self {
        let mut graph = Self::new();
        for (child, parent) in rules.dependency_pairs() {
            graph.add_edge(child, parent);
        }
        graph
    }

    /// Add an edge. Self-edges are ignored. Returns whether it was new.
    pub fn add_edge(&mut self, child: PluginId, parent: PluginId) -> bool {
        if child == parent {
            return false;
        }
        let added = self
            .forward
            .entry(child.clone())
            .or_default()
            .insert(parent.clone());
        self.backward.entry(parent).or_default().insert(child);
        added
    }

    /// What `id` requires.
    pub fn forward(&self, id: &str) -> &BTreeSet<PluginId> {
        self.forward.get(id).unwrap_or(&NO_EDGES)
    }

    /// What requires `id`.
    pub fn backward(&self, id: &str) -> &BTreeSet<PluginId> {
        self.backward.get(id).unwrap_or(&NO_EDGES)
    }

    /// Whether the edge `(child, parent)` exists.
    pub fn has_edge(&self, child: &str, parent: &str) -> bool {
        self.forward(child).contains(parent)
    }

    /// All edges as `(child, parent)`, sorted.
    pub fn edges(&self) -> Vec<(PluginId, PluginId)> {
        let mut edges: Vec<_> = self
            .forward
            .iter()
            .flat_map(|(child, parents)| parents.iter().map(move |p| (child.clone(), p.clone())))
            .collect();
        edges.sort();
        edges
    }

    pub fn edge_count(&self) -> usize {
        self.forward.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.edge_count() == 0
    }

    /// Add every edge of `other`. Returns how many edges were new.
    pub fn merge(&mut self, other: &DependencyGraph) -> usize {
        other
            .edges()
            .into_iter()
            .filter(|(child, parent)| self.add_edge(child.clone(), parent.clone()))
            .count()
    }

    /// Serialize for the option store.
    pub fn to_json(&self) -> EngineResult<String> {
        let persisted = PersistedGraph {
            generated_at: Utc::now(),
            edges: self
                .forward
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        };
        serde_json::to_string(&persisted).map_err(EngineError::InvalidGraph)
    }

    /// Decode a graph previously written by [`DependencyGraph::to_json`].
    pub fn from_json(json: &str) -> EngineResult<Self> {
        let persisted: PersistedGraph =
            serde_json::from_str(json).map_err(EngineError::InvalidGraph)?;

        let mut graph = Self::new();
        for (child, parents) in persisted.edges {
            for parent in parents {
                graph.add_edge(child.clone(), parent);
            }
        }
        Ok(graph)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn id(s: &str) -> PluginId {
        PluginId::new(s)
    }

    #[test]
    fn forward_and_backward_indexes() {
        let mut graph = DependencyGraph::new();
        graph.add_edge(id("jet-menu"), id("jet-engine"));
        graph.add_edge(id("jet-smart-filters"), id("jet-engine"));

        assert_eq!(graph.forward("jet-menu"), &BTreeSet::from([id("jet-engine")]));
        assert_eq!(
            graph.backward("jet-engine"),
            &BTreeSet::from([id("jet-menu"), id("jet-smart-filters")])
        );
        assert!(graph.forward("unknown").is_empty());
        assert!(graph.backward("jet-menu").is_empty());
    }

    #[test]
    fn duplicate_and_self_edges() {
        let mut graph = DependencyGraph::new();
        assert!(graph.add_edge(id("a"), id("b")));
        assert!(!graph.add_edge(id("a"), id("b")));
        assert!(!graph.add_edge(id("a"), id("a")));
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn from_builtin_rules() {
        let graph = DependencyGraph::from_rules(&RuleSet::builtin());
        assert!(graph.has_edge("jet-menu", "jet-engine"));
        assert!(graph.has_edge("elementor-pro", "elementor"));
        assert!(graph.backward("woocommerce").contains("woocommerce-subscriptions"));
    }

    #[test]
    fn merge_is_additive() {
        let mut base = DependencyGraph::new();
        base.add_edge(id("a"), id("b"));

        let mut other = DependencyGraph::new();
        other.add_edge(id("a"), id("b"));
        other.add_edge(id("a"), id("c"));

        assert_eq!(base.merge(&other), 1);
        assert!(base.has_edge("a", "b"));
        assert!(base.has_edge("a", "c"));
    }

    #[test]
    fn json_persistence() {
        let mut graph = DependencyGraph::new();
        graph.add_edge(id("x"), id("y"));
        graph.add_edge(id("y"), id("x"));

        let restored = DependencyGraph::from_json(&graph.to_json().unwrap()).unwrap();
        assert_eq!(restored, graph);
    }

    #[test]
    fn invalid_json_is_error() {
        assert!(matches!(
            DependencyGraph::from_json("not json"),
            Err(EngineError::InvalidGraph(_))
        ));
    }
}
