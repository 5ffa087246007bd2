//! Transitive dependency closure over the active roster.
//!
//! Breadth-first walk from the seed set. A processed set guarantees each
//! identifier is expanded at most once, so cycles terminate.

mod gate;

use std::collections::{BTreeSet, HashSet, VecDeque};

use tracing::trace;

pub use gate::{DEFAULT_MIN_PLUGINS, GateDecision, GateOutcome, SafetyGate};

use crate::graph::DependencyGraph;
use crate::plugin::{ActivePluginSet, PluginId};

/// The finalized set of identifiers a request needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequiredSet(BTreeSet<PluginId>);

impl RequiredSet {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.0.contains(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PluginId> {
        self.0.iter()
    }

    pub fn as_set(&self) -> &BTreeSet<PluginId> {
        &self.0
    }
}

impl From<BTreeSet<PluginId>> for RequiredSet {
    fn from(set: BTreeSet<PluginId>) -> Self {
        Self(set)
    }
}

/// Computes the closure of a seed set over a dependency graph.
#[derive(Debug, Clone, Copy)]
pub struct ClosureResolver<'g> {
    graph: &'g DependencyGraph,
    reverse_expansion: bool,
}

impl<'g> ClosureResolver<'g> {
    pub fn new(graph: &'g DependencyGraph) -> Self {
        Self {
            graph,
            reverse_expansion: false,
        }
    }

    /// Also pull in active dependents of every required plugin, so that an
    /// already-active extension of a required hub is not dropped.
    pub fn with_reverse_expansion(mut self, enabled: bool) -> Self {
        self.reverse_expansion = enabled;
        self
    }

    /// Resolve `seeds` to the full required set, restricted to `active`.
    ///
    /// Inactive identifiers are skipped without expansion: they cannot be
    /// loaded, so nothing they depend on is needed on their behalf.
    pub fn resolve(&self, seeds: &BTreeSet<PluginId>, active: &ActivePluginSet) -> RequiredSet {
        let mut queue: VecDeque<&PluginId> = seeds.iter().collect();
        let mut processed: HashSet<&PluginId> = HashSet::new();

        while let Some(id) = queue.pop_front() {
            if processed.contains(id) {
                continue;
            }
            if !active.contains(id.as_str()) {
                trace!(plugin = %id, "required plugin is inactive; skipping");
                continue;
            }
            processed.insert(id);

            for parent in self.graph.forward(id.as_str()) {
                if !processed.contains(parent) {
                    queue.push_back(parent);
                }
            }

            if self.reverse_expansion {
                for child in self.graph.backward(id.as_str()) {
                    if !processed.contains(child) && active.contains(child.as_str()) {
                        queue.push_back(child);
                    }
                }
            }
        }

        RequiredSet(processed.into_iter().cloned().collect())
    }
}
