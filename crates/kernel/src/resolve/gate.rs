//! Safety gate between the resolver and the host loader.
//!
//! Any doubt resolves to "load everything": a near-empty required set or an
//! empty filtered list hands the host its roster back unchanged.

use serde::Serialize;

use super::RequiredSet;
use crate::plugin::ActivePluginSet;

/// Default minimum size of a required set worth filtering with.
pub const DEFAULT_MIN_PLUGINS: usize = 3;

/// How the gate decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateOutcome {
    /// The roster was narrowed to the required set.
    Filtered,
    /// The required set was smaller than the minimum; roster unchanged.
    BelowMinimum,
    /// Filtering produced nothing; roster unchanged.
    EmptyResult,
}

/// The list the host should load, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateDecision {
    pub plugins: Vec<String>,
    pub outcome: GateOutcome,
}

/// Applies minimum-count and non-empty guarantees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SafetyGate {
    min_plugins: usize,
}

impl SafetyGate {
    pub fn new(min_plugins: usize) -> Self {
        Self { min_plugins }
    }

    pub fn min_plugins(&self) -> usize {
        self.min_plugins
    }

    /// Narrow `active` to `required`, preserving load order.
    pub fn apply(&self, required: &RequiredSet, active: &ActivePluginSet) -> GateDecision {
        if required.len() < self.min_plugins {
            return GateDecision {
                plugins: active.paths(),
                outcome: GateOutcome::BelowMinimum,
            };
        }

        let plugins = active.paths_within(required.as_set());
        if plugins.is_empty() {
            return GateDecision {
                plugins: active.paths(),
                outcome: GateOutcome::EmptyResult,
            };
        }

        GateDecision {
            plugins,
            outcome: GateOutcome::Filtered,
        }
    }
}

impl Default for SafetyGate {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_PLUGINS)
    }
}
