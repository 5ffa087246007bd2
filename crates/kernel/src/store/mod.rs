//! Persistent option store abstraction.
//!
//! The host's options/metadata table is the engine's only durable storage:
//! the persisted dependency map, the essential-plugin list and the
//! persistent cache tier all live here as string values.
//!
//! Two implementations ship: [`MemoryOptionStore`] for tests and single
//! process deployments, and [`PgOptionStore`] backed by PostgreSQL.

mod postgres;

use async_trait::async_trait;
use dashmap::DashMap;

pub use postgres::PgOptionStore;

use crate::engine::EngineResult;

/// Option holding the persisted, inference-augmented dependency map.
pub const DEPENDENCY_MAP_KEY: &str = "sieve_dependency_map";

/// Option holding the operator-edited essential plugin list (JSON array).
pub const ESSENTIAL_PLUGINS_KEY: &str = "sieve_essential_plugins";

/// Generic key-value persistence.
#[async_trait]
pub trait OptionStore: Send + Sync {
    /// Load an option value.
    async fn get_option(&self, name: &str) -> EngineResult<Option<String>>;

    /// Create or replace an option value.
    async fn set_option(&self, name: &str, value: &str) -> EngineResult<()>;

    /// Delete an option. Returns whether it existed.
    async fn delete_option(&self, name: &str) -> EngineResult<bool>;

    /// Delete every option whose name starts with `prefix`.
    async fn delete_prefix(&self, prefix: &str) -> EngineResult<u64>;

    /// Whether the backing store is reachable.
    async fn healthy(&self) -> bool {
        true
    }
}

/// In-process option store.
#[derive(Debug, Default)]
pub struct MemoryOptionStore {
    options: DashMap<String, String>,
}

impl MemoryOptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.options.len()
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }
}

#[async_trait]
impl OptionStore for MemoryOptionStore {
    async fn get_option(&self, name: &str) -> EngineResult<Option<String>> {
        Ok(self.options.get(name).map(|v| v.value().clone()))
    }

    async fn set_option(&self, name: &str, value: &str) -> EngineResult<()> {
        self.options.insert(name.to_string(), value.to_string());
        Ok(())
    }

    async fn delete_option(&self, name: &str) -> EngineResult<bool> {
        Ok(self.options.remove(name).is_some())
    }

    async fn delete_prefix(&self, prefix: &str) -> EngineResult<u64> {
        let before = self.options.len();
        self.options.retain(|name, _| !name.starts_with(prefix));
        Ok((before - self.options.len()) as u64)
    }
}
