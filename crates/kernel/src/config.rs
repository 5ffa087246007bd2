//! Configuration loaded from environment variables.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::cache::{CacheTtl, DEFAULT_CONTENT_TTL_SECS, DEFAULT_URL_TTL_SECS};
use crate::engine::{DEFAULT_LOG_CAPACITY, EngineSettings};
use crate::plugin::PluginId;
use crate::resolve::DEFAULT_MIN_PLUGINS;

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port (default: 3000).
    pub port: u16,

    /// PostgreSQL connection URL. When None, options live in memory.
    pub database_url: Option<String>,

    /// Redis connection URL. When None, the L2 cache tier is disabled.
    pub redis_url: Option<String>,

    /// Maximum database connections in pool (default: 10).
    pub database_max_connections: u32,

    /// Root the plugin paths in a roster are relative to (default: ./plugins).
    pub plugins_dir: PathBuf,

    /// Optional TOML rules file merged over the built-in tables.
    pub rules_file: Option<PathBuf>,

    /// Re-infer the dependency graph when the roster changes (default: false).
    pub rebuild_on_roster_change: bool,

    /// Engine tuning.
    pub engine: EngineSettings,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let port = parse_or(&var, "PORT", 3000)?;
        let database_url = var("DATABASE_URL");
        let redis_url = var("REDIS_URL");
        let database_max_connections = parse_or(&var, "DATABASE_MAX_CONNECTIONS", 10)?;

        let plugins_dir = var("PLUGINS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./plugins"));
        let rules_file = var("SIEVE_RULES_FILE").map(PathBuf::from);
        let rebuild_on_roster_change = flag_or(&var, "SIEVE_REBUILD_ON_ROSTER_CHANGE", false)?;

        let defaults = EngineSettings::default();
        let engine = EngineSettings {
            enabled: flag_or(&var, "SIEVE_ENABLED", true)?,
            min_plugins: parse_or(&var, "SIEVE_MIN_PLUGINS", DEFAULT_MIN_PLUGINS)?,
            reverse_expansion: flag_or(&var, "SIEVE_REVERSE_EXPANSION", true)?,
            essential: var("SIEVE_ESSENTIAL_PLUGINS")
                .map(|v| split_list(&v).into_iter().map(PluginId::from).collect())
                .unwrap_or_default(),
            bypass_paths: var("SIEVE_BYPASS_PATHS")
                .map(|v| split_list(&v))
                .unwrap_or(defaults.bypass_paths),
            bypass_queries: defaults.bypass_queries,
            cache_ttl: CacheTtl {
                url: Duration::from_secs(parse_or(
                    &var,
                    "SIEVE_URL_CACHE_TTL",
                    DEFAULT_URL_TTL_SECS,
                )?),
                content: Duration::from_secs(parse_or(
                    &var,
                    "SIEVE_CONTENT_CACHE_TTL",
                    DEFAULT_CONTENT_TTL_SECS,
                )?),
            },
            log_capacity: parse_or(&var, "SIEVE_LOG_CAPACITY", DEFAULT_LOG_CAPACITY)?,
        };

        Ok(Self {
            port,
            database_url,
            redis_url,
            database_max_connections,
            plugins_dir,
            rules_file,
            rebuild_on_roster_change,
            engine,
        })
    }
}

fn parse_or<T>(var: impl Fn(&str) -> Option<String>, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{name} must be a valid {}", std::any::type_name::<T>())),
        None => Ok(default),
    }
}

fn flag_or(var: impl Fn(&str) -> Option<String>, name: &str, default: bool) -> Result<bool> {
    match var(name) {
        Some(raw) => match raw.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => anyhow::bail!("{name} must be a boolean, got '{other}'"),
        },
        None => Ok(default),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_without_variables() {
        let config = load(&[]).unwrap();
        assert_eq!(config.port, 3000);
        assert!(config.database_url.is_none());
        assert!(config.redis_url.is_none());
        assert!(config.engine.enabled);
        assert!(config.engine.reverse_expansion);
        assert_eq!(config.engine.min_plugins, 3);
        assert_eq!(config.engine.cache_ttl, CacheTtl::default());
        assert!(config.engine.bypass_paths.contains(&"/wp-admin/".to_string()));
    }

    #[test]
    fn reads_engine_settings() {
        let config = load(&[
            ("SIEVE_ENABLED", "off"),
            ("SIEVE_MIN_PLUGINS", "5"),
            ("SIEVE_REVERSE_EXPANSION", "false"),
            ("SIEVE_ESSENTIAL_PLUGINS", "akismet/akismet.php, wordpress-seo"),
            ("SIEVE_BYPASS_PATHS", "/internal/"),
            ("SIEVE_URL_CACHE_TTL", "60"),
        ])
        .unwrap();

        assert!(!config.engine.enabled);
        assert_eq!(config.engine.min_plugins, 5);
        assert!(!config.engine.reverse_expansion);
        assert_eq!(
            config.engine.essential,
            vec![PluginId::new("akismet"), PluginId::new("wordpress-seo")]
        );
        assert_eq!(config.engine.bypass_paths, vec!["/internal/".to_string()]);
        assert_eq!(config.engine.cache_ttl.url, Duration::from_secs(60));
    }

    #[test]
    fn empty_values_count_as_unset() {
        let config = load(&[("DATABASE_URL", ""), ("REDIS_URL", "  ")]).unwrap();
        assert!(config.database_url.is_none());
        assert!(config.redis_url.is_none());
    }

    #[test]
    fn rejects_bad_numbers_and_flags() {
        let err = load(&[("SIEVE_MIN_PLUGINS", "many")]).unwrap_err();
        assert!(err.to_string().contains("SIEVE_MIN_PLUGINS"));

        let err = load(&[("SIEVE_ENABLED", "maybe")]).unwrap_err();
        assert!(err.to_string().contains("SIEVE_ENABLED"));
    }
}
