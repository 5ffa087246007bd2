//! Tiered cache for extractor output.
//!
//! L1 (Moka): in-process, short TTL.
//! L2 (Redis): optional, shared across instances.
//! L3 (option store): always present, persistent fallback.
//!
//! Two key domains with their own freshness windows and invalidation
//! triggers:
//! - URL domain, keyed by a hash of the normalized path; dropped wholesale
//!   whenever the active roster changes.
//! - Content domain, keyed by content id; dropped per entity when it is
//!   saved.
//!
//! Every tier failure is logged and treated as a miss.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use moka::future::Cache;
use redis::AsyncCommands;
use redis::Client as RedisClient;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::engine::EngineError;
use crate::plugin::PluginId;
use crate::store::OptionStore;

/// Default TTL for L1 cache (60 seconds).
const L1_TTL_SECS: u64 = 60;

/// Maximum L1 cache capacity.
const L1_MAX_CAPACITY: u64 = 10_000;

/// Default freshness window of the URL domain (1 hour).
pub const DEFAULT_URL_TTL_SECS: u64 = 3_600;

/// Default freshness window of the content domain (24 hours).
pub const DEFAULT_CONTENT_TTL_SECS: u64 = 86_400;

/// Key prefix shared by every cache entry.
const KEY_PREFIX: &str = "sieve:";

/// The two independent cache domains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheDomain {
    Url,
    Content,
}

impl CacheDomain {
    /// Key prefix for this domain.
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Url => "sieve:url:",
            Self::Content => "sieve:content:",
        }
    }

    /// Key for a normalized request path.
    pub fn url_key(normalized_path: &str) -> String {
        let digest = Sha256::digest(normalized_path.as_bytes());
        format!("{}{}", Self::Url.prefix(), hex::encode(digest))
    }

    /// Key for a content entity id.
    pub fn content_key(content_id: &str) -> String {
        format!("{}{content_id}", Self::Content.prefix())
    }
}

/// Freshness windows per domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtl {
    pub url: Duration,
    pub content: Duration,
}

impl CacheTtl {
    pub fn for_domain(&self, domain: CacheDomain) -> Duration {
        match domain {
            CacheDomain::Url => self.url,
            CacheDomain::Content => self.content,
        }
    }
}

impl Default for CacheTtl {
    fn default() -> Self {
        Self {
            url: Duration::from_secs(DEFAULT_URL_TTL_SECS),
            content: Duration::from_secs(DEFAULT_CONTENT_TTL_SECS),
        }
    }
}

/// A cached set of plugin identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub plugins: BTreeSet<PluginId>,
    /// Unix timestamp of the write.
    pub stored_at: i64,
    /// Unix timestamp after which the entry is absent.
    pub expires_at: i64,
}

impl CacheEntry {
    pub fn new(plugins: BTreeSet<PluginId>, ttl: Duration) -> Self {
        let now = Utc::now().timestamp();
        let ttl = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        Self {
            plugins,
            stored_at: now,
            expires_at: now.saturating_add(ttl),
        }
    }

    pub fn is_fresh(&self) -> bool {
        Utc::now().timestamp() < self.expires_at
    }

    fn encode(&self, key: &str) -> Result<String, EngineError> {
        serde_json::to_string(self).map_err(|source| EngineError::CacheCodec {
            key: key.to_string(),
            source,
        })
    }

    fn decode(key: &str, raw: &str) -> Result<Self, EngineError> {
        serde_json::from_str(raw).map_err(|source| EngineError::CacheCodec {
            key: key.to_string(),
            source,
        })
    }
}

/// Tiered cache layer.
#[derive(Clone)]
pub struct CacheLayer {
    inner: Arc<CacheLayerInner>,
}

struct CacheLayerInner {
    /// L1 in-process cache.
    local: Cache<String, String>,

    /// L2 Redis client, when configured.
    redis: Option<RedisClient>,

    /// L3 persistent fallback.
    store: Arc<dyn OptionStore>,

    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheLayer {
    /// Create a new cache layer.
    pub fn new(store: Arc<dyn OptionStore>, redis: Option<RedisClient>) -> Self {
        let local = Cache::builder()
            .max_capacity(L1_MAX_CAPACITY)
            .time_to_live(Duration::from_secs(L1_TTL_SECS))
            .support_invalidation_closures()
            .build();

        Self {
            inner: Arc::new(CacheLayerInner {
                local,
                redis,
                store,
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
            }),
        }
    }

    /// Get a fresh entry.
    ///
    /// Checks L1, then L2, then the option store; a lower-tier hit
    /// repopulates L1. Stale or undecodable entries are absent and are
    /// removed from every tier.
    pub async fn get(&self, key: &str) -> Option<CacheEntry> {
        let found = match self.get_raw(key).await {
            None => None,
            Some(raw) => match CacheEntry::decode(key, &raw) {
                Ok(entry) if entry.is_fresh() => Some(entry),
                Ok(_) => {
                    debug!(key = %key, "cache entry stale, evicting");
                    self.invalidate(key).await;
                    None
                }
                Err(e) => {
                    warn!(error = %e, "discarding undecodable cache entry");
                    self.invalidate(key).await;
                    None
                }
            },
        };

        let counter = if found.is_some() {
            &self.inner.hits
        } else {
            &self.inner.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);

        found
    }

    async fn get_raw(&self, key: &str) -> Option<String> {
        if let Some(val) = self.inner.local.get(key).await {
            debug!(key = %key, "cache L1 hit");
            return Some(val);
        }

        let val = match self.get_l2(key).await {
            Some(v) => {
                debug!(key = %key, "cache L2 hit, populating L1");
                Some(v)
            }
            None => match self.inner.store.get_option(key).await {
                Ok(v) => {
                    if v.is_some() {
                        debug!(key = %key, "cache store hit, populating L1");
                    }
                    v
                }
                Err(e) => {
                    warn!(error = %e, key = %key, "cache store lookup failed");
                    None
                }
            },
        };

        if let Some(ref v) = val {
            self.inner.local.insert(key.to_string(), v.clone()).await;
        }
        val
    }

    async fn get_l2(&self, key: &str) -> Option<String> {
        let redis = self.inner.redis.as_ref()?;
        let mut conn = match redis.get_multiplexed_async_connection().await {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "failed to get Redis connection for cache");
                return None;
            }
        };
        conn.get(key).await.ok()?
    }

    /// Store plugins under `key` for `ttl` in every tier.
    pub async fn set(&self, key: &str, plugins: BTreeSet<PluginId>, ttl: Duration) {
        let entry = CacheEntry::new(plugins, ttl);
        let value = match entry.encode(key) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "failed to encode cache entry");
                return;
            }
        };

        self.inner
            .local
            .insert(key.to_string(), value.clone())
            .await;

        if let Some(redis) = &self.inner.redis {
            match redis.get_multiplexed_async_connection().await {
                Ok(mut conn) => {
                    let secs = ttl.as_secs().max(1);
                    if let Err(e) = conn.set_ex::<_, _, ()>(key, &value, secs).await {
                        warn!(error = %e, key = %key, "failed to set cache value in Redis");
                    }
                }
                Err(e) => warn!(error = %e, "failed to get Redis connection for cache set"),
            }
        }

        if let Err(e) = self.inner.store.set_option(key, &value).await {
            warn!(error = %e, key = %key, "failed to persist cache value");
        }

        debug!(key = %key, ttl = ttl.as_secs(), "cache set");
    }

    /// Invalidate a single cache key in every tier.
    pub async fn invalidate(&self, key: &str) {
        self.inner.local.invalidate(key).await;

        if let Some(redis) = &self.inner.redis {
            match redis.get_multiplexed_async_connection().await {
                Ok(mut conn) => {
                    if let Err(e) = conn.del::<_, ()>(key).await {
                        warn!(error = %e, key = %key, "failed to delete cache key from Redis");
                    }
                }
                Err(e) => warn!(error = %e, "failed to get Redis connection for cache invalidate"),
            }
        }

        if let Err(e) = self.inner.store.delete_option(key).await {
            warn!(error = %e, key = %key, "failed to delete persisted cache value");
        }

        debug!(key = %key, "cache invalidated");
    }

    /// Invalidate every key of one domain.
    pub async fn invalidate_domain(&self, domain: CacheDomain) {
        self.invalidate_prefix(domain.prefix()).await;
    }

    /// Invalidate every cache entry in both domains.
    pub async fn invalidate_all(&self) {
        self.invalidate_prefix(KEY_PREFIX).await;
    }

    async fn invalidate_prefix(&self, prefix: &'static str) {
        if let Err(e) = self
            .inner
            .local
            .invalidate_entries_if(move |key, _| key.starts_with(prefix))
        {
            warn!(error = %e, "failed to invalidate L1 entries");
        }

        let deleted_l2 = self.delete_l2_prefix(prefix).await;

        let deleted_store = match self.inner.store.delete_prefix(prefix).await {
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, prefix = %prefix, "failed to delete persisted cache values");
                0
            }
        };

        debug!(prefix = %prefix, deleted_l2, deleted_store, "cache prefix invalidated");
    }

    /// Use SCAN to find and delete all matching Redis keys.
    async fn delete_l2_prefix(&self, prefix: &str) -> usize {
        let Some(redis) = &self.inner.redis else {
            return 0;
        };
        let Ok(mut conn) = redis.get_multiplexed_async_connection().await else {
            warn!("failed to get Redis connection for prefix invalidation");
            return 0;
        };

        let pattern = format!("{prefix}*");
        let mut cursor = 0u64;
        let mut total_deleted = 0usize;

        loop {
            let (next_cursor, keys): (u64, Vec<String>) = match redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await
            {
                Ok(result) => result,
                Err(e) => {
                    warn!(error = %e, "SCAN failed during prefix invalidation");
                    break;
                }
            };

            if !keys.is_empty() {
                if let Err(e) = conn.del::<_, ()>(&keys).await {
                    warn!(error = %e, "failed to delete keys from Redis");
                }
                total_deleted += keys.len();
            }

            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }

        total_deleted
    }

    /// Whether Redis answers, or `None` when no L2 is configured.
    pub async fn redis_healthy(&self) -> Option<bool> {
        let redis = self.inner.redis.as_ref()?;
        let Ok(mut conn) = redis.get_multiplexed_async_connection().await else {
            return Some(false);
        };
        let pong: Result<String, _> = redis::cmd("PING").query_async(&mut conn).await;
        Some(pong.is_ok())
    }

    /// Get cache statistics (for monitoring).
    pub async fn stats(&self) -> CacheStats {
        self.inner.local.run_pending_tasks().await;
        CacheStats {
            l1_entry_count: self.inner.local.entry_count(),
            l2_enabled: self.inner.redis.is_some(),
            hits: self.inner.hits.load(Ordering::Relaxed),
            misses: self.inner.misses.load(Ordering::Relaxed),
        }
    }
}

/// Cache statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Number of entries in L1 cache.
    pub l1_entry_count: u64,

    /// Whether a Redis tier is configured.
    pub l2_enabled: bool,

    /// Fresh entries returned by `get`.
    pub hits: u64,

    /// `get` calls that found nothing usable.
    pub misses: u64,
}

impl std::fmt::Debug for CacheLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheLayer")
            .field("l2", &self.inner.redis.is_some())
            .finish()
    }
}
