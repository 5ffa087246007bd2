#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Cache behaviour seen through the engine.

use std::sync::Arc;
use std::time::Duration;

use sieve_kernel::cache::{CacheDomain, CacheLayer, CacheTtl};
use sieve_kernel::engine::{EngineSettings, ReentrancyToken};
use sieve_kernel::plugin::PluginId;
use sieve_kernel::request::{Phase, RequestContext};
use sieve_kernel::store::{MemoryOptionStore, OptionStore};
use sieve_test_utils::{TestEngine, page, shop_roster};

#[tokio::test]
async fn test_cold_and_warm_passes_agree() {
    let engine = TestEngine::new().build();
    let active = shop_roster();
    let ctx = RequestContext::new("/forums/")
        .with_content(page("21", "[contact-form-7 id=\"4\"] [bbp-forum-index]"));

    let cold = engine.filter(&ReentrancyToken::new(), &ctx, &active).await;
    let warm = engine.filter(&ReentrancyToken::new(), &ctx, &active).await;

    assert_eq!(cold, warm);
    let stats = engine.cache().stats().await;
    assert_eq!(stats.misses, 2);
    assert_eq!(stats.hits, 2);
}

#[tokio::test]
async fn test_content_save_drops_stale_signals() {
    let engine = TestEngine::new()
        .with_settings(EngineSettings {
            min_plugins: 1,
            ..EngineSettings::default()
        })
        .build();
    let active = shop_roster();
    let with_form = RequestContext::new("/about/").with_content(page("8", "[contact-form-7]"));
    let without_form = RequestContext::new("/about/").with_content(page("8", "Plain text."));

    let first = engine.filter(&ReentrancyToken::new(), &with_form, &active).await;
    assert!(first.seeds.contains(&PluginId::new("contact-form-7")));

    // Same entity id, edited body: the cached signals still apply.
    let stale = engine
        .filter(&ReentrancyToken::new(), &without_form, &active)
        .await;
    assert!(stale.seeds.contains(&PluginId::new("contact-form-7")));

    engine.on_content_saved("8").await;
    let fresh = engine
        .filter(&ReentrancyToken::new(), &without_form, &active)
        .await;
    assert!(!fresh.seeds.contains(&PluginId::new("contact-form-7")));
}

#[tokio::test]
async fn test_roster_change_clears_url_domain_only() {
    let store = Arc::new(MemoryOptionStore::new());
    let engine = TestEngine::new().with_store(Arc::clone(&store)).build();
    let ctx = RequestContext::new("/shop/").with_content(page("5", "[products]"));

    engine
        .filter(&ReentrancyToken::new(), &ctx, &shop_roster())
        .await;

    let url_key = CacheDomain::url_key("/shop/");
    let content_key = CacheDomain::content_key("5");
    assert!(store.get_option(&url_key).await.unwrap().is_some());
    assert!(store.get_option(&content_key).await.unwrap().is_some());

    engine.on_roster_changed().await;

    assert!(engine.cache().get(&url_key).await.is_none());
    assert!(store.get_option(&url_key).await.unwrap().is_none());
    assert!(engine.cache().get(&content_key).await.is_some());
}

#[tokio::test]
async fn test_cached_signals_follow_roster() {
    let engine = TestEngine::new()
        .with_settings(EngineSettings {
            min_plugins: 1,
            ..EngineSettings::default()
        })
        .build();
    let ctx = RequestContext::new("/cart/");

    let full = engine
        .filter(&ReentrancyToken::new(), &ctx, &shop_roster())
        .await;
    assert!(full.plugins.contains(&"woocommerce/woocommerce.php".to_string()));

    // Warm URL entry, but woocommerce is no longer active.
    let smaller = sieve_test_utils::roster(&["akismet/akismet.php", "bbpress/bbpress.php"]);
    let result = engine.filter(&ReentrancyToken::new(), &ctx, &smaller).await;
    assert!(result.seeds.is_empty());
    assert_eq!(result.plugins, smaller.paths());
}

#[tokio::test]
async fn test_early_phase_leaves_content_cache_untouched() {
    let store = Arc::new(MemoryOptionStore::new());
    let engine = TestEngine::new().with_store(Arc::clone(&store)).build();
    let ctx = RequestContext::new("/about/")
        .with_content(page("77", "[contact-form-7]"))
        .with_phase(Phase::Early);

    engine
        .filter(&ReentrancyToken::new(), &ctx, &shop_roster())
        .await;

    assert!(
        store
            .get_option(&CacheDomain::content_key("77"))
            .await
            .unwrap()
            .is_none()
    );
    assert!(
        store
            .get_option(&CacheDomain::url_key("/about/"))
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn test_expired_entries_are_absent() {
    let store: Arc<dyn OptionStore> = Arc::new(MemoryOptionStore::new());
    let cache = CacheLayer::new(store, None);
    let key = CacheDomain::url_key("/old/");

    cache
        .set(&key, [PluginId::new("woocommerce")].into_iter().collect(), Duration::ZERO)
        .await;

    assert!(cache.get(&key).await.is_none());
}

#[tokio::test]
async fn test_expired_rows_do_not_accumulate() {
    let store = Arc::new(MemoryOptionStore::new());
    let cache = CacheLayer::new(store.clone(), None);
    let keys: Vec<String> = (0..100)
        .map(|n| CacheDomain::url_key(&format!("/missing-{n}/")))
        .collect();

    for key in &keys {
        cache
            .set(key, [PluginId::new("woocommerce")].into_iter().collect(), Duration::ZERO)
            .await;
    }
    assert_eq!(store.len(), 100);

    for key in &keys {
        assert!(cache.get(key).await.is_none());
    }
    assert!(store.is_empty());
}

#[test]
fn test_default_ttls() {
    let ttl = CacheTtl::default();
    assert_eq!(ttl.for_domain(CacheDomain::Url), Duration::from_secs(3600));
    assert_eq!(ttl.for_domain(CacheDomain::Content), Duration::from_secs(86_400));
}
