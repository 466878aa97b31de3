//! Read path over the page store

use crate::cache::config::CacheConfig;
use crate::error::Result;
use crate::schema::CachedPage;
use crate::stats::RuntimeStats;
use crate::store::PageStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

/// Result of a cache lookup.
///
/// A stale page is still returned; whether to serve it is up to the caller.
#[derive(Debug, Clone)]
pub struct CacheLookup {
    pub page: Option<CachedPage>,
    pub stale: bool,
}

impl CacheLookup {
    pub fn miss() -> Self {
        Self {
            page: None,
            stale: false,
        }
    }

    pub fn is_hit(&self) -> bool {
        self.page.is_some()
    }

    pub fn is_fresh_hit(&self) -> bool {
        self.page.is_some() && !self.stale
    }
}

/// Fetch-or-signal-miss over a [`PageStore`], counting hits and misses
#[derive(Clone)]
pub struct CacheService {
    store: Arc<dyn PageStore>,
    stats: Arc<RuntimeStats>,
    config: CacheConfig,
}

impl CacheService {
    pub fn new(store: Arc<dyn PageStore>, stats: Arc<RuntimeStats>, config: CacheConfig) -> Self {
        Self {
            store,
            stats,
            config,
        }
    }

    /// Look a page up for a reader.
    ///
    /// A hit increments the page's view count and the `hits` counter, stale
    /// or not; an absent slug increments `misses`.
    pub async fn get(&self, slug: &str) -> Result<CacheLookup> {
        self.get_at(slug, Utc::now()).await
    }

    /// [`get`](Self::get) evaluated at a fixed instant
    pub async fn get_at(&self, slug: &str, now: DateTime<Utc>) -> Result<CacheLookup> {
        let Some(mut page) = self.store.get(slug).await? else {
            debug!("Cache miss: {}", slug);
            self.stats.record_miss();
            return Ok(CacheLookup::miss());
        };

        self.stats.record_hit();
        if let Some(views) = self.store.record_view(slug).await? {
            page.view_count = views;
        }

        let stale = page.is_stale_at(now);
        debug!("Cache hit: {} (stale: {})", slug, stale);

        Ok(CacheLookup {
            page: Some(page),
            stale,
        })
    }

    /// Read without touching counters or view counts
    pub async fn peek(&self, slug: &str) -> Result<Option<CachedPage>> {
        self.store.get(slug).await
    }

    /// Write a page, keeping the larger of the stored and supplied view counts
    pub async fn store(&self, page: CachedPage) -> Result<CachedPage> {
        debug!("Caching page: {} (confidence {:.2})", page.slug, page.confidence_score);
        self.store.upsert(page).await
    }

    /// Whether `page` is below the configured confidence threshold
    pub fn is_low_confidence(&self, page: &CachedPage) -> bool {
        page.is_low_confidence(self.config.low_confidence_threshold)
    }

    pub fn record_regeneration(&self, slug: &str, duration_ms: u64) {
        self.stats.record_regeneration(slug, duration_ms);
    }

    pub fn record_error(&self, slug: &str, message: &str) {
        self.stats.record_error(slug, message);
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn stats(&self) -> &Arc<RuntimeStats> {
        &self.stats
    }

    pub fn page_store(&self) -> &Arc<dyn PageStore> {
        &self.store
    }
}
