//! Cache invalidation
//!
//! Every operation is idempotent: deleting an absent page is a successful
//! no-op. Deleting a page also removes the edges it points out of, but keeps
//! the edges pointing into it so backlink history survives a rebuild.

use crate::cache::config::CacheConfig;
use crate::error::Result;
use crate::stats::RuntimeStats;
use crate::store::{LinkStore, PageStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Why pages were invalidated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum InvalidationReason {
    /// Explicit single-page delete
    Manual,

    /// Whole cache cleared
    All,

    /// TTL elapsed
    Stale,

    /// TTL elapsed more than the grace period ago (cleanup loop)
    StaleBeyondGrace { grace_secs: u64 },

    /// Confidence below the threshold
    LowConfidence { threshold: f64 },
}

impl std::fmt::Display for InvalidationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InvalidationReason::Manual => write!(f, "manual invalidation"),
            InvalidationReason::All => write!(f, "full clear"),
            InvalidationReason::Stale => write!(f, "TTL expired"),
            InvalidationReason::StaleBeyondGrace { grace_secs } => {
                write!(f, "TTL expired more than {}s ago", grace_secs)
            }
            InvalidationReason::LowConfidence { threshold } => {
                write!(f, "confidence below {:.2}", threshold)
            }
        }
    }
}

/// Record of one invalidation call
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidationEvent {
    pub reason: InvalidationReason,

    /// Slugs actually deleted; empty for a no-op
    pub slugs: Vec<String>,

    /// Outgoing edges removed along with the pages
    pub edges_removed: usize,

    pub timestamp: DateTime<Utc>,
}

impl InvalidationEvent {
    fn new(reason: InvalidationReason, slugs: Vec<String>, edges_removed: usize) -> Self {
        Self {
            reason,
            slugs,
            edges_removed,
            timestamp: Utc::now(),
        }
    }

    /// Number of pages deleted
    pub fn count(&self) -> usize {
        self.slugs.len()
    }

    /// Whether anything was deleted
    pub fn deleted(&self) -> bool {
        !self.slugs.is_empty()
    }
}

/// Deletes cached pages and keeps the link graph consistent with them
pub struct InvalidationManager {
    pages: Arc<dyn PageStore>,
    links: Arc<dyn LinkStore>,
    stats: Arc<RuntimeStats>,
    config: CacheConfig,
    events: Mutex<VecDeque<InvalidationEvent>>,
}

impl InvalidationManager {
    pub fn new(
        pages: Arc<dyn PageStore>,
        links: Arc<dyn LinkStore>,
        stats: Arc<RuntimeStats>,
        config: CacheConfig,
    ) -> Self {
        let capacity = config.event_log_capacity;
        Self {
            pages,
            links,
            stats,
            config,
            events: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Delete one page. Succeeds whether or not the page existed.
    pub async fn invalidate_one(&self, slug: &str) -> Result<InvalidationEvent> {
        let slugs = if self.pages.delete(slug).await? {
            vec![slug.to_string()]
        } else {
            debug!("Invalidate {}: no cached page", slug);
            Vec::new()
        };
        self.finish(InvalidationReason::Manual, slugs).await
    }

    /// Delete every page
    pub async fn invalidate_all(&self) -> Result<InvalidationEvent> {
        let slugs = self.pages.delete_all().await?;
        self.finish(InvalidationReason::All, slugs).await
    }

    /// Delete every page whose TTL has elapsed
    pub async fn invalidate_stale(&self) -> Result<InvalidationEvent> {
        let slugs = self.pages.delete_expired_before(Utc::now()).await?;
        self.finish(InvalidationReason::Stale, slugs).await
    }

    /// Delete pages that have been stale for longer than `grace`
    pub async fn invalidate_stale_older_than(
        &self,
        grace: std::time::Duration,
    ) -> Result<InvalidationEvent> {
        let grace_chrono =
            chrono::Duration::from_std(grace).unwrap_or_else(|_| chrono::Duration::zero());
        let slugs = self
            .pages
            .delete_expired_before(Utc::now() - grace_chrono)
            .await?;
        self.finish(
            InvalidationReason::StaleBeyondGrace {
                grace_secs: grace.as_secs(),
            },
            slugs,
        )
        .await
    }

    /// Delete pages with `confidence_score < threshold`
    pub async fn invalidate_low_confidence(&self, threshold: f64) -> Result<InvalidationEvent> {
        let slugs = self.pages.delete_below_confidence(threshold).await?;
        self.finish(InvalidationReason::LowConfidence { threshold }, slugs)
            .await
    }

    /// Most recent events, newest last
    pub async fn recent_events(&self) -> Vec<InvalidationEvent> {
        self.events.lock().await.iter().cloned().collect()
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    async fn finish(
        &self,
        reason: InvalidationReason,
        slugs: Vec<String>,
    ) -> Result<InvalidationEvent> {
        let mut edges_removed = 0;
        for slug in &slugs {
            edges_removed += self.links.delete_outgoing(slug).await?;
            self.links.set_page_exists(slug, false).await?;
        }

        let event = InvalidationEvent::new(reason, slugs, edges_removed);
        if event.deleted() {
            info!(
                "Invalidated {} page(s) ({}), removed {} edge(s)",
                event.count(),
                event.reason,
                edges_removed
            );
            self.stats.record_invalidations(event.count() as u64);
            self.push_event(event.clone()).await;
        }

        Ok(event)
    }

    async fn push_event(&self, event: InvalidationEvent) {
        let capacity = self.config.event_log_capacity;
        if capacity == 0 {
            return;
        }
        let mut events = self.events.lock().await;
        while events.len() >= capacity {
            events.pop_front();
        }
        events.push_back(event);
    }
}

/// Background loop removing pages stale beyond the configured grace period.
///
/// Runs until the task is aborted; spawn it with `tokio::spawn`.
pub async fn start_auto_cleanup(manager: Arc<InvalidationManager>) {
    let interval = manager.config.cleanup_interval;
    let grace = manager.config.cleanup_grace;

    info!(
        "Starting automatic stale cleanup (interval: {:?}, grace: {:?})",
        interval, grace
    );

    loop {
        tokio::time::sleep(interval).await;

        match manager.invalidate_stale_older_than(grace).await {
            Ok(event) => {
                if event.deleted() {
                    debug!("Auto cleanup removed {} page(s)", event.count());
                }
            }
            Err(e) => {
                warn!("Auto cleanup failed: {}", e);
            }
        }
    }
}
