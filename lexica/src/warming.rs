//! Cache warming
//!
//! Pre-populates pages for a topic list ahead of user traffic. Items are
//! independent: a failure is recorded and the batch moves on. Pages that are
//! already cached and fresh are left alone.

use crate::batch::{tally, ItemResult};
use crate::error::LexicaError;
use crate::pages::{normalize, GenerationReason, PageService};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Topics warmed when the caller names none
pub const DEFAULT_TOPICS: &[&str] = &[
    "sleep training",
    "teething",
    "colic",
    "starting solids",
    "night feeds",
    "nap schedules",
    "tummy time",
    "swaddling",
    "growth spurts",
    "separation anxiety",
];

#[derive(Debug, Clone)]
pub struct WarmingConfig {
    /// Items generated at once
    pub concurrency: usize,

    /// Pause after each generated item, per worker
    pub item_delay: Duration,
}

impl Default for WarmingConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            item_delay: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WarmSummary {
    pub total: usize,
    pub success: usize,
    pub skipped: usize,
    pub failed: usize,
    pub duration_ms: u64,
    pub results: Vec<ItemResult>,
}

#[derive(Clone)]
pub struct WarmingService {
    pages: PageService,
    config: WarmingConfig,
}

impl WarmingService {
    pub fn new(pages: PageService, config: WarmingConfig) -> Self {
        Self { pages, config }
    }

    pub fn config(&self) -> &WarmingConfig {
        &self.config
    }

    /// Warm the default topic list
    pub async fn warm_defaults(&self) -> WarmSummary {
        let topics: Vec<String> = DEFAULT_TOPICS.iter().map(|t| t.to_string()).collect();
        self.warm(&topics).await
    }

    /// Generate every topic that has no fresh page yet
    pub async fn warm(&self, topics: &[String]) -> WarmSummary {
        let started = Instant::now();

        // Duplicate topics collapse to one item per slug
        let mut seen = HashSet::new();
        let mut results = Vec::new();
        let mut slugs = Vec::new();
        for topic in topics {
            match normalize(topic) {
                Ok(slug) => {
                    if seen.insert(slug.clone()) {
                        slugs.push(slug);
                    }
                }
                Err(e) => results.push(ItemResult::failed(topic, 0, e.to_string())),
            }
        }

        info!(
            "Warming {} topic(s) with concurrency {}",
            slugs.len(),
            self.config.concurrency
        );

        let warmed: Vec<ItemResult> = stream::iter(slugs)
            .map(|slug| self.warm_one(slug))
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;
        results.extend(warmed);

        let (success, skipped, failed) = tally(&results);
        if success > 0 {
            self.pages.cache().stats().record_warmings(success as u64);
        }

        let summary = WarmSummary {
            total: results.len(),
            success,
            skipped,
            failed,
            duration_ms: started.elapsed().as_millis() as u64,
            results,
        };
        info!(
            "Warming finished: {} ok, {} skipped, {} failed in {}ms",
            summary.success, summary.skipped, summary.failed, summary.duration_ms
        );
        summary
    }

    async fn warm_one(&self, slug: String) -> ItemResult {
        match self.pages.cache().peek(&slug).await {
            Ok(Some(page)) if !page.is_stale() => {
                return ItemResult::skipped(&slug, "already cached");
            }
            Ok(_) => {}
            Err(e) => return ItemResult::failed(&slug, 0, e.to_string()),
        }

        let guard = match self.pages.inflight().acquire(&slug) {
            Ok(guard) => guard,
            Err(LexicaError::InFlight(_)) => {
                return ItemResult::skipped(&slug, "regeneration in progress")
            }
            Err(e) => return ItemResult::failed(&slug, 0, e.to_string()),
        };

        let started = Instant::now();
        let outcome = self
            .pages
            .generate_locked(&guard, GenerationReason::Warming)
            .await;
        drop(guard);
        let elapsed = started.elapsed().as_millis() as u64;

        let result = match outcome {
            Ok(page) => ItemResult::success(&slug, elapsed, page.confidence_score),
            Err(e) => {
                warn!("Warming {} failed: {}", slug, e);
                ItemResult::failed(&slug, elapsed, e.to_string())
            }
        };

        if !self.config.item_delay.is_zero() {
            tokio::time::sleep(self.config.item_delay).await;
        }
        result
    }
}
