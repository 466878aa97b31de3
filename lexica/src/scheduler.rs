//! Batch regeneration of stale pages
//!
//! A run selects up to `batch_size` stale pages, most viewed first, and
//! regenerates them one at a time with a pause between items so the
//! generation provider is never hit in a burst. One failed item never aborts
//! the run. A slug that is already regenerating elsewhere is skipped.

use crate::batch::{tally, ItemResult, ItemStatus};
use crate::error::Result;
use crate::jobs::JobQueue;
use crate::pages::{GenerationReason, PageService};
use chrono::{DateTime, Utc};
use lexica_kg::CachedPage;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    /// Pages regenerated per run
    pub batch_size: usize,

    /// Pause between items within a run
    pub item_delay: Duration,

    /// In-process trigger period; `None` when runs are triggered externally
    pub interval: Option<Duration>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            item_delay: Duration::from_millis(2000),
            interval: None,
        }
    }
}

/// Scheduler settings as reported by the introspection endpoint
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerInfo {
    pub batch_size: usize,
    pub delay_ms: u64,
    pub schedule: String,
    pub ordering: &'static str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub total: usize,
    pub success: usize,
    pub skipped: usize,
    pub failed: usize,
    pub duration_ms: u64,
    pub results: Vec<ItemResult>,
}

#[derive(Clone)]
pub struct RegenerationScheduler {
    pages: PageService,
    config: SchedulerConfig,
}

impl RegenerationScheduler {
    pub fn new(pages: PageService, config: SchedulerConfig) -> Self {
        Self { pages, config }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn info(&self) -> SchedulerInfo {
        SchedulerInfo {
            batch_size: self.config.batch_size,
            delay_ms: self.config.item_delay.as_millis() as u64,
            schedule: match self.config.interval {
                Some(interval) => format!("every {}s", interval.as_secs()),
                None => "external trigger".to_string(),
            },
            ordering: "viewCount desc",
        }
    }

    /// Stale pages for the next run, most viewed first
    pub async fn select_candidates(&self) -> Result<Vec<CachedPage>> {
        self.select(Utc::now(), self.config.batch_size).await
    }

    async fn select(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<CachedPage>> {
        let pages = self.pages.cache().page_store().stale_pages(now, limit).await?;
        Ok(pages)
    }

    /// Run one batch. Fails only if candidate selection fails.
    pub async fn run(&self) -> Result<RunSummary> {
        self.run_with_batch_size(self.config.batch_size).await
    }

    pub async fn run_with_batch_size(&self, batch_size: usize) -> Result<RunSummary> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let started = Instant::now();

        let candidates = self
            .select(started_at, batch_size)
            .await
            .inspect_err(|e| {
                error!("Regeneration run {} could not select candidates: {}", run_id, e)
            })?;

        info!(
            "Regeneration run {} starting with {} stale page(s)",
            run_id,
            candidates.len()
        );

        let mut results = Vec::with_capacity(candidates.len());
        let last = candidates.len().saturating_sub(1);

        for (index, candidate) in candidates.iter().enumerate() {
            let result = self.regenerate_one(candidate).await;
            let generated = result.status != ItemStatus::Skipped;
            results.push(result);

            if generated && index < last && !self.config.item_delay.is_zero() {
                tokio::time::sleep(self.config.item_delay).await;
            }
        }

        let (success, skipped, failed) = tally(&results);
        let summary = RunSummary {
            run_id,
            started_at,
            total: results.len(),
            success,
            skipped,
            failed,
            duration_ms: started.elapsed().as_millis() as u64,
            results,
        };

        info!(
            "Regeneration run {} finished: {} ok, {} skipped, {} failed in {}ms",
            run_id, summary.success, summary.skipped, summary.failed, summary.duration_ms
        );
        Ok(summary)
    }

    async fn regenerate_one(&self, candidate: &CachedPage) -> ItemResult {
        let slug = candidate.slug.as_str();
        let guard = match self.pages.inflight().acquire(slug) {
            Ok(guard) => guard,
            Err(_) => return ItemResult::skipped(slug, "regeneration in progress"),
        };

        let started = Instant::now();
        let outcome = self
            .pages
            .generate_locked(&guard, GenerationReason::Scheduled)
            .await;
        let elapsed = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(page) => ItemResult::success(slug, elapsed, page.confidence_score),
            Err(e) => {
                warn!(
                    "Scheduled regeneration of {} ({} views) failed: {}",
                    slug, candidate.view_count, e
                );
                ItemResult::failed(slug, elapsed, e.to_string())
            }
        }
    }
}

/// Submit a scheduler run to the job queue every `interval`.
///
/// Runs until the task is aborted. Each run waits for the previous one, so
/// runs never overlap.
pub async fn run_periodic(scheduler: RegenerationScheduler, jobs: JobQueue, interval: Duration) {
    info!("Scheduling regeneration every {:?}", interval);

    loop {
        tokio::time::sleep(interval).await;

        let runner = scheduler.clone();
        let submitted = jobs
            .submit("scheduled-regeneration", async move { runner.run().await })
            .await;
        let handle = match submitted {
            Ok(handle) => handle,
            Err(e) => {
                error!("Could not queue scheduled regeneration: {}", e);
                continue;
            }
        };

        match handle.wait().await {
            Ok(Ok(summary)) => {
                if summary.failed > 0 {
                    warn!(
                        "Scheduled run {} had {} failure(s)",
                        summary.run_id, summary.failed
                    );
                }
            }
            Ok(Err(e)) => error!("Scheduled regeneration failed: {}", e),
            Err(e) => error!("Scheduled regeneration job lost: {}", e),
        }
    }
}
