//! Page request path and the shared generate, store, record sequence
//!
//! Every path that produces content (a cache miss, a stale refresh, a forced
//! regeneration, warming and the batch scheduler) goes through
//! [`PageService::generate_locked`], which requires a [`RegenerationGuard`]
//! for the slug.

use crate::error::{LexicaError, Result};
use crate::generation::GenerationGateway;
use crate::inflight::{InFlightRegenerations, RegenerationGuard};
use crate::jobs::JobQueue;
use chrono::Utc;
use lexica_kg::slug::{deslugify, slugify};
use lexica_kg::{CacheService, CachedPage, EntityLink, GraphEngine};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

/// Why content was (re)generated; stored in `metadata.regenerationReason`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GenerationReason {
    /// First request for the slug
    Miss,
    /// Served stale and refreshed in the background
    StaleRead,
    /// Admin action
    Forced,
    Warming,
    Scheduled,
}

impl fmt::Display for GenerationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            GenerationReason::Miss => "miss",
            GenerationReason::StaleRead => "stale-read",
            GenerationReason::Forced => "forced",
            GenerationReason::Warming => "warming",
            GenerationReason::Scheduled => "scheduled",
        };
        f.write_str(text)
    }
}

/// Where a served page came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PageSource {
    Cache,
    Stale,
    Generated,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResponse {
    pub page: CachedPage,
    pub source: PageSource,

    /// A background refresh was queued by this request
    pub revalidating: bool,
}

#[derive(Clone)]
pub struct PageService {
    cache: CacheService,
    graph: GraphEngine,
    gateway: GenerationGateway,
    inflight: InFlightRegenerations,
    jobs: JobQueue,
}

impl PageService {
    pub fn new(
        cache: CacheService,
        graph: GraphEngine,
        gateway: GenerationGateway,
        inflight: InFlightRegenerations,
        jobs: JobQueue,
    ) -> Self {
        Self {
            cache,
            graph,
            gateway,
            inflight,
            jobs,
        }
    }

    pub fn cache(&self) -> &CacheService {
        &self.cache
    }

    pub fn graph(&self) -> &GraphEngine {
        &self.graph
    }

    pub fn inflight(&self) -> &InFlightRegenerations {
        &self.inflight
    }

    /// Serve a page, generating it on a miss.
    ///
    /// A stale page is returned as is and a refresh is queued unless one is
    /// already running. A miss while the first generation of the slug is
    /// still running fails with [`LexicaError::InFlight`].
    pub async fn fetch(&self, slug: &str) -> Result<PageResponse> {
        let slug = normalize(slug)?;
        let lookup = self.cache.get(&slug).await?;

        match lookup.page {
            Some(page) if !lookup.stale => Ok(PageResponse {
                page,
                source: PageSource::Cache,
                revalidating: false,
            }),
            Some(page) => {
                let revalidating = self.revalidate_in_background(&slug);
                Ok(PageResponse {
                    page,
                    source: PageSource::Stale,
                    revalidating,
                })
            }
            None => {
                let guard = self.inflight.acquire(&slug)?;
                let page = self.generate_locked(&guard, GenerationReason::Miss).await?;
                Ok(PageResponse {
                    page,
                    source: PageSource::Generated,
                    revalidating: false,
                })
            }
        }
    }

    /// Regenerate one page now, outside the batch scheduler
    pub async fn regenerate(&self, slug: &str) -> Result<CachedPage> {
        let slug = normalize(slug)?;
        let guard = self.inflight.acquire(&slug)?;
        self.generate_locked(&guard, GenerationReason::Forced).await
    }

    /// Generate content for the guarded slug, store it and record its links.
    ///
    /// The existing view count is carried onto the new content. Graph
    /// bookkeeping failures are logged and do not fail the call; the page is
    /// already stored by then.
    pub async fn generate_locked(
        &self,
        guard: &RegenerationGuard,
        reason: GenerationReason,
    ) -> Result<CachedPage> {
        let slug = guard.slug();
        let existing = self.cache.peek(slug).await?;

        let generated = self.gateway.generate(slug, &deslugify(slug)).await?;
        let links = generated.result.metadata.entity_links.clone();

        let now = Utc::now();
        let expires_at = self
            .cache
            .config()
            .ttl
            .expires_at(now, generated.result.confidence_score)?;
        let mut page = generated.result.into_page(slug, now, expires_at);

        if let Some(previous) = &existing {
            page.view_count = previous.view_count;
            page.last_regenerated_at = previous.last_regenerated_at;
            page.metadata.regenerated_at = Some(now);
            page.metadata.regeneration_reason = Some(reason.to_string());
        }

        let stored = self.cache.store(page).await?;
        if existing.is_some() {
            self.cache.page_store().mark_regenerated(slug, now).await?;
        }

        let previous_links = existing
            .as_ref()
            .map(|p| p.metadata.entity_links.clone())
            .unwrap_or_default();
        if let Err(e) = self.record_links(slug, &previous_links, &links).await {
            warn!("Stored {} but failed to record its links: {}", slug, e);
            self.cache.record_error(slug, &format!("link graph: {}", e));
        }

        info!(
            "Generated {} ({}) via {} in {}ms, confidence {:.2}",
            slug, reason, generated.provider, generated.duration_ms, stored.confidence_score
        );
        Ok(stored)
    }

    async fn record_links(
        &self,
        slug: &str,
        previous: &[EntityLink],
        links: &[EntityLink],
    ) -> Result<()> {
        self.graph.mark_page_created(slug).await?;
        self.graph.record_regeneration(slug, previous, links).await?;
        Ok(())
    }

    fn revalidate_in_background(&self, slug: &str) -> bool {
        let guard = match self.inflight.acquire(slug) {
            Ok(guard) => guard,
            Err(_) => {
                debug!("{} is stale but already regenerating", slug);
                return false;
            }
        };

        let service = self.clone();
        let job = async move {
            if let Err(e) = service
                .generate_locked(&guard, GenerationReason::StaleRead)
                .await
            {
                warn!("Background refresh of {} failed: {}", guard.slug(), e);
            }
        };

        // A rejected job drops the guard, so a later read can retry
        match self.jobs.try_submit("revalidate", job) {
            Ok(handle) => {
                handle.detach();
                true
            }
            Err(e) => {
                warn!("Could not queue refresh of {}: {}", slug, e);
                false
            }
        }
    }
}

/// Normalize a requested slug, rejecting input with nothing to slugify
pub fn normalize(slug: &str) -> Result<String> {
    let normalized = slugify(slug);
    if normalized.is_empty() {
        return Err(LexicaError::InvalidRequest(format!(
            "'{}' is not a valid page slug",
            slug
        )));
    }
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("Sleep Training").unwrap(), "sleep-training");
        assert_eq!(normalize("naps").unwrap(), "naps");
        assert!(matches!(normalize("  !! "), Err(LexicaError::InvalidRequest(_))));
    }

    #[test]
    fn test_reason_labels() {
        assert_eq!(GenerationReason::StaleRead.to_string(), "stale-read");
        assert_eq!(
            serde_json::to_value(GenerationReason::Scheduled).unwrap(),
            serde_json::json!("scheduled")
        );
    }
}
