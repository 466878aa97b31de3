//! In-process store backed by hash maps
//!
//! Pages, candidates and connections live behind one async `RwLock`, so a
//! single upsert is atomic with respect to other writers. Nothing survives a
//! restart.

use crate::error::Result;
use crate::schema::{
    CachedPage, CandidateObservation, LinkCandidate, PageConnection, PageStoreSummary,
};
use crate::store::{LinkStore, PageStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Map-backed implementation of [`PageStore`] and [`LinkStore`]
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<MemoryTables>>,
}

#[derive(Default)]
struct MemoryTables {
    /// slug -> page
    pages: HashMap<String, CachedPage>,

    /// normalized slug -> candidate
    candidates: HashMap<String, LinkCandidate>,

    /// (from, to) -> edge; ordered so listings are deterministic
    connections: BTreeMap<(String, String), PageConnection>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn delete_where<F>(tables: &mut MemoryTables, predicate: F) -> Vec<String>
    where
        F: Fn(&CachedPage) -> bool,
    {
        let doomed: Vec<String> = tables
            .pages
            .values()
            .filter(|p| predicate(p))
            .map(|p| p.slug.clone())
            .collect();
        for slug in &doomed {
            tables.pages.remove(slug);
        }
        doomed
    }
}

fn by_views_desc(a: &CachedPage, b: &CachedPage) -> Ordering {
    b.view_count.cmp(&a.view_count).then_with(|| a.slug.cmp(&b.slug))
}

#[async_trait]
impl PageStore for MemoryStore {
    async fn get(&self, slug: &str) -> Result<Option<CachedPage>> {
        let tables = self.inner.read().await;
        Ok(tables.pages.get(slug).cloned())
    }

    async fn exists(&self, slug: &str) -> Result<bool> {
        let tables = self.inner.read().await;
        Ok(tables.pages.contains_key(slug))
    }

    async fn upsert(&self, mut page: CachedPage) -> Result<CachedPage> {
        let mut tables = self.inner.write().await;

        if let Some(existing) = tables.pages.get(&page.slug) {
            debug!("Updating cached page in place: {}", page.slug);
            page.view_count = page.view_count.max(existing.view_count);
            if page.last_regenerated_at.is_none() {
                page.last_regenerated_at = existing.last_regenerated_at;
            }
        } else {
            debug!("Inserting cached page: {}", page.slug);
        }

        tables.pages.insert(page.slug.clone(), page.clone());
        Ok(page)
    }

    async fn record_view(&self, slug: &str) -> Result<Option<u64>> {
        let mut tables = self.inner.write().await;
        Ok(tables.pages.get_mut(slug).map(|page| {
            page.view_count += 1;
            page.view_count
        }))
    }

    async fn mark_regenerated(&self, slug: &str, at: DateTime<Utc>) -> Result<bool> {
        let mut tables = self.inner.write().await;
        match tables.pages.get_mut(slug) {
            Some(page) => {
                page.last_regenerated_at = Some(at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, slug: &str) -> Result<bool> {
        let mut tables = self.inner.write().await;
        Ok(tables.pages.remove(slug).is_some())
    }

    async fn delete_all(&self) -> Result<Vec<String>> {
        let mut tables = self.inner.write().await;
        Ok(tables.pages.drain().map(|(slug, _)| slug).collect())
    }

    async fn delete_expired_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<String>> {
        let mut tables = self.inner.write().await;
        Ok(Self::delete_where(&mut tables, |p| p.is_stale_at(cutoff)))
    }

    async fn delete_below_confidence(&self, threshold: f64) -> Result<Vec<String>> {
        let mut tables = self.inner.write().await;
        Ok(Self::delete_where(&mut tables, |p| p.is_low_confidence(threshold)))
    }

    async fn stale_pages(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<CachedPage>> {
        let tables = self.inner.read().await;
        let mut stale: Vec<CachedPage> = tables
            .pages
            .values()
            .filter(|p| p.is_stale_at(now))
            .cloned()
            .collect();

        // None sorts before Some, so never-regenerated pages go first
        stale.sort_by(|a, b| {
            b.view_count
                .cmp(&a.view_count)
                .then_with(|| a.last_regenerated_at.cmp(&b.last_regenerated_at))
                .then_with(|| a.slug.cmp(&b.slug))
        });
        stale.truncate(limit);
        Ok(stale)
    }

    async fn popular_pages(&self, limit: usize) -> Result<Vec<CachedPage>> {
        let tables = self.inner.read().await;
        let mut pages: Vec<CachedPage> = tables.pages.values().cloned().collect();
        pages.sort_by(by_views_desc);
        pages.truncate(limit);
        Ok(pages)
    }

    async fn low_confidence_pages(&self, threshold: f64, limit: usize) -> Result<Vec<CachedPage>> {
        let tables = self.inner.read().await;
        let mut pages: Vec<CachedPage> = tables
            .pages
            .values()
            .filter(|p| p.is_low_confidence(threshold))
            .cloned()
            .collect();
        pages.sort_by(|a, b| {
            a.confidence_score
                .partial_cmp(&b.confidence_score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.slug.cmp(&b.slug))
        });
        pages.truncate(limit);
        Ok(pages)
    }

    async fn existing_slugs(&self, slugs: &[String]) -> Result<Vec<String>> {
        let tables = self.inner.read().await;
        Ok(slugs
            .iter()
            .filter(|s| tables.pages.contains_key(s.as_str()))
            .cloned()
            .collect())
    }

    async fn list_slugs(&self) -> Result<Vec<String>> {
        let tables = self.inner.read().await;
        let mut slugs: Vec<String> = tables.pages.keys().cloned().collect();
        slugs.sort();
        Ok(slugs)
    }

    async fn summary(&self, now: DateTime<Utc>) -> Result<PageStoreSummary> {
        let tables = self.inner.read().await;
        let total = tables.pages.len() as u64;
        let mut summary = PageStoreSummary {
            total,
            ..Default::default()
        };

        let mut confidence_sum = 0.0;
        for page in tables.pages.values() {
            if page.published {
                summary.published += 1;
            }
            if page.is_stale_at(now) {
                summary.stale += 1;
            }
            confidence_sum += page.confidence_score;
            summary.total_views += page.view_count;
        }
        if total > 0 {
            summary.avg_confidence = confidence_sum / total as f64;
        }

        Ok(summary)
    }
}

#[async_trait]
impl LinkStore for MemoryStore {
    async fn upsert_candidate(&self, observation: CandidateObservation) -> Result<LinkCandidate> {
        let mut tables = self.inner.write().await;
        let existing = tables.candidates.remove(&observation.normalized_slug);
        let candidate = observation.apply(existing);
        tables
            .candidates
            .insert(candidate.normalized_slug.clone(), candidate.clone());
        Ok(candidate)
    }

    async fn get_candidate(&self, slug: &str) -> Result<Option<LinkCandidate>> {
        let tables = self.inner.read().await;
        Ok(tables.candidates.get(slug).cloned())
    }

    async fn get_candidates(&self, slugs: &[String]) -> Result<Vec<LinkCandidate>> {
        let tables = self.inner.read().await;
        Ok(slugs
            .iter()
            .filter_map(|s| tables.candidates.get(s.as_str()).cloned())
            .collect())
    }

    async fn set_page_exists(&self, slug: &str, exists: bool) -> Result<()> {
        let mut tables = self.inner.write().await;
        if let Some(candidate) = tables.candidates.get_mut(slug) {
            candidate.page_exists = exists;
        }
        Ok(())
    }

    async fn list_candidates(
        &self,
        missing_pages_only: bool,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<LinkCandidate>> {
        let tables = self.inner.read().await;
        let mut candidates: Vec<LinkCandidate> = tables
            .candidates
            .values()
            .filter(|c| !missing_pages_only || !c.page_exists)
            .cloned()
            .collect();
        candidates.sort_by(|a, b| {
            b.mentioned_count
                .cmp(&a.mentioned_count)
                .then_with(|| a.normalized_slug.cmp(&b.normalized_slug))
        });
        Ok(candidates.into_iter().skip(offset).take(limit).collect())
    }

    async fn upsert_connection(&self, connection: PageConnection) -> Result<PageConnection> {
        let mut tables = self.inner.write().await;
        let key = (connection.from_slug.clone(), connection.to_slug.clone());
        tables.connections.insert(key, connection.clone());
        Ok(connection)
    }

    async fn outgoing(&self, slug: &str) -> Result<Vec<PageConnection>> {
        let tables = self.inner.read().await;
        Ok(tables
            .connections
            .values()
            .filter(|c| c.from_slug == slug)
            .cloned()
            .collect())
    }

    async fn incoming(&self, slug: &str) -> Result<Vec<PageConnection>> {
        let tables = self.inner.read().await;
        Ok(tables
            .connections
            .values()
            .filter(|c| c.to_slug == slug)
            .cloned()
            .collect())
    }

    async fn delete_outgoing(&self, slug: &str) -> Result<usize> {
        let mut tables = self.inner.write().await;
        let before = tables.connections.len();
        tables.connections.retain(|(from, _), _| from != slug);
        Ok(before - tables.connections.len())
    }

    async fn connection_count(&self) -> Result<u64> {
        let tables = self.inner.read().await;
        Ok(tables.connections.len() as u64)
    }

    async fn linked_slugs(&self) -> Result<Vec<String>> {
        let tables = self.inner.read().await;
        let mut slugs: HashSet<String> = HashSet::new();
        for (from, to) in tables.connections.keys() {
            slugs.insert(from.clone());
            slugs.insert(to.clone());
        }
        let mut slugs: Vec<String> = slugs.into_iter().collect();
        slugs.sort();
        Ok(slugs)
    }

    async fn top_incoming(&self, limit: usize) -> Result<Vec<(String, u64)>> {
        let tables = self.inner.read().await;
        let mut counts: HashMap<&str, u64> = HashMap::new();
        for (_, to) in tables.connections.keys() {
            *counts.entry(to.as_str()).or_insert(0) += 1;
        }
        let mut counts: Vec<(String, u64)> = counts
            .into_iter()
            .map(|(slug, n)| (slug.to_string(), n))
            .collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        counts.truncate(limit);
        Ok(counts)
    }
}
