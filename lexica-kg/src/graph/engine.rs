//! Link graph maintenance and queries

use crate::error::Result;
use crate::graph::strength::connection_strength;
use crate::schema::{CandidateObservation, EntityLink, LinkCandidate, LinkConfidence, PageConnection};
use crate::store::{LinkStore, PageStore};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// Which way an edge points relative to the queried page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkDirection {
    Outgoing,
    Incoming,
}

/// A page connected to the queried page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelatedPage {
    pub slug: String,
    pub link_text: String,
    pub strength: f64,
    pub direction: LinkDirection,

    /// Mention count of the related slug as a link candidate (0 if untracked)
    pub mentioned_count: u64,
}

/// Slug with its incoming edge count
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkedPage {
    pub slug: String,
    pub incoming: u64,
}

/// Whole-graph summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphStats {
    /// Distinct slugs on either end of at least one edge
    pub total_pages: u64,
    pub total_connections: u64,
    pub avg_connections_per_page: f64,
    pub top_linked: Vec<LinkedPage>,
}

/// What one generation contributed to the graph
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphUpdate {
    pub candidates: Vec<LinkCandidate>,
    pub connections: Vec<PageConnection>,
}

/// Turns entity mentions into candidates and edges, and answers graph queries
#[derive(Clone)]
pub struct GraphEngine {
    pages: Arc<dyn PageStore>,
    links: Arc<dyn LinkStore>,
}

impl GraphEngine {
    pub fn new(pages: Arc<dyn PageStore>, links: Arc<dyn LinkStore>) -> Self {
        Self { pages, links }
    }

    /// Record the entity links of a freshly generated page.
    ///
    /// Each distinct target slug is counted once per generation. Links back to
    /// `source_slug` update the candidate but create no edge.
    pub async fn record_generation(
        &self,
        source_slug: &str,
        entity_links: &[EntityLink],
    ) -> Result<GraphUpdate> {
        self.record_regeneration(source_slug, &[], entity_links).await
    }

    /// Record the links of a page that replaced an earlier version.
    ///
    /// Targets the previous version already linked to are not counted as new
    /// mentions, so regenerating a page never inflates mention counts or
    /// edge strength. Their edges are still refreshed with the new surface
    /// text and any tier upgrade.
    pub async fn record_regeneration(
        &self,
        source_slug: &str,
        previous_links: &[EntityLink],
        entity_links: &[EntityLink],
    ) -> Result<GraphUpdate> {
        let mut update = GraphUpdate::default();
        let now = Utc::now();
        let already_counted: HashSet<String> = previous_links
            .iter()
            .map(EntityLink::normalized_slug)
            .filter(|slug| !slug.is_empty())
            .collect();

        for (slug, entity, confidence) in dedupe_links(entity_links) {
            let page_exists = self.pages.exists(&slug).await?;
            let candidate = self
                .links
                .upsert_candidate(CandidateObservation {
                    entity: entity.clone(),
                    normalized_slug: slug.clone(),
                    confidence,
                    page_exists,
                    observed_at: now,
                    new_mention: !already_counted.contains(&slug),
                })
                .await?;

            if slug != source_slug {
                let connection = self
                    .links
                    .upsert_connection(PageConnection {
                        from_slug: source_slug.to_string(),
                        to_slug: slug.clone(),
                        link_text: entity,
                        strength: connection_strength(
                            candidate.confidence,
                            candidate.mentioned_count,
                        ),
                    })
                    .await?;
                update.connections.push(connection);
            }

            update.candidates.push(candidate);
        }

        debug!(
            "Recorded {} candidate(s) and {} edge(s) for {}",
            update.candidates.len(),
            update.connections.len(),
            source_slug
        );
        Ok(update)
    }

    /// Flip the candidate flag once a page for `slug` exists
    pub async fn mark_page_created(&self, slug: &str) -> Result<()> {
        self.links.set_page_exists(slug, true).await
    }

    /// Pages linked to or from `slug`, strongest first; ties go to the page
    /// mentioned more often
    pub async fn related_pages(&self, slug: &str, limit: usize) -> Result<Vec<RelatedPage>> {
        let mut by_slug: HashMap<String, RelatedPage> = HashMap::new();

        let outgoing = self.links.outgoing(slug).await?;
        let incoming = self.links.incoming(slug).await?;
        let edges = outgoing
            .into_iter()
            .map(|c| (c.to_slug, c.link_text, c.strength, LinkDirection::Outgoing))
            .chain(
                incoming
                    .into_iter()
                    .map(|c| (c.from_slug, c.link_text, c.strength, LinkDirection::Incoming)),
            );

        for (other, link_text, strength, direction) in edges {
            if other == slug {
                continue;
            }
            let keep = by_slug
                .get(&other)
                .map_or(true, |existing| strength > existing.strength);
            if keep {
                by_slug.insert(
                    other.clone(),
                    RelatedPage {
                        slug: other,
                        link_text,
                        strength,
                        direction,
                        mentioned_count: 0,
                    },
                );
            }
        }

        let slugs: Vec<String> = by_slug.keys().cloned().collect();
        for candidate in self.links.get_candidates(&slugs).await? {
            if let Some(page) = by_slug.get_mut(&candidate.normalized_slug) {
                page.mentioned_count = candidate.mentioned_count;
            }
        }

        let mut related: Vec<RelatedPage> = by_slug.into_values().collect();

        related.sort_by(|a, b| {
            b.strength
                .partial_cmp(&a.strength)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.mentioned_count.cmp(&a.mentioned_count))
                .then_with(|| a.slug.cmp(&b.slug))
        });
        related.truncate(limit);
        Ok(related)
    }

    /// Edges pointing at `slug`, strongest first
    pub async fn backlinks(&self, slug: &str, limit: usize) -> Result<Vec<PageConnection>> {
        let mut edges = self.links.incoming(slug).await?;
        edges.sort_by(|a, b| {
            b.strength
                .partial_cmp(&a.strength)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.from_slug.cmp(&b.from_slug))
        });
        edges.truncate(limit);
        Ok(edges)
    }

    /// Totals plus the `top_n` most linked-to slugs
    pub async fn graph_stats(&self, top_n: usize) -> Result<GraphStats> {
        let total_pages = self.links.linked_slugs().await?.len() as u64;
        let total_connections = self.links.connection_count().await?;
        let avg_connections_per_page = if total_pages == 0 {
            0.0
        } else {
            total_connections as f64 / total_pages as f64
        };

        let top_linked = self
            .links
            .top_incoming(top_n)
            .await?
            .into_iter()
            .map(|(slug, incoming)| LinkedPage { slug, incoming })
            .collect();

        Ok(GraphStats {
            total_pages,
            total_connections,
            avg_connections_per_page,
            top_linked,
        })
    }

    /// Candidates with no page yet, most mentioned first.
    ///
    /// Page existence is checked against the page store now, so a page
    /// deleted or created since the last mention is reported correctly.
    pub async fn suggested_pages(&self, limit: usize) -> Result<Vec<LinkCandidate>> {
        let mut suggestions = Vec::new();
        if limit == 0 {
            return Ok(suggestions);
        }

        let page_size = limit.max(50);
        let mut offset = 0;
        loop {
            let batch = self.links.list_candidates(false, offset, page_size).await?;
            if batch.is_empty() {
                break;
            }
            offset += batch.len();

            let slugs: Vec<String> = batch.iter().map(|c| c.normalized_slug.clone()).collect();
            let existing: HashSet<String> =
                self.pages.existing_slugs(&slugs).await?.into_iter().collect();

            for mut candidate in batch {
                if existing.contains(&candidate.normalized_slug) {
                    continue;
                }
                candidate.page_exists = false;
                suggestions.push(candidate);
                if suggestions.len() >= limit {
                    return Ok(suggestions);
                }
            }
        }

        Ok(suggestions)
    }

    /// A candidate with `page_exists` evaluated now
    pub async fn candidate(&self, slug: &str) -> Result<Option<LinkCandidate>> {
        let Some(mut candidate) = self.links.get_candidate(slug).await? else {
            return Ok(None);
        };
        candidate.page_exists = self.pages.exists(slug).await?;
        Ok(Some(candidate))
    }

    /// Cached pages with no edge in either direction
    pub async fn orphaned_pages(&self) -> Result<Vec<String>> {
        let linked: HashSet<String> = self.links.linked_slugs().await?.into_iter().collect();
        Ok(self
            .pages
            .list_slugs()
            .await?
            .into_iter()
            .filter(|slug| !linked.contains(slug))
            .collect())
    }
}

/// Normalize and collapse links to one entry per slug, keeping the first
/// surface text and the highest tier
fn dedupe_links(links: &[EntityLink]) -> Vec<(String, String, LinkConfidence)> {
    let mut order: Vec<String> = Vec::new();
    let mut merged: HashMap<String, (String, LinkConfidence)> = HashMap::new();

    for link in links {
        let slug = link.normalized_slug();
        if slug.is_empty() {
            continue;
        }
        match merged.get_mut(&slug) {
            Some((_, confidence)) => *confidence = (*confidence).max(link.confidence),
            None => {
                order.push(slug.clone());
                merged.insert(slug, (link.entity.trim().to_string(), link.confidence));
            }
        }
    }

    order
        .into_iter()
        .filter_map(|slug| {
            merged
                .remove(&slug)
                .map(|(entity, confidence)| (slug, entity, confidence))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn engine(store: &MemoryStore) -> GraphEngine {
        GraphEngine::new(Arc::new(store.clone()), Arc::new(store.clone()))
    }

    #[test]
    fn test_dedupe_links() {
        let links = vec![
            EntityLink::new("Teething").with_confidence(LinkConfidence::Ghost),
            EntityLink::new("teething").with_confidence(LinkConfidence::Weak),
            EntityLink::new("Colic"),
            EntityLink::new("!!!"),
        ];
        let deduped = dedupe_links(&links);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0], ("teething".to_string(), "Teething".to_string(), LinkConfidence::Weak));
        assert_eq!(deduped[1].0, "colic");
    }

    #[tokio::test]
    async fn test_self_links_create_no_edge() {
        let store = MemoryStore::new();
        let graph = engine(&store);

        let update = graph
            .record_generation("colic", &[EntityLink::new("Colic"), EntityLink::new("Gas")])
            .await
            .unwrap();

        assert_eq!(update.candidates.len(), 2);
        assert_eq!(update.connections.len(), 1);
        assert_eq!(update.connections[0].to_slug, "gas");
    }

    #[tokio::test]
    async fn test_related_tie_break_by_mentions() {
        let store = MemoryStore::new();
        let graph = engine(&store);

        graph.record_generation("other", &[EntityLink::new("Popular")]).await.unwrap();
        graph
            .record_generation("hub", &[EntityLink::new("Quiet"), EntityLink::new("Popular")])
            .await
            .unwrap();

        let related = graph.related_pages("hub", 10).await.unwrap();
        // popular's edge from hub was written with two mentions
        assert_eq!(related[0].slug, "popular");
        assert!(related[0].strength > related[1].strength);

        store
            .upsert_connection(PageConnection {
                from_slug: "hub".to_string(),
                to_slug: "quiet".to_string(),
                link_text: "Quiet".to_string(),
                strength: related[0].strength,
            })
            .await
            .unwrap();
        let related = graph.related_pages("hub", 10).await.unwrap();
        assert_eq!(related[0].slug, "popular");
        assert_eq!(related[0].mentioned_count, 2);
        assert_eq!(related[1].mentioned_count, 1);
    }

    #[tokio::test]
    async fn test_regeneration_does_not_recount_mentions() {
        let store = MemoryStore::new();
        let graph = engine(&store);
        let first = vec![EntityLink::new("Teething"), EntityLink::new("Gas")];

        graph.record_generation("colic", &first).await.unwrap();
        for _ in 0..3 {
            graph.record_regeneration("colic", &first, &first).await.unwrap();
        }

        let teething = store.get_candidate("teething").await.unwrap().unwrap();
        assert_eq!(teething.mentioned_count, 1);
        let edge = &store.outgoing("colic").await.unwrap()[0];
        assert_eq!(edge.strength, 0.9);

        // A link the previous version lacked is a new mention
        let second = vec![EntityLink::new("Teething"), EntityLink::new("Reflux")];
        graph.record_regeneration("colic", &first, &second).await.unwrap();
        assert_eq!(store.get_candidate("reflux").await.unwrap().unwrap().mentioned_count, 1);
        assert_eq!(store.get_candidate("teething").await.unwrap().unwrap().mentioned_count, 1);

        // Another page mentioning the entity still counts
        graph.record_generation("naps", &[EntityLink::new("Teething")]).await.unwrap();
        assert_eq!(store.get_candidate("teething").await.unwrap().unwrap().mentioned_count, 2);
    }

    #[tokio::test]
    async fn test_orphans_and_stats_on_empty_graph() {
        let store = MemoryStore::new();
        let graph = engine(&store);

        let stats = graph.graph_stats(10).await.unwrap();
        assert_eq!(stats.total_pages, 0);
        assert_eq!(stats.avg_connections_per_page, 0.0);
        assert!(graph.orphaned_pages().await.unwrap().is_empty());
        assert!(graph.suggested_pages(0).await.unwrap().is_empty());
    }
}
