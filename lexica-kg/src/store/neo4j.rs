//! Neo4j-backed store
//!
//! Layout:
//! - `(:Page {slug, ...})` one node per cached page; timestamps are epoch
//!   milliseconds and `metadata` is a JSON string
//! - `(:LinkCandidate {normalized_slug, ...})` one node per tracked entity;
//!   the tier is stored as an integer rank so upgrades are a plain max
//! - `(:Topic {slug})-[:LINKS_TO {link_text, strength}]->(:Topic)` page
//!   connections. Topics are independent of pages, so deleting a page never
//!   touches its edges.

use crate::connection::Neo4jClient;
use crate::error::{Result, StoreError};
use crate::schema::{
    CachedPage, CandidateObservation, LinkCandidate, LinkConfidence, PageConnection,
    PageMetadata, PageStoreSummary,
};
use crate::store::{LinkStore, PageStore};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use neo4rs::{query, Graph, Query, Row};
use tracing::{debug, info};

const PAGE_FIELDS: &str = "p.slug AS slug, p.title AS title, p.content AS content, \
     p.excerpt AS excerpt, p.confidence_score AS confidence_score, \
     p.generated_at AS generated_at, p.ttl_expires_at AS ttl_expires_at, \
     p.view_count AS view_count, p.published AS published, \
     coalesce(p.last_regenerated_at, -1) AS last_regenerated_at, \
     coalesce(p.metadata, '{}') AS metadata";

const CANDIDATE_FIELDS: &str = "c.entity AS entity, c.normalized_slug AS normalized_slug, \
     c.confidence_rank AS confidence_rank, c.mentioned_count AS mentioned_count, \
     c.page_exists AS page_exists, c.first_seen_at AS first_seen_at, \
     c.last_seen_at AS last_seen_at";

const CONNECTION_FIELDS: &str = "a.slug AS from_slug, b.slug AS to_slug, \
     r.link_text AS link_text, r.strength AS strength";

/// Store backed by a Neo4j database
#[derive(Clone)]
pub struct Neo4jStore {
    graph: Graph,
}

impl Neo4jStore {
    /// Wrap an open client
    pub fn new(client: &Neo4jClient) -> Self {
        Self {
            graph: client.graph().clone(),
        }
    }

    /// Create uniqueness constraints. Safe to call on every start.
    pub async fn ensure_schema(&self) -> Result<()> {
        let statements = [
            "CREATE CONSTRAINT page_slug IF NOT EXISTS FOR (p:Page) REQUIRE p.slug IS UNIQUE",
            "CREATE CONSTRAINT candidate_slug IF NOT EXISTS \
             FOR (c:LinkCandidate) REQUIRE c.normalized_slug IS UNIQUE",
            "CREATE CONSTRAINT topic_slug IF NOT EXISTS FOR (t:Topic) REQUIRE t.slug IS UNIQUE",
            "CREATE INDEX page_ttl IF NOT EXISTS FOR (p:Page) ON (p.ttl_expires_at)",
        ];

        for statement in statements {
            self.graph
                .run(query(statement))
                .await
                .map_err(|e| StoreError::QueryError(format!("Failed to create schema: {}", e)))?;
        }

        info!("Page store schema ready");
        Ok(())
    }

    async fn fetch(&self, q: Query) -> Result<Vec<Row>> {
        let mut stream = self
            .graph
            .execute(q)
            .await
            .map_err(|e| StoreError::QueryError(e.to_string()))?;

        let mut rows = Vec::new();
        while let Some(row) = stream
            .next()
            .await
            .map_err(|e| StoreError::QueryError(format!("Failed to read row: {}", e)))?
        {
            rows.push(row);
        }
        Ok(rows)
    }

    async fn fetch_pages(&self, q: Query) -> Result<Vec<CachedPage>> {
        self.fetch(q).await?.iter().map(page_from_row).collect()
    }

    async fn fetch_slugs(&self, q: Query) -> Result<Vec<String>> {
        self.fetch(q)
            .await?
            .iter()
            .map(|row| field::<String>(row, "slug"))
            .collect()
    }

    async fn fetch_connections(&self, q: Query) -> Result<Vec<PageConnection>> {
        self.fetch(q).await?.iter().map(connection_from_row).collect()
    }
}

fn field<T>(row: &Row, key: &str) -> Result<T>
where
    T: serde::de::DeserializeOwned,
{
    row.get::<T>(key)
        .map_err(|e| StoreError::SerializationError(format!("Failed to read '{}': {}", key, e)))
}

fn millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| StoreError::SerializationError(format!("Invalid timestamp: {}", ms)))
}

fn confidence_rank(confidence: LinkConfidence) -> i64 {
    match confidence {
        LinkConfidence::Ghost => 0,
        LinkConfidence::Weak => 1,
        LinkConfidence::Strong => 2,
    }
}

fn confidence_from_rank(rank: i64) -> LinkConfidence {
    match rank {
        i64::MIN..=0 => LinkConfidence::Ghost,
        1 => LinkConfidence::Weak,
        _ => LinkConfidence::Strong,
    }
}

fn page_from_row(row: &Row) -> Result<CachedPage> {
    let last_regenerated: i64 = field(row, "last_regenerated_at")?;
    let metadata: String = field(row, "metadata")?;
    let metadata: PageMetadata = serde_json::from_str(&metadata)?;

    Ok(CachedPage {
        slug: field(row, "slug")?,
        title: field(row, "title")?,
        content: field(row, "content")?,
        excerpt: field(row, "excerpt")?,
        confidence_score: field(row, "confidence_score")?,
        generated_at: from_millis(field(row, "generated_at")?)?,
        ttl_expires_at: from_millis(field(row, "ttl_expires_at")?)?,
        view_count: field::<i64>(row, "view_count")?.max(0) as u64,
        published: field(row, "published")?,
        last_regenerated_at: if last_regenerated < 0 {
            None
        } else {
            Some(from_millis(last_regenerated)?)
        },
        metadata,
    })
}

fn candidate_from_row(row: &Row) -> Result<LinkCandidate> {
    Ok(LinkCandidate {
        entity: field(row, "entity")?,
        normalized_slug: field(row, "normalized_slug")?,
        confidence: confidence_from_rank(field(row, "confidence_rank")?),
        mentioned_count: field::<i64>(row, "mentioned_count")?.max(1) as u64,
        page_exists: field(row, "page_exists")?,
        first_seen_at: from_millis(field(row, "first_seen_at")?)?,
        last_seen_at: from_millis(field(row, "last_seen_at")?)?,
    })
}

fn connection_from_row(row: &Row) -> Result<PageConnection> {
    Ok(PageConnection {
        from_slug: field(row, "from_slug")?,
        to_slug: field(row, "to_slug")?,
        link_text: field(row, "link_text")?,
        strength: field(row, "strength")?,
    })
}

#[async_trait]
impl PageStore for Neo4jStore {
    async fn get(&self, slug: &str) -> Result<Option<CachedPage>> {
        let q = query(&format!(
            "MATCH (p:Page {{slug: $slug}}) RETURN {}",
            PAGE_FIELDS
        ))
        .param("slug", slug);

        Ok(self.fetch_pages(q).await?.into_iter().next())
    }

    async fn exists(&self, slug: &str) -> Result<bool> {
        let q = query("MATCH (p:Page {slug: $slug}) RETURN p.slug AS slug").param("slug", slug);
        Ok(!self.fetch_slugs(q).await?.is_empty())
    }

    async fn upsert(&self, page: CachedPage) -> Result<CachedPage> {
        debug!("Upserting page node: {}", page.slug);

        let metadata = serde_json::to_string(&page.metadata)?;
        let last_regenerated = page.last_regenerated_at.map(millis).unwrap_or(-1);

        let q = query(&format!(
            "MERGE (p:Page {{slug: $slug}})
             ON CREATE SET p.view_count = $view_count
             ON MATCH SET p.view_count = CASE
                 WHEN p.view_count > $view_count THEN p.view_count
                 ELSE $view_count END
             SET p.title = $title,
                 p.content = $content,
                 p.excerpt = $excerpt,
                 p.confidence_score = $confidence_score,
                 p.generated_at = $generated_at,
                 p.ttl_expires_at = $ttl_expires_at,
                 p.published = $published,
                 p.metadata = $metadata,
                 p.last_regenerated_at = CASE
                     WHEN $last_regenerated_at >= 0 THEN $last_regenerated_at
                     ELSE p.last_regenerated_at END
             RETURN {}",
            PAGE_FIELDS
        ))
        .param("slug", page.slug.as_str())
        .param("view_count", page.view_count as i64)
        .param("title", page.title.as_str())
        .param("content", page.content.as_str())
        .param("excerpt", page.excerpt.as_str())
        .param("confidence_score", page.confidence_score)
        .param("generated_at", millis(page.generated_at))
        .param("ttl_expires_at", millis(page.ttl_expires_at))
        .param("published", page.published)
        .param("metadata", metadata)
        .param("last_regenerated_at", last_regenerated);

        self.fetch_pages(q)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::QueryError(format!("Upsert of {} returned no row", page.slug)))
    }

    async fn record_view(&self, slug: &str) -> Result<Option<u64>> {
        let q = query(
            "MATCH (p:Page {slug: $slug})
             SET p.view_count = p.view_count + 1
             RETURN p.view_count AS view_count",
        )
        .param("slug", slug);

        match self.fetch(q).await?.first() {
            Some(row) => Ok(Some(field::<i64>(row, "view_count")?.max(0) as u64)),
            None => Ok(None),
        }
    }

    async fn mark_regenerated(&self, slug: &str, at: DateTime<Utc>) -> Result<bool> {
        let q = query(
            "MATCH (p:Page {slug: $slug})
             SET p.last_regenerated_at = $at
             RETURN p.slug AS slug",
        )
        .param("slug", slug)
        .param("at", millis(at));

        Ok(!self.fetch_slugs(q).await?.is_empty())
    }

    async fn delete(&self, slug: &str) -> Result<bool> {
        let q = query(
            "MATCH (p:Page {slug: $slug})
             WITH p, p.slug AS slug
             DETACH DELETE p
             RETURN slug",
        )
        .param("slug", slug);

        Ok(!self.fetch_slugs(q).await?.is_empty())
    }

    async fn delete_all(&self) -> Result<Vec<String>> {
        let q = query(
            "MATCH (p:Page)
             WITH p, p.slug AS slug
             DETACH DELETE p
             RETURN slug",
        );
        self.fetch_slugs(q).await
    }

    async fn delete_expired_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<String>> {
        let q = query(
            "MATCH (p:Page) WHERE p.ttl_expires_at < $cutoff
             WITH p, p.slug AS slug
             DETACH DELETE p
             RETURN slug",
        )
        .param("cutoff", millis(cutoff));
        self.fetch_slugs(q).await
    }

    async fn delete_below_confidence(&self, threshold: f64) -> Result<Vec<String>> {
        let q = query(
            "MATCH (p:Page) WHERE p.confidence_score < $threshold
             WITH p, p.slug AS slug
             DETACH DELETE p
             RETURN slug",
        )
        .param("threshold", threshold);
        self.fetch_slugs(q).await
    }

    async fn stale_pages(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<CachedPage>> {
        let q = query(&format!(
            "MATCH (p:Page) WHERE p.ttl_expires_at < $now
             RETURN {}
             ORDER BY view_count DESC, last_regenerated_at ASC, slug ASC
             LIMIT $limit",
            PAGE_FIELDS
        ))
        .param("now", millis(now))
        .param("limit", limit as i64);
        self.fetch_pages(q).await
    }

    async fn popular_pages(&self, limit: usize) -> Result<Vec<CachedPage>> {
        let q = query(&format!(
            "MATCH (p:Page)
             RETURN {}
             ORDER BY view_count DESC, slug ASC
             LIMIT $limit",
            PAGE_FIELDS
        ))
        .param("limit", limit as i64);
        self.fetch_pages(q).await
    }

    async fn low_confidence_pages(&self, threshold: f64, limit: usize) -> Result<Vec<CachedPage>> {
        let q = query(&format!(
            "MATCH (p:Page) WHERE p.confidence_score < $threshold
             RETURN {}
             ORDER BY confidence_score ASC, slug ASC
             LIMIT $limit",
            PAGE_FIELDS
        ))
        .param("threshold", threshold)
        .param("limit", limit as i64);
        self.fetch_pages(q).await
    }

    async fn existing_slugs(&self, slugs: &[String]) -> Result<Vec<String>> {
        if slugs.is_empty() {
            return Ok(Vec::new());
        }
        let q = query("MATCH (p:Page) WHERE p.slug IN $slugs RETURN p.slug AS slug")
            .param("slugs", slugs.to_vec());
        self.fetch_slugs(q).await
    }

    async fn list_slugs(&self) -> Result<Vec<String>> {
        self.fetch_slugs(query(
            "MATCH (p:Page) RETURN p.slug AS slug ORDER BY slug",
        ))
        .await
    }

    async fn summary(&self, now: DateTime<Utc>) -> Result<PageStoreSummary> {
        let q = query(
            "MATCH (p:Page)
             RETURN count(p) AS total,
                    sum(CASE WHEN p.published THEN 1 ELSE 0 END) AS published,
                    sum(CASE WHEN p.ttl_expires_at < $now THEN 1 ELSE 0 END) AS stale,
                    coalesce(avg(p.confidence_score), 0.0) AS avg_confidence,
                    coalesce(sum(p.view_count), 0) AS total_views",
        )
        .param("now", millis(now));

        let rows = self.fetch(q).await?;
        let Some(row) = rows.first() else {
            return Ok(PageStoreSummary::default());
        };

        Ok(PageStoreSummary {
            total: field::<i64>(row, "total")?.max(0) as u64,
            published: field::<i64>(row, "published")?.max(0) as u64,
            stale: field::<i64>(row, "stale")?.max(0) as u64,
            avg_confidence: field(row, "avg_confidence")?,
            total_views: field::<i64>(row, "total_views")?.max(0) as u64,
        })
    }
}

#[async_trait]
impl LinkStore for Neo4jStore {
    async fn upsert_candidate(&self, observation: CandidateObservation) -> Result<LinkCandidate> {
        let q = query(&format!(
            "MERGE (c:LinkCandidate {{normalized_slug: $slug}})
             ON CREATE SET c.entity = $entity,
                           c.confidence_rank = $rank,
                           c.mentioned_count = 1,
                           c.first_seen_at = $at,
                           c.last_seen_at = $at
             ON MATCH SET c.mentioned_count = c.mentioned_count + $increment,
                          c.confidence_rank = CASE
                              WHEN c.confidence_rank > $rank THEN c.confidence_rank
                              ELSE $rank END,
                          c.last_seen_at = CASE
                              WHEN c.last_seen_at > $at THEN c.last_seen_at
                              ELSE $at END
             SET c.page_exists = $page_exists
             RETURN {}",
            CANDIDATE_FIELDS
        ))
        .param("slug", observation.normalized_slug.as_str())
        .param("entity", observation.entity.as_str())
        .param("rank", confidence_rank(observation.confidence))
        .param("at", millis(observation.observed_at))
        .param("page_exists", observation.page_exists)
        .param("increment", if observation.new_mention { 1_i64 } else { 0 });

        let rows = self.fetch(q).await?;
        let row = rows.first().ok_or_else(|| {
            StoreError::QueryError(format!(
                "Candidate upsert for {} returned no row",
                observation.normalized_slug
            ))
        })?;
        candidate_from_row(row)
    }

    async fn get_candidate(&self, slug: &str) -> Result<Option<LinkCandidate>> {
        let q = query(&format!(
            "MATCH (c:LinkCandidate {{normalized_slug: $slug}}) RETURN {}",
            CANDIDATE_FIELDS
        ))
        .param("slug", slug);

        match self.fetch(q).await?.first() {
            Some(row) => Ok(Some(candidate_from_row(row)?)),
            None => Ok(None),
        }
    }

    async fn get_candidates(&self, slugs: &[String]) -> Result<Vec<LinkCandidate>> {
        if slugs.is_empty() {
            return Ok(Vec::new());
        }
        let q = query(&format!(
            "MATCH (c:LinkCandidate) WHERE c.normalized_slug IN $slugs RETURN {}",
            CANDIDATE_FIELDS
        ))
        .param("slugs", slugs.to_vec());

        self.fetch(q).await?.iter().map(candidate_from_row).collect()
    }

    async fn set_page_exists(&self, slug: &str, exists: bool) -> Result<()> {
        let q = query(
            "MATCH (c:LinkCandidate {normalized_slug: $slug})
             SET c.page_exists = $exists",
        )
        .param("slug", slug)
        .param("exists", exists);

        self.graph
            .run(q)
            .await
            .map_err(|e| StoreError::QueryError(e.to_string()))
    }

    async fn list_candidates(
        &self,
        missing_pages_only: bool,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<LinkCandidate>> {
        let q = query(&format!(
            "MATCH (c:LinkCandidate)
             WHERE NOT $missing_only OR c.page_exists = false
             RETURN {}
             ORDER BY mentioned_count DESC, normalized_slug ASC
             SKIP $offset LIMIT $limit",
            CANDIDATE_FIELDS
        ))
        .param("missing_only", missing_pages_only)
        .param("offset", offset as i64)
        .param("limit", limit as i64);

        self.fetch(q).await?.iter().map(candidate_from_row).collect()
    }

    async fn upsert_connection(&self, connection: PageConnection) -> Result<PageConnection> {
        let q = query(
            "MERGE (a:Topic {slug: $from})
             MERGE (b:Topic {slug: $to})
             MERGE (a)-[r:LINKS_TO]->(b)
             SET r.link_text = $link_text, r.strength = $strength",
        )
        .param("from", connection.from_slug.as_str())
        .param("to", connection.to_slug.as_str())
        .param("link_text", connection.link_text.as_str())
        .param("strength", connection.strength);

        self.graph
            .run(q)
            .await
            .map_err(|e| StoreError::QueryError(format!("Failed to upsert connection: {}", e)))?;
        Ok(connection)
    }

    async fn outgoing(&self, slug: &str) -> Result<Vec<PageConnection>> {
        let q = query(&format!(
            "MATCH (a:Topic {{slug: $slug}})-[r:LINKS_TO]->(b:Topic)
             RETURN {} ORDER BY to_slug",
            CONNECTION_FIELDS
        ))
        .param("slug", slug);
        self.fetch_connections(q).await
    }

    async fn incoming(&self, slug: &str) -> Result<Vec<PageConnection>> {
        let q = query(&format!(
            "MATCH (a:Topic)-[r:LINKS_TO]->(b:Topic {{slug: $slug}})
             RETURN {} ORDER BY from_slug",
            CONNECTION_FIELDS
        ))
        .param("slug", slug);
        self.fetch_connections(q).await
    }

    async fn delete_outgoing(&self, slug: &str) -> Result<usize> {
        let q = query(
            "MATCH (:Topic {slug: $slug})-[r:LINKS_TO]->()
             DELETE r
             RETURN count(r) AS removed",
        )
        .param("slug", slug);

        match self.fetch(q).await?.first() {
            Some(row) => Ok(field::<i64>(row, "removed")?.max(0) as usize),
            None => Ok(0),
        }
    }

    async fn connection_count(&self) -> Result<u64> {
        let rows = self
            .fetch(query("MATCH ()-[r:LINKS_TO]->() RETURN count(r) AS total"))
            .await?;
        match rows.first() {
            Some(row) => Ok(field::<i64>(row, "total")?.max(0) as u64),
            None => Ok(0),
        }
    }

    async fn linked_slugs(&self) -> Result<Vec<String>> {
        self.fetch_slugs(query(
            "MATCH (t:Topic)-[:LINKS_TO]-()
             RETURN DISTINCT t.slug AS slug ORDER BY slug",
        ))
        .await
    }

    async fn top_incoming(&self, limit: usize) -> Result<Vec<(String, u64)>> {
        let q = query(
            "MATCH ()-[r:LINKS_TO]->(t:Topic)
             RETURN t.slug AS slug, count(r) AS incoming
             ORDER BY incoming DESC, slug ASC
             LIMIT $limit",
        )
        .param("limit", limit as i64);

        self.fetch(q)
            .await?
            .iter()
            .map(|row| {
                Ok((
                    field::<String>(row, "slug")?,
                    field::<i64>(row, "incoming")?.max(0) as u64,
                ))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_rank_roundtrip() {
        for tier in [LinkConfidence::Ghost, LinkConfidence::Weak, LinkConfidence::Strong] {
            assert_eq!(confidence_from_rank(confidence_rank(tier)), tier);
        }
        assert_eq!(confidence_from_rank(7), LinkConfidence::Strong);
        assert_eq!(confidence_from_rank(-3), LinkConfidence::Ghost);
    }

    #[test]
    fn test_millis_conversion() {
        let at = from_millis(1_700_000_000_123).unwrap();
        assert_eq!(millis(at), 1_700_000_000_123);
    }
}
