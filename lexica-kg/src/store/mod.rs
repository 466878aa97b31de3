//! Storage seams for pages, link candidates and page connections
//!
//! Two backends implement both traits:
//! - [`MemoryStore`]: process-local maps behind a `RwLock`, used by tests and
//!   single-node development
//! - [`Neo4jStore`]: durable storage in Neo4j, pages and candidates as nodes,
//!   connections as `LINKS_TO` relationships between `Topic` nodes
//!
//! All writes are upserts keyed by slug (or by the ordered slug pair for
//! connections). The page upsert never lowers `view_count`.

pub mod memory;
pub mod neo4j;

use crate::error::Result;
use crate::schema::{
    CachedPage, CandidateObservation, LinkCandidate, PageConnection, PageStoreSummary,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use memory::MemoryStore;
pub use neo4j::Neo4jStore;

/// Durable storage of cached pages keyed by slug
#[async_trait]
pub trait PageStore: Send + Sync {
    /// Fetch a page by slug
    async fn get(&self, slug: &str) -> Result<Option<CachedPage>>;

    /// Check whether a page exists
    async fn exists(&self, slug: &str) -> Result<bool>;

    /// Insert or replace a page. The stored `view_count` is the larger of the
    /// existing and the supplied value. Returns the stored page.
    async fn upsert(&self, page: CachedPage) -> Result<CachedPage>;

    /// Increment the view counter; returns the new count, `None` if absent
    async fn record_view(&self, slug: &str) -> Result<Option<u64>>;

    /// Record that the page was regenerated at `at`; `false` if absent
    async fn mark_regenerated(&self, slug: &str, at: DateTime<Utc>) -> Result<bool>;

    /// Delete one page; `false` if it did not exist
    async fn delete(&self, slug: &str) -> Result<bool>;

    /// Delete every page, returning the deleted slugs
    async fn delete_all(&self) -> Result<Vec<String>>;

    /// Delete pages whose TTL elapsed before `cutoff`, returning their slugs
    async fn delete_expired_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<String>>;

    /// Delete pages with `confidence_score < threshold`, returning their slugs
    async fn delete_below_confidence(&self, threshold: f64) -> Result<Vec<String>>;

    /// Stale pages at `now`, most viewed first; among equal view counts the
    /// page regenerated longest ago (or never) comes first
    async fn stale_pages(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<CachedPage>>;

    /// Most viewed pages
    async fn popular_pages(&self, limit: usize) -> Result<Vec<CachedPage>>;

    /// Pages below the confidence threshold, lowest first
    async fn low_confidence_pages(&self, threshold: f64, limit: usize) -> Result<Vec<CachedPage>>;

    /// Which of the given slugs currently have a page
    async fn existing_slugs(&self, slugs: &[String]) -> Result<Vec<String>>;

    /// Every stored slug
    async fn list_slugs(&self) -> Result<Vec<String>>;

    /// Aggregate counts evaluated at `now`
    async fn summary(&self, now: DateTime<Utc>) -> Result<PageStoreSummary>;
}

/// Durable storage of link candidates and directed page connections
#[async_trait]
pub trait LinkStore: Send + Sync {
    /// Fold one observation into the candidate keyed by its normalized slug
    async fn upsert_candidate(&self, observation: CandidateObservation) -> Result<LinkCandidate>;

    /// Fetch a candidate by normalized slug
    async fn get_candidate(&self, slug: &str) -> Result<Option<LinkCandidate>>;

    /// Fetch the candidates for the given slugs in one lookup; slugs without
    /// a candidate are left out
    async fn get_candidates(&self, slugs: &[String]) -> Result<Vec<LinkCandidate>>;

    /// Flip the stored `page_exists` flag; no-op when there is no candidate
    async fn set_page_exists(&self, slug: &str, exists: bool) -> Result<()>;

    /// Candidates ordered by `mentioned_count` descending, optionally only
    /// those whose stored flag says no page exists
    async fn list_candidates(
        &self,
        missing_pages_only: bool,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<LinkCandidate>>;

    /// Insert or update the edge for the ordered pair
    async fn upsert_connection(&self, connection: PageConnection) -> Result<PageConnection>;

    /// Edges leaving `slug`
    async fn outgoing(&self, slug: &str) -> Result<Vec<PageConnection>>;

    /// Edges arriving at `slug`
    async fn incoming(&self, slug: &str) -> Result<Vec<PageConnection>>;

    /// Remove edges leaving `slug`, returning how many were removed
    async fn delete_outgoing(&self, slug: &str) -> Result<usize>;

    /// Total number of edges
    async fn connection_count(&self) -> Result<u64>;

    /// Distinct slugs that appear on either end of an edge
    async fn linked_slugs(&self) -> Result<Vec<String>>;

    /// Slugs with the most incoming edges, with their counts
    async fn top_incoming(&self, limit: usize) -> Result<Vec<(String, u64)>>;
}
