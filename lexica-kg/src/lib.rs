//! # Lexica Knowledge Graph (lexica-kg)
//!
//! Storage, caching and link-graph engine for generated reference pages.
//!
//! ## Features
//!
//! - Confidence-scored page cache with tiered TTLs and stale-aware reads
//! - Idempotent invalidation that keeps the link graph free of dangling
//!   outgoing edges
//! - Link candidates and weighted page connections built from the entity
//!   mentions of each generated page
//! - Two interchangeable backends: in-process maps and Neo4j
//! - Lock-free runtime counters for observability
//!
//! ## Stores
//!
//! Everything reads and writes through the [`PageStore`] and [`LinkStore`]
//! traits. [`MemoryStore`] implements both in process:
//!
//! ```
//! use lexica_kg::{CacheConfig, CacheService, MemoryStore, RuntimeStats};
//! use std::sync::Arc;
//!
//! # async fn example() -> lexica_kg::Result<()> {
//! let store = Arc::new(MemoryStore::new());
//! let cache = CacheService::new(store, Arc::new(RuntimeStats::new()), CacheConfig::default());
//!
//! assert!(!cache.get("sleep-training").await?.is_hit());
//! # Ok(())
//! # }
//! ```
//!
//! [`Neo4jStore`] persists the same data in Neo4j:
//!
//! ```no_run
//! use lexica_kg::{Neo4jClient, Neo4jSettings, Neo4jStore};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Neo4jSettings::from_env().unwrap_or_default();
//!     let client = Neo4jClient::connect(&settings).await?;
//!
//!     let store = Neo4jStore::new(&client);
//!     store.ensure_schema().await?;
//!
//!     let health = client.probe().await;
//!     println!("Neo4j: {:?} ({}ms)", health.status, health.response_time_ms);
//!     Ok(())
//! }
//! ```
//!
//! ## Link Graph
//!
//! ```
//! use lexica_kg::{EntityLink, GraphEngine, MemoryStore};
//! use std::sync::Arc;
//!
//! # async fn example() -> lexica_kg::Result<()> {
//! let store = Arc::new(MemoryStore::new());
//! let graph = GraphEngine::new(store.clone(), store);
//!
//! graph
//!     .record_generation("sleep-training", &[EntityLink::new("Teething")])
//!     .await?;
//!
//! let backlinks = graph.backlinks("teething", 10).await?;
//! assert_eq!(backlinks[0].from_slug, "sleep-training");
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod connection;
pub mod error;
pub mod graph;
pub mod schema;
pub mod slug;
pub mod stats;
pub mod store;

// Re-export main types for convenience
pub use cache::{
    CacheConfig, CacheConfigBuilder, CacheLookup, CacheService, InvalidationEvent,
    InvalidationManager, InvalidationReason, TtlPolicy, TtlTier, MAX_TTL,
};
pub use connection::{HealthCheckConfig, HealthCheckResult, HealthStatus, Neo4jClient, Neo4jSettings};
pub use error::{Result, StoreError};
pub use graph::{GraphEngine, GraphStats, GraphUpdate, LinkDirection, LinkedPage, RelatedPage};
pub use schema::{
    CachedPage, CandidateObservation, EntityLink, LinkCandidate, LinkConfidence, PageConnection,
    PageMetadata, PageStoreSummary, PageSummary,
};
pub use stats::{RuntimeEvent, RuntimeEventKind, RuntimeStats, RuntimeStatsSnapshot};
pub use store::{LinkStore, MemoryStore, Neo4jStore, PageStore};
