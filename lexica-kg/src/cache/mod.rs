//! # Page Cache
//!
//! Confidence-scored, TTL-based cache of generated pages.
//!
//! ## Features
//!
//! - **Confidence tiers**: the TTL of a page is chosen from its confidence
//!   score, with jitter that only ever extends it
//! - **Stale-aware reads**: lookups report staleness and leave the serving
//!   decision to the caller
//! - **Idempotent invalidation**: by slug, globally, by staleness or by
//!   confidence threshold, with an in-memory event log
//! - **Background cleanup**: pages stale beyond a grace period are removed
//!
//! ## Example
//!
//! ```rust
//! use lexica_kg::cache::{CacheConfig, CacheService, TtlPolicy};
//! use lexica_kg::{MemoryStore, RuntimeStats};
//! use std::sync::Arc;
//!
//! # async fn example() -> lexica_kg::Result<()> {
//! let config = CacheConfig::builder()
//!     .ttl(TtlPolicy::daily())
//!     .low_confidence_threshold(0.5)
//!     .build();
//!
//! let cache = CacheService::new(Arc::new(MemoryStore::new()), Arc::new(RuntimeStats::new()), config);
//!
//! let lookup = cache.get("sleep-training").await?;
//! if let Some(page) = lookup.page {
//!     println!("{} (stale: {})", page.title, lookup.stale);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod invalidation;
pub mod service;

pub use config::{CacheConfig, CacheConfigBuilder, TtlPolicy, TtlTier, MAX_TTL};
pub use invalidation::{
    start_auto_cleanup, InvalidationEvent, InvalidationManager, InvalidationReason,
};
pub use service::{CacheLookup, CacheService};
