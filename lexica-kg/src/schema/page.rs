//! Cached page types

use crate::schema::link::EntityLink;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::time::Duration;

/// A generated reference page held in the page store.
///
/// `slug` is the natural key and never changes. `view_count` accumulates
/// across regenerations; every other field is replaced when the page is
/// regenerated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedPage {
    /// Normalized identifier, unique
    pub slug: String,

    /// Generated title
    pub title: String,

    /// Generated body
    pub content: String,

    /// Short generated summary
    pub excerpt: String,

    /// Producer-supplied quality estimate in [0, 1]
    pub confidence_score: f64,

    /// When the content was generated
    pub generated_at: DateTime<Utc>,

    /// When the content stops being fresh
    pub ttl_expires_at: DateTime<Utc>,

    /// Number of reads; never decremented
    pub view_count: u64,

    /// Whether readers may see the page
    pub published: bool,

    /// Last time the regeneration scheduler (or a forced regeneration)
    /// refreshed this page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_regenerated_at: Option<DateTime<Utc>>,

    /// Free-form generation metadata
    #[serde(default)]
    pub metadata: PageMetadata,
}

impl CachedPage {
    /// Check whether the page is stale at the given instant
    pub fn is_stale_at(&self, now: DateTime<Utc>) -> bool {
        now > self.ttl_expires_at
    }

    /// Check whether the page is stale now
    pub fn is_stale(&self) -> bool {
        self.is_stale_at(Utc::now())
    }

    /// Check whether the confidence score is below the given threshold
    pub fn is_low_confidence(&self, threshold: f64) -> bool {
        self.confidence_score < threshold
    }

    /// Get time until expiration, `None` once stale
    pub fn time_until_expiration(&self) -> Option<Duration> {
        let now = Utc::now();
        if now > self.ttl_expires_at {
            None
        } else {
            (self.ttl_expires_at - now).to_std().ok()
        }
    }

    /// Get the age of the generated content
    pub fn age(&self) -> Duration {
        (Utc::now() - self.generated_at)
            .to_std()
            .unwrap_or(Duration::from_secs(0))
    }

    /// Compact view used by listings
    pub fn summary(&self) -> PageSummary {
        PageSummary {
            slug: self.slug.clone(),
            title: self.title.clone(),
            confidence_score: self.confidence_score,
            view_count: self.view_count,
            generated_at: self.generated_at,
            ttl_expires_at: self.ttl_expires_at,
            published: self.published,
        }
    }
}

/// Metadata attached to a page at generation time
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMetadata {
    /// Identifiers of the documents the generator grounded the page on
    #[serde(default)]
    pub sources_used: Vec<String>,

    /// Entities mentioned by the page, with their target slugs
    #[serde(default)]
    pub entity_links: Vec<EntityLink>,

    /// Provider that produced the content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    /// Set when the page was rebuilt in place
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regenerated_at: Option<DateTime<Utc>>,

    /// Why the page was rebuilt (`scheduled`, `manual`, `stale-read`, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regeneration_reason: Option<String>,

    /// Anything else the generator reported
    #[serde(default, flatten)]
    pub extra: Map<String, JsonValue>,
}

/// Compact page listing entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSummary {
    pub slug: String,
    pub title: String,
    pub confidence_score: f64,
    pub view_count: u64,
    pub generated_at: DateTime<Utc>,
    pub ttl_expires_at: DateTime<Utc>,
    pub published: bool,
}

/// Aggregate counts over the page store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageStoreSummary {
    /// Total number of cached pages
    pub total: u64,

    /// Pages visible to readers
    pub published: u64,

    /// Pages whose TTL has elapsed
    pub stale: u64,

    /// Mean confidence score (0 when the store is empty)
    pub avg_confidence: f64,

    /// Sum of all view counts
    pub total_views: u64,
}
