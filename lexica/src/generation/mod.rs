//! Page generation
//!
//! The generation collaborator sits behind [`PageGenerator`]. The
//! [`GenerationGateway`] is the only caller: it bounds each attempt with a
//! timeout, walks the configured providers in order and reports outcomes to
//! the runtime stats.

pub mod cli;
pub mod gateway;

pub use cli::{CliGenerator, Model};
pub use gateway::{GeneratedPage, GenerationGateway};

use crate::error::GenerationError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lexica_kg::{CachedPage, PageMetadata};
use serde::{Deserialize, Serialize};

/// Content produced for one topic query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResult {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub excerpt: String,

    /// Quality estimate in [0, 1]
    pub confidence_score: f64,

    #[serde(default)]
    pub metadata: PageMetadata,

    #[serde(default = "default_published")]
    pub published: bool,
}

fn default_published() -> bool {
    true
}

impl GenerationResult {
    /// Build the page to store. `view_count` starts at zero; the store keeps
    /// the larger of the existing and new counts.
    pub fn into_page(
        self,
        slug: &str,
        generated_at: DateTime<Utc>,
        ttl_expires_at: DateTime<Utc>,
    ) -> CachedPage {
        CachedPage {
            slug: slug.to_string(),
            title: self.title,
            content: self.content,
            excerpt: self.excerpt,
            confidence_score: self.confidence_score.clamp(0.0, 1.0),
            generated_at,
            ttl_expires_at,
            view_count: 0,
            published: self.published,
            last_regenerated_at: None,
            metadata: self.metadata,
        }
    }
}

/// A provider of generated page content
#[async_trait]
pub trait PageGenerator: Send + Sync {
    /// Short label used in logs and error reports
    fn name(&self) -> &str;

    /// Produce a page for a natural-language topic query
    async fn generate(&self, query: &str) -> Result<GenerationResult, GenerationError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_wire_format() {
        let json = serde_json::json!({
            "title": "Teething",
            "content": "...",
            "confidenceScore": 1.4,
            "metadata": {"entityLinks": [{"entity": "Drool"}]}
        });
        let result: GenerationResult = serde_json::from_value(json).unwrap();
        assert!(result.published);
        assert_eq!(result.excerpt, "");

        let now = Utc::now();
        let page = result.into_page("teething", now, now + chrono::Duration::hours(1));
        assert_eq!(page.confidence_score, 1.0);
        assert_eq!(page.metadata.entity_links[0].normalized_slug(), "drool");
        assert_eq!(page.view_count, 0);
    }
}
