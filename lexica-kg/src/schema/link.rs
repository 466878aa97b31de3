//! Link candidate and page connection types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Confidence tier of an entity mention
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkConfidence {
    /// Speculative mention, no strong evidence the entity deserves a page
    Ghost,
    /// Plausible mention
    Weak,
    /// Clear, deliberate mention
    Strong,
}

impl LinkConfidence {
    /// Convert tier to string for storage
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkConfidence::Strong => "strong",
            LinkConfidence::Weak => "weak",
            LinkConfidence::Ghost => "ghost",
        }
    }

    /// Parse tier from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "strong" => Some(LinkConfidence::Strong),
            "weak" => Some(LinkConfidence::Weak),
            "ghost" => Some(LinkConfidence::Ghost),
            _ => None,
        }
    }
}

impl Default for LinkConfidence {
    fn default() -> Self {
        LinkConfidence::Strong
    }
}

impl std::fmt::Display for LinkConfidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An entity mention discovered by the generator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityLink {
    /// Display text of the entity as it appeared in the page
    pub entity: String,

    /// Slug suggested by the generator; the key comes from `entity` unless
    /// that has nothing to slugify
    #[serde(default)]
    pub slug: String,

    /// Confidence tier of the mention
    #[serde(default)]
    pub confidence: LinkConfidence,
}

impl EntityLink {
    /// Create a strong link to the entity's own slug
    pub fn new(entity: impl Into<String>) -> Self {
        let entity = entity.into();
        let slug = crate::slug::slugify(&entity);
        Self {
            entity,
            slug,
            confidence: LinkConfidence::Strong,
        }
    }

    /// Override the confidence tier
    pub fn with_confidence(mut self, confidence: LinkConfidence) -> Self {
        self.confidence = confidence;
        self
    }

    /// The candidate key, always derived from the entity text so every
    /// generator files the same entity under the same slug. The supplied
    /// slug is only used when the entity text has nothing to slugify.
    pub fn normalized_slug(&self) -> String {
        let from_entity = crate::slug::slugify(&self.entity);
        if from_entity.is_empty() {
            crate::slug::slugify(&self.slug)
        } else {
            from_entity
        }
    }
}

/// A tracked entity that may or may not have a page yet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkCandidate {
    /// Display text
    pub entity: String,

    /// Unique key
    pub normalized_slug: String,

    /// Highest tier observed so far
    pub confidence: LinkConfidence,

    /// Number of generated pages that mentioned the entity (>= 1)
    pub mentioned_count: u64,

    /// Whether a cached page exists for the slug
    pub page_exists: bool,

    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

/// One observation of an entity in a freshly generated page
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateObservation {
    pub entity: String,
    pub normalized_slug: String,
    pub confidence: LinkConfidence,
    pub page_exists: bool,
    pub observed_at: DateTime<Utc>,

    /// Whether this counts as a new mention. `false` when a regenerated
    /// page repeats a link its previous version already carried.
    pub new_mention: bool,
}

impl CandidateObservation {
    /// Fold this observation into an existing candidate (or start a new one)
    pub fn apply(&self, existing: Option<LinkCandidate>) -> LinkCandidate {
        match existing {
            Some(mut candidate) => {
                if self.new_mention {
                    candidate.mentioned_count += 1;
                }
                candidate.confidence = candidate.confidence.max(self.confidence);
                candidate.page_exists = self.page_exists;
                if self.observed_at > candidate.last_seen_at {
                    candidate.last_seen_at = self.observed_at;
                }
                candidate
            }
            None => LinkCandidate {
                entity: self.entity.clone(),
                normalized_slug: self.normalized_slug.clone(),
                confidence: self.confidence,
                mentioned_count: 1,
                page_exists: self.page_exists,
                first_seen_at: self.observed_at,
                last_seen_at: self.observed_at,
            },
        }
    }
}

/// Directed, weighted edge between two page slugs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageConnection {
    pub from_slug: String,
    pub to_slug: String,

    /// Surface text used for the link
    pub link_text: String,

    /// Edge weight in [0, 1]
    pub strength: f64,
}

impl PageConnection {
    /// Whether the edge would be a self-loop
    pub fn is_self_loop(&self) -> bool {
        self.from_slug == self.to_slug
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_roundtrip_and_order() {
        assert_eq!(LinkConfidence::from_str("STRONG"), Some(LinkConfidence::Strong));
        assert_eq!(LinkConfidence::from_str("nope"), None);
        assert!(LinkConfidence::Strong > LinkConfidence::Weak);
        assert!(LinkConfidence::Weak > LinkConfidence::Ghost);
    }

    #[test]
    fn test_entity_link_normalization() {
        let link: EntityLink =
            serde_json::from_value(serde_json::json!({"entity": "Night Weaning"})).unwrap();
        assert_eq!(link.normalized_slug(), "night-weaning");
        assert_eq!(link.confidence, LinkConfidence::Strong);

        // The entity text decides the key, not the generator's slug
        let link = EntityLink {
            entity: "Teething".to_string(),
            slug: "teething-pain".to_string(),
            confidence: LinkConfidence::Weak,
        };
        assert_eq!(link.normalized_slug(), "teething");

        let link = EntityLink {
            entity: "!!!".to_string(),
            slug: "Night Terrors".to_string(),
            confidence: LinkConfidence::Weak,
        };
        assert_eq!(link.normalized_slug(), "night-terrors");
    }

    #[test]
    fn test_observation_accumulates() {
        let t0 = Utc::now();
        let first = CandidateObservation {
            entity: "teething".to_string(),
            normalized_slug: "teething".to_string(),
            confidence: LinkConfidence::Ghost,
            page_exists: false,
            observed_at: t0,
            new_mention: true,
        };
        let candidate = first.apply(None);
        assert_eq!(candidate.mentioned_count, 1);

        let second = CandidateObservation {
            confidence: LinkConfidence::Weak,
            observed_at: t0 + chrono::Duration::seconds(5),
            ..first.clone()
        };
        let candidate = second.apply(Some(candidate));
        assert_eq!(candidate.mentioned_count, 2);
        assert_eq!(candidate.confidence, LinkConfidence::Weak);
        assert!(candidate.last_seen_at >= candidate.first_seen_at);

        // A weaker later mention never downgrades the tier
        let third = CandidateObservation {
            confidence: LinkConfidence::Ghost,
            ..second
        };
        let candidate = third.apply(Some(candidate));
        assert_eq!(candidate.confidence, LinkConfidence::Weak);
        assert_eq!(candidate.mentioned_count, 3);

        // A repeated mention upgrades the tier but keeps the count
        let repeat = CandidateObservation {
            confidence: LinkConfidence::Strong,
            new_mention: false,
            ..first
        };
        let candidate = repeat.apply(Some(candidate));
        assert_eq!(candidate.mentioned_count, 3);
        assert_eq!(candidate.confidence, LinkConfidence::Strong);
    }
}
