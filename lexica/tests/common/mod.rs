//! Shared fixtures: a scripted generator and an in-memory context

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, Utc};
use lexica::{AppConfig, AppContext, GenerationError, GenerationResult, PageGenerator};
use lexica_kg::{CachedPage, EntityLink, PageMetadata};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub const CRON_SECRET: &str = "test-cron-secret";

/// Answers every query with a page whose title is the query. Individual
/// queries can be scripted to fail or to carry specific links.
#[derive(Default)]
pub struct ScriptedGenerator {
    calls: Mutex<Vec<String>>,
    failing: Mutex<Vec<String>>,
    links: Mutex<HashMap<String, Vec<EntityLink>>>,
    confidence: Mutex<HashMap<String, f64>>,
    delay: std::time::Duration,
}

impl ScriptedGenerator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn slow(delay: std::time::Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            ..Self::default()
        })
    }

    pub fn fail_on(&self, query: &str) {
        self.failing.lock().unwrap().push(query.to_string());
    }

    pub fn link(&self, query: &str, links: Vec<EntityLink>) {
        self.links.lock().unwrap().insert(query.to_string(), links);
    }

    pub fn confidence(&self, query: &str, score: f64) {
        self.confidence.lock().unwrap().insert(query.to_string(), score);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageGenerator for ScriptedGenerator {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, query: &str) -> Result<GenerationResult, GenerationError> {
        self.calls.lock().unwrap().push(query.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if self.failing.lock().unwrap().iter().any(|q| q == query) {
            return Err(GenerationError::Provider {
                provider: "scripted".to_string(),
                message: format!("refused {}", query),
            });
        }

        let entity_links = self
            .links
            .lock()
            .unwrap()
            .get(query)
            .cloned()
            .unwrap_or_default();
        let confidence_score = self
            .confidence
            .lock()
            .unwrap()
            .get(query)
            .copied()
            .unwrap_or(0.9);

        Ok(GenerationResult {
            title: query.to_string(),
            content: format!("# {}\n\nGenerated body.", query),
            excerpt: format!("About {}", query),
            confidence_score,
            metadata: PageMetadata {
                entity_links,
                ..Default::default()
            },
            published: true,
        })
    }
}

pub fn test_config() -> AppConfig {
    AppConfig {
        cron_secret: Some(CRON_SECRET.to_string()),
        ttl_jitter: 0.0,
        regen_delay_ms: 0,
        warm_delay_ms: 0,
        generation_timeout_secs: 5,
        ..AppConfig::default()
    }
}

pub fn context(generator: Arc<ScriptedGenerator>) -> AppContext {
    context_with(test_config(), generator)
}

pub fn context_with(config: AppConfig, generator: Arc<ScriptedGenerator>) -> AppContext {
    AppContext::in_memory(config, vec![generator as Arc<dyn PageGenerator>])
}

/// A page that expired an hour ago
pub fn stale_page(slug: &str, view_count: u64) -> CachedPage {
    let generated_at = Utc::now() - Duration::hours(30);
    CachedPage {
        slug: slug.to_string(),
        title: slug.to_string(),
        content: "old body".to_string(),
        excerpt: String::new(),
        confidence_score: 0.4,
        generated_at,
        ttl_expires_at: generated_at + Duration::hours(29),
        view_count,
        published: true,
        last_regenerated_at: None,
        metadata: PageMetadata::default(),
    }
}

pub async fn seed_stale(ctx: &AppContext, pages: &[(&str, u64)]) {
    for (slug, views) in pages {
        ctx.page_store.upsert(stale_page(slug, *views)).await.unwrap();
    }
}
