//! Integration tests for the page cache and link graph
//!
//! These tests run against the in-memory store and cover:
//! - TTL tiers and staleness
//! - View count preservation across rewrites
//! - Idempotent invalidation and its effect on edges
//! - Candidate accumulation and query-time page existence
//! - Related pages, backlinks, suggestions and orphans

use chrono::{Duration, Utc};
use lexica_kg::{
    CacheConfig, CacheService, CachedPage, EntityLink, GraphEngine, InvalidationManager,
    LinkConfidence, LinkStore, MemoryStore, PageMetadata, PageStore, RuntimeStats, TtlPolicy,
    TtlTier,
};
use std::sync::Arc;

struct Harness {
    store: MemoryStore,
    stats: Arc<RuntimeStats>,
    cache: CacheService,
    invalidation: InvalidationManager,
    graph: GraphEngine,
    config: CacheConfig,
}

fn harness() -> Harness {
    let store = MemoryStore::new();
    let stats = Arc::new(RuntimeStats::new());
    let config = CacheConfig::builder()
        .ttl(TtlPolicy {
            jitter: 0.0,
            ..TtlPolicy::default()
        })
        .build();

    Harness {
        cache: CacheService::new(Arc::new(store.clone()), stats.clone(), config.clone()),
        invalidation: InvalidationManager::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            stats.clone(),
            config.clone(),
        ),
        graph: GraphEngine::new(Arc::new(store.clone()), Arc::new(store.clone())),
        store,
        stats,
        config,
    }
}

fn generated(h: &Harness, slug: &str, confidence: f64, links: Vec<EntityLink>) -> CachedPage {
    let now = Utc::now();
    CachedPage {
        slug: slug.to_string(),
        title: slug.replace('-', " "),
        content: format!("About {}", slug),
        excerpt: String::new(),
        confidence_score: confidence,
        generated_at: now,
        ttl_expires_at: h.config.ttl.expires_at(now, confidence).unwrap(),
        view_count: 0,
        published: true,
        last_regenerated_at: None,
        metadata: PageMetadata {
            entity_links: links,
            ..Default::default()
        },
    }
}

async fn publish(h: &Harness, page: CachedPage) {
    let slug = page.slug.clone();
    let links = page.metadata.entity_links.clone();
    h.cache.store(page).await.unwrap();
    h.graph.mark_page_created(&slug).await.unwrap();
    h.graph.record_generation(&slug, &links).await.unwrap();
}

#[tokio::test]
async fn test_sleep_training_scenario() {
    let h = harness();
    assert!(!h.cache.get("sleep-training").await.unwrap().is_hit());

    let page = generated(
        &h,
        "sleep-training",
        0.85,
        vec![EntityLink {
            entity: "teething".to_string(),
            slug: "teething".to_string(),
            confidence: LinkConfidence::Strong,
        }],
    );
    assert_eq!(h.config.ttl.tier(page.confidence_score), TtlTier::High);
    let expected_expiry = page.generated_at + Duration::hours(168);
    assert_eq!(page.ttl_expires_at, expected_expiry);
    publish(&h, page).await;

    let candidate = h.graph.candidate("teething").await.unwrap().unwrap();
    assert_eq!(candidate.mentioned_count, 1);
    assert!(!candidate.page_exists);

    let edges = h.store.outgoing("sleep-training").await.unwrap();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].to_slug, "teething");
    assert_eq!(edges[0].strength, 0.9);

    let lookup = h.cache.get("sleep-training").await.unwrap();
    assert!(lookup.is_fresh_hit());
    let snapshot = h.stats.snapshot();
    assert_eq!((snapshot.hits, snapshot.misses), (1, 1));
}

#[tokio::test]
async fn test_page_not_stale_before_ttl() {
    let h = harness();
    let page = generated(&h, "colic", 0.3, Vec::new());
    let generated_at = page.generated_at;
    h.cache.store(page).await.unwrap();

    let before = generated_at + Duration::hours(24);
    let lookup = h.cache.get_at("colic", before).await.unwrap();
    assert!(!lookup.stale);

    let after = generated_at + Duration::hours(24) + Duration::milliseconds(1);
    let lookup = h.cache.get_at("colic", after).await.unwrap();
    assert!(lookup.stale);
}

#[tokio::test]
async fn test_view_count_survives_rewrite() {
    let h = harness();
    h.cache.store(generated(&h, "naps", 0.9, Vec::new())).await.unwrap();
    for _ in 0..7 {
        h.cache.get("naps").await.unwrap();
    }

    let rewritten = h.cache.store(generated(&h, "naps", 0.95, Vec::new())).await.unwrap();
    assert_eq!(rewritten.view_count, 7);
    assert_eq!(h.cache.peek("naps").await.unwrap().unwrap().view_count, 7);
}

#[tokio::test]
async fn test_candidate_accumulation_uses_query_time_existence() {
    let h = harness();
    for source in ["naps", "night-feeds", "solids"] {
        publish(
            &h,
            generated(&h, source, 0.9, vec![EntityLink::new("Teething")]),
        )
        .await;
    }

    let candidate = h.graph.candidate("teething").await.unwrap().unwrap();
    assert_eq!(candidate.mentioned_count, 3);
    assert!(!candidate.page_exists);

    h.cache.store(generated(&h, "teething", 0.9, Vec::new())).await.unwrap();
    let candidate = h.graph.candidate("teething").await.unwrap().unwrap();
    assert!(candidate.page_exists);
    assert_eq!(candidate.mentioned_count, 3);

    // Suggestions skip it now without another mention
    let suggestions = h.graph.suggested_pages(10).await.unwrap();
    assert!(suggestions.iter().all(|c| c.normalized_slug != "teething"));
}

#[tokio::test]
async fn test_related_and_backlinks_agree() {
    let h = harness();
    publish(&h, generated(&h, "a", 0.9, vec![EntityLink::new("B")])).await;

    let related = h.graph.related_pages("a", 10).await.unwrap();
    let backlinks = h.graph.backlinks("b", 10).await.unwrap();

    assert_eq!(related.len(), 1);
    assert_eq!(related[0].slug, "b");
    assert_eq!(backlinks.len(), 1);
    assert_eq!(backlinks[0].from_slug, "a");
    assert_eq!(related[0].strength, 0.9);
    assert_eq!(backlinks[0].strength, related[0].strength);

    // Related works from the other end too
    let from_b = h.graph.related_pages("b", 10).await.unwrap();
    assert_eq!(from_b[0].slug, "a");
}

#[tokio::test]
async fn test_invalidation_keeps_backlinks() {
    let h = harness();
    publish(&h, generated(&h, "a", 0.9, vec![EntityLink::new("B")])).await;
    publish(&h, generated(&h, "b", 0.9, vec![EntityLink::new("C")])).await;

    let first = h.invalidation.invalidate_one("b").await.unwrap();
    assert!(first.deleted());
    assert_eq!(first.edges_removed, 1);

    let second = h.invalidation.invalidate_one("b").await.unwrap();
    assert!(!second.deleted());
    assert_eq!(second.edges_removed, 0);

    // a -> b survives, b -> c is gone
    assert_eq!(h.graph.backlinks("b", 10).await.unwrap().len(), 1);
    assert!(h.graph.backlinks("c", 10).await.unwrap().is_empty());
    assert!(!h.graph.candidate("b").await.unwrap().unwrap().page_exists);
    assert_eq!(h.stats.snapshot().invalidations, 1);
}

#[tokio::test]
async fn test_low_confidence_invalidation() {
    let h = harness();
    for (slug, confidence) in [("x", 0.2), ("y", 0.6), ("z", 0.4)] {
        h.cache.store(generated(&h, slug, confidence, Vec::new())).await.unwrap();
    }

    let event = h.invalidation.invalidate_low_confidence(0.5).await.unwrap();
    assert_eq!(event.count(), 2);
    assert_eq!(h.store.list_slugs().await.unwrap(), vec!["y".to_string()]);
}

#[tokio::test]
async fn test_graph_stats_and_orphans() {
    let h = harness();
    publish(
        &h,
        generated(&h, "hub", 0.9, vec![EntityLink::new("Left"), EntityLink::new("Right")]),
    )
    .await;
    publish(&h, generated(&h, "left", 0.9, vec![EntityLink::new("Right")])).await;
    publish(&h, generated(&h, "island", 0.9, Vec::new())).await;

    let stats = h.graph.graph_stats(5).await.unwrap();
    assert_eq!(stats.total_pages, 3);
    assert_eq!(stats.total_connections, 3);
    assert_eq!(stats.avg_connections_per_page, 1.0);
    assert_eq!(stats.top_linked[0].slug, "right");
    assert_eq!(stats.top_linked[0].incoming, 2);

    assert_eq!(h.graph.orphaned_pages().await.unwrap(), vec!["island".to_string()]);

    let suggestions = h.graph.suggested_pages(10).await.unwrap();
    assert_eq!(suggestions.len(), 1);
    assert_eq!(suggestions[0].normalized_slug, "right");
    assert_eq!(suggestions[0].mentioned_count, 2);
}

#[tokio::test]
async fn test_candidate_tier_only_upgrades() {
    let h = harness();
    h.graph
        .record_generation("a", &[EntityLink::new("Reflux").with_confidence(LinkConfidence::Weak)])
        .await
        .unwrap();
    h.graph
        .record_generation("b", &[EntityLink::new("Reflux").with_confidence(LinkConfidence::Ghost)])
        .await
        .unwrap();

    let candidate = h.store.get_candidate("reflux").await.unwrap().unwrap();
    assert_eq!(candidate.confidence, LinkConfidence::Weak);
    assert_eq!(candidate.mentioned_count, 2);
    assert!(candidate.last_seen_at >= candidate.first_seen_at);

    let edge = &h.store.incoming("reflux").await.unwrap();
    let from_b = edge.iter().find(|c| c.from_slug == "b").unwrap();
    assert!((from_b.strength - 0.65).abs() < 1e-9);
}

#[tokio::test]
async fn test_concurrent_reads_count_every_view() {
    let h = harness();
    h.cache.store(generated(&h, "busy", 0.9, Vec::new())).await.unwrap();

    let reads = (0..50).map(|_| h.cache.get("busy"));
    let results = futures::future::join_all(reads).await;
    assert!(results.iter().all(|r| r.as_ref().unwrap().is_hit()));

    assert_eq!(h.cache.peek("busy").await.unwrap().unwrap().view_count, 50);
    assert_eq!(h.stats.snapshot().hits, 50);
}
