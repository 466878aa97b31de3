//! Integration tests for the request path, warming and batch regeneration
//!
//! All tests run against the in-memory store with a scripted generator.

mod common;

use common::{context, context_with, seed_stale, test_config, ScriptedGenerator};
use lexica::{ItemStatus, LexicaError, PageSource};
use lexica_kg::{EntityLink, TtlTier};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

#[tokio::test]
async fn test_batch_isolates_failures() {
    let generator = ScriptedGenerator::new();
    generator.fail_on("beta");
    let ctx = context(generator.clone());
    seed_stale(&ctx, &[("alpha", 4), ("beta", 3), ("gamma", 2), ("delta", 1)]).await;

    let summary = ctx.scheduler.run().await.unwrap();

    assert_eq!(summary.total, 4);
    assert_eq!(summary.success, 3);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.skipped, 0);
    assert_eq!(generator.calls(), vec!["alpha", "beta", "gamma", "delta"]);

    let failed: Vec<_> = summary
        .results
        .iter()
        .filter(|r| r.status == ItemStatus::Failed)
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].slug, "beta");

    // The failed page keeps its old content and stays stale
    let beta = ctx.pages.cache().peek("beta").await.unwrap().unwrap();
    assert_eq!(beta.content, "old body");
    assert!(beta.is_stale());
    assert!(ctx.stats.snapshot().errors >= 1);
}

#[tokio::test]
async fn test_candidates_ordered_by_popularity() {
    let ctx = context(ScriptedGenerator::new());
    seed_stale(&ctx, &[("five", 5), ("fifty", 50), ("one", 1)]).await;

    let candidates = ctx.scheduler.select_candidates().await.unwrap();
    let views: Vec<u64> = candidates.iter().map(|p| p.view_count).collect();
    assert_eq!(views, vec![50, 5, 1]);
}

#[tokio::test]
async fn test_batch_size_limits_run() {
    let generator = ScriptedGenerator::new();
    let config = lexica::AppConfig {
        regen_batch_size: 2,
        ..test_config()
    };
    let ctx = context_with(config, generator.clone());
    seed_stale(&ctx, &[("a", 1), ("b", 30), ("c", 20)]).await;

    let summary = ctx.scheduler.run().await.unwrap();
    assert_eq!(summary.total, 2);
    assert_eq!(generator.calls(), vec!["b", "c"]);

    // The long tail waits for the next run
    assert!(ctx.pages.cache().peek("a").await.unwrap().unwrap().is_stale());
}

#[tokio::test]
async fn test_in_flight_slug_is_skipped() {
    let generator = ScriptedGenerator::new();
    let ctx = context(generator.clone());
    seed_stale(&ctx, &[("busy", 10), ("idle", 5)]).await;

    let guard = ctx.pages.inflight().acquire("busy").unwrap();
    let summary = ctx.scheduler.run().await.unwrap();
    drop(guard);

    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.success, 1);
    assert_eq!(generator.calls(), vec!["idle"]);
    assert!(!ctx.pages.inflight().is_in_flight("busy"));
}

#[tokio::test]
async fn test_regeneration_preserves_view_count() {
    let ctx = context(ScriptedGenerator::new());
    seed_stale(&ctx, &[("naps", 42)]).await;

    ctx.scheduler.run().await.unwrap();

    let page = ctx.pages.cache().peek("naps").await.unwrap().unwrap();
    assert_eq!(page.view_count, 42);
    assert!(!page.is_stale());
    assert_eq!(page.content, "# naps\n\nGenerated body.");
    assert!(page.last_regenerated_at.is_some());
    assert!(page.metadata.regenerated_at.is_some());
    assert_eq!(page.metadata.regeneration_reason.as_deref(), Some("scheduled"));
    assert_eq!(ctx.stats.snapshot().regenerations, 1);
}

#[tokio::test]
async fn test_miss_generates_and_records_links() {
    let generator = ScriptedGenerator::new();
    generator.link("sleep training", vec![EntityLink::new("teething")]);
    generator.confidence("sleep training", 0.85);
    let ctx = context(generator.clone());

    let response = ctx.pages.fetch("sleep-training").await.unwrap();
    assert_eq!(response.source, PageSource::Generated);

    let page = response.page;
    assert_eq!(page.view_count, 0);
    assert_eq!(ctx.config.ttl_policy().tier(page.confidence_score), TtlTier::High);
    assert_eq!(
        page.ttl_expires_at - page.generated_at,
        chrono::Duration::hours(168)
    );
    assert!(page.metadata.regeneration_reason.is_none());

    let candidate = ctx.graph().candidate("teething").await.unwrap().unwrap();
    assert_eq!(candidate.mentioned_count, 1);
    assert!(!candidate.page_exists);

    let backlinks = ctx.graph().backlinks("teething", 10).await.unwrap();
    assert_eq!(backlinks.len(), 1);
    assert_eq!(backlinks[0].from_slug, "sleep-training");
    assert_eq!(backlinks[0].strength, 0.9);

    // Second read is a cache hit and counts a view
    let again = ctx.pages.fetch("Sleep Training").await.unwrap();
    assert_eq!(again.source, PageSource::Cache);
    assert_eq!(generator.calls().len(), 1);
    assert_eq!(
        ctx.pages.cache().peek("sleep-training").await.unwrap().unwrap().view_count,
        1
    );
}

#[tokio::test]
async fn test_stale_read_serves_then_refreshes() {
    let generator = ScriptedGenerator::new();
    let ctx = context(generator.clone());
    seed_stale(&ctx, &[("colic", 7)]).await;

    let response = ctx.pages.fetch("colic").await.unwrap();
    assert_eq!(response.source, PageSource::Stale);
    assert!(response.revalidating);
    assert_eq!(response.page.content, "old body");

    let refreshed = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let page = ctx.pages.cache().peek("colic").await.unwrap().unwrap();
            if !page.is_stale() && !ctx.pages.inflight().is_in_flight("colic") {
                return page;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    assert_eq!(refreshed.view_count, 8);
    assert_eq!(
        refreshed.metadata.regeneration_reason.as_deref(),
        Some("stale-read")
    );
    assert_eq!(generator.calls(), vec!["colic"]);
}

#[tokio::test]
async fn test_stale_read_does_not_double_submit() {
    let generator = ScriptedGenerator::new();
    let ctx = context(generator);
    seed_stale(&ctx, &[("reflux", 3)]).await;

    let guard = ctx.pages.inflight().acquire("reflux").unwrap();
    let response = ctx.pages.fetch("reflux").await.unwrap();
    assert_eq!(response.source, PageSource::Stale);
    assert!(!response.revalidating);
    drop(guard);
}

#[tokio::test]
async fn test_stale_read_does_not_wait_on_full_queue() {
    let generator = ScriptedGenerator::new();
    let config = lexica::AppConfig {
        job_workers: 1,
        job_queue_capacity: 1,
        ..test_config()
    };
    let ctx = context_with(config, generator.clone());
    seed_stale(&ctx, &[("croup", 2)]).await;

    // Occupy the only worker and the only pending slot
    let (release_tx, release_rx) = oneshot::channel::<()>();
    let (started_tx, started_rx) = oneshot::channel();
    ctx.jobs
        .submit("busy", async move {
            let _ = started_tx.send(());
            let _ = release_rx.await;
        })
        .await
        .unwrap()
        .detach();
    started_rx.await.unwrap();
    ctx.jobs.submit("queued", async {}).await.unwrap().detach();

    let response = tokio::time::timeout(Duration::from_millis(500), ctx.pages.fetch("croup"))
        .await
        .expect("stale read waited on the job queue")
        .unwrap();
    assert_eq!(response.source, PageSource::Stale);
    assert!(!response.revalidating);
    assert_eq!(response.page.content, "old body");

    // The rejected refresh released its claim on the slug
    assert!(!ctx.pages.inflight().is_in_flight("croup"));
    let _ = release_tx.send(());
    assert!(generator.calls().is_empty());
}

#[tokio::test]
async fn test_regeneration_does_not_inflate_mentions() {
    let generator = ScriptedGenerator::new();
    generator.link("colic", vec![EntityLink::new("Gas")]);
    let ctx = context(generator.clone());

    ctx.pages.fetch("colic").await.unwrap();
    ctx.pages.regenerate("colic").await.unwrap();
    ctx.pages.regenerate("colic").await.unwrap();

    let gas = ctx.graph().candidate("gas").await.unwrap().unwrap();
    assert_eq!(gas.mentioned_count, 1);
    let backlinks = ctx.graph().backlinks("gas", 10).await.unwrap();
    assert_eq!(backlinks[0].strength, 0.9);

    // A new link on regeneration is still a fresh mention
    generator.link("colic", vec![EntityLink::new("Gas"), EntityLink::new("Reflux")]);
    ctx.pages.regenerate("colic").await.unwrap();
    let reflux = ctx.graph().candidate("reflux").await.unwrap().unwrap();
    assert_eq!(reflux.mentioned_count, 1);
    assert_eq!(ctx.graph().candidate("gas").await.unwrap().unwrap().mentioned_count, 1);
}

#[tokio::test]
async fn test_scheduler_pauses_between_items() {
    let generator = ScriptedGenerator::new();
    let config = lexica::AppConfig {
        regen_delay_ms: 60,
        ..test_config()
    };
    let ctx = context_with(config, generator.clone());
    seed_stale(&ctx, &[("a", 3), ("b", 2), ("c", 1)]).await;

    let started = Instant::now();
    let summary = ctx.scheduler.run().await.unwrap();

    assert_eq!(summary.success, 3);
    // Two pauses for three items, none after the last
    assert!(started.elapsed() >= Duration::from_millis(120));
    assert!(summary.duration_ms >= 120);
}

#[tokio::test]
async fn test_run_regenerates_each_slug_once() {
    let generator = ScriptedGenerator::new();
    let ctx = context(generator.clone());
    seed_stale(&ctx, &[("naps", 1), ("naps", 9)]).await;

    let summary = ctx.scheduler.run().await.unwrap();
    assert_eq!(summary.total, 1);
    assert_eq!(generator.calls(), vec!["naps"]);
}

#[tokio::test]
async fn test_forced_regeneration_conflicts_while_in_flight() {
    let ctx = context(ScriptedGenerator::new());
    seed_stale(&ctx, &[("swaddling", 1)]).await;

    let guard = ctx.pages.inflight().acquire("swaddling").unwrap();
    assert!(matches!(
        ctx.pages.regenerate("swaddling").await,
        Err(LexicaError::InFlight(_))
    ));
    drop(guard);

    let page = ctx.pages.regenerate("swaddling").await.unwrap();
    assert_eq!(page.metadata.regeneration_reason.as_deref(), Some("forced"));
}

#[tokio::test]
async fn test_concurrent_miss_generates_once() {
    let generator = ScriptedGenerator::slow(Duration::from_millis(100));
    let ctx = context(generator.clone());

    let (first, second) = tokio::join!(ctx.pages.fetch("teething"), ctx.pages.fetch("teething"));
    let outcomes = [first, second];

    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(outcomes
        .iter()
        .any(|r| matches!(r, Err(LexicaError::InFlight(_)))));
    assert_eq!(generator.calls().len(), 1);
}

#[tokio::test]
async fn test_warming_skips_fresh_and_isolates_failures() {
    let generator = ScriptedGenerator::new();
    generator.fail_on("colic");
    let ctx = context(generator.clone());

    ctx.pages.fetch("naps").await.unwrap();

    let topics: Vec<String> = ["naps", "colic", "Teething", "teething"]
        .iter()
        .map(|t| t.to_string())
        .collect();
    let summary = ctx.warming.warm(&topics).await;

    assert_eq!(summary.total, 3);
    assert_eq!(summary.success, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(ctx.stats.snapshot().warmings, 1);
    assert!(ctx.pages.cache().peek("teething").await.unwrap().is_some());
}

#[tokio::test]
async fn test_warming_defaults_cover_curated_list() {
    let ctx = context(ScriptedGenerator::new());
    let summary = ctx.warming.warm_defaults().await;

    assert_eq!(summary.total, lexica::DEFAULT_TOPICS.len());
    assert_eq!(summary.success, summary.total);
    assert!(ctx
        .pages
        .cache()
        .peek("sleep-training")
        .await
        .unwrap()
        .is_some());
}
