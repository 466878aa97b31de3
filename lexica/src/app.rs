//! Service wiring
//!
//! [`AppContext`] owns one instance of every component and is shared by the
//! HTTP handlers, the CLI and the background loops.

use crate::config::{AppConfig, StoreBackend};
use crate::error::Result;
use crate::generation::{CliGenerator, GenerationGateway, PageGenerator};
use crate::inflight::InFlightRegenerations;
use crate::jobs::{JobQueue, JobQueueStats};
use crate::pages::PageService;
use crate::scheduler::{run_periodic, RegenerationScheduler};
use crate::warming::WarmingService;
use chrono::Utc;
use lexica_kg::cache::start_auto_cleanup;
use lexica_kg::{
    CacheService, GraphEngine, HealthCheckResult, InvalidationEvent, InvalidationManager,
    LinkStore, MemoryStore, Neo4jClient, Neo4jStore, PageStore, PageStoreSummary, PageSummary,
    RuntimeStats, RuntimeStatsSnapshot,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

const OVERVIEW_LIST_SIZE: usize = 10;

#[derive(Clone)]
enum Backend {
    Memory,
    Neo4j(Neo4jClient),
}

/// Aggregate view served by `GET /cache`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheOverview {
    pub store: PageStoreSummary,
    pub runtime: RuntimeStatsSnapshot,
    pub hit_rate: f64,
    pub popular: Vec<PageSummary>,
    pub low_confidence: Vec<PageSummary>,
    pub stale: Vec<PageSummary>,
    pub recent_invalidations: Vec<InvalidationEvent>,
    pub jobs: JobQueueStats,
    pub in_flight: usize,
}

#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<AppConfig>,
    pub stats: Arc<RuntimeStats>,
    pub page_store: Arc<dyn PageStore>,
    pub invalidation: Arc<InvalidationManager>,
    pub pages: PageService,
    pub warming: WarmingService,
    pub scheduler: RegenerationScheduler,
    pub jobs: JobQueue,
    backend: Backend,
}

impl AppContext {
    /// Open the configured store and build the `claude` CLI provider chain
    pub async fn connect(config: AppConfig) -> Result<Self> {
        config.validate()?;

        let generators: Vec<Arc<dyn PageGenerator>> = config
            .model_chain()?
            .into_iter()
            .map(|model| {
                Arc::new(CliGenerator::new(model).with_claude_path(config.claude_path.clone()))
                    as Arc<dyn PageGenerator>
            })
            .collect();

        match config.store {
            StoreBackend::Memory => {
                info!("Using in-memory store");
                Ok(Self::in_memory(config, generators))
            }
            StoreBackend::Neo4j => {
                let client = Neo4jClient::connect(&config.neo4j_settings()).await?;
                let store = Arc::new(Neo4jStore::new(&client));
                store.ensure_schema().await?;
                info!("Using Neo4j store at {}", config.neo4j_uri);
                Ok(Self::assemble(
                    config,
                    store.clone(),
                    store,
                    generators,
                    Backend::Neo4j(client),
                ))
            }
        }
    }

    /// Wire everything over a fresh [`MemoryStore`]
    pub fn in_memory(config: AppConfig, generators: Vec<Arc<dyn PageGenerator>>) -> Self {
        let store = Arc::new(MemoryStore::new());
        Self::assemble(config, store.clone(), store, generators, Backend::Memory)
    }

    fn assemble(
        config: AppConfig,
        page_store: Arc<dyn PageStore>,
        link_store: Arc<dyn LinkStore>,
        generators: Vec<Arc<dyn PageGenerator>>,
        backend: Backend,
    ) -> Self {
        let stats = Arc::new(RuntimeStats::new());
        let cache_config = config.cache_config();

        let cache = CacheService::new(page_store.clone(), stats.clone(), cache_config.clone());
        let invalidation = Arc::new(InvalidationManager::new(
            page_store.clone(),
            link_store.clone(),
            stats.clone(),
            cache_config,
        ));
        let graph = GraphEngine::new(page_store.clone(), link_store);
        let gateway = GenerationGateway::new(generators, config.generation_timeout(), stats.clone());
        let jobs = JobQueue::start(config.job_workers, config.job_queue_capacity);

        let pages = PageService::new(
            cache,
            graph,
            gateway,
            InFlightRegenerations::new(),
            jobs.clone(),
        );
        let warming = WarmingService::new(pages.clone(), config.warming_config());
        let scheduler = RegenerationScheduler::new(pages.clone(), config.scheduler_config());

        Self {
            config: Arc::new(config),
            stats,
            page_store,
            invalidation,
            pages,
            warming,
            scheduler,
            jobs,
            backend,
        }
    }

    pub fn graph(&self) -> &GraphEngine {
        self.pages.graph()
    }

    /// Start the optional cleanup and periodic regeneration loops
    pub fn spawn_background(&self) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        if self.invalidation.config().enable_auto_cleanup {
            handles.push(tokio::spawn(start_auto_cleanup(self.invalidation.clone())));
        }

        if let Some(interval) = self.scheduler.config().interval {
            handles.push(tokio::spawn(run_periodic(
                self.scheduler.clone(),
                self.jobs.clone(),
                interval,
            )));
        }

        handles
    }

    pub async fn health(&self) -> HealthCheckResult {
        match &self.backend {
            Backend::Memory => HealthCheckResult::in_memory(),
            Backend::Neo4j(client) => client.probe().await,
        }
    }

    pub async fn cache_overview(&self) -> Result<CacheOverview> {
        let now = Utc::now();
        let threshold = self.config.low_confidence_threshold;
        let runtime = self.stats.snapshot();

        let summaries = |pages: Vec<lexica_kg::CachedPage>| -> Vec<PageSummary> {
            pages.iter().map(|p| p.summary()).collect()
        };

        Ok(CacheOverview {
            store: self.page_store.summary(now).await?,
            hit_rate: runtime.hit_rate(),
            runtime,
            popular: summaries(self.page_store.popular_pages(OVERVIEW_LIST_SIZE).await?),
            low_confidence: summaries(
                self.page_store
                    .low_confidence_pages(threshold, OVERVIEW_LIST_SIZE)
                    .await?,
            ),
            stale: summaries(self.page_store.stale_pages(now, OVERVIEW_LIST_SIZE).await?),
            recent_invalidations: self.invalidation.recent_events().await,
            jobs: self.jobs.stats(),
            in_flight: self.pages.inflight().len(),
        })
    }
}
