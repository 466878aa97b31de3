//! # Lexica
//!
//! On-demand generated reference pages. Pages are produced by an LLM provider
//! chain, cached with confidence-tiered TTLs, refreshed by a popularity-ordered
//! batch scheduler and linked into a graph built from the entities each page
//! mentions.
//!
//! Storage, caching and the link graph live in [`lexica_kg`]; this crate adds
//! generation, warming, scheduling, the job queue, the HTTP API and the CLI.

pub mod api;
pub mod app;
pub mod batch;
pub mod config;
pub mod error;
pub mod generation;
pub mod inflight;
pub mod jobs;
pub mod pages;
pub mod scheduler;
pub mod warming;

pub use api::{router, ApiError, ApiServer};
pub use app::{AppContext, CacheOverview};
pub use batch::{ItemResult, ItemStatus};
pub use config::{AppConfig, StoreBackend};
pub use error::{GenerationError, LexicaError, Result};
pub use generation::{
    CliGenerator, GeneratedPage, GenerationGateway, GenerationResult, Model, PageGenerator,
};
pub use inflight::{InFlightRegenerations, RegenerationGuard};
pub use jobs::{JobHandle, JobQueue, JobQueueStats};
pub use pages::{GenerationReason, PageResponse, PageService, PageSource};
pub use scheduler::{RegenerationScheduler, RunSummary, SchedulerConfig, SchedulerInfo};
pub use warming::{WarmSummary, WarmingConfig, WarmingService, DEFAULT_TOPICS};
