//! Service configuration
//!
//! Every setting is a command-line flag that falls back to an environment
//! variable and then to a default. `.env` is loaded before parsing.

use crate::error::LexicaError;
use crate::generation::Model;
use crate::scheduler::SchedulerConfig;
use crate::warming::WarmingConfig;
use clap::{Args, ValueEnum};
use lexica_kg::{CacheConfig, Neo4jSettings, TtlPolicy, MAX_TTL};
use std::path::PathBuf;
use std::time::Duration;

const HOUR: u64 = 3600;

/// Backend holding pages, candidates and connections
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreBackend {
    Memory,
    Neo4j,
}

#[derive(Debug, Clone, Args)]
pub struct AppConfig {
    /// Address the HTTP server binds to
    #[arg(long, env = "LEXICA_HOST", default_value = "127.0.0.1")]
    pub host: String,

    #[arg(long, env = "LEXICA_PORT", default_value_t = 8080)]
    pub port: u16,

    #[arg(long, env = "LEXICA_STORE", value_enum, default_value_t = StoreBackend::Memory)]
    pub store: StoreBackend,

    #[arg(long, env = "NEO4J_URI", default_value = "bolt://localhost:7687")]
    pub neo4j_uri: String,

    #[arg(long, env = "NEO4J_USER", default_value = "neo4j")]
    pub neo4j_user: String,

    #[arg(long, env = "NEO4J_PASSWORD", default_value = "", hide_env_values = true)]
    pub neo4j_password: String,

    #[arg(long, env = "NEO4J_DATABASE", default_value = "neo4j")]
    pub neo4j_database: String,

    /// Bearer secret for the scheduled regeneration endpoint
    #[arg(long, env = "LEXICA_CRON_SECRET", hide_env_values = true)]
    pub cron_secret: Option<String>,

    #[arg(long, env = "LEXICA_LOW_CONFIDENCE_THRESHOLD", default_value_t = 0.5)]
    pub low_confidence_threshold: f64,

    #[arg(long, env = "LEXICA_TTL_HIGH_HOURS", default_value_t = 168, value_parser = ttl_hours())]
    pub ttl_high_hours: u64,

    #[arg(long, env = "LEXICA_TTL_MEDIUM_HOURS", default_value_t = 72, value_parser = ttl_hours())]
    pub ttl_medium_hours: u64,

    #[arg(long, env = "LEXICA_TTL_LOW_HOURS", default_value_t = 24, value_parser = ttl_hours())]
    pub ttl_low_hours: u64,

    #[arg(long, env = "LEXICA_TTL_JITTER", default_value_t = 0.1)]
    pub ttl_jitter: f64,

    /// Stale pages regenerated per scheduler run
    #[arg(long, env = "LEXICA_REGEN_BATCH_SIZE", default_value_t = 10)]
    pub regen_batch_size: usize,

    /// Pause between regenerations within a run
    #[arg(long, env = "LEXICA_REGEN_DELAY_MS", default_value_t = 2000)]
    pub regen_delay_ms: u64,

    /// In-process scheduler period; 0 leaves runs to the cron endpoint
    #[arg(long, env = "LEXICA_REGEN_INTERVAL_MINS", default_value_t = 0)]
    pub regen_interval_mins: u64,

    #[arg(long, env = "LEXICA_WARM_CONCURRENCY", default_value_t = 1)]
    pub warm_concurrency: usize,

    #[arg(long, env = "LEXICA_WARM_DELAY_MS", default_value_t = 500)]
    pub warm_delay_ms: u64,

    #[arg(long, env = "LEXICA_GENERATION_TIMEOUT_SECS", default_value_t = 120)]
    pub generation_timeout_secs: u64,

    /// Ordered fallback list of models
    #[arg(long, env = "LEXICA_MODELS", default_value = "sonnet,haiku")]
    pub models: String,

    #[arg(long, env = "LEXICA_CLAUDE_PATH", default_value = "claude")]
    pub claude_path: PathBuf,

    #[arg(long, env = "LEXICA_JOB_WORKERS", default_value_t = 2)]
    pub job_workers: usize,

    /// Pending jobs allowed before submissions wait (or, for stale refreshes,
    /// are dropped)
    #[arg(long, env = "LEXICA_JOB_QUEUE_CAPACITY", default_value_t = 256)]
    pub job_queue_capacity: usize,

    /// Stale cleanup period; 0 disables the loop
    #[arg(long, env = "LEXICA_CLEANUP_INTERVAL_MINS", default_value_t = 0)]
    pub cleanup_interval_mins: u64,

    #[arg(long, env = "LEXICA_CLEANUP_GRACE_HOURS", default_value_t = 72, value_parser = ttl_hours())]
    pub cleanup_grace_hours: u64,
}

/// Hour counts accepted for TTL and grace flags
fn ttl_hours() -> clap::builder::RangedU64ValueParser<u64> {
    clap::value_parser!(u64).range(0..=MAX_TTL.as_secs() / HOUR)
}

fn hours(count: u64) -> Duration {
    Duration::from_secs(count.saturating_mul(HOUR))
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            store: StoreBackend::Memory,
            neo4j_uri: "bolt://localhost:7687".to_string(),
            neo4j_user: "neo4j".to_string(),
            neo4j_password: String::new(),
            neo4j_database: "neo4j".to_string(),
            cron_secret: None,
            low_confidence_threshold: 0.5,
            ttl_high_hours: 168,
            ttl_medium_hours: 72,
            ttl_low_hours: 24,
            ttl_jitter: 0.1,
            regen_batch_size: 10,
            regen_delay_ms: 2000,
            regen_interval_mins: 0,
            warm_concurrency: 1,
            warm_delay_ms: 500,
            generation_timeout_secs: 120,
            models: "sonnet,haiku".to_string(),
            claude_path: PathBuf::from("claude"),
            job_workers: 2,
            job_queue_capacity: 256,
            cleanup_interval_mins: 0,
            cleanup_grace_hours: 72,
        }
    }
}

impl AppConfig {
    pub fn ttl_policy(&self) -> TtlPolicy {
        TtlPolicy {
            high_ttl: hours(self.ttl_high_hours),
            medium_ttl: hours(self.ttl_medium_hours),
            low_ttl: hours(self.ttl_low_hours),
            jitter: self.ttl_jitter,
            ..TtlPolicy::default()
        }
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::builder()
            .ttl(self.ttl_policy())
            .low_confidence_threshold(self.low_confidence_threshold)
            .enable_auto_cleanup(self.cleanup_interval_mins > 0)
            .cleanup_interval(Duration::from_secs(self.cleanup_interval_mins.max(1).saturating_mul(60)))
            .cleanup_grace(hours(self.cleanup_grace_hours))
            .build()
    }

    pub fn neo4j_settings(&self) -> Neo4jSettings {
        Neo4jSettings {
            uri: self.neo4j_uri.clone(),
            user: self.neo4j_user.clone(),
            password: self.neo4j_password.clone(),
            database: self.neo4j_database.clone(),
            ..Neo4jSettings::default()
        }
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            batch_size: self.regen_batch_size,
            item_delay: Duration::from_millis(self.regen_delay_ms),
            interval: (self.regen_interval_mins > 0)
                .then(|| Duration::from_secs(self.regen_interval_mins.saturating_mul(60))),
        }
    }

    pub fn warming_config(&self) -> WarmingConfig {
        WarmingConfig {
            concurrency: self.warm_concurrency.max(1),
            item_delay: Duration::from_millis(self.warm_delay_ms),
        }
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }

    /// Parse the fallback model list, preserving order and dropping repeats
    pub fn model_chain(&self) -> Result<Vec<Model>, LexicaError> {
        let mut chain = Vec::new();
        for name in self.models.split(',').filter(|s| !s.trim().is_empty()) {
            let model: Model = name.parse().map_err(LexicaError::Configuration)?;
            if !chain.contains(&model) {
                chain.push(model);
            }
        }

        if chain.is_empty() {
            return Err(LexicaError::Configuration(
                "LEXICA_MODELS must name at least one model".to_string(),
            ));
        }
        Ok(chain)
    }

    /// The scheduler secret, or the error every cron request reports when it
    /// is missing
    pub fn require_cron_secret(&self) -> Result<&str, LexicaError> {
        match self.cron_secret.as_deref() {
            Some(secret) if !secret.is_empty() => Ok(secret),
            _ => Err(LexicaError::Configuration(
                "LEXICA_CRON_SECRET is not set".to_string(),
            )),
        }
    }

    pub fn validate(&self) -> Result<(), LexicaError> {
        self.cache_config()
            .validate()
            .map_err(LexicaError::Configuration)?;
        self.model_chain()?;

        if self.regen_batch_size == 0 {
            return Err(LexicaError::Configuration(
                "LEXICA_REGEN_BATCH_SIZE must be at least 1".to_string(),
            ));
        }
        if self.generation_timeout_secs == 0 {
            return Err(LexicaError::Configuration(
                "LEXICA_GENERATION_TIMEOUT_SECS must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
