//! Neo4j connection settings, client and liveness probe
//!
//! The probe backs the `/health` endpoint. It prefers `CALL db.ping()` and
//! falls back to `RETURN 1` on servers without the procedure.

use crate::error::{Result, StoreError};
use chrono::{DateTime, Utc};
use neo4rs::{query, ConfigBuilder, Graph};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Connection settings for the Neo4j page store
#[derive(Debug, Clone)]
pub struct Neo4jSettings {
    pub uri: String,
    pub user: String,
    pub password: String,
    pub database: String,

    /// Pool size handed to the driver
    pub max_connections: usize,
}

impl Default for Neo4jSettings {
    fn default() -> Self {
        Self {
            uri: "bolt://localhost:7687".to_string(),
            user: "neo4j".to_string(),
            password: String::new(),
            database: "neo4j".to_string(),
            max_connections: 16,
        }
    }
}

impl Neo4jSettings {
    /// Read `NEO4J_URI`, `NEO4J_USER`, `NEO4J_PASSWORD` and `NEO4J_DATABASE`,
    /// loading a `.env` file first when one is present.
    ///
    /// Returns `None` when `NEO4J_URI` is unset, meaning the caller should use
    /// the in-memory store.
    pub fn from_env() -> Option<Self> {
        dotenv::dotenv().ok();

        let uri = std::env::var("NEO4J_URI").ok()?;
        let defaults = Self::default();
        Some(Self {
            uri,
            user: std::env::var("NEO4J_USER").unwrap_or(defaults.user),
            password: std::env::var("NEO4J_PASSWORD").unwrap_or(defaults.password),
            database: std::env::var("NEO4J_DATABASE").unwrap_or(defaults.database),
            max_connections: defaults.max_connections,
        })
    }
}

/// Probe tuning
#[derive(Debug, Clone)]
pub struct HealthCheckConfig {
    /// Extra attempts after the first failure
    pub max_retries: u32,
    pub retry_delay: Duration,

    /// Responses slower than this report `Degraded`
    pub degraded_threshold_ms: u64,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            retry_delay: Duration::from_millis(250),
            degraded_threshold_ms: 1000,
        }
    }
}

/// Outcome of a liveness probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// HTTP status the health endpoint answers with
    pub fn to_http_status_code(&self) -> u16 {
        match self {
            HealthStatus::Healthy | HealthStatus::Degraded => 200,
            HealthStatus::Unhealthy => 503,
        }
    }

    /// Healthy or degraded
    pub fn is_operational(&self) -> bool {
        matches!(self, HealthStatus::Healthy | HealthStatus::Degraded)
    }
}

/// Probe report
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckResult {
    pub status: HealthStatus,
    pub backend: String,
    pub response_time_ms: u64,
    pub checked_at: DateTime<Utc>,
    pub retry_count: u32,
    pub used_fallback: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HealthCheckResult {
    /// Report for a backend that needs no probing
    pub fn in_memory() -> Self {
        Self {
            status: HealthStatus::Healthy,
            backend: "memory".to_string(),
            response_time_ms: 0,
            checked_at: Utc::now(),
            retry_count: 0,
            used_fallback: false,
            error: None,
        }
    }

    fn from_elapsed(elapsed: Duration, degraded_threshold_ms: u64) -> Self {
        let response_time_ms = elapsed.as_millis() as u64;
        let status = if response_time_ms > degraded_threshold_ms {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };
        Self {
            status,
            backend: "neo4j".to_string(),
            response_time_ms,
            checked_at: Utc::now(),
            retry_count: 0,
            used_fallback: false,
            error: None,
        }
    }

    fn failed(elapsed: Duration, error: String) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            backend: "neo4j".to_string(),
            response_time_ms: elapsed.as_millis() as u64,
            checked_at: Utc::now(),
            retry_count: 0,
            used_fallback: false,
            error: Some(error),
        }
    }
}

/// Pooled Neo4j client
#[derive(Clone)]
pub struct Neo4jClient {
    graph: Graph,
    health_config: HealthCheckConfig,
}

impl Neo4jClient {
    /// Open a connection pool with the given settings
    pub async fn connect(settings: &Neo4jSettings) -> Result<Self> {
        info!(
            "Connecting to Neo4j at {} (database: {})",
            settings.uri, settings.database
        );

        let config = ConfigBuilder::default()
            .uri(settings.uri.as_str())
            .user(settings.user.as_str())
            .password(settings.password.as_str())
            .db(settings.database.as_str())
            .fetch_size(500)
            .max_connections(settings.max_connections)
            .build()
            .map_err(|e| StoreError::ConfigError(e.to_string()))?;

        let graph = Graph::connect(config)
            .await
            .map_err(|e| StoreError::ConnectionError(e.to_string()))?;

        info!("Connected to Neo4j");

        Ok(Self {
            graph,
            health_config: HealthCheckConfig::default(),
        })
    }

    /// Replace the probe tuning
    pub fn with_health_config(mut self, health_config: HealthCheckConfig) -> Self {
        self.health_config = health_config;
        self
    }

    /// Run `RETURN 1`
    pub async fn health_check(&self) -> Result<()> {
        self.graph
            .run(query("RETURN 1"))
            .await
            .map_err(|e| StoreError::ConnectionError(e.to_string()))
    }

    async fn ping(&self) -> Result<bool> {
        let mut rows = self
            .graph
            .execute(query("CALL db.ping()"))
            .await
            .map_err(|e| StoreError::QueryError(e.to_string()))?;

        match rows.next().await? {
            Some(row) => Ok(row.get::<bool>("success").unwrap_or(false)),
            None => Err(StoreError::QueryError(
                "db.ping() returned no rows".to_string(),
            )),
        }
    }

    /// Probe the server, retrying transient failures. Never errors; failures
    /// are reported as `Unhealthy`.
    pub async fn probe(&self) -> HealthCheckResult {
        let mut retry_count = 0;
        let mut used_fallback = false;

        loop {
            let start = Instant::now();
            let outcome = if used_fallback {
                self.health_check().await
            } else {
                match self.ping().await {
                    Ok(true) => Ok(()),
                    Ok(false) => Err(StoreError::QueryError(
                        "db.ping() reported failure".to_string(),
                    )),
                    Err(e) => {
                        debug!("db.ping() unavailable, falling back to RETURN 1: {}", e);
                        used_fallback = true;
                        self.health_check().await
                    }
                }
            };

            let mut result = match outcome {
                Ok(()) => HealthCheckResult::from_elapsed(
                    start.elapsed(),
                    self.health_config.degraded_threshold_ms,
                ),
                Err(e) => HealthCheckResult::failed(start.elapsed(), e.to_string()),
            };
            result.retry_count = retry_count;
            result.used_fallback = used_fallback;

            if result.status.is_operational() || retry_count >= self.health_config.max_retries {
                return result;
            }

            retry_count += 1;
            warn!(
                "Neo4j probe failed (attempt {}/{}), retrying after {:?}",
                retry_count,
                self.health_config.max_retries + 1,
                self.health_config.retry_delay
            );
            tokio::time::sleep(self.health_config.retry_delay).await;
        }
    }

    /// Underlying driver handle
    pub fn graph(&self) -> &Graph {
        &self.graph
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_status_http_codes() {
        assert_eq!(HealthStatus::Healthy.to_http_status_code(), 200);
        assert_eq!(HealthStatus::Degraded.to_http_status_code(), 200);
        assert_eq!(HealthStatus::Unhealthy.to_http_status_code(), 503);
        assert!(!HealthStatus::Unhealthy.is_operational());
    }

    #[test]
    fn test_degraded_threshold() {
        let fast = HealthCheckResult::from_elapsed(Duration::from_millis(20), 1000);
        assert_eq!(fast.status, HealthStatus::Healthy);

        let slow = HealthCheckResult::from_elapsed(Duration::from_millis(1500), 1000);
        assert_eq!(slow.status, HealthStatus::Degraded);
        assert_eq!(slow.response_time_ms, 1500);
    }

    #[test]
    fn test_failed_result_carries_error() {
        let result = HealthCheckResult::failed(Duration::from_millis(5), "refused".to_string());
        assert_eq!(result.status, HealthStatus::Unhealthy);
        assert_eq!(result.error.as_deref(), Some("refused"));
    }

    #[test]
    fn test_in_memory_report() {
        let result = HealthCheckResult::in_memory();
        assert_eq!(result.backend, "memory");
        assert!(result.status.is_operational());
    }
}
