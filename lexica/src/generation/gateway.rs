//! Timed, ordered fallback over generation providers

use super::{GenerationResult, PageGenerator};
use crate::error::GenerationError;
use lexica_kg::RuntimeStats;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Successful generation with its provenance
#[derive(Debug, Clone)]
pub struct GeneratedPage {
    pub result: GenerationResult,
    pub provider: String,
    pub duration_ms: u64,

    /// Providers that failed before this one succeeded
    pub failed_attempts: Vec<String>,
}

/// The single entry point to the generation collaborator.
///
/// Providers are tried in order. Each attempt is bounded by `timeout`, and
/// each failure is logged and recorded before the next provider is tried.
/// The gateway never retries a provider; retry policy belongs to callers.
#[derive(Clone)]
pub struct GenerationGateway {
    strategies: Vec<Arc<dyn PageGenerator>>,
    timeout: Duration,
    stats: Arc<RuntimeStats>,
}

impl GenerationGateway {
    pub fn new(
        strategies: Vec<Arc<dyn PageGenerator>>,
        timeout: Duration,
        stats: Arc<RuntimeStats>,
    ) -> Self {
        Self {
            strategies,
            timeout,
            stats,
        }
    }

    /// Provider names in the order they are tried
    pub fn providers(&self) -> Vec<String> {
        self.strategies.iter().map(|s| s.name().to_string()).collect()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Generate content for `slug` from a topic query
    pub async fn generate(
        &self,
        slug: &str,
        query: &str,
    ) -> Result<GeneratedPage, GenerationError> {
        if self.strategies.is_empty() {
            self.stats
                .record_error(slug, &GenerationError::NoProviders.to_string());
            return Err(GenerationError::NoProviders);
        }

        let started = Instant::now();
        let mut failures: Vec<GenerationError> = Vec::new();

        for strategy in &self.strategies {
            let provider = strategy.name().to_string();
            debug!("Generating {} with {}", slug, provider);

            let outcome = match tokio::time::timeout(self.timeout, strategy.generate(query)).await
            {
                Ok(outcome) => outcome,
                Err(_) => Err(GenerationError::Timeout {
                    provider: provider.clone(),
                    secs: self.timeout.as_secs(),
                }),
            };

            match outcome {
                Ok(mut result) => {
                    let duration_ms = started.elapsed().as_millis() as u64;
                    if result.metadata.provider.is_none() {
                        result.metadata.provider = Some(provider.clone());
                    }
                    self.stats.record_regeneration(slug, duration_ms);
                    return Ok(GeneratedPage {
                        result,
                        provider,
                        duration_ms,
                        failed_attempts: failures.iter().map(|e| e.to_string()).collect(),
                    });
                }
                Err(e) => {
                    warn!("Generation of {} failed with {}: {}", slug, provider, e);
                    self.stats.record_error(slug, &e.to_string());
                    failures.push(e);
                }
            }
        }

        if failures.len() == 1 {
            if let Some(only) = failures.pop() {
                return Err(only);
            }
        }
        Err(GenerationError::Exhausted(
            failures.iter().map(|e| e.to_string()).collect(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Fixed {
        name: &'static str,
        outcome: Result<f64, &'static str>,
        delay: Duration,
    }

    #[async_trait]
    impl PageGenerator for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        async fn generate(&self, query: &str) -> Result<GenerationResult, GenerationError> {
            tokio::time::sleep(self.delay).await;
            match self.outcome {
                Ok(confidence) => Ok(GenerationResult {
                    title: query.to_string(),
                    content: "body".to_string(),
                    excerpt: String::new(),
                    confidence_score: confidence,
                    metadata: Default::default(),
                    published: true,
                }),
                Err(message) => Err(GenerationError::Provider {
                    provider: self.name.to_string(),
                    message: message.to_string(),
                }),
            }
        }
    }

    fn gateway(strategies: Vec<Fixed>, timeout: Duration) -> (GenerationGateway, Arc<RuntimeStats>) {
        let stats = Arc::new(RuntimeStats::new());
        let strategies = strategies
            .into_iter()
            .map(|s| Arc::new(s) as Arc<dyn PageGenerator>)
            .collect();
        (GenerationGateway::new(strategies, timeout, stats.clone()), stats)
    }

    #[tokio::test]
    async fn test_falls_back_in_order() {
        let (gateway, stats) = gateway(
            vec![
                Fixed { name: "primary", outcome: Err("overloaded"), delay: Duration::ZERO },
                Fixed { name: "secondary", outcome: Ok(0.7), delay: Duration::ZERO },
            ],
            Duration::from_secs(1),
        );

        let generated = gateway.generate("naps", "naps").await.unwrap();
        assert_eq!(generated.provider, "secondary");
        assert_eq!(generated.failed_attempts.len(), 1);
        assert_eq!(generated.result.metadata.provider.as_deref(), Some("secondary"));

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.errors, 1);
        assert_eq!(snapshot.regenerations, 1);
    }

    #[tokio::test]
    async fn test_timeout_is_a_failure() {
        let (gateway, stats) = gateway(
            vec![Fixed { name: "slow", outcome: Ok(0.9), delay: Duration::from_millis(200) }],
            Duration::from_millis(20),
        );

        let error = gateway.generate("naps", "naps").await.unwrap_err();
        assert!(matches!(error, GenerationError::Timeout { .. }));
        assert_eq!(stats.snapshot().errors, 1);
    }

    #[tokio::test]
    async fn test_exhausted_reports_every_attempt() {
        let (gateway, _) = gateway(
            vec![
                Fixed { name: "a", outcome: Err("x"), delay: Duration::ZERO },
                Fixed { name: "b", outcome: Err("y"), delay: Duration::ZERO },
            ],
            Duration::from_secs(1),
        );

        match gateway.generate("naps", "naps").await.unwrap_err() {
            GenerationError::Exhausted(attempts) => assert_eq!(attempts.len(), 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_no_providers() {
        let (gateway, _) = gateway(Vec::new(), Duration::from_secs(1));
        assert_eq!(
            gateway.generate("naps", "naps").await.unwrap_err(),
            GenerationError::NoProviders
        );
    }
}
