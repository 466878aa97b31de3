//! Configuration for the page cache

use crate::error::{Result as StoreResult, StoreError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const HOUR: u64 = 3600;

/// Longest TTL a tier may be configured with (ten years)
pub const MAX_TTL: Duration = Duration::from_secs(10 * 366 * 24 * HOUR);

/// Freshness tier a page falls into based on its confidence score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TtlTier {
    High,
    Medium,
    Low,
}

/// Maps a confidence score to a time-to-live.
///
/// Lower confidence means a shorter life, so doubtful pages get regenerated
/// sooner. Jitter only ever lengthens the TTL: a page is never stale before
/// `generated_at + base_ttl`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TtlPolicy {
    /// Scores at or above this get `high_ttl`
    pub high_threshold: f64,

    /// Scores at or above this (and below `high_threshold`) get `medium_ttl`
    pub medium_threshold: f64,

    pub high_ttl: Duration,
    pub medium_ttl: Duration,
    pub low_ttl: Duration,

    /// Upper bound of the random extension, as a fraction of the base TTL
    /// (0.0 - 1.0). Spreads expirations so a warm batch does not go stale in
    /// one instant.
    pub jitter: f64,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self {
            high_threshold: 0.8,
            medium_threshold: 0.5,
            high_ttl: Duration::from_secs(168 * HOUR),
            medium_ttl: Duration::from_secs(72 * HOUR),
            low_ttl: Duration::from_secs(24 * HOUR),
            jitter: 0.1,
        }
    }
}

impl TtlPolicy {
    /// Short-lived pages for fast-moving topics
    pub fn realtime() -> Self {
        Self {
            high_ttl: Duration::from_secs(6 * HOUR),
            medium_ttl: Duration::from_secs(3 * HOUR),
            low_ttl: Duration::from_secs(HOUR),
            jitter: 0.15,
            ..Default::default()
        }
    }

    /// Pages refreshed roughly once a day
    pub fn daily() -> Self {
        Self {
            high_ttl: Duration::from_secs(23 * HOUR),
            medium_ttl: Duration::from_secs(12 * HOUR),
            low_ttl: Duration::from_secs(6 * HOUR),
            jitter: 0.1,
            ..Default::default()
        }
    }

    /// Long-lived reference material
    pub fn reference() -> Self {
        Self {
            high_ttl: Duration::from_secs(30 * 24 * HOUR),
            medium_ttl: Duration::from_secs(14 * 24 * HOUR),
            low_ttl: Duration::from_secs(3 * 24 * HOUR),
            jitter: 0.05,
            ..Default::default()
        }
    }

    /// Tier for a confidence score
    pub fn tier(&self, confidence: f64) -> TtlTier {
        if confidence >= self.high_threshold {
            TtlTier::High
        } else if confidence >= self.medium_threshold {
            TtlTier::Medium
        } else {
            TtlTier::Low
        }
    }

    /// TTL before jitter
    pub fn base_ttl(&self, confidence: f64) -> Duration {
        match self.tier(confidence) {
            TtlTier::High => self.high_ttl,
            TtlTier::Medium => self.medium_ttl,
            TtlTier::Low => self.low_ttl,
        }
    }

    /// TTL with a random extension in `[0, jitter * base]`
    pub fn ttl_for(&self, confidence: f64) -> Duration {
        let base = self.base_ttl(confidence);
        if self.jitter <= 0.0 {
            return base;
        }

        let extension = base.as_secs_f64() * self.jitter * rand::random::<f64>();
        base.saturating_add(Duration::try_from_secs_f64(extension).unwrap_or_default())
    }

    /// Expiry instant for a page generated at `generated_at`. Fails when the
    /// TTL cannot be represented as a timestamp.
    pub fn expires_at(
        &self,
        generated_at: chrono::DateTime<chrono::Utc>,
        confidence: f64,
    ) -> StoreResult<chrono::DateTime<chrono::Utc>> {
        let ttl = self.ttl_for(confidence);
        chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| generated_at.checked_add_signed(ttl))
            .ok_or_else(|| {
                StoreError::ConfigError(format!(
                    "TTL of {}s from {} overflows the timestamp range",
                    ttl.as_secs(),
                    generated_at
                ))
            })
    }

    /// Validate thresholds, durations and jitter
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.high_threshold)
            || !(0.0..=1.0).contains(&self.medium_threshold)
        {
            return Err("confidence thresholds must be between 0.0 and 1.0".to_string());
        }

        if self.medium_threshold > self.high_threshold {
            return Err("medium_threshold must not exceed high_threshold".to_string());
        }

        if self.high_ttl.is_zero() || self.medium_ttl.is_zero() || self.low_ttl.is_zero() {
            return Err("TTL durations must be greater than 0".to_string());
        }

        if self.high_ttl > MAX_TTL || self.medium_ttl > MAX_TTL || self.low_ttl > MAX_TTL {
            return Err(format!(
                "TTL durations must not exceed {} hours",
                MAX_TTL.as_secs() / HOUR
            ));
        }

        if !(0.0..=1.0).contains(&self.jitter) {
            return Err("jitter must be between 0.0 and 1.0".to_string());
        }

        Ok(())
    }
}

/// Configuration for the page cache and its maintenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Confidence to TTL mapping
    pub ttl: TtlPolicy,

    /// Pages below this score count as low confidence
    pub low_confidence_threshold: f64,

    /// Run the stale-page cleanup loop
    pub enable_auto_cleanup: bool,

    /// How often the cleanup loop wakes
    pub cleanup_interval: Duration,

    /// Only pages stale for longer than this are removed by the cleanup loop,
    /// giving the scheduler a chance to refresh them first
    pub cleanup_grace: Duration,

    /// Invalidation events kept in memory
    pub event_log_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: TtlPolicy::default(),
            low_confidence_threshold: 0.5,
            enable_auto_cleanup: false,
            cleanup_interval: Duration::from_secs(3600),
            cleanup_grace: Duration::from_secs(72 * HOUR),
            event_log_capacity: 50,
        }
    }
}

impl CacheConfig {
    /// Create a new builder for cache configuration
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        self.ttl.validate()?;

        if !(0.0..=1.0).contains(&self.low_confidence_threshold) {
            return Err("low_confidence_threshold must be between 0.0 and 1.0".to_string());
        }

        if self.enable_auto_cleanup && self.cleanup_interval.is_zero() {
            return Err("cleanup_interval must be greater than 0".to_string());
        }

        Ok(())
    }
}

/// Builder for cache configuration
#[derive(Debug, Default)]
pub struct CacheConfigBuilder {
    ttl: Option<TtlPolicy>,
    low_confidence_threshold: Option<f64>,
    enable_auto_cleanup: Option<bool>,
    cleanup_interval: Option<Duration>,
    cleanup_grace: Option<Duration>,
    event_log_capacity: Option<usize>,
}

impl CacheConfigBuilder {
    /// Set the TTL policy
    pub fn ttl(mut self, policy: TtlPolicy) -> Self {
        self.ttl = Some(policy);
        self
    }

    /// Set the low-confidence threshold
    pub fn low_confidence_threshold(mut self, threshold: f64) -> Self {
        self.low_confidence_threshold = Some(threshold);
        self
    }

    /// Enable or disable the cleanup loop
    pub fn enable_auto_cleanup(mut self, enable: bool) -> Self {
        self.enable_auto_cleanup = Some(enable);
        self
    }

    /// Set cleanup interval
    pub fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = Some(interval);
        self
    }

    /// Set cleanup grace period
    pub fn cleanup_grace(mut self, grace: Duration) -> Self {
        self.cleanup_grace = Some(grace);
        self
    }

    /// Set the invalidation event log size
    pub fn event_log_capacity(mut self, capacity: usize) -> Self {
        self.event_log_capacity = Some(capacity);
        self
    }

    /// Build the cache configuration
    pub fn build(self) -> CacheConfig {
        let defaults = CacheConfig::default();

        CacheConfig {
            ttl: self.ttl.unwrap_or(defaults.ttl),
            low_confidence_threshold: self
                .low_confidence_threshold
                .unwrap_or(defaults.low_confidence_threshold),
            enable_auto_cleanup: self
                .enable_auto_cleanup
                .unwrap_or(defaults.enable_auto_cleanup),
            cleanup_interval: self.cleanup_interval.unwrap_or(defaults.cleanup_interval),
            cleanup_grace: self.cleanup_grace.unwrap_or(defaults.cleanup_grace),
            event_log_capacity: self
                .event_log_capacity
                .unwrap_or(defaults.event_log_capacity),
        }
    }
}
