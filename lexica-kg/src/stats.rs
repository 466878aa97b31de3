//! Process-wide runtime counters
//!
//! Counters are lock-free atomics so concurrent requests never contend on a
//! read. A short log of recent regenerations and errors is kept for the admin
//! stats view; it sits behind a mutex that recovers from poisoning.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;
use tracing::warn;

const DEFAULT_EVENT_CAPACITY: usize = 50;

/// Kind of a recorded runtime event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEventKind {
    Regeneration,
    Error,
}

/// One entry of the recent-event log
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeEvent {
    pub kind: RuntimeEventKind,
    pub slug: String,

    /// Duration for regenerations, message for errors
    pub detail: String,
    pub at: DateTime<Utc>,
}

/// Counters shared by every component that reports activity.
///
/// Create one per process and hand out `Arc<RuntimeStats>`; nothing is
/// persisted and everything resets on restart.
pub struct RuntimeStats {
    started: Instant,
    started_at: DateTime<Utc>,
    hits: AtomicU64,
    misses: AtomicU64,
    regenerations: AtomicU64,
    invalidations: AtomicU64,
    warmings: AtomicU64,
    errors: AtomicU64,
    recent: Mutex<VecDeque<RuntimeEvent>>,
    capacity: usize,
}

impl Default for RuntimeStats {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeStats {
    pub fn new() -> Self {
        Self::with_event_capacity(DEFAULT_EVENT_CAPACITY)
    }

    /// Keep at most `capacity` recent events
    pub fn with_event_capacity(capacity: usize) -> Self {
        Self {
            started: Instant::now(),
            started_at: Utc::now(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            regenerations: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
            warmings: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            recent: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Count pages removed by an invalidation
    pub fn record_invalidations(&self, count: u64) {
        self.invalidations.fetch_add(count, Ordering::Relaxed);
    }

    /// Count pages produced by a warming run
    pub fn record_warmings(&self, count: u64) {
        self.warmings.fetch_add(count, Ordering::Relaxed);
    }

    /// A generation for `slug` finished successfully
    pub fn record_regeneration(&self, slug: &str, duration_ms: u64) {
        self.regenerations.fetch_add(1, Ordering::Relaxed);
        self.push_event(RuntimeEvent {
            kind: RuntimeEventKind::Regeneration,
            slug: slug.to_string(),
            detail: format!("{}ms", duration_ms),
            at: Utc::now(),
        });
    }

    /// A generation or store call for `slug` failed
    pub fn record_error(&self, slug: &str, message: &str) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        self.push_event(RuntimeEvent {
            kind: RuntimeEventKind::Error,
            slug: slug.to_string(),
            detail: message.to_string(),
            at: Utc::now(),
        });
    }

    /// Consistent-enough copy of every counter
    pub fn snapshot(&self) -> RuntimeStatsSnapshot {
        let recent_events = self.events().iter().cloned().collect();
        RuntimeStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            regenerations: self.regenerations.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            warmings: self.warmings.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            uptime_secs: self.started.elapsed().as_secs(),
            started_at: self.started_at,
            recent_events,
        }
    }

    fn push_event(&self, event: RuntimeEvent) {
        if self.capacity == 0 {
            return;
        }
        let mut recent = self.events();
        while recent.len() >= self.capacity {
            recent.pop_front();
        }
        recent.push_back(event);
    }

    fn events(&self) -> MutexGuard<'_, VecDeque<RuntimeEvent>> {
        match self.recent.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!(
                    lock_kind = "mutex.lock",
                    result = "poisoned_recovered",
                    "Recovered from poisoned runtime stats lock"
                );
                poisoned.into_inner()
            }
        }
    }
}

/// Serializable copy of [`RuntimeStats`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub regenerations: u64,
    pub invalidations: u64,
    pub warmings: u64,
    pub errors: u64,
    pub uptime_secs: u64,
    pub started_at: DateTime<Utc>,
    pub recent_events: Vec<RuntimeEvent>,
}

impl RuntimeStatsSnapshot {
    /// Hit rate as a percentage of all lookups
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

impl fmt::Display for RuntimeStatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "hits: {}, misses: {}, hit_rate: {:.2}%, regenerations: {}, invalidations: {}, warmings: {}, errors: {}, uptime: {}s",
            self.hits,
            self.misses,
            self.hit_rate(),
            self.regenerations,
            self.invalidations,
            self.warmings,
            self.errors,
            self.uptime_secs
        )
    }
}
