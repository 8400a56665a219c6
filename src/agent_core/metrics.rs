//! Per-capability usage metrics for the running process.
//!
//! One [`MetricsCollector`] is shared (behind `Arc`) by everything that
//! executes calls. State lives behind a single `std::sync::Mutex`; no lock is
//! ever held across an `.await`.

use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// How many capabilities `most_used` lists by default.
pub const DEFAULT_TOP_N: usize = 5;

// ─── State ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
struct CapabilityStats {
    usage_count: u64,
    latency_samples: Vec<f64>,
    error_count: u64,
}

impl CapabilityStats {
    fn mean_latency(&self) -> f64 {
        if self.latency_samples.is_empty() {
            return 0.0;
        }
        self.latency_samples.iter().sum::<f64>() / self.latency_samples.len() as f64
    }

    fn error_rate(&self) -> f64 {
        if self.usage_count == 0 {
            return 0.0;
        }
        self.error_count as f64 / self.usage_count as f64
    }
}

#[derive(Debug)]
struct MetricsState {
    started: Instant,
    started_at: DateTime<Utc>,
    /// Insertion order is first-recorded order, used to break usage ties.
    capabilities: IndexMap<String, CapabilityStats>,
}

impl MetricsState {
    fn fresh() -> Self {
        Self {
            started: Instant::now(),
            started_at: Utc::now(),
            capabilities: IndexMap::new(),
        }
    }
}

// ─── Snapshot ───────────────────────────────────────────────────────────────

/// Aggregates for one capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilitySummary {
    pub capability: String,
    pub usage_count: u64,
    pub error_count: u64,
    pub average_latency_seconds: f64,
    pub error_rate: f64,
}

/// Entry in the most-used ranking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRank {
    pub capability: String,
    pub usage_count: u64,
}

/// Read-only view of the collector at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub started_at: DateTime<Utc>,
    pub session_duration_seconds: f64,
    pub total_calls: u64,
    /// In first-recorded order.
    pub capabilities: Vec<CapabilitySummary>,
    /// Usage descending, ties in first-recorded order.
    pub most_used: Vec<UsageRank>,
}

impl MetricsSnapshot {
    pub fn get(&self, capability: &str) -> Option<&CapabilitySummary> {
        self.capabilities.iter().find(|c| c.capability == capability)
    }

    pub fn total_errors(&self) -> u64 {
        self.capabilities.iter().map(|c| c.error_count).sum()
    }
}

// ─── MetricsCollector ───────────────────────────────────────────────────────

/// Process-lifetime call statistics keyed by capability name.
#[derive(Debug)]
pub struct MetricsCollector {
    state: Mutex<MetricsState>,
    top_n: usize,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::with_top_n(DEFAULT_TOP_N)
    }

    pub fn with_top_n(top_n: usize) -> Self {
        Self {
            state: Mutex::new(MetricsState::fresh()),
            top_n,
        }
    }

    /// A panic while holding the lock leaves counters usable, so recover.
    fn lock(&self) -> MutexGuard<'_, MetricsState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record one finished call.
    pub fn record(&self, capability: &str, latency_seconds: f64, success: bool) {
        let latency = if latency_seconds.is_finite() {
            latency_seconds.max(0.0)
        } else {
            0.0
        };

        let mut state = self.lock();
        let stats = state
            .capabilities
            .entry(capability.to_string())
            .or_default();
        stats.usage_count += 1;
        stats.latency_samples.push(latency);
        if !success {
            stats.error_count += 1;
        }
    }

    /// Summary with the configured top-N.
    pub fn summary(&self) -> MetricsSnapshot {
        self.summary_top(self.top_n)
    }

    /// Summary listing at most `top_n` entries in `most_used`.
    pub fn summary_top(&self, top_n: usize) -> MetricsSnapshot {
        let state = self.lock();

        let capabilities: Vec<CapabilitySummary> = state
            .capabilities
            .iter()
            .map(|(name, stats)| CapabilitySummary {
                capability: name.clone(),
                usage_count: stats.usage_count,
                error_count: stats.error_count,
                average_latency_seconds: stats.mean_latency(),
                error_rate: stats.error_rate(),
            })
            .collect();

        let mut most_used: Vec<UsageRank> = capabilities
            .iter()
            .map(|c| UsageRank {
                capability: c.capability.clone(),
                usage_count: c.usage_count,
            })
            .collect();
        // Stable: equal counts keep first-recorded order.
        most_used.sort_by(|a, b| b.usage_count.cmp(&a.usage_count));
        most_used.truncate(top_n);

        MetricsSnapshot {
            started_at: state.started_at,
            session_duration_seconds: state.started.elapsed().as_secs_f64(),
            total_calls: capabilities.iter().map(|c| c.usage_count).sum(),
            capabilities,
            most_used,
        }
    }

    /// Drop all counters and restart the session clock.
    pub fn reset(&self) {
        *self.lock() = MetricsState::fresh();
        tracing::debug!("metrics reset");
    }

    /// Emit the current summary as one structured log line.
    pub fn log_summary(&self) {
        self.log_summary_top(self.top_n);
    }

    /// Like [`log_summary`](Self::log_summary), ranking at most `top_n` capabilities.
    pub fn log_summary_top(&self, top_n: usize) {
        let snapshot = self.summary_top(top_n);
        let most_used = snapshot
            .most_used
            .iter()
            .map(|r| format!("{}={}", r.capability, r.usage_count))
            .collect::<Vec<_>>()
            .join(",");
        tracing::info!(
            total_calls = snapshot.total_calls,
            total_errors = snapshot.total_errors(),
            capabilities = snapshot.capabilities.len(),
            session_duration_s = snapshot.session_duration_seconds,
            most_used = %most_used,
            "tool metrics"
        );
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
