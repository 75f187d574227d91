//! Request/miss counters and the periodic statistics snapshot.
//!
//! Counters are plain atomics on the hot path; the snapshot aggregates them
//! for the reporting loop, which logs the rendered table through `tracing`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::types::Method;

#[derive(Debug, Default)]
struct MethodCounters {
    requests: AtomicU64,
    misses: AtomicU64,
}

/// Monotonic per-method counters plus the global cache-reset counter.
#[derive(Debug)]
pub struct Counters {
    methods: [MethodCounters; Method::COUNT],
    cache_resets: AtomicU64,
    started_on: DateTime<Utc>,
}

impl Counters {
    #[must_use]
    pub fn new() -> Self {
        Self {
            methods: std::array::from_fn(|_| MethodCounters::default()),
            cache_resets: AtomicU64::new(0),
            started_on: Utc::now(),
        }
    }

    /// Counts one client request for `method`.
    pub fn record_request(&self, method: Method) {
        self.methods[method.index()].requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts one upstream call made on behalf of a client request.
    pub fn record_miss(&self, method: Method) {
        self.methods[method.index()].misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts one full cache reset.
    pub fn record_cache_reset(&self) {
        self.cache_resets.fetch_add(1, Ordering::Relaxed);
    }

    /// Takes a consistent-enough snapshot for reporting.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            started_on: self.started_on,
            cache_resets: self.cache_resets.load(Ordering::Relaxed),
            methods: Method::ALL
                .iter()
                .map(|method| MethodStats {
                    method: method.name(),
                    requests: self.methods[method.index()].requests.load(Ordering::Relaxed),
                    misses: self.methods[method.index()].misses.load(Ordering::Relaxed),
                })
                .collect(),
        }
    }
}

impl Default for Counters {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-method request/miss totals.
#[derive(Debug, Clone, Serialize)]
pub struct MethodStats {
    pub method: &'static str,
    pub requests: u64,
    pub misses: u64,
}

impl MethodStats {
    /// Cache hit rate in whole percent; zero when nothing was requested yet.
    #[must_use]
    pub fn hit_percent(&self) -> u64 {
        if self.requests == 0 {
            return 0;
        }
        let hits = self.requests.saturating_sub(self.misses);
        (hits * 100 + self.requests / 2) / self.requests
    }
}

/// A point-in-time view of all counters.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub started_on: DateTime<Utc>,
    pub cache_resets: u64,
    pub methods: Vec<MethodStats>,
}

impl StatsSnapshot {
    /// Renders the statistics table logged by the reporting loop.
    #[must_use]
    pub fn render_table(&self) -> String {
        let mut lines = vec![
            "Cache Statistics:".to_string(),
            format!("{:>25}{:>6}{:>9}", "Method", "Hit %", "Requests"),
        ];

        let mut total_requests = 0u64;
        let mut total_misses = 0u64;
        for stats in &self.methods {
            lines.push(format!(
                "{:>25}{:>6}{:>9}",
                stats.method,
                stats.hit_percent(),
                stats.requests
            ));
            total_requests += stats.requests;
            total_misses += stats.misses;
        }

        let total = MethodStats { method: "TOTAL", requests: total_requests, misses: total_misses };
        lines.push(format!("{:>25}{:>6}{:>9}", total.method, total.hit_percent(), total.requests));
        lines.push(format!("Start of service: {}", self.started_on.to_rfc3339()));
        lines.push(format!("Cache resets since start of service: {}", self.cache_resets));
        lines.join("\n")
    }
}
