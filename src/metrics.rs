//! Scoring metrics: counts per risk level, failures and latency percentiles.

use crate::error::ErrorKind;
use crate::types::prediction::{PredictionResult, RiskLevel};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};
use tracing::info;

/// Latency samples kept in memory
const MAX_LATENCY_SAMPLES: usize = 10_000;

/// Metrics collector for scoring runs
pub struct ScoringMetrics {
    /// Total records scored
    pub records_scored: AtomicU64,
    /// Results returned as `unknown` because no model was loaded
    pub untrained_results: AtomicU64,
    /// Results returned as `unknown` for any other failure
    pub error_results: AtomicU64,
    by_level: RwLock<BTreeMap<RiskLevel, u64>>,
    /// Scoring latencies in microseconds
    latencies: RwLock<Vec<u64>>,
    start_time: Instant,
}

impl ScoringMetrics {
    pub fn new() -> Self {
        Self {
            records_scored: AtomicU64::new(0),
            untrained_results: AtomicU64::new(0),
            error_results: AtomicU64::new(0),
            by_level: RwLock::new(BTreeMap::new()),
            latencies: RwLock::new(Vec::with_capacity(1000)),
            start_time: Instant::now(),
        }
    }

    /// Record one scored record
    pub fn record(&self, result: &PredictionResult, elapsed: Duration) {
        self.records_scored.fetch_add(1, Ordering::Relaxed);

        if result.is_error() {
            let counter = match result.error_kind {
                Some(ErrorKind::ModelNotTrained) => &self.untrained_results,
                _ => &self.error_results,
            };
            counter.fetch_add(1, Ordering::Relaxed);
        }

        if let Ok(mut by_level) = self.by_level.write() {
            *by_level.entry(result.risk_level).or_insert(0) += 1;
        }

        if let Ok(mut latencies) = self.latencies.write() {
            latencies.push(elapsed.as_micros() as u64);
            if latencies.len() > MAX_LATENCY_SAMPLES {
                latencies.drain(0..MAX_LATENCY_SAMPLES / 2);
            }
        }
    }

    /// Latency statistics over the retained samples
    pub fn latency_stats(&self) -> LatencyStats {
        let latencies = self.latencies.read().unwrap_or_else(PoisonError::into_inner);
        if latencies.is_empty() {
            return LatencyStats::default();
        }

        let mut sorted = latencies.clone();
        sorted.sort_unstable();
        let count = sorted.len();
        let percentile = |p: f64| sorted[((count as f64 * p) as usize).min(count - 1)];

        LatencyStats {
            count: count as u64,
            mean_us: sorted.iter().sum::<u64>() / count as u64,
            p50_us: percentile(0.50),
            p95_us: percentile(0.95),
            p99_us: percentile(0.99),
            max_us: sorted[count - 1],
        }
    }

    /// Results per risk level, `unknown` included
    pub fn counts_by_level(&self) -> BTreeMap<RiskLevel, u64> {
        self.by_level
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Records per second since creation
    pub fn throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.records_scored.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Print summary statistics
    pub fn print_summary(&self) {
        let scored = self.records_scored.load(Ordering::Relaxed);
        let untrained = self.untrained_results.load(Ordering::Relaxed);
        let errors = self.error_results.load(Ordering::Relaxed);
        let latency = self.latency_stats();

        info!("╔══════════════════════════════════════════════════════════════╗");
        info!("║            DROPOUT RISK SCORING - METRICS SUMMARY            ║");
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Records Scored: {:>8}  │  Throughput: {:>8.1} rec/s        ║",
            scored,
            self.throughput()
        );
        info!(
            "║ Untrained: {:>8}  │  Errors: {:>8}                        ║",
            untrained, errors
        );
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Latency (μs): mean={:>5} p50={:>5} p95={:>5} p99={:>5}      ║",
            latency.mean_us, latency.p50_us, latency.p95_us, latency.p99_us
        );
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!("║ Results by Risk Level:                                       ║");
        for (level, count) in self.counts_by_level() {
            let pct = if scored > 0 {
                (count as f64 / scored as f64) * 100.0
            } else {
                0.0
            };
            let bar = "█".repeat(((pct / 5.0) as usize).min(20));
            info!("║   {:8}: {:>6} ({:>5.1}%) {}", level.as_str(), count, pct, bar);
        }
        info!("╚══════════════════════════════════════════════════════════════╝");
    }
}

impl Default for ScoringMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Latency statistics
#[derive(Debug, Default, Clone, PartialEq)]
pub struct LatencyStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}
