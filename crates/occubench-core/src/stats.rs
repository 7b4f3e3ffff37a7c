//! Per-query-type statistics kept by each query thread.

use std::time::Duration;

use hdrhistogram::Histogram;
use occubench_types::QueryKind;
use serde::Serialize;
use tracing::info;

/// Tracks latency percentiles for one query type.
#[derive(Debug, Clone)]
pub struct LatencyTracker {
    histogram: Option<Histogram<u64>>,
}

impl LatencyTracker {
    /// Auto-resizing histogram with 3 significant digits.
    pub fn new() -> Self {
        Self {
            histogram: Histogram::new(3).ok(),
        }
    }

    /// Records a latency measurement in nanoseconds.
    pub fn record(&mut self, latency_ns: u64) {
        if let Some(h) = self.histogram.as_mut() {
            h.record(latency_ns).ok();
        }
    }

    pub fn count(&self) -> u64 {
        self.histogram.as_ref().map_or(0, Histogram::len)
    }

    /// Latency at `quantile` in nanoseconds.
    pub fn quantile(&self, quantile: f64) -> u64 {
        self.histogram
            .as_ref()
            .map_or(0, |h| h.value_at_quantile(quantile))
    }

    pub fn p50(&self) -> u64 {
        self.quantile(0.50)
    }

    pub fn p95(&self) -> u64 {
        self.quantile(0.95)
    }

    pub fn p99(&self) -> u64 {
        self.quantile(0.99)
    }

    pub fn p999(&self) -> u64 {
        self.quantile(0.999)
    }

    pub fn merge(&mut self, other: &LatencyTracker) {
        if let (Some(mine), Some(theirs)) = (self.histogram.as_mut(), other.histogram.as_ref()) {
            mine.add(theirs).ok();
        }
    }
}

impl Default for LatencyTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Counters for one query type.
#[derive(Debug, Clone, Default)]
pub struct KindStats {
    pub count: u64,
    pub total: Duration,
    /// Every recorded latency in milliseconds.
    pub individual_ms: Vec<f64>,
    pub latency: LatencyTracker,
}

impl KindStats {
    pub fn record(&mut self, elapsed: Duration) {
        self.count += 1;
        self.total += elapsed;
        self.individual_ms.push(elapsed.as_secs_f64() * 1_000.0);
        self.latency.record(elapsed.as_nanos() as u64);
    }

    pub fn mean_ms(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.total.as_secs_f64() * 1_000.0 / self.count as f64
    }

    /// Population standard deviation.
    pub fn stdev_ms(&self) -> f64 {
        if self.individual_ms.is_empty() {
            return 0.0;
        }
        let mean = self.mean_ms();
        let variance = self
            .individual_ms
            .iter()
            .map(|ms| (ms - mean).powi(2))
            .sum::<f64>()
            / self.individual_ms.len() as f64;
        variance.sqrt()
    }

    /// Queries per second of time spent in this query type.
    pub fn qps(&self) -> f64 {
        let secs = self.total.as_secs_f64();
        if secs > 0.0 { self.count as f64 / secs } else { 0.0 }
    }

    pub fn merge(&mut self, other: &KindStats) {
        self.count += other.count;
        self.total += other.total;
        self.individual_ms.extend_from_slice(&other.individual_ms);
        self.latency.merge(&other.latency);
    }
}

/// One line of a statistics report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsRow {
    pub kind: QueryKind,
    pub count: u64,
    pub mean_ms: f64,
    pub stdev_ms: f64,
    pub qps: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub p999_ms: f64,
}

impl StatsRow {
    fn new(kind: QueryKind, stats: &KindStats) -> Self {
        let ms = |ns: u64| ns as f64 / 1_000_000.0;
        Self {
            kind,
            count: stats.count,
            mean_ms: stats.mean_ms(),
            stdev_ms: stats.stdev_ms(),
            qps: stats.qps(),
            p50_ms: ms(stats.latency.p50()),
            p95_ms: ms(stats.latency.p95()),
            p99_ms: ms(stats.latency.p99()),
            p999_ms: ms(stats.latency.p999()),
        }
    }
}

/// In-progress and cumulative counters for every query type.
///
/// Recording goes to the in-progress set; a periodic report logs it and
/// folds it into the cumulative set.
#[derive(Debug, Clone, Default)]
pub struct WorkloadStatistics {
    in_progress: [KindStats; 5],
    cumulative: [KindStats; 5],
}

impl WorkloadStatistics {
    pub fn record(&mut self, kind: QueryKind, elapsed: Duration) {
        self.in_progress[kind.index()].record(elapsed);
    }

    pub fn fold_in_progress(&mut self) {
        for (done, pending) in self.cumulative.iter_mut().zip(&mut self.in_progress) {
            done.merge(pending);
            *pending = KindStats::default();
        }
    }

    /// Logs the counters gathered since the last report, then folds them in.
    pub fn report(&mut self, thread: &str) {
        for kind in QueryKind::ALL {
            let stats = &self.in_progress[kind.index()];
            if stats.count == 0 {
                continue;
            }
            info!(
                thread,
                kind = %kind,
                count = stats.count,
                mean_ms = stats.mean_ms(),
                qps = stats.qps(),
                "query progress"
            );
        }
        self.fold_in_progress();
    }

    /// Adds another thread's cumulative counters to these.
    pub fn merge(&mut self, other: &WorkloadStatistics) {
        for (mine, theirs) in self.cumulative.iter_mut().zip(&other.cumulative) {
            mine.merge(theirs);
        }
    }

    pub fn kind(&self, kind: QueryKind) -> &KindStats {
        &self.cumulative[kind.index()]
    }

    pub fn total(&self) -> u64 {
        self.cumulative.iter().map(|s| s.count).sum()
    }

    /// Cumulative rows in `QueryKind::ALL` order.
    pub fn rows(&self) -> Vec<StatsRow> {
        QueryKind::ALL
            .iter()
            .map(|kind| StatsRow::new(*kind, self.kind(*kind)))
            .collect()
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "total": self.total(),
            "kinds": self.rows(),
        })
    }
}
