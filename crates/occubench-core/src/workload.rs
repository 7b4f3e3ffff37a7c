//! Query selection and argument synthesis.

use occubench_config::{ConfigError, QueriesConfig, RangeBands};
use occubench_gen::BenchRng;
use occubench_types::{ApName, QueryKind, QueryOutput, Timestamp, Topology};
use serde::Serialize;
use tracing::debug;

use crate::error::{BenchError, BenchResult};
use crate::sink::QueryAdapter;

const SECS_PER_DAY: u64 = 86_400;

/// Days looked back by the day, week, month and year bands.
const BAND_DAYS: [u64; 4] = [1, 7, 30, 365];

/// One fully parameterized query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum QueryRequest {
    TotalClients {
        start: Timestamp,
        end: Timestamp,
    },
    FloorTotals {
        start: Timestamp,
        end: Timestamp,
    },
    MaxForAp {
        start: Timestamp,
        end: Timestamp,
        ap: ApName,
    },
    AvgOccupancy {
        start: Timestamp,
        end: Timestamp,
        window_minutes: u32,
    },
    KMeans {
        start: Timestamp,
        end: Timestamp,
        clusters: usize,
        iterations: usize,
    },
}

impl QueryRequest {
    pub fn kind(&self) -> QueryKind {
        match self {
            QueryRequest::TotalClients { .. } => QueryKind::TotalClients,
            QueryRequest::FloorTotals { .. } => QueryKind::FloorTotals,
            QueryRequest::MaxForAp { .. } => QueryKind::MaxForAp,
            QueryRequest::AvgOccupancy { .. } => QueryKind::AvgOccupancy,
            QueryRequest::KMeans { .. } => QueryKind::KMeans,
        }
    }

    pub fn execute(&self, adapter: &dyn QueryAdapter) -> BenchResult<QueryOutput> {
        Ok(match self {
            QueryRequest::TotalClients { start, end } => {
                QueryOutput::TotalClients(adapter.total_clients(*start, *end)?)
            }
            QueryRequest::FloorTotals { start, end } => {
                QueryOutput::FloorTotals(adapter.floor_totals(*start, *end)?)
            }
            QueryRequest::MaxForAp { start, end, ap } => {
                QueryOutput::MaxForAp(adapter.max_for_ap(*start, *end, ap)?)
            }
            QueryRequest::AvgOccupancy {
                start,
                end,
                window_minutes,
            } => QueryOutput::AvgOccupancy(adapter.avg_occupancy(*start, *end, *window_minutes)?),
            QueryRequest::KMeans {
                start,
                end,
                clusters,
                iterations,
            } => QueryOutput::KMeans(adapter.kmeans(*start, *end, *clusters, *iterations)?),
        })
    }
}

/// Draws query types and their arguments.
///
/// Immutable once built; every draw goes through the caller's rng so one
/// workload can be shared by all query threads.
#[derive(Debug, Clone)]
pub struct QueryWorkload {
    weights: [u32; 5],
    total_weight: u64,
    bands: RangeBands,
    earliest: Timestamp,
    interval: (u64, u64),
    kmeans_interval: (u64, u64),
    kmeans_clusters: usize,
    kmeans_iterations: usize,
    window_minutes: u32,
    aps: Vec<ApName>,
}

impl QueryWorkload {
    pub fn new(config: &QueriesConfig, aps: Vec<ApName>) -> BenchResult<Self> {
        let weights = config.weights.as_array();
        let total_weight = config.weights.total();
        if total_weight == 0 {
            return Err(invalid("query weights sum to zero"));
        }
        if aps.is_empty() {
            return Err(invalid("the topology has no access points to query"));
        }
        Ok(Self {
            weights,
            total_weight,
            bands: config.ranges,
            earliest: Timestamp::from_date(config.earliest_valid_date),
            interval: (config.interval_min_secs, config.interval_max_secs),
            kmeans_interval: (config.kmeans_interval_min_secs, config.kmeans_interval_max_secs),
            kmeans_clusters: config.kmeans_clusters,
            kmeans_iterations: config.kmeans_iterations,
            window_minutes: config.avg_occupancy_window_minutes,
            aps,
        })
    }

    pub fn from_topology(config: &QueriesConfig, topology: &Topology) -> BenchResult<Self> {
        Self::new(config, topology.ap_names())
    }

    /// Earliest instant any generated range may start at.
    pub fn earliest(&self) -> Timestamp {
        self.earliest
    }

    /// Maps a uniform draw below the weight sum onto cumulative buckets.
    pub fn select_kind(&self, rng: &mut BenchRng) -> QueryKind {
        let draw = rng.next_below(self.total_weight);
        let mut bound = 0;
        for (kind, weight) in QueryKind::ALL.iter().zip(self.weights) {
            bound += u64::from(weight);
            if draw < bound {
                return *kind;
            }
        }
        // Unreachable while the weights sum to total_weight.
        QueryKind::ALL[self.weights.iter().rposition(|w| *w > 0).unwrap_or(0)]
    }

    /// Stratified draw in `[earliest, newest]`, biased towards `newest`.
    pub fn random_time(&self, rng: &mut BenchRng, newest: Timestamp, earliest: Timestamp) -> Timestamp {
        let u = rng.next_f64();
        let thresholds = [self.bands.day, self.bands.week, self.bands.month, self.bands.year];
        let start = thresholds
            .iter()
            .zip(BAND_DAYS)
            .find(|(threshold, _)| u < **threshold)
            .map_or(earliest, |(_, days)| newest.saturating_sub_secs(days * SECS_PER_DAY));
        self.time_between(rng, start, newest)
    }

    fn time_between(&self, rng: &mut BenchRng, start: Timestamp, end: Timestamp) -> Timestamp {
        let start = start.max(self.earliest);
        let span = end.secs_since(start);
        if span == 0 {
            return start;
        }
        start.saturating_add_secs(rng.next_below(span))
    }

    /// Random `[start, end]` with `min <= end - start <= max`, inside
    /// `[earliest, newest]` whenever that range is at least `min` long.
    pub fn time_interval(
        &self,
        rng: &mut BenchRng,
        newest: Timestamp,
        min: u64,
        max: u64,
    ) -> (Timestamp, Timestamp) {
        let a = self.random_time(rng, newest, self.earliest);
        let b = self.random_time(rng, newest, self.earliest);
        let (start, end) = if a <= b { (a, b) } else { (b, a) };
        let mut start = start.max(self.earliest);
        let mut end = end.min(newest);

        if start.saturating_add_secs(min) > end {
            end = start.saturating_add_secs(min);
            if end > newest {
                end = newest;
                start = newest.saturating_sub_secs(min).max(self.earliest);
            }
        }
        if start.saturating_add_secs(max) < end {
            end = start.saturating_add_secs(max);
        }
        (start, end)
    }

    /// Start of an average-occupancy query ending at `newest`.
    pub fn avg_occupancy_start(&self, rng: &mut BenchRng, newest: Timestamp) -> Timestamp {
        let (min, max) = self.interval;
        let farthest = newest.saturating_sub_secs(max).max(self.earliest);
        let start = self.random_time(rng, newest, farthest);
        if start.saturating_add_secs(min) > newest {
            newest.saturating_sub_secs(min).max(self.earliest)
        } else {
            start
        }
    }

    /// Draws the next query against data up to `newest`.
    pub fn next_query(&self, rng: &mut BenchRng, newest: Timestamp) -> QueryRequest {
        let kind = self.select_kind(rng);
        let (min, max) = self.interval;
        let request = match kind {
            QueryKind::TotalClients => {
                let (start, end) = self.time_interval(rng, newest, min, max);
                QueryRequest::TotalClients { start, end }
            }
            QueryKind::FloorTotals => {
                let (start, end) = self.time_interval(rng, newest, min, max);
                QueryRequest::FloorTotals { start, end }
            }
            QueryKind::MaxForAp => {
                let (start, end) = self.time_interval(rng, newest, min, max);
                let ap = self.aps[rng.next_usize(self.aps.len())].clone();
                QueryRequest::MaxForAp { start, end, ap }
            }
            QueryKind::AvgOccupancy => QueryRequest::AvgOccupancy {
                start: self.avg_occupancy_start(rng, newest),
                end: newest,
                window_minutes: self.window_minutes,
            },
            QueryKind::KMeans => {
                let (min, max) = self.kmeans_interval;
                let (start, end) = self.time_interval(rng, newest, min, max);
                QueryRequest::KMeans {
                    start,
                    end,
                    clusters: self.kmeans_clusters,
                    iterations: self.kmeans_iterations,
                }
            }
        };
        debug!(?request, "query drawn");
        request
    }
}

fn invalid(message: &str) -> BenchError {
    BenchError::Config(ConfigError::ValidationError(message.to_string()))
}
