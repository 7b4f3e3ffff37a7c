//! # occubench-core: Workload orchestration
//!
//! Drives a benchmark run against any backend that implements [`Sink`]
//! and [`QueryAdapter`]:
//!
//! - [`IngestOrchestrator`] partitions access points across producer
//!   threads, each pacing itself with a [`RateController`] and publishing
//!   progress through the shared [`FreshnessCoordinator`].
//! - [`QueryOrchestrator`] runs query threads that draw weighted query
//!   types and stratified time ranges from a [`QueryWorkload`], bounded by
//!   the freshness of ingested data.
//! - [`KMeans`] is the streaming clustering engine backends can use to
//!   answer K-Means queries.
//! - [`Benchmark`] ties the phases together from a [`BenchConfig`].
//!
//! [`BenchConfig`]: occubench_config::BenchConfig

mod bench;
mod error;
mod freshness;
mod ingest;
mod kmeans;
mod runner;
mod sink;
mod stats;
mod throttle;
mod workload;

pub use bench::{Benchmark, PopulationReport, PreparedBenchmark, RunReport};
pub use error::{BenchError, BenchResult};
pub use freshness::FreshnessCoordinator;
pub use ingest::{
    FRESHNESS_PUSH_EVERY, IngestOrchestrator, IngestReport, IngestSettings, IngestThreadReport,
    IngestWrapper,
};
pub use kmeans::KMeans;
pub use runner::{
    FreshnessSource, QueryOrchestrator, QueryRecord, QueryReport, QueryRunner, QueryThreadReport,
};
pub use sink::{BackendRegistry, QueryAdapter, Sink};
pub use stats::{KindStats, LatencyTracker, StatsRow, WorkloadStatistics};
pub use throttle::{RateController, WINDOW};
pub use workload::{QueryRequest, QueryWorkload};
