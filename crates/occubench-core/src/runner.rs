//! Query threads and their orchestration.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use occubench_config::{FreshnessPolling, QueriesConfig};
use occubench_gen::BenchRng;
use occubench_types::{QueryKind, QueryOutput, Timestamp, Topology};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::error::{BenchError, BenchResult};
use crate::freshness::FreshnessCoordinator;
use crate::sink::QueryAdapter;
use crate::stats::WorkloadStatistics;
use crate::workload::QueryWorkload;

const WAIT_FOR_INGEST: Duration = Duration::from_secs(1);
const MISCONFIGURED_PAUSE: Duration = Duration::from_secs(10);

/// Where a query thread reads the freshness bound from.
#[derive(Debug)]
pub enum FreshnessSource {
    InProcess(Arc<FreshnessCoordinator>),
    Backend {
        /// `None` asks before every query.
        interval: Option<Duration>,
        last_poll: Option<Instant>,
        /// Last value reported by the backend, before adjustment.
        raw: Timestamp,
    },
}

impl FreshnessSource {
    pub fn new(polling: FreshnessPolling, coordinator: &Arc<FreshnessCoordinator>) -> Self {
        match polling {
            FreshnessPolling::InProcess => FreshnessSource::InProcess(Arc::clone(coordinator)),
            FreshnessPolling::Always => FreshnessSource::Backend {
                interval: None,
                last_poll: None,
                raw: coordinator.current(),
            },
            FreshnessPolling::Every(interval) => FreshnessSource::Backend {
                interval: Some(interval),
                last_poll: None,
                raw: coordinator.current(),
            },
        }
    }

    /// Current bound. Backend values are truncated to whole seconds and
    /// advanced by one so readings at exactly that second are included.
    pub fn current(&mut self, adapter: &dyn QueryAdapter, force: bool) -> BenchResult<Timestamp> {
        match self {
            FreshnessSource::InProcess(coordinator) => Ok(coordinator.current()),
            FreshnessSource::Backend {
                interval,
                last_poll,
                raw,
            } => {
                let due = match (*interval, *last_poll) {
                    (Some(interval), Some(last)) => last.elapsed() >= interval,
                    _ => true,
                };
                if force || due {
                    *raw = adapter.newest_timestamp(*raw)?;
                    *last_poll = Some(Instant::now());
                    debug!(newest = %raw, "polled backend freshness");
                }
                Ok(raw.truncate_to_secs().saturating_add_secs(1))
            }
        }
    }
}

/// One executed query, kept when results are saved.
#[derive(Debug, Clone, Serialize)]
pub struct QueryRecord {
    pub id: u64,
    pub thread: usize,
    pub kind: QueryKind,
    pub output: QueryOutput,
}

/// Outcome of one query thread.
#[derive(Debug, Clone)]
pub struct QueryThreadReport {
    pub name: String,
    pub stats: WorkloadStatistics,
    pub elapsed: Duration,
    /// Transport error that ended the thread.
    pub error: Option<String>,
    pub records: Vec<QueryRecord>,
}

#[derive(Debug, Clone, Default)]
pub struct QueryReport {
    pub threads: Vec<QueryThreadReport>,
    /// All threads merged in thread order.
    pub stats: WorkloadStatistics,
    pub elapsed: Duration,
}

impl QueryReport {
    pub fn records(&self) -> impl Iterator<Item = &QueryRecord> {
        self.threads.iter().flat_map(|t| t.records.iter())
    }

    pub fn failed(&self) -> bool {
        self.threads.iter().any(|t| t.error.is_some())
    }
}

/// The loop of one query thread.
pub struct QueryRunner {
    pub name: String,
    pub index: usize,
    pub adapter: Arc<dyn QueryAdapter>,
    /// Private adapters are prepared and finished by their thread.
    pub owns_adapter: bool,
    pub config: Arc<QueriesConfig>,
    pub topology: Arc<Topology>,
    pub workload: Arc<QueryWorkload>,
    pub freshness: FreshnessSource,
    /// Wait for ingestion instead of giving up on an empty history.
    pub ingest_running: bool,
    pub save_results: bool,
    pub rng: BenchRng,
}

impl QueryRunner {
    pub fn run(mut self) -> QueryThreadReport {
        let started = Instant::now();
        let mut stats = WorkloadStatistics::default();
        let mut records = Vec::new();
        info!(thread = %self.name, "query thread started");

        let error = match self.run_inner(&mut stats, &mut records) {
            Ok(()) => None,
            Err(e) => {
                error!(thread = %self.name, error = %e, "query thread failed");
                Some(e.to_string())
            }
        };
        stats.fold_in_progress();
        info!(thread = %self.name, queries = stats.total(), "query thread done");

        QueryThreadReport {
            name: self.name,
            stats,
            elapsed: started.elapsed(),
            error,
            records,
        }
    }

    fn run_inner(
        &mut self,
        stats: &mut WorkloadStatistics,
        records: &mut Vec<QueryRecord>,
    ) -> BenchResult<()> {
        let mut warmup_rng = self.rng.fork();
        let mut prepare_rng = self.rng.fork();
        let adapter = Arc::clone(&self.adapter);
        if self.owns_adapter {
            adapter.prepare(&self.config, &self.topology, prepare_rng.next_u64())?;
        }

        self.check_for_config_error(adapter.as_ref())?;

        if let Some(warmup) = self.config.warmup() {
            let started = Instant::now();
            while started.elapsed() < warmup {
                let newest = self.freshness.current(adapter.as_ref(), false)?;
                self.workload
                    .next_query(&mut warmup_rng, newest)
                    .execute(adapter.as_ref())?;
            }
            debug!(thread = %self.name, "warm-up done");
        }

        let duration = self.config.duration();
        let target = self.config.target_count();
        let report_every = self.config.report_frequency();
        let started = Instant::now();
        let mut last_report = started;
        let mut executed = 0u64;

        loop {
            let finished = match (duration, target) {
                (Some(duration), _) => started.elapsed() >= duration,
                (None, Some(target)) => executed >= target,
                (None, None) => true,
            };
            if finished {
                break;
            }

            let newest = self.freshness.current(adapter.as_ref(), false)?;
            let request = self.workload.next_query(&mut self.rng, newest);
            let kind = request.kind();
            let began = Instant::now();
            let output = request.execute(adapter.as_ref())?;
            stats.record(kind, began.elapsed());
            executed += 1;

            if self.save_results {
                records.push(QueryRecord {
                    id: executed,
                    thread: self.index,
                    kind,
                    output,
                });
            }
            if let Some(every) = report_every {
                if last_report.elapsed() >= every {
                    stats.report(&self.name);
                    last_report = Instant::now();
                }
            }
        }

        if self.owns_adapter {
            adapter.done()?;
        }
        Ok(())
    }

    /// Ensures the earliest valid date is not after the newest data.
    ///
    /// With ingestion running the thread waits for data to catch up;
    /// otherwise it warns, pauses and carries on.
    fn check_for_config_error(&mut self, adapter: &dyn QueryAdapter) -> BenchResult<()> {
        let earliest = self.workload.earliest();
        loop {
            let newest = self.freshness.current(adapter, true)?;
            if earliest <= newest {
                return Ok(());
            }
            if self.ingest_running {
                info!(
                    thread = %self.name,
                    %earliest,
                    %newest,
                    "earliest valid date is after the newest data, waiting for ingestion"
                );
                thread::sleep(WAIT_FOR_INGEST);
            } else {
                warn!(
                    thread = %self.name,
                    %earliest,
                    %newest,
                    "earliest valid date is after the newest data and nothing is ingesting; check queries.earliest_valid_date"
                );
                thread::sleep(MISCONFIGURED_PAUSE);
                return Ok(());
            }
        }
    }
}

/// Runs the query threads to completion.
pub struct QueryOrchestrator {
    config: Arc<QueriesConfig>,
    topology: Arc<Topology>,
    workload: Arc<QueryWorkload>,
    freshness: Arc<FreshnessCoordinator>,
    ingest_running: bool,
    save_results: bool,
}

impl QueryOrchestrator {
    pub fn new(
        config: QueriesConfig,
        topology: Arc<Topology>,
        freshness: Arc<FreshnessCoordinator>,
    ) -> BenchResult<Self> {
        let workload = QueryWorkload::from_topology(&config, &topology)?;
        Ok(Self {
            config: Arc::new(config),
            topology,
            workload: Arc::new(workload),
            freshness,
            ingest_running: false,
            save_results: false,
        })
    }

    pub fn ingest_running(mut self, running: bool) -> Self {
        self.ingest_running = running;
        self
    }

    pub fn save_results(mut self, save: bool) -> Self {
        self.save_results = save;
        self
    }

    /// Spawns the threads, waits for them and merges their statistics.
    ///
    /// In shared mode `open_adapter` is called once and the adapter is
    /// prepared here with a seed drawn from `rng`; otherwise every thread
    /// opens and prepares its own.
    pub fn run(
        &self,
        rng: &mut BenchRng,
        mut open_adapter: impl FnMut() -> BenchResult<Arc<dyn QueryAdapter>>,
    ) -> BenchResult<QueryReport> {
        let started = Instant::now();
        let threads = self.config.threads.max(1);

        let shared = if self.config.shared_instance {
            let adapter = open_adapter()?;
            adapter.prepare(&self.config, &self.topology, rng.next_u64())?;
            Some(adapter)
        } else {
            None
        };

        let mut handles = Vec::with_capacity(threads);
        for index in 0..threads {
            let (adapter, owns_adapter) = match &shared {
                Some(adapter) => (Arc::clone(adapter), false),
                None => (open_adapter()?, true),
            };
            let name = format!("occubench-query-{index}");
            let runner = QueryRunner {
                name: name.clone(),
                index,
                adapter,
                owns_adapter,
                config: Arc::clone(&self.config),
                topology: Arc::clone(&self.topology),
                workload: Arc::clone(&self.workload),
                freshness: FreshnessSource::new(self.config.freshness_polling(), &self.freshness),
                ingest_running: self.ingest_running,
                save_results: self.save_results,
                rng: rng.fork(),
            };
            let handle = thread::Builder::new()
                .name(name.clone())
                .spawn(move || runner.run())
                .map_err(|source| BenchError::Spawn {
                    name: name.clone(),
                    source,
                })?;
            handles.push((name, handle));
        }
        info!(threads, shared = shared.is_some(), "query threads started");

        let mut report = QueryReport::default();
        let mut panicked = None;
        for (name, handle) in handles {
            match handle.join() {
                Ok(thread) => {
                    report.stats.merge(&thread.stats);
                    report.threads.push(thread);
                }
                Err(_) => {
                    error!(thread = %name, "query thread panicked");
                    panicked.get_or_insert(name);
                }
            }
        }

        if let Some(adapter) = shared {
            adapter.done()?;
        }
        if let Some(name) = panicked {
            return Err(BenchError::ThreadPanicked(name));
        }

        report.elapsed = started.elapsed();
        info!(
            queries = report.stats.total(),
            elapsed_secs = report.elapsed.as_secs_f64(),
            "querying finished"
        );
        Ok(report)
    }
}
