//! A complete benchmark run: population, ingestion and querying.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::thread;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use occubench_config::{BenchConfig, FreshnessPolling};
use occubench_gen::{
    AssignedAp, BenchRng, GenerationSummary, SeedFiles, SeriesGenerator, SeriesSettings,
    assigned_aps, load_seed, prepare_topology,
};
use occubench_types::{SeedModel, Timestamp, Topology};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::BenchResult;
use crate::freshness::FreshnessCoordinator;
use crate::ingest::{IngestOrchestrator, IngestReport, IngestSettings, IngestWrapper};
use crate::runner::{QueryOrchestrator, QueryReport};
use crate::sink::BackendRegistry;

const STANDALONE_POLL: Duration = Duration::from_secs(1);

fn unbounded_end() -> NaiveDate {
    NaiveDate::from_ymd_opt(9999, 12, 31).unwrap_or(NaiveDate::MAX)
}

/// A validated configuration, before the seed is loaded.
#[derive(Debug, Clone)]
pub struct Benchmark {
    config: BenchConfig,
}

impl Benchmark {
    pub fn new(config: BenchConfig) -> BenchResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &BenchConfig {
        &self.config
    }

    /// Loads the seed files named by the generator config.
    pub fn prepare(self) -> BenchResult<PreparedBenchmark> {
        let seed = load_seed(&SeedFiles::from(&self.config.generator))?;
        self.prepare_with_seed(seed)
    }

    /// Builds the topology over an already loaded seed.
    pub fn prepare_with_seed(self, mut seed: SeedModel) -> BenchResult<PreparedBenchmark> {
        let mut master = BenchRng::new(self.config.benchmark.seed);
        let mut topology_rng = master.fork();
        let topology = prepare_topology(&mut seed, &self.config.generator, &mut topology_rng)?;
        let aps = assigned_aps(topology.access_points())?;
        info!(
            floors = topology.floors.len(),
            aps = aps.len(),
            seed_entries = seed.entry_count(),
            "topology ready"
        );

        Ok(PreparedBenchmark {
            population_rng: master.fork(),
            ingest_rng: master.fork(),
            query_rng: master.fork(),
            config: self.config,
            seed: Arc::new(seed),
            topology: Arc::new(topology),
            aps,
        })
    }
}

/// What the population phase wrote.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PopulationReport {
    pub entries: u64,
    pub readings: u64,
    pub elapsed: Duration,
    pub stopped_early: bool,
}

impl PopulationReport {
    fn new(summary: GenerationSummary, elapsed: Duration) -> Self {
        Self {
            entries: summary.entries,
            readings: summary.readings,
            elapsed,
            stopped_early: summary.stopped_early,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub population: Option<PopulationReport>,
    pub ingest: Option<IngestReport>,
    pub queries: Option<QueryReport>,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn stopped_early(&self) -> bool {
        self.population.is_some_and(|p| p.stopped_early)
            || self.ingest.as_ref().is_some_and(IngestReport::stopped_early)
    }
}

/// Seed, topology and random streams of one run.
pub struct PreparedBenchmark {
    config: BenchConfig,
    seed: Arc<SeedModel>,
    topology: Arc<Topology>,
    aps: Vec<AssignedAp>,
    population_rng: BenchRng,
    ingest_rng: BenchRng,
    query_rng: BenchRng,
}

impl PreparedBenchmark {
    pub fn config(&self) -> &BenchConfig {
        &self.config
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn seed(&self) -> &SeedModel {
        &self.seed
    }

    fn series_settings(&self) -> SeriesSettings {
        SeriesSettings::from_config(&self.config.generator, self.config.benchmark.schema)
    }

    /// Writes `[generator.start_date, generator.end_date)` for every access
    /// point into a freshly recreated sink on the ingest backend.
    pub fn populate(&mut self, registry: &dyn BackendRegistry) -> BenchResult<PopulationReport> {
        let generator_config = &self.config.generator;
        let started = Instant::now();
        let sink = registry.open_sink(self.config.ingest.backend, &self.topology)?;
        sink.prepare(true)?;

        let stop = AtomicBool::new(false);
        let mut writer = IngestWrapper::new(sink.as_ref(), &stop, "population");
        let generator = SeriesGenerator::new(&self.seed, self.series_settings())?;
        let outcome = generator.generate(
            &self.aps,
            generator_config.start_date,
            generator_config.end_date,
            &mut self.population_rng,
            &mut writer,
        );
        let closed = sink.close();
        let summary = outcome?;
        closed?;

        let report = PopulationReport::new(summary, started.elapsed());
        info!(
            entries = report.entries,
            "Generated {} entries in {:.1} sec",
            report.entries,
            report.elapsed.as_secs_f64()
        );
        if report.stopped_early {
            warn!("population stopped early; this may indicate a backend error");
        }
        Ok(report)
    }

    /// Runs every enabled phase and returns their reports.
    pub fn run(mut self, registry: &dyn BackendRegistry) -> BenchResult<RunReport> {
        let started = Instant::now();
        let population = if self.config.generator.enabled {
            Some(self.populate(registry)?)
        } else {
            None
        };

        let freshness = Arc::new(FreshnessCoordinator::new(Timestamp::from_date(
            self.config.generator.end_date,
        )));

        let ingest = if self.config.ingest.enabled {
            Some(self.start_ingest(registry, &freshness, population.is_none())?)
        } else {
            None
        };

        let queries = if self.config.queries.enabled {
            let orchestrator = QueryOrchestrator::new(
                self.config.queries.clone(),
                Arc::clone(&self.topology),
                Arc::clone(&freshness),
            )
            .map(|o| {
                o.ingest_running(ingest.is_some())
                    .save_results(self.config.output.save_query_results)
            });
            let backend = self.config.queries.backend;
            Some(orchestrator.and_then(|o| {
                o.run(&mut self.query_rng, || registry.open_query_adapter(backend))
            }))
        } else {
            if let Some(ingest) = &ingest {
                self.wait_for_standalone_ingest(ingest);
            }
            None
        };

        let ingest = match ingest {
            Some(ingest) => {
                ingest.stop();
                Some(ingest.join()?)
            }
            None => None,
        };
        let queries = queries.transpose()?;

        Ok(RunReport {
            population,
            ingest,
            queries,
            elapsed: started.elapsed(),
        })
    }

    fn start_ingest(
        &mut self,
        registry: &dyn BackendRegistry,
        freshness: &Arc<FreshnessCoordinator>,
        recreate: bool,
    ) -> BenchResult<IngestOrchestrator> {
        let ingest = &self.config.ingest;
        let end = if self.config.queries.enabled {
            unbounded_end()
        } else {
            ingest.end_date
        };
        let settings = IngestSettings {
            threads: ingest.threads,
            shared_instance: ingest.shared_instance,
            start: ingest.start_date,
            end,
            desired_speed: ingest.desired_speed(),
            report_frequency: ingest.report_frequency(),
            series: self.series_settings(),
            push_freshness: self.config.queries.freshness_polling() == FreshnessPolling::InProcess,
            recreate,
        };
        let backend = ingest.backend;
        let topology = Arc::clone(&self.topology);
        IngestOrchestrator::start(
            &settings,
            Arc::clone(&self.seed),
            &self.aps,
            &mut self.ingest_rng,
            Arc::clone(freshness),
            || registry.open_sink(backend, &topology),
        )
    }

    fn wait_for_standalone_ingest(&self, ingest: &IngestOrchestrator) {
        let deadline = self.config.ingest.duration().map(|d| Instant::now() + d);
        loop {
            if ingest.is_finished() {
                info!("all ingest threads reached the configured end date");
                return;
            }
            let now = Instant::now();
            let pause = match deadline {
                Some(deadline) if now >= deadline => {
                    info!("ingest duration elapsed");
                    return;
                }
                Some(deadline) => STANDALONE_POLL.min(deadline - now),
                None => STANDALONE_POLL,
            };
            thread::sleep(pause);
        }
    }
}
