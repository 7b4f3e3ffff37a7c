//! Producer threads feeding generated entries into sinks.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use occubench_gen::{AssignedAp, BenchRng, EntryWriter, SeriesGenerator, SeriesSettings};
use occubench_types::{GeneratedEntry, SeedModel, Timestamp};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::error::{BenchError, BenchResult};
use crate::freshness::FreshnessCoordinator;
use crate::sink::Sink;
use crate::throttle::RateController;

/// Entries between two freshness pushes.
pub const FRESHNESS_PUSH_EVERY: u64 = 20_000;

/// Decorates a sink with pacing, freshness pushes and progress reports.
pub struct IngestWrapper<'a> {
    sink: &'a dyn Sink,
    stop: &'a AtomicBool,
    throttle: Option<RateController>,
    freshness: Option<&'a FreshnessCoordinator>,
    report_every: Option<Duration>,
    label: &'a str,
    entries: u64,
    readings: u64,
    last_time: Option<Timestamp>,
    started: Instant,
    last_report: Instant,
    reported_entries: u64,
}

impl<'a> IngestWrapper<'a> {
    pub fn new(sink: &'a dyn Sink, stop: &'a AtomicBool, label: &'a str) -> Self {
        let now = Instant::now();
        Self {
            sink,
            stop,
            throttle: None,
            freshness: None,
            report_every: None,
            label,
            entries: 0,
            readings: 0,
            last_time: None,
            started: now,
            last_report: now,
            reported_entries: 0,
        }
    }

    pub fn throttled(mut self, desired: Option<u64>) -> Self {
        self.throttle = desired.map(RateController::new);
        self
    }

    pub fn pushing_freshness(mut self, freshness: Option<&'a FreshnessCoordinator>) -> Self {
        self.freshness = freshness;
        self
    }

    pub fn reporting(mut self, every: Option<Duration>) -> Self {
        self.report_every = every;
        self
    }

    pub fn entries(&self) -> u64 {
        self.entries
    }

    pub fn readings(&self) -> u64 {
        self.readings
    }

    /// Pushes the last written timestamp and logs the average speed.
    pub fn finish(&self) -> Duration {
        if let (Some(freshness), Some(last)) = (self.freshness, self.last_time) {
            freshness.advance(last);
        }
        let elapsed = self.started.elapsed();
        let secs = elapsed.as_secs_f64();
        info!(
            thread = self.label,
            entries = self.entries,
            "{} entries in {:.1} sec, avg speed {:.0} entries/sec",
            self.entries,
            secs,
            per_sec(self.entries, secs)
        );
        elapsed
    }

    fn maybe_report(&mut self) {
        let Some(every) = self.report_every else {
            return;
        };
        let since = self.last_report.elapsed();
        if since < every {
            return;
        }
        let produced = self.entries - self.reported_entries;
        info!(
            thread = self.label,
            entries = self.entries,
            "{:.0} entries/sec",
            per_sec(produced, since.as_secs_f64())
        );
        self.last_report = Instant::now();
        self.reported_entries = self.entries;
    }
}

impl EntryWriter for IngestWrapper<'_> {
    type Error = BenchError;

    fn write(&mut self, entry: GeneratedEntry) -> BenchResult<()> {
        if let Some(throttle) = self.throttle.as_mut() {
            throttle.pace();
        }
        let time = entry.time();
        self.readings += entry.reading_count() as u64;
        self.sink.add(entry)?;
        self.entries += 1;
        self.last_time = Some(time);

        if let Some(freshness) = self.freshness {
            if self.entries % FRESHNESS_PUSH_EVERY == 0 {
                freshness.advance(time);
            }
        }
        self.maybe_report();
        Ok(())
    }

    fn should_stop(&self) -> bool {
        self.stop.load(Ordering::Relaxed) || self.sink.should_stop_early()
    }
}

fn per_sec(count: u64, secs: f64) -> f64 {
    if secs > 0.0 { count as f64 / secs } else { 0.0 }
}

/// How producers are laid out and what they generate.
#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub threads: usize,
    pub shared_instance: bool,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub desired_speed: Option<u64>,
    pub report_frequency: Option<Duration>,
    pub series: SeriesSettings,
    /// Feed the in-process freshness coordinator.
    pub push_freshness: bool,
    /// Ask the first sink instance to recreate its schema.
    pub recreate: bool,
}

/// Outcome of one producer thread.
#[derive(Debug, Clone, Serialize)]
pub struct IngestThreadReport {
    pub name: String,
    pub entries: u64,
    pub readings: u64,
    pub elapsed: Duration,
    pub stopped_early: bool,
    /// Transport error that ended the thread.
    pub error: Option<String>,
}

impl IngestThreadReport {
    pub fn entries_per_sec(&self) -> f64 {
        per_sec(self.entries, self.elapsed.as_secs_f64())
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub threads: Vec<IngestThreadReport>,
}

impl IngestReport {
    pub fn total_entries(&self) -> u64 {
        self.threads.iter().map(|t| t.entries).sum()
    }

    pub fn total_readings(&self) -> u64 {
        self.threads.iter().map(|t| t.readings).sum()
    }

    pub fn stopped_early(&self) -> bool {
        self.threads.iter().any(|t| t.stopped_early)
    }

    pub fn failed(&self) -> bool {
        self.threads.iter().any(|t| t.error.is_some())
    }
}

struct Producer {
    name: String,
    handle: JoinHandle<IngestThreadReport>,
}

/// Running ingestion: one producer per access-point partition.
pub struct IngestOrchestrator {
    producers: Vec<Producer>,
    sinks: Vec<Arc<dyn Sink>>,
    stop: Arc<AtomicBool>,
}

impl IngestOrchestrator {
    /// Partitions `aps` round-robin and spawns the producers.
    ///
    /// `open_sink` is called once in shared mode and once per thread
    /// otherwise. Each producer draws from its own fork of `rng`.
    pub fn start(
        settings: &IngestSettings,
        seed: Arc<SeedModel>,
        aps: &[AssignedAp],
        rng: &mut BenchRng,
        freshness: Arc<FreshnessCoordinator>,
        mut open_sink: impl FnMut() -> BenchResult<Arc<dyn Sink>>,
    ) -> BenchResult<Self> {
        let threads = settings.threads.max(1);
        let mut partitions: Vec<Vec<AssignedAp>> = vec![Vec::new(); threads];
        for (i, ap) in aps.iter().enumerate() {
            partitions[i % threads].push(ap.clone());
        }

        let mut sinks: Vec<Arc<dyn Sink>> = Vec::new();
        let stop = Arc::new(AtomicBool::new(false));
        let mut producers = Vec::with_capacity(threads);

        for (index, partition) in partitions.into_iter().enumerate() {
            let sink = if settings.shared_instance && !sinks.is_empty() {
                Arc::clone(&sinks[0])
            } else {
                let sink = open_sink()?;
                sink.prepare(settings.recreate && sinks.is_empty())?;
                sinks.push(Arc::clone(&sink));
                sink
            };

            let name = format!("occubench-ingest-{index}");
            let job = ProducerJob {
                name: name.clone(),
                settings: settings.clone(),
                seed: Arc::clone(&seed),
                aps: partition,
                rng: rng.fork(),
                freshness: settings.push_freshness.then(|| Arc::clone(&freshness)),
                sink,
                stop: Arc::clone(&stop),
            };
            let handle = thread::Builder::new()
                .name(name.clone())
                .spawn(move || job.run())
                .map_err(|source| BenchError::Spawn {
                    name: name.clone(),
                    source,
                });
            match handle {
                Ok(handle) => producers.push(Producer { name, handle }),
                Err(e) => {
                    stop.store(true, Ordering::Relaxed);
                    return Err(e);
                }
            }
        }

        info!(
            threads,
            sinks = sinks.len(),
            aps = aps.len(),
            start = %settings.start,
            end = %settings.end,
            "ingestion started"
        );
        Ok(Self {
            producers,
            sinks,
            stop,
        })
    }

    /// True once every producer has returned.
    pub fn is_finished(&self) -> bool {
        self.producers.iter().all(|p| p.handle.is_finished())
    }

    /// Asks every producer to stop after its current entry.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// Joins all producers, then closes each distinct sink once.
    pub fn join(self) -> BenchResult<IngestReport> {
        let mut report = IngestReport::default();
        let mut panicked = None;
        for producer in self.producers {
            match producer.handle.join() {
                Ok(thread) => report.threads.push(thread),
                Err(_) => {
                    error!(thread = %producer.name, "producer panicked");
                    panicked.get_or_insert(producer.name);
                }
            }
        }

        let mut closed = HashSet::new();
        let mut close_error = None;
        for sink in &self.sinks {
            let id = Arc::as_ptr(sink).cast::<()>() as usize;
            if !closed.insert(id) {
                continue;
            }
            if let Err(e) = sink.close() {
                warn!(error = %e, "failed to close sink");
                close_error.get_or_insert(e);
            }
        }

        if let Some(name) = panicked {
            return Err(BenchError::ThreadPanicked(name));
        }
        if let Some(e) = close_error {
            return Err(e);
        }
        info!(
            entries = report.total_entries(),
            stopped_early = report.stopped_early(),
            "ingestion finished"
        );
        Ok(report)
    }
}

struct ProducerJob {
    name: String,
    settings: IngestSettings,
    seed: Arc<SeedModel>,
    aps: Vec<AssignedAp>,
    rng: BenchRng,
    freshness: Option<Arc<FreshnessCoordinator>>,
    sink: Arc<dyn Sink>,
    stop: Arc<AtomicBool>,
}

impl ProducerJob {
    fn run(mut self) -> IngestThreadReport {
        info!(thread = %self.name, aps = self.aps.len(), "producer started");
        let mut writer = IngestWrapper::new(self.sink.as_ref(), &self.stop, &self.name)
            .throttled(self.settings.desired_speed)
            .pushing_freshness(self.freshness.as_deref())
            .reporting(self.settings.report_frequency);

        let outcome = SeriesGenerator::new(&self.seed, self.settings.series)
            .map_err(BenchError::from)
            .and_then(|generator| {
                generator.generate(
                    &self.aps,
                    self.settings.start,
                    self.settings.end,
                    &mut self.rng,
                    &mut writer,
                )
            });
        let elapsed = writer.finish();

        let (stopped_early, error) = match outcome {
            Ok(summary) => {
                // An explicit stop is not a failure.
                let early = summary.stopped_early && self.sink.should_stop_early();
                if early {
                    warn!(thread = %self.name, "sink asked to stop early; results may be incomplete");
                }
                (early, None)
            }
            Err(e) => {
                error!(thread = %self.name, error = %e, "producer failed");
                (false, Some(e.to_string()))
            }
        };

        IngestThreadReport {
            entries: writer.entries(),
            readings: writer.readings(),
            name: self.name,
            elapsed,
            stopped_early,
            error,
        }
    }
}
