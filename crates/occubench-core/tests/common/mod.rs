//! A recording backend and a one-day seed for orchestration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use occubench_config::{BackendKind, BenchConfig};
use occubench_core::{BackendRegistry, BenchResult, QueryAdapter, Sink};
use occubench_types::{
    ApName, AvgOccupancy, FloorMetadata, FloorTotal, GeneratedEntry, KMeansCluster, MaxForAp,
    SeedEntry, SeedModel, SensorId, Timestamp, Topology, TotalClients,
};

pub const SENSORS: [&str; 4] = ["g1", "g2", "f1", "f2"];
pub const TICKS_PER_DAY: u64 = 1_440;

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

/// Two floors, four sensors, one day of per-minute entries covering every sensor.
pub fn seed() -> SeedModel {
    let floors = vec![
        FloorMetadata {
            key: "ground".to_string(),
            number: 0,
            repeatable: false,
            sensors: vec!["g1".into(), "g2".into()],
        },
        FloorMetadata {
            key: "first".to_string(),
            number: 2,
            repeatable: true,
            sensors: vec!["f1".into(), "f2".into()],
        },
    ];
    let day = date(2019, 1, 1);
    let entries = (0..TICKS_PER_DAY)
        .map(|minute| {
            let probabilities: HashMap<SensorId, f64> = SENSORS
                .iter()
                .enumerate()
                .map(|(i, s)| (SensorId::from(*s), 0.1 * (i + 1) as f64))
                .collect();
            let total = 50 + (minute % 60) as u32;
            SeedEntry::new(
                Timestamp::from_date(day).saturating_add_secs(minute * 60),
                total,
                probabilities,
            )
        })
        .collect();
    let mut model = SeedModel {
        floors,
        ..SeedModel::default()
    };
    model.entries.insert(day, entries);
    model
}

/// Two days of history, then ingestion from 2019-04-01, with a small query budget.
pub fn config() -> BenchConfig {
    let mut config = BenchConfig::default();
    config.generator.start_date = date(2019, 3, 30);
    config.generator.end_date = date(2019, 4, 1);
    config.generator.jitter_max = 0;
    config.ingest.start_date = date(2019, 4, 1);
    config.ingest.threads = 2;
    config.queries.threads = 2;
    config.queries.duration_secs = -1;
    config.queries.warmup_secs = -1;
    config.queries.max_count = 20;
    config.queries.earliest_valid_date = date(2019, 3, 30);
    config.queries.interval_min_secs = 3_600;
    config.queries.interval_max_secs = 86_400;
    config.queries.kmeans_interval_min_secs = 3_600;
    config.queries.kmeans_interval_max_secs = 86_400;
    config
}

/// What the backend saw, shared by every instance it opened.
#[derive(Debug, Default)]
pub struct Journal {
    pub entries: AtomicU64,
    pub newest: AtomicU64,
    pub sinks_opened: AtomicUsize,
    pub adapters_opened: AtomicUsize,
    pub closes: AtomicUsize,
    pub prepares: Mutex<Vec<bool>>,
    pub queries: AtomicUsize,
    pub adapter_prepares: AtomicUsize,
    pub adapter_dones: AtomicUsize,
}

impl Journal {
    pub fn entries(&self) -> u64 {
        self.entries.load(Ordering::SeqCst)
    }

    pub fn prepares(&self) -> Vec<bool> {
        self.prepares.lock().unwrap().clone()
    }
}

/// Counts entries instead of keeping them.
pub struct RecordingSink {
    journal: Arc<Journal>,
    stop_after: Option<u64>,
}

impl Sink for RecordingSink {
    fn prepare(&self, recreate: bool) -> BenchResult<()> {
        self.journal.prepares.lock().unwrap().push(recreate);
        Ok(())
    }

    fn add(&self, entry: GeneratedEntry) -> BenchResult<()> {
        self.journal.entries.fetch_add(1, Ordering::SeqCst);
        self.journal
            .newest
            .fetch_max(entry.time().as_nanos(), Ordering::SeqCst);
        Ok(())
    }

    fn should_stop_early(&self) -> bool {
        self.stop_after
            .is_some_and(|limit| self.journal.entries() >= limit)
    }

    fn close(&self) -> BenchResult<()> {
        self.journal.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct RecordingAdapter {
    journal: Arc<Journal>,
}

impl RecordingAdapter {
    fn count(&self) {
        self.journal.queries.fetch_add(1, Ordering::SeqCst);
    }
}

impl QueryAdapter for RecordingAdapter {
    fn prepare(
        &self,
        _config: &occubench_config::QueriesConfig,
        _topology: &Topology,
        _rng_seed: u64,
    ) -> BenchResult<()> {
        self.journal.adapter_prepares.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn done(&self) -> BenchResult<()> {
        self.journal.adapter_dones.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn newest_timestamp(&self, previous: Timestamp) -> BenchResult<Timestamp> {
        let newest = Timestamp::from_nanos(self.journal.newest.load(Ordering::SeqCst));
        Ok(newest.max(previous))
    }

    fn total_clients(&self, start: Timestamp, _end: Timestamp) -> BenchResult<Vec<TotalClients>> {
        self.count();
        Ok(vec![TotalClients {
            day: start.date(),
            total: 1,
        }])
    }

    fn floor_totals(&self, _start: Timestamp, _end: Timestamp) -> BenchResult<Vec<FloorTotal>> {
        self.count();
        Ok(Vec::new())
    }

    fn max_for_ap(&self, _start: Timestamp, _end: Timestamp, _ap: &ApName) -> BenchResult<Vec<MaxForAp>> {
        self.count();
        Ok(Vec::new())
    }

    fn avg_occupancy(
        &self,
        _start: Timestamp,
        _end: Timestamp,
        _window_minutes: u32,
    ) -> BenchResult<Vec<AvgOccupancy>> {
        self.count();
        Ok(Vec::new())
    }

    fn kmeans(
        &self,
        _start: Timestamp,
        _end: Timestamp,
        clusters: usize,
        _iterations: usize,
    ) -> BenchResult<Vec<KMeansCluster>> {
        self.count();
        Ok(vec![KMeansCluster::default(); clusters])
    }
}

#[derive(Default)]
pub struct RecordingRegistry {
    pub journal: Arc<Journal>,
    pub stop_after: Option<u64>,
}

impl BackendRegistry for RecordingRegistry {
    fn open_sink(&self, _kind: BackendKind, _topology: &Topology) -> BenchResult<Arc<dyn Sink>> {
        self.journal.sinks_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(RecordingSink {
            journal: Arc::clone(&self.journal),
            stop_after: self.stop_after,
        }))
    }

    fn open_query_adapter(&self, _kind: BackendKind) -> BenchResult<Arc<dyn QueryAdapter>> {
        self.journal.adapters_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(RecordingAdapter {
            journal: Arc::clone(&self.journal),
        }))
    }
}
