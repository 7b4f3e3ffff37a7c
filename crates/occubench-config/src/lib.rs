//! Configuration management for occubench
//!
//! Provides hierarchical configuration loading from multiple sources:
//! 1. An explicit file passed on the command line (highest precedence)
//! 2. Environment variables (OCCUBENCH_* prefix, `__` between sections)
//! 3. occubench.local.toml (gitignored, local overrides)
//! 4. occubench.toml (git-tracked, project config)
//! 5. ~/.config/occubench/config.toml (user defaults)
//! 6. Built-in defaults (lowest precedence)
//!
//! Every run validates the merged result with [`BenchConfig::validate`]
//! before any worker thread starts.

use anyhow::Result;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

mod error;
mod loader;
mod paths;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use occubench_types::Schema;
pub use paths::Paths;

/// Main benchmark configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    pub benchmark: BenchmarkConfig,
    pub generator: GeneratorConfig,
    pub ingest: IngestConfig,
    pub queries: QueriesConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchmarkConfig {
    /// Master seed every random stream of a run is derived from.
    pub seed: u64,
    pub schema: Schema,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            seed: 1234,
            schema: Schema::Row,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Populate the backend with `[start_date, end_date)` before ingestion starts.
    pub enabled: bool,
    pub seed_dir: PathBuf,
    pub floors_file: PathBuf,
    pub floor_map_file: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ignore_file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub combined_file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locations_file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partners_file: Option<PathBuf>,
    pub separator: String,
    /// Seconds between entries in the seed data.
    pub source_interval_secs: u32,
    /// Seconds between generated ticks.
    pub generation_interval_secs: u32,
    pub floor_scale: f64,
    pub sensor_scale: f64,
    pub client_scale: f64,
    /// Exclusive upper bound of the per-reading jitter draw. 0 disables jitter.
    pub jitter_max: u32,
    pub preserve_floors: bool,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            seed_dir: PathBuf::from("seed/data"),
            floors_file: PathBuf::from("seed/floors.txt"),
            floor_map_file: PathBuf::from("seed/floormap.txt"),
            ignore_file: None,
            combined_file: None,
            locations_file: None,
            partners_file: None,
            separator: ";".to_string(),
            source_interval_secs: 60,
            generation_interval_secs: 60,
            floor_scale: 1.0,
            sensor_scale: 1.0,
            client_scale: 1.0,
            jitter_max: 100,
            preserve_floors: true,
            start_date: date(2019, 1, 1),
            end_date: date(2019, 4, 1),
        }
    }
}

/// Backends selectable for ingestion and querying.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// Thread-safe in-memory store. Supports ingestion and every query.
    #[default]
    Memory,
    /// CSV files under `output.csv_dir`. Ingestion only.
    Csv,
    /// Counts and drops entries. Ingestion only.
    Discard,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub enabled: bool,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Desired entries per second per producer. Zero or less disables throttling.
    pub speed: i64,
    /// Seconds between progress reports. Zero or less disables them.
    pub report_frequency_secs: i64,
    /// Wall-clock limit for standalone ingestion. Zero or less runs to `end_date`.
    pub duration_secs: i64,
    pub threads: usize,
    pub shared_instance: bool,
    pub backend: BackendKind,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            start_date: date(2019, 4, 1),
            end_date: date(9999, 12, 31),
            speed: -1,
            report_frequency_secs: -1,
            duration_secs: -1,
            threads: 1,
            shared_instance: false,
            backend: BackendKind::Memory,
        }
    }
}

impl IngestConfig {
    /// Desired entries per second, if throttling is enabled.
    pub fn desired_speed(&self) -> Option<u64> {
        u64::try_from(self.speed).ok().filter(|s| *s > 0)
    }

    pub fn report_frequency(&self) -> Option<Duration> {
        positive_secs(self.report_frequency_secs)
    }

    pub fn duration(&self) -> Option<Duration> {
        positive_secs(self.duration_secs)
    }
}

/// Integer selection weight of each query type.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct QueryWeights {
    pub total_clients: u32,
    pub floor_totals: u32,
    pub max_for_ap: u32,
    pub avg_occupancy: u32,
    pub kmeans: u32,
}

impl Default for QueryWeights {
    fn default() -> Self {
        Self {
            total_clients: 1,
            floor_totals: 1,
            max_for_ap: 2,
            avg_occupancy: 1,
            kmeans: 1,
        }
    }
}

impl QueryWeights {
    /// Weights in `QueryKind::ALL` order.
    pub fn as_array(&self) -> [u32; 5] {
        [
            self.total_clients,
            self.floor_totals,
            self.max_for_ap,
            self.avg_occupancy,
            self.kmeans,
        ]
    }

    pub fn total(&self) -> u64 {
        self.as_array().iter().map(|w| u64::from(*w)).sum()
    }
}

/// Ascending thresholds of the stratified time-range draw.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RangeBands {
    pub day: f64,
    pub week: f64,
    pub month: f64,
    pub year: f64,
}

impl Default for RangeBands {
    fn default() -> Self {
        Self {
            day: 0.4,
            week: 0.7,
            month: 0.9,
            year: 0.95,
        }
    }
}

/// Where query threads learn the newest ingested timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreshnessPolling {
    /// Read the in-process coordinator fed by ingestion threads.
    InProcess,
    /// Ask the backend before every query.
    Always,
    /// Ask the backend at most once per interval.
    Every(Duration),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueriesConfig {
    pub enabled: bool,
    pub threads: usize,
    pub shared_instance: bool,
    pub duration_secs: i64,
    pub warmup_secs: i64,
    /// Query count target, used when `duration_secs` is zero or less.
    pub max_count: i64,
    pub report_frequency_secs: i64,
    pub earliest_valid_date: NaiveDate,
    pub weights: QueryWeights,
    pub ranges: RangeBands,
    pub interval_min_secs: u64,
    pub interval_max_secs: u64,
    pub kmeans_interval_min_secs: u64,
    pub kmeans_interval_max_secs: u64,
    pub kmeans_clusters: usize,
    pub kmeans_iterations: usize,
    /// Negative: in-process coordinator. Zero: ask the backend every time.
    pub freshness_poll_ms: i64,
    pub avg_occupancy_window_minutes: u32,
    pub backend: BackendKind,
}

impl Default for QueriesConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threads: 1,
            shared_instance: false,
            duration_secs: 60,
            warmup_secs: 5,
            max_count: -1,
            report_frequency_secs: 20,
            earliest_valid_date: date(2019, 1, 1),
            weights: QueryWeights::default(),
            ranges: RangeBands::default(),
            interval_min_secs: 21_600,
            interval_max_secs: 7_776_000,
            kmeans_interval_min_secs: 21_600,
            kmeans_interval_max_secs: 86_400,
            kmeans_clusters: 5,
            kmeans_iterations: 10,
            freshness_poll_ms: -1,
            avg_occupancy_window_minutes: 5,
            backend: BackendKind::Memory,
        }
    }
}

impl QueriesConfig {
    pub fn duration(&self) -> Option<Duration> {
        positive_secs(self.duration_secs)
    }

    pub fn warmup(&self) -> Option<Duration> {
        positive_secs(self.warmup_secs)
    }

    pub fn report_frequency(&self) -> Option<Duration> {
        positive_secs(self.report_frequency_secs)
    }

    pub fn target_count(&self) -> Option<u64> {
        u64::try_from(self.max_count).ok().filter(|c| *c > 0)
    }

    pub fn freshness_polling(&self) -> FreshnessPolling {
        match u64::try_from(self.freshness_poll_ms) {
            Err(_) => FreshnessPolling::InProcess,
            Ok(0) => FreshnessPolling::Always,
            Ok(ms) => FreshnessPolling::Every(Duration::from_millis(ms)),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory CSV backends write to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub csv_dir: Option<PathBuf>,
    /// Keep every query result so it can be written out after the run.
    pub save_query_results: bool,
}

impl BenchConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self> {
        ConfigLoader::new().load()
    }

    /// Load configuration from specific project directory
    pub fn load_from_dir(project_dir: impl AsRef<Path>) -> Result<Self> {
        ConfigLoader::new().with_project_dir(project_dir).load()
    }

    /// Parse a single TOML file on top of the built-in defaults.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::ParseError {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Resolve relative paths to absolute
    pub fn resolve_paths(&mut self, base_dir: impl AsRef<Path>) {
        let base = base_dir.as_ref();
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };

        let generator = &mut self.generator;
        resolve(&mut generator.seed_dir);
        resolve(&mut generator.floors_file);
        resolve(&mut generator.floor_map_file);
        for optional in [
            &mut generator.ignore_file,
            &mut generator.combined_file,
            &mut generator.locations_file,
            &mut generator.partners_file,
            &mut self.output.csv_dir,
        ] {
            if let Some(p) = optional.as_mut() {
                resolve(p);
            }
        }
    }

    /// Checks every constraint that can be decided before a run starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_generator()?;
        self.validate_ingest()?;
        if self.queries.enabled {
            self.validate_queries()?;
        }
        Ok(())
    }

    fn validate_generator(&self) -> Result<(), ConfigError> {
        let g = &self.generator;
        let (source, generation) = (g.source_interval_secs, g.generation_interval_secs);
        if source == 0 || generation == 0 {
            return Err(ConfigError::invalid("sample intervals must be positive"));
        }
        if source % generation != 0 && generation % source != 0 {
            return Err(ConfigError::invalid(format!(
                "mismatching intervals: generation interval {generation}s and seed interval {source}s must match or one must evenly divide the other"
            )));
        }
        for (name, value) in [
            ("floor_scale", g.floor_scale),
            ("sensor_scale", g.sensor_scale),
            ("client_scale", g.client_scale),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::invalid(format!(
                    "generator.{name} must be positive, got {value}"
                )));
            }
        }
        if g.start_date >= g.end_date {
            return Err(ConfigError::invalid(format!(
                "generator.start_date {} must be before generator.end_date {}",
                g.start_date, g.end_date
            )));
        }
        if g.separator.is_empty() {
            return Err(ConfigError::invalid("generator.separator must not be empty"));
        }
        Ok(())
    }

    fn validate_ingest(&self) -> Result<(), ConfigError> {
        let i = &self.ingest;
        if i.enabled {
            if i.threads == 0 {
                return Err(ConfigError::invalid("ingest.threads must be at least 1"));
            }
            if i.start_date >= i.end_date {
                return Err(ConfigError::invalid(format!(
                    "ingest.start_date {} must be before ingest.end_date {}",
                    i.start_date, i.end_date
                )));
            }
            if i.backend == BackendKind::Csv && self.output.csv_dir.is_none() {
                return Err(ConfigError::invalid(
                    "the csv backend requires output.csv_dir",
                ));
            }
        }
        Ok(())
    }

    fn validate_queries(&self) -> Result<(), ConfigError> {
        let q = &self.queries;
        if q.threads == 0 {
            return Err(ConfigError::invalid("queries.threads must be at least 1"));
        }
        if q.weights.total() == 0 {
            return Err(ConfigError::invalid(
                "query weights sum to zero; no query can ever be selected",
            ));
        }
        let bands = [q.ranges.day, q.ranges.week, q.ranges.month, q.ranges.year];
        if bands.iter().any(|b| !(0.0..1.0).contains(b)) || bands.windows(2).any(|w| w[0] > w[1])
        {
            return Err(ConfigError::invalid(format!(
                "queries.ranges must be ascending thresholds in [0, 1), got {bands:?}"
            )));
        }
        for (name, min, max) in [
            ("interval", q.interval_min_secs, q.interval_max_secs),
            ("kmeans_interval", q.kmeans_interval_min_secs, q.kmeans_interval_max_secs),
        ] {
            if min > max {
                return Err(ConfigError::invalid(format!(
                    "queries.{name}_min_secs ({min}) exceeds queries.{name}_max_secs ({max})"
                )));
            }
        }
        if q.duration().is_none() && q.target_count().is_none() {
            return Err(ConfigError::invalid(
                "queries need either a positive duration_secs or a positive max_count",
            ));
        }
        if q.kmeans_clusters == 0 || q.kmeans_iterations == 0 {
            return Err(ConfigError::invalid(
                "queries.kmeans_clusters and queries.kmeans_iterations must be positive",
            ));
        }
        if q.backend != BackendKind::Memory {
            return Err(ConfigError::invalid(format!(
                "backend {:?} cannot answer queries",
                q.backend
            )));
        }
        Ok(())
    }
}

fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or_default()
}

fn positive_secs(secs: i64) -> Option<Duration> {
    u64::try_from(secs)
        .ok()
        .filter(|s| *s > 0)
        .map(Duration::from_secs)
}
