//! # occubench-types: Core types for `occubench`
//!
//! This crate contains the shared data model used across the harness:
//! - Identifiers ([`SensorId`], [`ApName`], [`LocationType`])
//! - Temporal types ([`Timestamp`])
//! - Seed data ([`SeedEntry`], [`FloorMetadata`], [`SeedModel`])
//! - Synthetic topology ([`SyntheticAccessPoint`], [`Floor`], [`Topology`])
//! - Generated readings ([`GeneratedEntry`], [`Schema`])
//! - Query results ([`QueryKind`], [`QueryOutput`] and its row types)

use std::{
    collections::{BTreeMap, BTreeSet, HashMap, HashSet},
    fmt::{self, Display},
    sync::Arc,
};

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

// ============================================================================
// Identifiers
// ============================================================================

/// Identifier of a sensor in the recorded seed data.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SensorId(String);

impl SensorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SensorId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for SensorId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Opaque name of a synthetic access point.
///
/// Backed by an `Arc<str>` because every generated row carries one; cloning
/// a name is a reference-count bump rather than an allocation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApName(Arc<str>);

impl ApName {
    pub fn new(name: &str) -> Self {
        Self(Arc::from(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ApName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ApName {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Kind of physical location a sensor is mounted in.
///
/// Assignment only pairs synthetic access points with seed sensors of the
/// same location type.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LocationType(String);

impl LocationType {
    /// Location type given to sensors with no explicit classification.
    pub const DEFAULT: &'static str = "general";

    pub fn new(kind: impl Into<String>) -> Self {
        Self(kind.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for LocationType {
    fn default() -> Self {
        Self(Self::DEFAULT.to_string())
    }
}

impl Display for LocationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Temporal Types
// ============================================================================

const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Wall-clock timestamp in nanoseconds since the Unix epoch (UTC).
///
/// Generated readings, freshness bounds and query arguments all use this
/// type. Conversions to and from `chrono` saturate instead of panicking so
/// that sentinel dates such as `9999-12-31` remain usable as "unbounded".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The Unix epoch (1970-01-01 00:00:00 UTC).
    pub const EPOCH: Timestamp = Timestamp(0);

    /// Creates a timestamp from nanoseconds since Unix epoch.
    pub fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    /// Returns the timestamp as nanoseconds since Unix epoch.
    pub fn as_nanos(&self) -> u64 {
        self.0
    }

    /// Creates a timestamp from whole seconds since Unix epoch.
    pub fn from_secs(secs: u64) -> Self {
        Self(secs.saturating_mul(NANOS_PER_SEC))
    }

    /// Returns the timestamp as seconds since Unix epoch (truncates nanoseconds).
    pub fn as_secs(&self) -> u64 {
        self.0 / NANOS_PER_SEC
    }

    /// Converts a naive UTC date-time. Dates before the epoch clamp to it.
    pub fn from_datetime(time: NaiveDateTime) -> Self {
        let utc = time.and_utc();
        let secs = u64::try_from(utc.timestamp()).unwrap_or(0);
        Self(
            secs.saturating_mul(NANOS_PER_SEC)
                .saturating_add(u64::from(utc.timestamp_subsec_nanos())),
        )
    }

    /// Midnight at the start of `date`.
    pub fn from_date(date: NaiveDate) -> Self {
        Self::from_datetime(date.and_time(NaiveTime::MIN))
    }

    /// Converts back into a naive UTC date-time.
    pub fn to_datetime(&self) -> NaiveDateTime {
        let secs = (self.0 / NANOS_PER_SEC) as i64;
        let nanos = (self.0 % NANOS_PER_SEC) as u32;
        DateTime::from_timestamp(secs, nanos)
            .map(|dt| dt.naive_utc())
            .unwrap_or_default()
    }

    /// The calendar date this timestamp falls on.
    pub fn date(&self) -> NaiveDate {
        self.to_datetime().date()
    }

    /// Drops the sub-second part.
    pub fn truncate_to_secs(&self) -> Self {
        Self(self.0 - self.0 % NANOS_PER_SEC)
    }

    /// Drops everything below the day boundary.
    pub fn truncate_to_day(&self) -> Self {
        Self::from_date(self.date())
    }

    pub fn saturating_add_secs(&self, secs: u64) -> Self {
        Self(self.0.saturating_add(secs.saturating_mul(NANOS_PER_SEC)))
    }

    pub fn saturating_sub_secs(&self, secs: u64) -> Self {
        Self(self.0.saturating_sub(secs.saturating_mul(NANOS_PER_SEC)))
    }

    pub fn saturating_add_nanos(&self, nanos: u64) -> Self {
        Self(self.0.saturating_add(nanos))
    }

    /// Whole seconds from `earlier` to `self`, or 0 if `earlier` is later.
    pub fn secs_since(&self, earlier: Timestamp) -> u64 {
        self.0.saturating_sub(earlier.0) / NANOS_PER_SEC
    }
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_datetime().format("%Y-%m-%dT%H:%M:%S%.f"))
    }
}

impl From<NaiveDateTime> for Timestamp {
    fn from(value: NaiveDateTime) -> Self {
        Self::from_datetime(value)
    }
}

impl From<Timestamp> for u64 {
    fn from(ts: Timestamp) -> Self {
        ts.0
    }
}

// ============================================================================
// Seed Data
// ============================================================================

/// One recorded sample of the seed dataset.
///
/// `probabilities` is `None` for a data hole. A hole is meaningful and must
/// never be read as "every sensor had zero clients".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedEntry {
    pub time: Timestamp,
    pub total: u32,
    pub probabilities: Option<HashMap<SensorId, f64>>,
}

impl SeedEntry {
    pub fn new(time: Timestamp, total: u32, probabilities: HashMap<SensorId, f64>) -> Self {
        Self {
            time,
            total,
            probabilities: Some(probabilities),
        }
    }

    /// An entry for which the recorder captured nothing.
    pub fn hole(time: Timestamp) -> Self {
        Self {
            time,
            total: 0,
            probabilities: None,
        }
    }

    pub fn has_data(&self) -> bool {
        self.probabilities.is_some()
    }

    /// Probability share for `sensor`, if the entry has data for it.
    pub fn probability(&self, sensor: &SensorId) -> Option<f64> {
        self.probabilities.as_ref()?.get(sensor).copied()
    }
}

/// Description of one floor in the seed dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FloorMetadata {
    /// Key used in the metadata files.
    pub key: String,
    /// Floor number. The ground floor is 0; number 1 is never used.
    pub number: u32,
    /// Whether this floor may be repeated when scaling beyond the seed's floor count.
    pub repeatable: bool,
    /// Seed sensors on this floor, in file order.
    pub sensors: Vec<SensorId>,
}

/// The parsed and preprocessed seed dataset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeedModel {
    pub floors: Vec<FloorMetadata>,
    pub locations: HashMap<SensorId, LocationType>,
    /// Partner groups keyed by their primary sensor.
    pub partners: HashMap<SensorId, Vec<SensorId>>,
    /// Sensors merged into a kept sensor, keyed by the kept sensor.
    pub combined: HashMap<SensorId, Vec<SensorId>>,
    /// Entries grouped by date, time-ordered within each date.
    pub entries: BTreeMap<NaiveDate, Vec<SeedEntry>>,
}

impl SeedModel {
    /// Location type of `sensor`, falling back to the default classification.
    pub fn location_of(&self, sensor: &SensorId) -> LocationType {
        self.locations.get(sensor).cloned().unwrap_or_default()
    }

    /// Partner group of `sensor`. Empty when it has none.
    pub fn partners_of(&self, sensor: &SensorId) -> &[SensorId] {
        self.partners.get(sensor).map_or(&[], Vec::as_slice)
    }

    /// Sensors that only ever appear as a partner of some primary.
    pub fn secondary_partners(&self) -> HashSet<&SensorId> {
        self.partners.values().flatten().collect()
    }

    /// Seed sensors on the floor with the given number.
    pub fn sensors_on_floor(&self, number: u32) -> Option<&[SensorId]> {
        self.floors
            .iter()
            .find(|f| f.number == number)
            .map(|f| f.sensors.as_slice())
    }

    /// Total number of seed entries across all dates.
    pub fn entry_count(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    /// Every sensor in the seed, in floor then file order.
    pub fn all_sensors(&self) -> impl Iterator<Item = &SensorId> {
        self.floors.iter().flat_map(|f| f.sensors.iter())
    }
}

// ============================================================================
// Synthetic Topology
// ============================================================================

/// A generated access point.
///
/// Everything but `assigned` is fixed at topology generation. `assigned` is
/// written exactly once by the assignment step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntheticAccessPoint {
    pub name: ApName,
    /// Seed sensor this access point was cloned from.
    pub origin: SensorId,
    pub floor: u32,
    pub location: LocationType,
    /// Indices (within the same floor) of partners that must be assigned together.
    pub partners: Vec<usize>,
    /// Index of the primary access point if this one is itself a partner.
    pub partner_of: Option<usize>,
    pub assigned: Option<SensorId>,
}

impl SyntheticAccessPoint {
    pub fn new(name: ApName, origin: SensorId, floor: u32, location: LocationType) -> Self {
        Self {
            name,
            origin,
            floor,
            location,
            partners: Vec::new(),
            partner_of: None,
            assigned: None,
        }
    }

    pub fn has_partners(&self) -> bool {
        !self.partners.is_empty()
    }

    pub fn is_assigned(&self) -> bool {
        self.assigned.is_some()
    }
}

/// A generated floor and its access points.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Floor {
    pub number: u32,
    /// Key of the seed floor this floor was cloned from.
    pub template: String,
    pub aps: Vec<SyntheticAccessPoint>,
}

/// The full synthetic topology.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    pub floors: Vec<Floor>,
}

impl Topology {
    pub fn new(floors: Vec<Floor>) -> Self {
        Self { floors }
    }

    /// All access points in floor order.
    pub fn access_points(&self) -> impl Iterator<Item = &SyntheticAccessPoint> {
        self.floors.iter().flat_map(|f| f.aps.iter())
    }

    pub fn ap_count(&self) -> usize {
        self.floors.iter().map(|f| f.aps.len()).sum()
    }

    pub fn ap_names(&self) -> Vec<ApName> {
        self.access_points().map(|ap| ap.name.clone()).collect()
    }

    /// Whether every access point carries a seed assignment.
    pub fn is_fully_assigned(&self) -> bool {
        self.access_points().all(SyntheticAccessPoint::is_assigned)
    }

    /// How many access points were assigned each seed sensor.
    pub fn assignment_counts(&self) -> HashMap<SensorId, u32> {
        let mut counts = HashMap::new();
        for sensor in self.access_points().filter_map(|ap| ap.assigned.as_ref()) {
            *counts.entry(sensor.clone()).or_insert(0) += 1;
        }
        counts
    }
}

// ============================================================================
// Generated Readings
// ============================================================================

/// Shape of generated readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Schema {
    /// One reading per access point per tick.
    #[default]
    Row,
    /// One reading per tick covering every active access point.
    Wide,
}

/// A single unit of output from the generator.
///
/// Handed to a sink by value and dropped after `add` returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeneratedEntry {
    Row {
        time: Timestamp,
        ap: ApName,
        clients: u32,
    },
    Wide {
        time: Timestamp,
        readings: BTreeMap<ApName, u32>,
    },
}

impl GeneratedEntry {
    pub fn time(&self) -> Timestamp {
        match self {
            GeneratedEntry::Row { time, .. } | GeneratedEntry::Wide { time, .. } => *time,
        }
    }

    /// Number of (access point, count) readings carried.
    pub fn reading_count(&self) -> usize {
        match self {
            GeneratedEntry::Row { .. } => 1,
            GeneratedEntry::Wide { readings, .. } => readings.len(),
        }
    }
}

// ============================================================================
// Queries
// ============================================================================

/// The analytical query types of the workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueryKind {
    TotalClients,
    FloorTotals,
    MaxForAp,
    AvgOccupancy,
    KMeans,
}

impl QueryKind {
    /// All kinds in weight-bucket order.
    pub const ALL: [QueryKind; 5] = [
        QueryKind::TotalClients,
        QueryKind::FloorTotals,
        QueryKind::MaxForAp,
        QueryKind::AvgOccupancy,
        QueryKind::KMeans,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn label(self) -> &'static str {
        match self {
            QueryKind::TotalClients => "Total Clients",
            QueryKind::FloorTotals => "Floor Totals",
            QueryKind::MaxForAp => "Max for AP",
            QueryKind::AvgOccupancy => "Avg Occupancy",
            QueryKind::KMeans => "K-Means",
        }
    }
}

impl Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Sum of all clients on one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TotalClients {
    pub day: NaiveDate,
    pub total: u64,
}

/// Sum of clients on one floor on one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FloorTotal {
    pub floor: u32,
    pub day: NaiveDate,
    pub total: u64,
}

/// Highest reading for one access point on one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaxForAp {
    pub ap: ApName,
    pub day: NaiveDate,
    pub max: u32,
}

/// Current occupancy of an access point against its history at this time of day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvgOccupancy {
    pub ap: ApName,
    pub current: u32,
    pub historical_now: f64,
    pub historical_soon: f64,
}

/// One K-Means cluster, as the set of access points assigned to it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KMeansCluster {
    pub aps: BTreeSet<ApName>,
}

impl Display for KMeansCluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.aps.is_empty() {
            return f.write_str("EMPTY");
        }
        let mut first = true;
        for ap in &self.aps {
            if !first {
                f.write_str(";")?;
            }
            first = false;
            f.write_str(ap.as_str())?;
        }
        Ok(())
    }
}

/// Backend-agnostic result of one dispatched query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "rows", rename_all = "kebab-case")]
pub enum QueryOutput {
    TotalClients(Vec<TotalClients>),
    FloorTotals(Vec<FloorTotal>),
    MaxForAp(Vec<MaxForAp>),
    AvgOccupancy(Vec<AvgOccupancy>),
    KMeans(Vec<KMeansCluster>),
}

impl QueryOutput {
    pub fn kind(&self) -> QueryKind {
        match self {
            QueryOutput::TotalClients(_) => QueryKind::TotalClients,
            QueryOutput::FloorTotals(_) => QueryKind::FloorTotals,
            QueryOutput::MaxForAp(_) => QueryKind::MaxForAp,
            QueryOutput::AvgOccupancy(_) => QueryKind::AvgOccupancy,
            QueryOutput::KMeans(_) => QueryKind::KMeans,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            QueryOutput::TotalClients(rows) => rows.len(),
            QueryOutput::FloorTotals(rows) => rows.len(),
            QueryOutput::MaxForAp(rows) => rows.len(),
            QueryOutput::AvgOccupancy(rows) => rows.len(),
            QueryOutput::KMeans(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
