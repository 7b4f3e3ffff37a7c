//! Thread-safe in-memory store answering every query type.
//!
//! Readings are kept per access point in time order. A [`MemoryStore`] is a
//! cheap handle; every [`MemorySession`] opened from it sees the same data,
//! so sinks and query adapters opened separately still meet in one store.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::NaiveDate;
use occubench_config::QueriesConfig;
use occubench_core::{BenchResult, KMeans, QueryAdapter, Sink};
use occubench_gen::BenchRng;
use occubench_types::{
    ApName, AvgOccupancy, FloorTotal, GeneratedEntry, KMeansCluster, MaxForAp, Timestamp,
    Topology, TotalClients,
};
use tracing::debug;

use crate::error::{TargetError, TargetResult};

const SECS_PER_DAY: u64 = 86_400;

#[derive(Debug, Default)]
struct StoreInner {
    readings: HashMap<ApName, Vec<(Timestamp, u32)>>,
    floors: HashMap<ApName, u32>,
    /// Floor numbers in topology order.
    floor_order: Vec<u32>,
    newest: Option<Timestamp>,
}

impl StoreInner {
    fn insert(&mut self, ap: ApName, time: Timestamp, clients: u32) {
        let series = self.readings.entry(ap).or_default();
        match series.last() {
            Some((last, _)) if *last > time => {
                let at = series.partition_point(|(t, _)| *t <= time);
                series.insert(at, (time, clients));
            }
            _ => series.push((time, clients)),
        }
        if self.newest.is_none_or(|newest| time > newest) {
            self.newest = Some(time);
        }
    }

    /// Readings of `ap` on `[start, end)`.
    fn range(&self, ap: &ApName, start: Timestamp, end: Timestamp) -> &[(Timestamp, u32)] {
        let Some(series) = self.readings.get(ap) else {
            return &[];
        };
        let from = series.partition_point(|(t, _)| *t < start);
        let to = series.partition_point(|(t, _)| *t < end);
        &series[from..to.max(from)]
    }

    fn sorted_aps(&self) -> Vec<ApName> {
        let mut aps: Vec<ApName> = self.readings.keys().cloned().collect();
        aps.sort();
        aps
    }
}

#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Arc<RwLock<StoreInner>>,
    /// Seconds between generated ticks; the "current" reading of an
    /// average-occupancy query is the newest one within this span.
    sample_rate_secs: u64,
}

impl MemoryStore {
    pub fn new(sample_rate_secs: u32) -> Self {
        Self {
            inner: Arc::default(),
            sample_rate_secs: u64::from(sample_rate_secs.max(1)),
        }
    }

    /// Opens a session sharing this store.
    pub fn session(&self) -> MemorySession {
        MemorySession {
            store: self.clone(),
            rng: Mutex::new(BenchRng::new(0)),
        }
    }

    fn read(&self) -> TargetResult<RwLockReadGuard<'_, StoreInner>> {
        self.inner.read().map_err(|_| TargetError::LockPoisoned)
    }

    fn write(&self) -> TargetResult<RwLockWriteGuard<'_, StoreInner>> {
        self.inner.write().map_err(|_| TargetError::LockPoisoned)
    }

    /// Records which floor every access point is on.
    pub fn register_topology(&self, topology: &Topology) -> TargetResult<()> {
        let mut inner = self.write()?;
        inner.floors = topology
            .access_points()
            .map(|ap| (ap.name.clone(), ap.floor))
            .collect();
        inner.floor_order = topology.floors.iter().map(|f| f.number).collect();
        Ok(())
    }

    pub fn insert(&self, entry: GeneratedEntry) -> TargetResult<()> {
        let mut inner = self.write()?;
        match entry {
            GeneratedEntry::Row { time, ap, clients } => inner.insert(ap, time, clients),
            GeneratedEntry::Wide { time, readings } => {
                for (ap, clients) in readings {
                    inner.insert(ap, time, clients);
                }
            }
        }
        Ok(())
    }

    /// Drops every reading; the floor layout is kept.
    pub fn clear(&self) -> TargetResult<()> {
        let mut inner = self.write()?;
        inner.readings.clear();
        inner.newest = None;
        Ok(())
    }

    pub fn newest(&self) -> TargetResult<Option<Timestamp>> {
        Ok(self.read()?.newest)
    }

    pub fn reading_count(&self) -> TargetResult<usize> {
        Ok(self.read()?.readings.values().map(Vec::len).sum())
    }

    pub fn total_clients(&self, start: Timestamp, end: Timestamp) -> TargetResult<Vec<TotalClients>> {
        let inner = self.read()?;
        let mut days: BTreeMap<NaiveDate, u64> = BTreeMap::new();
        for ap in inner.readings.keys() {
            for (time, clients) in inner.range(ap, start, end) {
                *days.entry(time.date()).or_default() += u64::from(*clients);
            }
        }
        Ok(days
            .into_iter()
            .map(|(day, total)| TotalClients { day, total })
            .collect())
    }

    /// Floors in topology order, days ascending within a floor.
    pub fn floor_totals(&self, start: Timestamp, end: Timestamp) -> TargetResult<Vec<FloorTotal>> {
        let inner = self.read()?;
        let mut per_floor: HashMap<u32, BTreeMap<NaiveDate, u64>> = HashMap::new();
        for (ap, floor) in &inner.floors {
            for (time, clients) in inner.range(ap, start, end) {
                *per_floor
                    .entry(*floor)
                    .or_default()
                    .entry(time.date())
                    .or_default() += u64::from(*clients);
            }
        }
        let mut totals = Vec::new();
        for floor in &inner.floor_order {
            let Some(days) = per_floor.remove(floor) else {
                continue;
            };
            totals.extend(days.into_iter().map(|(day, total)| FloorTotal {
                floor: *floor,
                day,
                total,
            }));
        }
        Ok(totals)
    }

    pub fn max_for_ap(
        &self,
        start: Timestamp,
        end: Timestamp,
        ap: &ApName,
    ) -> TargetResult<Vec<MaxForAp>> {
        let inner = self.read()?;
        let mut days: BTreeMap<NaiveDate, u32> = BTreeMap::new();
        for (time, clients) in inner.range(ap, start, end) {
            let max = days.entry(time.date()).or_default();
            *max = (*max).max(*clients);
        }
        Ok(days
            .into_iter()
            .map(|(day, max)| MaxForAp {
                ap: ap.clone(),
                day,
                max,
            })
            .collect())
    }

    /// For every access point with a current reading: that reading, the
    /// mean over `[d - window, d)` and the mean over `[d, d + window)` for
    /// `d = end, end - 1 day, ...` while `d >= start`.
    ///
    /// Access points missing either history are left out.
    pub fn avg_occupancy(
        &self,
        start: Timestamp,
        end: Timestamp,
        window_minutes: u32,
    ) -> TargetResult<Vec<AvgOccupancy>> {
        let inner = self.read()?;
        let window = u64::from(window_minutes) * 60;
        let mut anchors = Vec::new();
        let mut day = end;
        loop {
            anchors.push(day);
            let previous = day.saturating_sub_secs(SECS_PER_DAY);
            if previous < start || previous == day {
                break;
            }
            day = previous;
        }

        let mut output = Vec::new();
        for ap in inner.sorted_aps() {
            let current = inner
                .range(&ap, end.saturating_sub_secs(self.sample_rate_secs), end)
                .last()
                .map(|(_, clients)| *clients);
            let Some(current) = current else {
                continue;
            };
            let now = mean(anchors.iter().flat_map(|d| {
                inner.range(&ap, d.saturating_sub_secs(window), *d)
            }));
            let soon = mean(anchors.iter().flat_map(|d| {
                inner.range(&ap, *d, d.saturating_add_secs(window))
            }));
            if let (Some(historical_now), Some(historical_soon)) = (now, soon) {
                output.push(AvgOccupancy {
                    ap,
                    current,
                    historical_now,
                    historical_soon,
                });
            }
        }
        Ok(output)
    }

    /// Client counts of `ap` on `[start, end)` in time order.
    pub fn series(&self, ap: &ApName, start: Timestamp, end: Timestamp) -> TargetResult<Vec<u64>> {
        let inner = self.read()?;
        Ok(inner
            .range(ap, start, end)
            .iter()
            .map(|(_, clients)| u64::from(*clients))
            .collect())
    }

    pub fn ap_names(&self) -> TargetResult<Vec<ApName>> {
        Ok(self.read()?.sorted_aps())
    }
}

fn mean<'a>(readings: impl Iterator<Item = &'a (Timestamp, u32)>) -> Option<f64> {
    let (sum, count) = readings.fold((0u64, 0u64), |(sum, count), (_, clients)| {
        (sum + u64::from(*clients), count + 1)
    });
    (count > 0).then(|| sum as f64 / count as f64)
}

/// One opened instance of the memory backend.
///
/// Carries its own K-Means rng, seeded when the adapter is prepared.
#[derive(Debug)]
pub struct MemorySession {
    store: MemoryStore,
    rng: Mutex<BenchRng>,
}

impl MemorySession {
    pub fn store(&self) -> &MemoryStore {
        &self.store
    }
}

impl Sink for MemorySession {
    fn prepare(&self, recreate: bool) -> BenchResult<()> {
        if recreate {
            self.store.clear()?;
            debug!("memory store cleared");
        }
        Ok(())
    }

    fn add(&self, entry: GeneratedEntry) -> BenchResult<()> {
        Ok(self.store.insert(entry)?)
    }

    fn close(&self) -> BenchResult<()> {
        debug!(readings = self.store.reading_count()?, "memory sink closed");
        Ok(())
    }
}

impl QueryAdapter for MemorySession {
    fn prepare(&self, _config: &QueriesConfig, topology: &Topology, rng_seed: u64) -> BenchResult<()> {
        self.store.register_topology(topology)?;
        let mut rng = self.rng.lock().map_err(|_| TargetError::LockPoisoned)?;
        *rng = BenchRng::new(rng_seed);
        Ok(())
    }

    fn newest_timestamp(&self, previous: Timestamp) -> BenchResult<Timestamp> {
        Ok(self.store.newest()?.map_or(previous, |newest| newest.max(previous)))
    }

    fn total_clients(&self, start: Timestamp, end: Timestamp) -> BenchResult<Vec<TotalClients>> {
        Ok(self.store.total_clients(start, end)?)
    }

    fn floor_totals(&self, start: Timestamp, end: Timestamp) -> BenchResult<Vec<FloorTotal>> {
        Ok(self.store.floor_totals(start, end)?)
    }

    fn max_for_ap(&self, start: Timestamp, end: Timestamp, ap: &ApName) -> BenchResult<Vec<MaxForAp>> {
        Ok(self.store.max_for_ap(start, end, ap)?)
    }

    fn avg_occupancy(
        &self,
        start: Timestamp,
        end: Timestamp,
        window_minutes: u32,
    ) -> BenchResult<Vec<AvgOccupancy>> {
        Ok(self.store.avg_occupancy(start, end, window_minutes)?)
    }

    fn kmeans(
        &self,
        start: Timestamp,
        end: Timestamp,
        clusters: usize,
        iterations: usize,
    ) -> BenchResult<Vec<KMeansCluster>> {
        let aps = self.store.ap_names()?;
        let mut rng = self.rng.lock().map_err(|_| TargetError::LockPoisoned)?;
        KMeans::new(clusters, iterations).run(&aps, &mut rng, |ap| {
            Ok(self.store.series(ap, start, end)?)
        })
    }
}
