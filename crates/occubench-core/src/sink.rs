//! Backend seams: where generated entries go and where queries are answered.
//!
//! The orchestrators only ever see these traits. Concrete backends are
//! chosen once at startup through a [`BackendRegistry`].

use std::sync::Arc;

use occubench_config::{BackendKind, QueriesConfig};
use occubench_types::{
    ApName, AvgOccupancy, FloorTotal, GeneratedEntry, KMeansCluster, MaxForAp, Timestamp,
    Topology, TotalClients,
};

use crate::error::BenchResult;

/// Destination of generated entries.
///
/// In shared-instance mode one sink receives calls from several producer
/// threads at once. Implementations provide their own synchronization; the
/// orchestrator adds none.
pub trait Sink: Send + Sync {
    /// Called once per distinct instance before the first entry.
    /// `recreate` asks the backend to drop and rebuild its schema.
    fn prepare(&self, recreate: bool) -> BenchResult<()> {
        let _ = recreate;
        Ok(())
    }

    /// Accepts one entry. An error ends the calling producer.
    fn add(&self, entry: GeneratedEntry) -> BenchResult<()>;

    /// Soft failure flag, polled after every entry. Once it returns `true`
    /// producers stop and the run is reported as stopped early.
    fn should_stop_early(&self) -> bool {
        false
    }

    /// Called exactly once per distinct instance during shutdown.
    fn close(&self) -> BenchResult<()>;
}

/// Read side of a backend.
///
/// The same thread-safety obligation as [`Sink`] applies in shared mode.
pub trait QueryAdapter: Send + Sync {
    fn prepare(
        &self,
        config: &QueriesConfig,
        topology: &Topology,
        rng_seed: u64,
    ) -> BenchResult<()> {
        let _ = (config, topology, rng_seed);
        Ok(())
    }

    fn done(&self) -> BenchResult<()> {
        Ok(())
    }

    /// Newest timestamp the backend has persisted, or `previous` when it
    /// holds nothing newer.
    fn newest_timestamp(&self, previous: Timestamp) -> BenchResult<Timestamp>;

    /// Per-day sum of clients on `[start, end)`.
    fn total_clients(&self, start: Timestamp, end: Timestamp) -> BenchResult<Vec<TotalClients>>;

    /// Per-floor, per-day sum of clients on `[start, end)`.
    fn floor_totals(&self, start: Timestamp, end: Timestamp) -> BenchResult<Vec<FloorTotal>>;

    fn max_for_ap(
        &self,
        start: Timestamp,
        end: Timestamp,
        ap: &ApName,
    ) -> BenchResult<Vec<MaxForAp>>;

    fn avg_occupancy(
        &self,
        start: Timestamp,
        end: Timestamp,
        window_minutes: u32,
    ) -> BenchResult<Vec<AvgOccupancy>>;

    fn kmeans(
        &self,
        start: Timestamp,
        end: Timestamp,
        clusters: usize,
        iterations: usize,
    ) -> BenchResult<Vec<KMeansCluster>>;
}

/// Opens backend instances by configured kind.
pub trait BackendRegistry: Send + Sync {
    fn open_sink(&self, kind: BackendKind, topology: &Topology) -> BenchResult<Arc<dyn Sink>>;

    fn open_query_adapter(&self, kind: BackendKind) -> BenchResult<Arc<dyn QueryAdapter>>;
}
