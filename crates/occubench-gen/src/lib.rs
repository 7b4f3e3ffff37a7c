//! # occubench-gen: Synthetic occupancy data
//!
//! Turns a small recorded seed dataset into an arbitrarily large, realistic
//! stream of access-point readings:
//!
//! 1. [`load_seed`] parses the per-date data files and floor metadata.
//! 2. [`generate_topology`] clones seed floors into a synthetic building.
//! 3. [`assign_floors_to_ids`] maps each synthetic access point onto a seed sensor.
//! 4. [`normalize_probabilities`] rescales the seed so per-tick shares sum to one.
//! 5. [`SeriesGenerator`] replays the seed as readings into an [`EntryWriter`].
//!
//! [`prepare_topology`] runs steps 2 to 4 in order.

mod error;
mod normalize;
mod rng;
mod seed;
mod series;
mod topology;

pub use error::{GenError, GenResult};
pub use normalize::normalize_probabilities;
pub use rng::BenchRng;
pub use seed::{SeedFiles, load_seed};
pub use series::{
    AssignedAp, EntryWriter, GenerationSummary, SeriesGenerator, SeriesSettings, assigned_aps,
};
pub use topology::{TopologySettings, assign_floors_to_ids, congruent_seed_floor, generate_topology};

use occubench_config::GeneratorConfig;
use occubench_types::{SeedModel, Topology};

/// Generates, assigns and normalizes in one step.
///
/// `seed` is normalized in place against the returned topology and must
/// not be normalized again.
pub fn prepare_topology(
    seed: &mut SeedModel,
    config: &GeneratorConfig,
    rng: &mut BenchRng,
) -> GenResult<Topology> {
    let settings = TopologySettings {
        floor_scale: config.floor_scale,
        sensor_scale: config.sensor_scale,
    };
    let mut topology = generate_topology(seed, settings, rng)?;
    assign_floors_to_ids(&mut topology, seed, config.preserve_floors)?;
    normalize_probabilities(&topology, seed);
    Ok(topology)
}
