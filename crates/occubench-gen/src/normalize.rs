//! Probability normalization over the assigned topology.

use occubench_types::{SeedModel, SensorId, Topology};
use tracing::info;

/// Rescales seed probabilities so that, per entry, the probabilities of
/// all access points sum to 1.
///
/// For every entry with data, each assigned sensor first absorbs the
/// probability of the sensors merged into it. The entry's total is then
/// the sum of `probability × assignment count` over assigned sensors, and
/// each assigned sensor's probability is divided by it. Holes are left
/// untouched. Entries whose assigned probabilities are all zero keep
/// their zeros.
///
/// The merge bookkeeping is cleared afterwards so normalization is not
/// applied twice.
pub fn normalize_probabilities(topology: &Topology, seed: &mut SeedModel) {
    let counts = topology.assignment_counts();
    let combined = std::mem::take(&mut seed.combined);
    let mut normalized = 0usize;

    for entry in seed.entries.values_mut().flatten() {
        let Some(probabilities) = entry.probabilities.as_mut() else {
            continue;
        };

        let mut folded: Vec<(SensorId, f64)> = Vec::with_capacity(counts.len());
        let mut total = 0.0;
        for (sensor, count) in &counts {
            let Some(own) = probabilities.get(sensor).copied() else {
                continue;
            };
            let merged: f64 = combined
                .get(sensor)
                .into_iter()
                .flatten()
                .filter_map(|m| probabilities.get(m))
                .sum();
            let probability = own + merged;
            total += probability * f64::from(*count);
            folded.push((sensor.clone(), probability));
        }

        for (sensor, probability) in folded {
            let scaled = if total > 0.0 { probability / total } else { probability };
            probabilities.insert(sensor, scaled);
        }
        normalized += 1;
    }

    info!(entries = normalized, "normalized seed probabilities");
}
