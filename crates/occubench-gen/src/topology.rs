//! Synthetic topology generation and seed assignment.
//!
//! Generation clones seed floors into a larger (or smaller) building, then
//! assignment maps every synthetic access point onto a seed sensor whose
//! behavior it will mimic.

use std::collections::{HashMap, HashSet};

use occubench_types::{ApName, Floor, LocationType, SeedModel, SensorId, SyntheticAccessPoint, Topology};
use tracing::{debug, info};

use crate::error::{GenError, GenResult};
use crate::rng::BenchRng;

/// Scale factors applied when cloning the seed building.
#[derive(Debug, Clone, Copy)]
pub struct TopologySettings {
    pub floor_scale: f64,
    pub sensor_scale: f64,
}

impl Default for TopologySettings {
    fn default() -> Self {
        Self {
            floor_scale: 1.0,
            sensor_scale: 1.0,
        }
    }
}

/// Builds the synthetic topology.
///
/// Non-repeatable seed floors come first, in file order; repeatable floors
/// are then cycled to fill the remaining `ceil(floors * floor_scale)` slots.
/// Each floor gets `ceil(sensors * sensor_scale)` access points cloned from
/// its template floor. A template sensor with partners is cloned together
/// with its whole partner group, so a floor can overshoot its target by at
/// most one group.
pub fn generate_topology(
    seed: &SeedModel,
    settings: TopologySettings,
    rng: &mut BenchRng,
) -> GenResult<Topology> {
    if seed.floors.is_empty() {
        return Err(GenError::EmptySeed("no floors".to_string()));
    }
    let wanted = ((seed.floors.len() as f64 * settings.floor_scale).ceil() as usize).max(1);

    let fixed: Vec<_> = seed.floors.iter().filter(|f| !f.repeatable).collect();
    let repeatable: Vec<_> = seed.floors.iter().filter(|f| f.repeatable).collect();
    if wanted > fixed.len() && repeatable.is_empty() {
        return Err(GenError::NoRepeatableFloors {
            needed: wanted,
            available: fixed.len(),
        });
    }

    let templates = fixed
        .iter()
        .chain(repeatable.iter().cycle())
        .take(wanted)
        .copied();

    let secondary = seed.secondary_partners();
    let mut names = NameAllocator::default();
    let mut floors = Vec::with_capacity(wanted);

    for (slot, template) in templates.enumerate() {
        let number = synthetic_floor_number(slot);
        let primaries: Vec<&SensorId> = template
            .sensors
            .iter()
            .filter(|s| !secondary.contains(s))
            .collect();
        let target = (template.sensors.len() as f64 * settings.sensor_scale).ceil() as usize;

        let mut aps = Vec::with_capacity(target);
        let mut cursor = 0;
        while aps.len() < target && !primaries.is_empty() {
            let origin = primaries[cursor % primaries.len()];
            cursor += 1;
            let primary_index = aps.len();
            aps.push(SyntheticAccessPoint::new(
                names.next(rng),
                origin.clone(),
                number,
                seed.location_of(origin),
            ));
            for partner in seed.partners_of(origin) {
                let index = aps.len();
                let mut ap = SyntheticAccessPoint::new(
                    names.next(rng),
                    partner.clone(),
                    number,
                    seed.location_of(partner),
                );
                ap.partner_of = Some(primary_index);
                aps.push(ap);
                aps[primary_index].partners.push(index);
            }
        }

        debug!(floor = number, template = %template.key, aps = aps.len(), "generated floor");
        floors.push(Floor {
            number,
            template: template.key.clone(),
            aps,
        });
    }

    let topology = Topology::new(floors);
    info!(
        floors = topology.floors.len(),
        access_points = topology.ap_count(),
        "generated topology"
    );
    Ok(topology)
}

/// Synthetic floors are numbered like seed floors: 0 for the first, then from 2.
fn synthetic_floor_number(slot: usize) -> u32 {
    if slot == 0 { 0 } else { slot as u32 + 1 }
}

/// Hands out unique opaque `AP-XXXXXX` names.
#[derive(Default)]
struct NameAllocator {
    used: HashSet<ApName>,
}

impl NameAllocator {
    fn next(&mut self, rng: &mut BenchRng) -> ApName {
        loop {
            let name = ApName::new(&format!("AP-{:06X}", rng.next_u32() & 0x00FF_FFFF));
            if self.used.insert(name.clone()) {
                return name;
            }
        }
    }
}

/// The seed floor a synthetic floor must draw its sensors from when floors are preserved.
///
/// Floor 0 maps to seed floor 0; floor `n >= 2` maps to `((n - 2) mod (seed_floors - 1)) + 2`.
pub fn congruent_seed_floor(floor: u32, seed_floors: usize) -> GenResult<u32> {
    if floor == 0 {
        return Ok(0);
    }
    let upper = seed_floors.saturating_sub(1) as u32;
    if upper == 0 || floor < 2 {
        return Err(GenError::FloorMapping { floor, seed_floors });
    }
    Ok((floor - 2) % upper + 2)
}

/// Assigns a seed sensor to every synthetic access point.
///
/// Access points are visited in floor order. Candidates are seed sensors
/// of the same location type, minus those already consumed at that
/// location. With `preserve_floors` a candidate must also sit on the
/// congruent seed floor. A candidate without partners only matches an
/// access point without partners; a candidate with partners only matches
/// one with an equally sized group, and then the whole group is assigned
/// in order. When no candidate matches, the location's consumed set is
/// cleared and the search retried once; a second failure is fatal.
pub fn assign_floors_to_ids(
    topology: &mut Topology,
    seed: &SeedModel,
    preserve_floors: bool,
) -> GenResult<()> {
    let secondary = seed.secondary_partners();
    let mut candidates: HashMap<LocationType, Vec<SensorId>> = HashMap::new();
    for sensor in seed.all_sensors().filter(|s| !secondary.contains(s)) {
        candidates
            .entry(seed.location_of(sensor))
            .or_default()
            .push(sensor.clone());
    }
    let floor_sets: HashMap<u32, HashSet<&SensorId>> = seed
        .floors
        .iter()
        .map(|f| (f.number, f.sensors.iter().collect()))
        .collect();

    let mut consumed: HashMap<LocationType, HashSet<SensorId>> = HashMap::new();
    let mut resets = 0usize;

    for floor in &mut topology.floors {
        let allowed = if preserve_floors {
            let seed_floor = congruent_seed_floor(floor.number, seed.floors.len())?;
            Some(
                floor_sets
                    .get(&seed_floor)
                    .ok_or(GenError::MissingSeedFloor(seed_floor))?,
            )
        } else {
            None
        };

        let mut failures = 0;
        let mut index = 0;
        while index < floor.aps.len() {
            if floor.aps[index].is_assigned() {
                index += 1;
                continue;
            }
            let location = floor.aps[index].location.clone();
            let pool = candidates
                .get(&location)
                .ok_or_else(|| GenError::NoCandidates {
                    location: location.clone(),
                })?;

            if assign_one(floor, index, pool, seed, allowed, &mut consumed) {
                failures = 0;
                index += 1;
                continue;
            }

            failures += 1;
            if failures >= 2 {
                let ap = &floor.aps[index];
                return Err(GenError::AssignmentExhausted {
                    ap: ap.name.clone(),
                    floor: floor.number,
                    location,
                });
            }
            debug!(floor = floor.number, %location, "candidates exhausted, resetting location");
            resets += 1;
            if let Some(set) = consumed.get_mut(&location) {
                set.clear();
            }
        }
    }

    info!(
        access_points = topology.ap_count(),
        distinct_sensors = topology.assignment_counts().len(),
        resets,
        "assigned seed sensors"
    );
    Ok(())
}

/// Tries each candidate in order. Returns whether the access point at `index` was assigned.
fn assign_one(
    floor: &mut Floor,
    index: usize,
    pool: &[SensorId],
    seed: &SeedModel,
    allowed: Option<&HashSet<&SensorId>>,
    consumed: &mut HashMap<LocationType, HashSet<SensorId>>,
) -> bool {
    let location = floor.aps[index].location.clone();
    let group_size = floor.aps[index].partners.len();

    for candidate in pool {
        if consumed.get(&location).is_some_and(|set| set.contains(candidate)) {
            continue;
        }
        if allowed.is_some_and(|set| !set.contains(candidate)) {
            continue;
        }
        let partners = seed.partners_of(candidate);
        if partners.len() != group_size {
            continue;
        }

        floor.aps[index].assigned = Some(candidate.clone());
        consumed.entry(location).or_default().insert(candidate.clone());

        let partner_indices = floor.aps[index].partners.clone();
        for (partner_index, sensor) in partner_indices.into_iter().zip(partners) {
            let partner = &mut floor.aps[partner_index];
            partner.assigned = Some(sensor.clone());
            consumed
                .entry(partner.location.clone())
                .or_default()
                .insert(sensor.clone());
        }
        return true;
    }
    false
}
