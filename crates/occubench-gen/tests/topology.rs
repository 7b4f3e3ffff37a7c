//! Topology, assignment and normalization over a multi-floor seed.

mod common;

use std::collections::{HashMap, HashSet};

use occubench_config::GeneratorConfig;
use occubench_gen::{
    BenchRng, TopologySettings, assign_floors_to_ids, congruent_seed_floor, generate_topology,
    normalize_probabilities, prepare_topology,
};
use occubench_types::{LocationType, SensorId, Topology};
use proptest::prelude::*;

fn assigned(seed: &occubench_types::SeedModel, floor_scale: f64, preserve: bool, rng_seed: u64) -> Topology {
    let settings = TopologySettings {
        floor_scale,
        sensor_scale: 1.0,
    };
    let mut topology = generate_topology(seed, settings, &mut BenchRng::new(rng_seed)).unwrap();
    assign_floors_to_ids(&mut topology, seed, preserve).unwrap();
    topology
}

fn assert_sums_to_one(seed: &occubench_types::SeedModel, topology: &Topology) {
    for entry in seed.entries.values().flatten() {
        let Some(probabilities) = &entry.probabilities else {
            continue;
        };
        let present: Vec<f64> = topology
            .access_points()
            .filter_map(|ap| probabilities.get(ap.assigned.as_ref().unwrap()).copied())
            .collect();
        if present.is_empty() {
            continue;
        }
        let sum: f64 = present.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9, "entry at {} sums to {sum}", entry.time);
    }
}

#[test]
fn normalization_conserves_probability() {
    let mut seed = common::campus();
    let topology = assigned(&seed, 2.0, true, 11);
    normalize_probabilities(&topology, &mut seed);
    assert_sums_to_one(&seed, &topology);
}

#[test]
fn assignment_is_complete_and_unique_per_location() {
    let mut seed = common::campus();
    seed.locations
        .insert(SensorId::from("f1"), LocationType::new("lecture"));
    seed.locations
        .insert(SensorId::from("s1"), LocationType::new("lecture"));

    let topology = assigned(&seed, 1.0, false, 3);
    assert!(topology.is_fully_assigned());

    let mut seen: HashMap<LocationType, HashSet<SensorId>> = HashMap::new();
    for ap in topology.access_points() {
        let sensor = ap.assigned.clone().unwrap();
        assert!(
            seen.entry(ap.location.clone()).or_default().insert(sensor.clone()),
            "{sensor} assigned twice at {}",
            ap.location
        );
    }
}

#[test]
fn preserved_floors_are_congruent() {
    let seed = common::campus();
    let topology = assigned(&seed, 3.5, true, 21);
    assert!(topology.floors.len() >= 10);

    for floor in &topology.floors {
        let seed_floor = congruent_seed_floor(floor.number, seed.floors.len()).unwrap();
        let sensors = seed.sensors_on_floor(seed_floor).unwrap();
        for ap in &floor.aps {
            assert!(sensors.contains(ap.assigned.as_ref().unwrap()));
        }
    }
}

#[test]
fn same_seed_same_topology() {
    let seed = common::campus();
    assert_eq!(assigned(&seed, 2.0, true, 77), assigned(&seed, 2.0, true, 77));
    assert_ne!(
        assigned(&seed, 2.0, true, 77).ap_names(),
        assigned(&seed, 2.0, true, 78).ap_names()
    );
}

#[test]
fn prepare_topology_runs_every_step() {
    let mut seed = common::campus();
    seed.combined
        .insert(SensorId::from("g1"), vec![SensorId::from("gx")]);
    let config = GeneratorConfig {
        floor_scale: 1.5,
        sensor_scale: 2.0,
        ..GeneratorConfig::default()
    };
    let topology = prepare_topology(&mut seed, &config, &mut BenchRng::new(5)).unwrap();

    assert!(topology.is_fully_assigned());
    assert!(seed.combined.is_empty());
    assert_sums_to_one(&seed, &topology);
}

proptest! {
    #[test]
    fn conservation_holds_for_arbitrary_shares(
        shares in proptest::collection::vec(0.001f64..1.0, 8),
        floor_scale in 1.0f64..3.0,
        rng_seed in any::<u64>(),
    ) {
        let mut seed = common::campus();
        let day = common::date(2019, 1, 3);
        let names = ["g1", "g2", "f1", "f2", "f3", "s1", "s2", "s3"];
        let pairs: Vec<(&str, f64)> = names.iter().copied().zip(shares).collect();
        seed.entries.insert(day, vec![common::entry(day, 0, 50, &pairs)]);

        let topology = assigned(&seed, floor_scale, true, rng_seed);
        normalize_probabilities(&topology, &mut seed);

        let probabilities = seed.entries[&day][0].probabilities.as_ref().unwrap();
        let sum: f64 = topology
            .access_points()
            .map(|ap| probabilities[ap.assigned.as_ref().unwrap()])
            .sum();
        prop_assert!((sum - 1.0).abs() < 1e-9);
    }
}
