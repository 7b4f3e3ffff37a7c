//! Prints the synthetic building.

use std::path::Path;

use anyhow::{Context, Result};
use occubench_core::Benchmark;

use super::load_config;
use crate::style::{grid, print_labeled, print_section};

pub fn run(file: Option<&Path>) -> Result<()> {
    let config = load_config(file)?;
    let prepared = Benchmark::new(config)?
        .prepare()
        .context("Failed to build the topology")?;
    let topology = prepared.topology();

    let rows = topology
        .floors
        .iter()
        .flat_map(|floor| {
            floor.aps.iter().map(move |ap| {
                vec![
                    floor.number.to_string(),
                    floor.template.clone(),
                    ap.name.to_string(),
                    ap.location.to_string(),
                    ap.assigned
                        .as_ref()
                        .map_or_else(|| "-".to_string(), ToString::to_string),
                ]
            })
        })
        .collect();

    print_section("Topology");
    println!(
        "{}",
        grid(&["Floor", "Template", "Access point", "Location", "Sensor"], rows)
    );
    print_labeled("Floors", &topology.floors.len().to_string());
    print_labeled("Access points", &topology.ap_count().to_string());
    print_labeled("Seed floors", &prepared.seed().floors.len().to_string());
    Ok(())
}
