//! Population-only run into CSV files.

use std::path::Path;

use anyhow::{Context, Result};
use occubench_config::BackendKind;
use occubench_core::Benchmark;
use occubench_targets::TargetRegistry;

use super::load_config;
use crate::style::{print_labeled, print_path, print_success, print_warn};

pub fn run(file: Option<&Path>, out: &Path) -> Result<()> {
    let mut config = load_config(file)?;
    config.generator.enabled = true;
    config.ingest.enabled = false;
    config.queries.enabled = false;
    config.ingest.backend = BackendKind::Csv;
    config.output.csv_dir = Some(out.to_path_buf());

    let (start, end) = (config.generator.start_date, config.generator.end_date);
    let registry = TargetRegistry::new(&config);
    let mut prepared = Benchmark::new(config)?
        .prepare()
        .context("Failed to prepare the generator")?;
    let report = prepared.populate(&registry)?;

    if report.stopped_early {
        print_warn("Generation stopped early");
    } else {
        print_success(&format!(
            "Generated {start} .. {end} in {:.1}s",
            report.elapsed.as_secs_f64()
        ));
    }
    print_labeled("Entries", &report.entries.to_string());
    print_labeled("Readings", &report.readings.to_string());
    print_path("Output", out);
    Ok(())
}
