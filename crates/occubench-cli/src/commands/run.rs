//! Full benchmark run.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use occubench_config::Paths;
use occubench_core::{Benchmark, IngestReport, QueryReport, RunReport};
use occubench_targets::TargetRegistry;
use tracing::info;

use super::load_config;
use crate::style::{
    grid, info_table, print_labeled, print_path, print_section, print_success, print_warn,
    stats_table,
};

pub fn run(file: Option<&Path>, seed: Option<u64>) -> Result<()> {
    let mut config = load_config(file)?;
    if let Some(seed) = seed {
        config.benchmark.seed = seed;
    }
    let seed = config.benchmark.seed;
    let save_results = config.output.save_query_results;

    let registry = TargetRegistry::new(&config);
    let prepared = Benchmark::new(config)?
        .prepare()
        .context("Failed to prepare the benchmark")?;
    info!(
        seed,
        floors = prepared.topology().floors.len(),
        access_points = prepared.topology().ap_count(),
        "benchmark prepared"
    );

    let report = prepared.run(&registry)?;
    print_report(&report);

    if let (true, Some(queries)) = (save_results, &report.queries) {
        let dir = Paths::results_dir(std::env::current_dir()?);
        let path = write_records(&dir, seed, queries)?;
        print_path("Query results", &path);
    }

    let ingest_failed = report.ingest.as_ref().is_some_and(IngestReport::failed);
    let queries_failed = report.queries.as_ref().is_some_and(QueryReport::failed);
    anyhow::ensure!(
        !ingest_failed && !queries_failed,
        "At least one worker thread failed; see the log for details"
    );
    if report.stopped_early() {
        print_warn("Ingestion stopped early; the backend may have reported an error");
    } else {
        print_success(&format!(
            "Benchmark finished in {:.1}s",
            report.elapsed.as_secs_f64()
        ));
    }
    Ok(())
}

fn print_report(report: &RunReport) {
    if let Some(population) = &report.population {
        print_section("Population");
        println!(
            "{}",
            info_table(&[
                ("Entries", population.entries.to_string()),
                ("Readings", population.readings.to_string()),
                ("Elapsed", format!("{:.1}s", population.elapsed.as_secs_f64())),
            ])
        );
    }

    if let Some(ingest) = &report.ingest {
        print_section("Ingestion");
        let rows = ingest
            .threads
            .iter()
            .map(|t| {
                vec![
                    t.name.clone(),
                    t.entries.to_string(),
                    t.readings.to_string(),
                    format!("{:.0}", t.entries_per_sec()),
                    t.error.clone().unwrap_or_default(),
                ]
            })
            .collect();
        println!(
            "{}",
            grid(&["Thread", "Entries", "Readings", "Entries/s", "Error"], rows)
        );
        print_labeled("Total entries", &ingest.total_entries().to_string());
    }

    if let Some(queries) = &report.queries {
        print_section("Queries");
        println!("{}", stats_table(&queries.stats.rows()));
        print_labeled("Total queries", &queries.stats.total().to_string());
        for thread in &queries.threads {
            if let Some(error) = &thread.error {
                print_warn(&format!("{} failed: {error}", thread.name));
            }
        }
    }
}

/// Writes every saved query result as one JSON object per line.
fn write_records(dir: &Path, seed: u64, report: &QueryReport) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    let path = dir.join(format!("queries-{seed}.jsonl"));
    let file = File::create(&path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut out = BufWriter::new(file);
    for record in report.records() {
        serde_json::to_writer(&mut out, record)?;
        writeln!(out)?;
    }
    out.flush()?;
    Ok(path)
}
