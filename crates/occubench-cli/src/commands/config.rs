//! Configuration inspection commands.

use std::path::Path;

use anyhow::{Context, Result};
use occubench_config::BenchConfig;

use super::load_config;
use crate::Format;
use crate::style::{info_table, print_hint, print_section, print_success};

pub fn show(file: Option<&Path>, format: Format) -> Result<()> {
    let config = load_config(file)?;

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&config)?),
        Format::Toml => println!("{}", toml::to_string_pretty(&config)?),
        Format::Text => print_text(&config),
    }
    Ok(())
}

pub fn validate(file: Option<&Path>) -> Result<()> {
    let config = load_config(file)?;
    config.validate().context("Configuration is invalid")?;
    print_success("Configuration is valid");
    if !config.generator.seed_dir.exists() {
        print_hint(&format!(
            "seed directory {} does not exist yet",
            config.generator.seed_dir.display()
        ));
    }
    Ok(())
}

fn on_off(enabled: bool) -> String {
    let label = if enabled { "enabled" } else { "disabled" };
    label.to_string()
}

fn secs(value: i64) -> String {
    if value < 0 { "off".to_string() } else { format!("{value}s") }
}

fn print_text(config: &BenchConfig) {
    let b = &config.benchmark;
    print_section("Benchmark");
    println!(
        "{}",
        info_table(&[("Seed", b.seed.to_string()), ("Schema", format!("{:?}", b.schema))])
    );

    let g = &config.generator;
    print_section("Generator");
    println!(
        "{}",
        info_table(&[
            ("Population", on_off(g.enabled)),
            ("Seed data", g.seed_dir.display().to_string()),
            ("Dates", format!("{} .. {}", g.start_date, g.end_date)),
            (
                "Intervals",
                format!(
                    "source {}s, generated {}s",
                    g.source_interval_secs, g.generation_interval_secs
                ),
            ),
            (
                "Scale",
                format!(
                    "floors x{}, sensors x{}, clients x{}",
                    g.floor_scale, g.sensor_scale, g.client_scale
                ),
            ),
            ("Jitter max", g.jitter_max.to_string()),
            ("Preserve floors", g.preserve_floors.to_string()),
        ])
    );

    let i = &config.ingest;
    print_section("Ingest");
    println!(
        "{}",
        info_table(&[
            ("Ingest", on_off(i.enabled)),
            ("Backend", format!("{:?}", i.backend)),
            ("Dates", format!("{} .. {}", i.start_date, i.end_date)),
            (
                "Speed",
                i.desired_speed()
                    .map_or_else(|| "unthrottled".to_string(), |s| format!("{s} entries/s")),
            ),
            ("Threads", i.threads.to_string()),
            ("Shared instance", i.shared_instance.to_string()),
            ("Duration", secs(i.duration_secs)),
        ])
    );

    let q = &config.queries;
    print_section("Queries");
    println!(
        "{}",
        info_table(&[
            ("Queries", on_off(q.enabled)),
            ("Backend", format!("{:?}", q.backend)),
            ("Threads", q.threads.to_string()),
            ("Shared instance", q.shared_instance.to_string()),
            ("Duration", secs(q.duration_secs)),
            ("Warm-up", secs(q.warmup_secs)),
            (
                "Max count",
                q.target_count().map_or_else(|| "unbounded".to_string(), |n| n.to_string()),
            ),
            ("Weights", format!("{:?}", q.weights.as_array())),
            ("Freshness", format!("{:?}", q.freshness_polling())),
        ])
    );

    let o = &config.output;
    print_section("Output");
    println!(
        "{}",
        info_table(&[
            (
                "CSV directory",
                o.csv_dir
                    .as_ref()
                    .map_or_else(|| "-".to_string(), |d| d.display().to_string()),
            ),
            ("Save query results", o.save_query_results.to_string()),
        ])
    );
}
