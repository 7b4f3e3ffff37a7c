//! Subcommand implementations.

pub mod config;
pub mod generate;
pub mod run;
pub mod topology;
pub mod version;

use std::path::Path;

use anyhow::{Context, Result};
use occubench_config::{BenchConfig, ConfigLoader};

/// Merges every configuration source, with `file` on top when given.
pub fn load_config(file: Option<&Path>) -> Result<BenchConfig> {
    let mut loader = ConfigLoader::new();
    if let Some(file) = file {
        anyhow::ensure!(file.exists(), "Config file {} does not exist", file.display());
        loader = loader.with_file(file);
    }
    loader.load().context("Failed to load configuration")
}
