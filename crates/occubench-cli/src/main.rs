//! occubench command line.
//!
//! Drives synthetic Wi-Fi occupancy workloads against a backend.
//!
//! # Quick Start
//!
//! ```bash
//! # Inspect the merged configuration
//! occubench config show --format toml
//!
//! # Print the synthetic building
//! occubench topology
//!
//! # Populate, ingest and query with the default backend
//! occubench run --seed 42
//!
//! # Write the history to CSV without running anything else
//! occubench generate --out ./history
//! ```

mod commands;
mod style;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};

/// occubench - synthetic occupancy workloads for time-series backends.
#[derive(Parser)]
#[command(name = "occubench")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version information.
    Version,

    /// Run the full benchmark: population, ingestion and querying.
    Run {
        /// Config file layered above every other source.
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override the master seed.
        #[arg(short, long)]
        seed: Option<u64>,
    },

    /// Write the generator's history to CSV files and exit.
    Generate {
        /// Directory the CSV files are written to.
        #[arg(short, long)]
        out: PathBuf,

        /// Config file layered above every other source.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Print the synthetic floors and their sensor assignments.
    Topology {
        /// Config file layered above every other source.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Configuration commands.
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the merged configuration.
    Show {
        /// Output format.
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,

        /// Config file layered above every other source.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Validate the merged configuration without running anything.
    Validate {
        /// Config file layered above every other source.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum Format {
    Text,
    Json,
    Toml,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    style::set_no_color(cli.no_color || std::env::var_os("NO_COLOR").is_some());

    match cli.command {
        Commands::Version => {
            commands::version::run();
            Ok(())
        }
        Commands::Run { config, seed } => commands::run::run(config.as_deref(), seed),
        Commands::Generate { out, config } => commands::generate::run(config.as_deref(), &out),
        Commands::Topology { config } => commands::topology::run(config.as_deref()),
        Commands::Config(cmd) => match cmd {
            ConfigCommands::Show { format, config } => {
                commands::config::show(config.as_deref(), format)
            }
            ConfigCommands::Validate { config } => commands::config::validate(config.as_deref()),
        },
    }
}
