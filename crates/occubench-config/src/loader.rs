//! Configuration loader with multi-source merging

use crate::{BenchConfig, Paths};
use anyhow::{Context, Result};
use std::env;
use std::path::{Path, PathBuf};

/// Configuration loader with builder pattern
pub struct ConfigLoader {
    project_dir: PathBuf,
    env_prefix: String,
    explicit_file: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new config loader with default project directory (current dir)
    pub fn new() -> Self {
        Self {
            project_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            env_prefix: "OCCUBENCH".to_string(),
            explicit_file: None,
        }
    }

    /// Set the project directory
    pub fn with_project_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.project_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Set the environment variable prefix (default: "OCCUBENCH")
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Layer an explicit config file above every other source.
    pub fn with_file(mut self, file: impl AsRef<Path>) -> Self {
        self.explicit_file = Some(file.as_ref().to_path_buf());
        self
    }

    /// TOML files below the environment layer, lowest precedence first.
    ///
    /// Missing files are skipped.
    fn file_layers(&self) -> Vec<PathBuf> {
        let mut layers = Vec::with_capacity(3);
        if let Ok(user) = Paths::new().user_config_file() {
            layers.push(user);
        }
        layers.push(Paths::project_config_file(&self.project_dir));
        layers.push(Paths::local_config_file(&self.project_dir));
        layers.retain(|path| path.exists());
        layers
    }

    /// Merges defaults, the user/project/local files, `{prefix}_*`
    /// variables and the explicit file, in that order, then resolves
    /// relative paths against the project directory.
    pub fn load(self) -> Result<BenchConfig> {
        let defaults = config::Config::try_from(&BenchConfig::default())
            .context("Failed to serialize built-in defaults")?;
        let mut builder = config::Config::builder().add_source(defaults);

        for path in self.file_layers() {
            builder = builder.add_source(toml_file(&path, false));
        }

        // OCCUBENCH_QUERIES__DURATION_SECS=30
        builder = builder.add_source(
            config::Environment::with_prefix(&self.env_prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        if let Some(file) = &self.explicit_file {
            builder = builder.add_source(toml_file(file, true));
        }

        let mut merged: BenchConfig = builder
            .build()
            .context("Failed to merge configuration sources")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        merged.resolve_paths(&self.project_dir);
        Ok(merged)
    }
}

fn toml_file(path: &Path, required: bool) -> config::File<config::FileSourceFile, config::FileFormat> {
    config::File::from(path)
        .required(required)
        .format(config::FileFormat::Toml)
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
