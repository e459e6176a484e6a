//! Configuration management for the CLI
//!
//! Layered with the `config` crate: built-in defaults, then an optional TOML
//! file, then `KDATASET_*` environment variables.

use anyhow::{Context, Result};
use dataset_lib::dataset::{DEFAULT_SHUFFLE_SEED, DEFAULT_TEST_FRACTION};
use dataset_lib::pipeline::{AlignmentKind, ProcessorConfig, DEFAULT_ALIGNMENT_TOLERANCE_SECS};
use dataset_lib::tabular::GridClock;
use dataset_lib::AssemblerConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const ENV_PREFIX: &str = "KDATASET";

/// CLI configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding raw collection JSON files
    pub raw_dir: PathBuf,
    /// Directory for per-run feature matrices
    pub processed_dir: PathBuf,
    /// Directory for train/test datasets
    pub datasets_dir: PathBuf,
    pub test_split: f64,
    pub shuffle_seed: u64,
    /// Value for cells a matrix does not provide when combining runs
    pub fill_value: f64,
    /// `index` or `timestamp`
    pub alignment: String,
    pub alignment_tolerance_secs: f64,
    /// Offset of grid timestamps from UTC; naive grid when unset
    pub grid_utc_offset_secs: Option<i32>,
    /// Metric categories to keep; all when unset
    pub categories: Option<Vec<String>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            raw_dir: PathBuf::from("data/raw"),
            processed_dir: PathBuf::from("data/processed"),
            datasets_dir: PathBuf::from("data/datasets"),
            test_split: DEFAULT_TEST_FRACTION,
            shuffle_seed: DEFAULT_SHUFFLE_SEED,
            fill_value: 0.0,
            alignment: "index".to_string(),
            alignment_tolerance_secs: DEFAULT_ALIGNMENT_TOLERANCE_SECS,
            grid_utc_offset_secs: None,
            categories: None,
        }
    }
}

impl Config {
    /// Load configuration from defaults, file and environment.
    ///
    /// An explicit `path` must exist; the default location is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let defaults = Self::default();
        let mut builder = config::Config::builder()
            .set_default("raw_dir", defaults.raw_dir.to_string_lossy().to_string())?
            .set_default(
                "processed_dir",
                defaults.processed_dir.to_string_lossy().to_string(),
            )?
            .set_default(
                "datasets_dir",
                defaults.datasets_dir.to_string_lossy().to_string(),
            )?
            .set_default("test_split", defaults.test_split)?
            .set_default("shuffle_seed", defaults.shuffle_seed)?
            .set_default("fill_value", defaults.fill_value)?
            .set_default("alignment", defaults.alignment)?
            .set_default("alignment_tolerance_secs", defaults.alignment_tolerance_secs)?;

        builder = match path {
            Some(path) => builder.add_source(config::File::from(path).required(true)),
            None => match Self::default_path() {
                Some(default_path) => {
                    builder.add_source(config::File::from(default_path).required(false))
                }
                None => builder,
            },
        };

        let config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("categories"),
            )
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to parse configuration")
    }

    /// `~/.config/kdataset/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs_next::home_dir().map(|home| home.join(".config").join("kdataset").join("config.toml"))
    }

    pub fn processor_config(&self) -> Result<ProcessorConfig> {
        let alignment = match self
            .alignment
            .parse::<AlignmentKind>()
            .map_err(anyhow::Error::msg)?
        {
            AlignmentKind::Timestamp { .. } => AlignmentKind::Timestamp {
                tolerance_secs: self.alignment_tolerance_secs,
            },
            index => index,
        };

        Ok(ProcessorConfig {
            clock: GridClock::from_offset_secs(self.grid_utc_offset_secs),
            alignment,
            categories: self.categories.clone(),
            label_override: None,
        })
    }

    pub fn assembler_config(&self) -> AssemblerConfig {
        AssemblerConfig {
            test_fraction: self.test_split,
            seed: self.shuffle_seed,
            fill_value: self.fill_value,
        }
    }
}
