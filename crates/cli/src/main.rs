//! Cluster issue dataset CLI
//!
//! Turns raw collection runs into per-run feature matrices and assembles
//! those matrices into shuffled train/test datasets.

mod commands;
mod config;
mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use commands::{assemble, inspect, process};
use dataset_lib::{PipelineMetrics, StructuredLogger};
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const CLI_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Cluster issue dataset CLI
#[derive(Parser)]
#[command(name = "kdataset")]
#[command(author, version, about = "Build cluster issue classification datasets from collected metrics", long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to ~/.config/kdataset/config.toml)
    #[arg(long, env = "KDATASET_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, short, default_value = "table", global = true)]
    pub format: output::OutputFormat,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Write pipeline metrics in Prometheus text format to this file on exit
    #[arg(long, env = "KDATASET_METRICS_FILE", global = true)]
    pub metrics_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Tabularize raw collection runs into feature matrices
    Process {
        /// Raw collection JSON files (defaults to every file in raw_dir)
        inputs: Vec<PathBuf>,

        /// Directory for the feature matrices
        #[arg(long, short)]
        output_dir: Option<PathBuf>,

        /// Override the cluster issue type recorded in the runs
        #[arg(long, short)]
        label: Option<String>,
    },

    /// Combine feature matrices into training and testing datasets
    Assemble {
        /// Directory holding processed_metrics_*.csv files
        #[arg(long, short)]
        input_dir: Option<PathBuf>,

        /// Directory for the dataset files
        #[arg(long, short)]
        output_dir: Option<PathBuf>,

        /// Fraction of rows placed in the testing set
        #[arg(long)]
        test_split: Option<f64>,

        /// Shuffle seed
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Summarize one raw collection run
    Inspect {
        /// Raw collection JSON file
        input: PathBuf,
    },
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Process { .. } => "process",
            Commands::Assemble { .. } => "assemble",
            Commands::Inspect { .. } => "inspect",
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so table/JSON output on stdout stays clean
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(fmt::layer().json().with_writer(std::io::stderr))
        .init();

    let config = config::Config::load(cli.config.as_deref())?;
    debug!(?config, "Configuration loaded");

    let instance = std::env::var("HOSTNAME").unwrap_or_else(|_| "local".to_string());
    let logger = StructuredLogger::new(instance);
    logger.log_startup(CLI_VERSION, cli.command.name());

    let metrics = PipelineMetrics::new();

    let result = match cli.command {
        Commands::Process {
            inputs,
            output_dir,
            label,
        } => process::run(&config, logger, inputs, output_dir, label, cli.format),
        Commands::Assemble {
            input_dir,
            output_dir,
            test_split,
            seed,
        } => assemble::run(
            &config,
            logger,
            assemble::AssembleArgs {
                input_dir,
                output_dir,
                test_split,
                seed,
            },
            cli.format,
        ),
        Commands::Inspect { input } => inspect::run(&config, &input, cli.format),
    };

    if let Some(path) = &cli.metrics_file {
        let text = metrics.render().context("Failed to render metrics")?;
        std::fs::write(path, text)
            .with_context(|| format!("Failed to write metrics to {}", path.display()))?;
    }

    result
}
