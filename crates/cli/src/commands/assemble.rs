//! `assemble`: per-run matrices to train/test datasets

use anyhow::{Context, Result};
use chrono::Utc;
use colored::Colorize;
use dataset_lib::{AssemblyReport, DatasetAssembler, StructuredLogger};
use serde::Serialize;
use std::path::PathBuf;
use tabled::Tabled;

use crate::config::Config;
use crate::output::{color_share, print_heading, print_json, print_success, print_table, print_warning, OutputFormat};

/// Row for the label distribution table
#[derive(Tabled)]
struct LabelRow {
    #[tabled(rename = "Label")]
    label: String,
    #[tabled(rename = "Rows")]
    count: usize,
    #[tabled(rename = "Share")]
    share: String,
}

#[derive(Serialize)]
struct AssembleOutput<'a> {
    train_path: PathBuf,
    test_path: PathBuf,
    #[serde(flatten)]
    report: &'a AssemblyReport,
}

pub struct AssembleArgs {
    pub input_dir: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub test_split: Option<f64>,
    pub seed: Option<u64>,
}

/// Combine every matrix in the input directory and write the split
pub fn run(
    config: &Config,
    logger: StructuredLogger,
    args: AssembleArgs,
    format: OutputFormat,
) -> Result<()> {
    let mut assembler_config = config.assembler_config();
    if let Some(fraction) = args.test_split {
        assembler_config.test_fraction = fraction;
    }
    if let Some(seed) = args.seed {
        assembler_config.seed = seed;
    }

    let input_dir = args.input_dir.unwrap_or_else(|| config.processed_dir.clone());
    let output_dir = args.output_dir.unwrap_or_else(|| config.datasets_dir.clone());

    let assembler = DatasetAssembler::new(assembler_config)?.with_logger(logger);
    let (split, report) = assembler
        .assemble_dir(&input_dir)
        .with_context(|| format!("Failed to assemble dataset from {}", input_dir.display()))?;
    let (train_path, test_path) = assembler
        .write(&split, &output_dir, Utc::now().date_naive())
        .context("Failed to write dataset files")?;

    match format {
        OutputFormat::Json => print_json(&AssembleOutput {
            train_path,
            test_path,
            report: &report,
        })?,
        OutputFormat::Table => {
            print_heading("Dataset Summary");
            println!("Matrix files:           {}", report.files_loaded);
            println!("Total rows:             {}", report.total_rows);
            println!("Training rows:          {}", report.train_rows);
            println!("Testing rows:           {}", report.test_rows);
            println!("Columns:                {}", split.columns.len());
            println!();

            println!("{}", "Label Distribution".bold());
            println!("{}", "-".repeat(50));
            let rows: Vec<LabelRow> = report
                .labels
                .iter()
                .map(|stat| LabelRow {
                    label: stat.label.clone(),
                    count: stat.count,
                    share: color_share(stat.percentage),
                })
                .collect();
            print_table(&rows);
            println!();

            for skipped in &report.skipped_files {
                print_warning(&format!("Skipped {}", skipped.display()));
            }
            print_success(&format!("Training data saved to {}", train_path.display()));
            print_success(&format!("Testing data saved to {}", test_path.display()));
        }
    }

    Ok(())
}
