//! `process`: raw collection runs to per-run feature matrices

use anyhow::{Context, Result};
use dataset_lib::{IssueType, RunProcessor, StructuredLogger};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tabled::Tabled;

use crate::config::Config;
use crate::output::{print_info, print_json, print_success, print_table, print_warning, OutputFormat};

/// Row for the processed runs table
#[derive(Tabled, Serialize)]
struct ProcessedRow {
    #[tabled(rename = "Source")]
    source: String,
    #[tabled(rename = "Output")]
    output: String,
    #[tabled(rename = "Label")]
    label: String,
    #[tabled(rename = "Rows")]
    rows: usize,
    #[tabled(rename = "Features")]
    features: usize,
    #[tabled(rename = "Events")]
    events: usize,
}

#[derive(Serialize)]
struct SkippedRow {
    source: String,
    reason: String,
}

#[derive(Serialize)]
struct ProcessReport {
    processed: Vec<ProcessedRow>,
    skipped: Vec<SkippedRow>,
}

/// Raw JSON files in a directory, sorted by name
fn raw_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read raw data directory {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().and_then(|e| e.to_str()) == Some("json"))
        .collect();
    files.sort();
    Ok(files)
}

/// Tabularize every given run (or every run in the raw directory)
pub fn run(
    config: &Config,
    logger: StructuredLogger,
    inputs: Vec<PathBuf>,
    output_dir: Option<PathBuf>,
    label: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let mut processor_config = config.processor_config()?;
    if let Some(label) = label {
        let issue = label
            .parse::<IssueType>()
            .with_context(|| format!("Invalid --label {label:?}"))?;
        processor_config.label_override = Some(issue);
    }

    let inputs = if inputs.is_empty() {
        raw_files(&config.raw_dir)?
    } else {
        inputs
    };
    if inputs.is_empty() {
        print_warning(&format!(
            "No raw collection files found in {}",
            config.raw_dir.display()
        ));
        return Ok(());
    }

    let output_dir = output_dir.unwrap_or_else(|| config.processed_dir.clone());
    let processor = RunProcessor::new(processor_config).with_logger(logger);
    let outcome = processor
        .process_batch(&inputs, &output_dir)
        .context("Failed to process collection runs")?;

    let report = ProcessReport {
        processed: outcome
            .processed
            .iter()
            .map(|p| ProcessedRow {
                source: p.source.display().to_string(),
                output: p.output.display().to_string(),
                label: p.label.to_string(),
                rows: p.rows,
                features: p.feature_columns,
                events: p.event_stats.binned,
            })
            .collect(),
        skipped: outcome
            .skipped
            .iter()
            .map(|s| SkippedRow {
                source: s.source.display().to_string(),
                reason: s.reason.clone(),
            })
            .collect(),
    };

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Table => {
            print_table(&report.processed);
            for skipped in &report.skipped {
                print_warning(&format!("Skipped {}: {}", skipped.source, skipped.reason));
            }
            print_success(&format!(
                "Processed {} of {} runs into {}",
                report.processed.len(),
                inputs.len(),
                output_dir.display()
            ));
            if report.processed.iter().any(|p| p.features == 0) {
                print_info("Some runs produced no metric columns; only event and label columns were written");
            }
        }
    }

    Ok(())
}
