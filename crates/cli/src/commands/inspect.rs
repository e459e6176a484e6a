//! `inspect`: summary of one raw collection run

use anyhow::{Context, Result};
use dataset_lib::tabular::{bin_events, resolve_grid, GridClock};
use dataset_lib::load_raw_run;
use serde::Serialize;
use std::path::Path;
use tabled::Tabled;

use crate::config::Config;
use crate::output::{print_heading, print_json, print_table, print_warning, OutputFormat};

/// Row for the per-category table
#[derive(Tabled, Serialize)]
struct CategoryRow {
    #[tabled(rename = "Category")]
    category: String,
    #[tabled(rename = "Metrics")]
    metrics: usize,
    #[tabled(rename = "Series")]
    series: usize,
}

#[derive(Serialize)]
struct InspectReport {
    path: String,
    label: String,
    label_valid: bool,
    grid_len: usize,
    grid_start: Option<String>,
    grid_end: Option<String>,
    events: usize,
    events_binned: usize,
    categories: Vec<CategoryRow>,
}

/// Print grid length, series per category, event count and label
pub fn run(config: &Config, path: &Path, format: OutputFormat) -> Result<()> {
    let run = load_raw_run(path).with_context(|| format!("Failed to load {}", path.display()))?;
    let clock = GridClock::from_offset_secs(config.grid_utc_offset_secs);

    let (label, label_valid) = match run.metadata.issue_type() {
        Ok(issue) => (issue.to_string(), true),
        Err(_) => (
            run.metadata.cluster_issue_type.clone().unwrap_or_default(),
            false,
        ),
    };

    let grid = resolve_grid(&run, clock).ok();
    let (grid_len, grid_start, grid_end, events_binned) = match &grid {
        Some(grid) => (
            grid.len(),
            Some(grid.format_timestamp(0)),
            Some(grid.format_timestamp(grid.len() - 1)),
            bin_events(&run.events, grid).stats.binned,
        ),
        None => (0, None, None, 0),
    };

    let report = InspectReport {
        path: path.display().to_string(),
        label,
        label_valid,
        grid_len,
        grid_start,
        grid_end,
        events: run.events.len(),
        events_binned,
        categories: run
            .categories
            .iter()
            .map(|c| CategoryRow {
                category: c.name.clone(),
                metrics: c.metrics.len(),
                series: c.series_count(),
            })
            .collect(),
    };

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Table => {
            print_heading("Collection Run");
            println!("File:                   {}", report.path);
            println!("Label:                  {}", report.label);
            println!("Grid rows:              {}", report.grid_len);
            if let (Some(start), Some(end)) = (&report.grid_start, &report.grid_end) {
                println!("Time range:             {} .. {}", start, end);
            }
            println!(
                "Events:                 {} ({} binned)",
                report.events, report.events_binned
            );
            println!();
            print_table(&report.categories);

            if !report.label_valid {
                print_warning(&format!(
                    "Unknown cluster issue type {:?}; this run would be skipped",
                    report.label
                ));
            }
            if grid.is_none() {
                print_warning("No series has any samples; this run would be skipped");
            }
        }
    }

    Ok(())
}
