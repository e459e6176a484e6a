//! Train/test dataset assembly
//!
//! Concatenates many per-run matrices with an outer join on columns,
//! shuffles the rows with a fixed seed and splits them by position.

use crate::error::{PipelineError, Result};
use crate::models::{LABEL_COLUMN, TIMESTAMP_COLUMN};
use crate::observability::{PipelineMetrics, StructuredLogger};
use crate::tabular::{
    dataset_file_names, format_value, list_matrix_files, read_matrix_file, write_table,
    LoadedMatrix,
};
use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default fraction of rows placed in the test split
pub const DEFAULT_TEST_FRACTION: f64 = 0.2;

/// Default shuffle seed
pub const DEFAULT_SHUFFLE_SEED: u64 = 42;

/// Configuration for dataset assembly
#[derive(Debug, Clone)]
pub struct AssemblerConfig {
    /// Fraction of shuffled rows that become the test set
    pub test_fraction: f64,
    /// Seed for the row shuffle
    pub seed: u64,
    /// Value for cells a matrix does not provide
    pub fill_value: f64,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            test_fraction: DEFAULT_TEST_FRACTION,
            seed: DEFAULT_SHUFFLE_SEED,
            fill_value: 0.0,
        }
    }
}

/// One row of the combined dataset
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetRow {
    pub timestamp: String,
    /// One value per column of the combined table
    pub values: Vec<f64>,
    pub label: String,
}

/// All input rows under the union of all input columns
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CombinedTable {
    pub columns: Vec<String>,
    pub rows: Vec<DatasetRow>,
}

/// Shuffled rows divided into train and test sets
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatasetSplit {
    pub columns: Vec<String>,
    pub train: Vec<DatasetRow>,
    pub test: Vec<DatasetRow>,
}

impl DatasetSplit {
    pub fn total_rows(&self) -> usize {
        self.train.len() + self.test.len()
    }
}

/// Count and share of one label in the combined set
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelStat {
    pub label: String,
    pub count: usize,
    pub percentage: f64,
}

/// Summary of one assembly pass
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AssemblyReport {
    pub files_loaded: usize,
    pub files_skipped: usize,
    pub skipped_files: Vec<PathBuf>,
    pub total_rows: usize,
    pub train_rows: usize,
    pub test_rows: usize,
    pub labels: Vec<LabelStat>,
}

/// Per-label counts, largest first, ties by label name
pub fn label_distribution(rows: &[DatasetRow]) -> Vec<LabelStat> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for row in rows {
        *counts.entry(row.label.as_str()).or_default() += 1;
    }

    let total = rows.len();
    let mut stats: Vec<LabelStat> = counts
        .into_iter()
        .map(|(label, count)| LabelStat {
            label: label.to_string(),
            count,
            percentage: count as f64 / total as f64 * 100.0,
        })
        .collect();
    stats.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));
    stats
}

/// Combines persisted matrices into train/test datasets
pub struct DatasetAssembler {
    config: AssemblerConfig,
    metrics: PipelineMetrics,
    logger: StructuredLogger,
}

impl DatasetAssembler {
    pub fn new(config: AssemblerConfig) -> Result<Self> {
        if !(0.0..=1.0).contains(&config.test_fraction) {
            return Err(PipelineError::InvalidTestFraction(config.test_fraction));
        }
        Ok(Self {
            config,
            metrics: PipelineMetrics::new(),
            logger: StructuredLogger::new("local"),
        })
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    /// Read every file, skipping (and reporting) the unusable ones
    pub fn load(&self, paths: &[PathBuf]) -> (Vec<LoadedMatrix>, Vec<PathBuf>) {
        let mut loaded = Vec::new();
        let mut skipped = Vec::new();

        for path in paths {
            match read_matrix_file(path) {
                Ok(matrix) => {
                    self.metrics.inc_matrix_files_loaded();
                    loaded.push(matrix);
                }
                Err(e) => {
                    self.metrics.inc_matrix_files_skipped();
                    self.logger.log_matrix_skipped(path, &e.to_string());
                    skipped.push(path.clone());
                }
            }
        }

        (loaded, skipped)
    }

    /// Concatenate matrices under the union of their columns
    pub fn combine(&self, matrices: &[LoadedMatrix]) -> CombinedTable {
        let mut columns: Vec<String> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();
        for matrix in matrices {
            for column in &matrix.columns {
                if !positions.contains_key(column) {
                    positions.insert(column.clone(), columns.len());
                    columns.push(column.clone());
                }
            }
        }

        let mut rows = Vec::with_capacity(matrices.iter().map(|m| m.rows.len()).sum());
        for matrix in matrices {
            let mapping: Vec<usize> = matrix.columns.iter().map(|c| positions[c]).collect();
            for row in &matrix.rows {
                let mut values = vec![self.config.fill_value; columns.len()];
                for (value, &target) in row.values.iter().zip(&mapping) {
                    values[target] = value.unwrap_or(self.config.fill_value);
                }
                rows.push(DatasetRow {
                    timestamp: row.timestamp.clone(),
                    values,
                    label: row.label.clone(),
                });
            }
        }

        debug!(
            matrices = matrices.len(),
            columns = columns.len(),
            rows = rows.len(),
            "Combined feature matrices"
        );
        CombinedTable { columns, rows }
    }

    /// Number of test rows for a combined table of `total` rows
    pub fn test_len(&self, total: usize) -> usize {
        ((self.config.test_fraction * total as f64).round() as usize).min(total)
    }

    /// Shuffle with the configured seed and split by position
    pub fn split(&self, table: CombinedTable) -> DatasetSplit {
        let CombinedTable { columns, mut rows } = table;
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        rows.shuffle(&mut rng);

        let test_len = self.test_len(rows.len());
        let train = rows.split_off(test_len);
        DatasetSplit {
            columns,
            train,
            test: rows,
        }
    }

    /// Load, combine and split the given files
    pub fn assemble(&self, paths: &[PathBuf]) -> Result<(DatasetSplit, AssemblyReport)> {
        let (matrices, skipped) = self.load(paths);
        if matrices.is_empty() {
            return Err(PipelineError::NoMatrixFiles {
                skipped: skipped.len(),
            });
        }

        let table = self.combine(&matrices);
        let labels = label_distribution(&table.rows);
        let split = self.split(table);

        let report = AssemblyReport {
            files_loaded: matrices.len(),
            files_skipped: skipped.len(),
            skipped_files: skipped,
            total_rows: split.total_rows(),
            train_rows: split.train.len(),
            test_rows: split.test.len(),
            labels,
        };

        for stat in &report.labels {
            self.logger
                .log_label_share(&stat.label, stat.count, stat.percentage);
        }
        self.metrics
            .set_dataset_rows(report.train_rows, report.test_rows);

        Ok((split, report))
    }

    /// Assemble every `processed_metrics_*.csv` in a directory
    pub fn assemble_dir(&self, input_dir: &Path) -> Result<(DatasetSplit, AssemblyReport)> {
        let paths = list_matrix_files(input_dir)?;
        debug!(dir = %input_dir.display(), files = paths.len(), "Found matrix files");
        self.assemble(&paths)
    }

    /// Write the split as `training_data_<date>.csv` / `testing_data_<date>.csv`
    pub fn write(
        &self,
        split: &DatasetSplit,
        output_dir: &Path,
        date: NaiveDate,
    ) -> Result<(PathBuf, PathBuf)> {
        let (train_name, test_name) = dataset_file_names(date);
        let train_path = output_dir.join(train_name);
        let test_path = output_dir.join(test_name);

        let header: Vec<String> = std::iter::once(TIMESTAMP_COLUMN.to_string())
            .chain(split.columns.iter().cloned())
            .chain(std::iter::once(LABEL_COLUMN.to_string()))
            .collect();

        write_table(&train_path, &header, split.train.iter().map(row_record))?;
        write_table(&test_path, &header, split.test.iter().map(row_record))?;

        self.logger.log_dataset_written(
            &train_path,
            split.train.len(),
            &test_path,
            split.test.len(),
        );
        Ok((train_path, test_path))
    }
}

fn row_record(row: &DatasetRow) -> Vec<String> {
    std::iter::once(row.timestamp.clone())
        .chain(row.values.iter().map(|v| format_value(*v)))
        .chain(std::iter::once(row.label.clone()))
        .collect()
}
