//! CSV persistence for feature matrices and dataset splits
//!
//! Every file is written to a temporary sibling first and renamed into
//! place, so readers never observe a partially written table.

use super::matrix::FeatureMatrix;
use crate::error::{PipelineError, Result};
use crate::models::{IssueType, LABEL_COLUMN, TIMESTAMP_COLUMN};
use chrono::{NaiveDate, NaiveDateTime};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File name prefix of per-run matrices
pub const MATRIX_FILE_PREFIX: &str = "processed_metrics_";

const MATRIX_FILE_EXTENSION: &str = "csv";

/// Format a value so that parsing it back yields the identical `f64`
pub fn format_value(value: f64) -> String {
    value.to_string()
}

/// `processed_metrics_<YYYYMMDD_HHMMSS>_<label>.csv`
pub fn matrix_file_name(label: IssueType, at: NaiveDateTime) -> String {
    format!(
        "{}{}_{}.{}",
        MATRIX_FILE_PREFIX,
        at.format("%Y%m%d_%H%M%S"),
        label,
        MATRIX_FILE_EXTENSION
    )
}

/// `training_data_<YYYYMMDD>.csv` and `testing_data_<YYYYMMDD>.csv`
pub fn dataset_file_names(date: NaiveDate) -> (String, String) {
    let stamp = date.format("%Y%m%d");
    (
        format!("training_data_{stamp}.{MATRIX_FILE_EXTENSION}"),
        format!("testing_data_{stamp}.{MATRIX_FILE_EXTENSION}"),
    )
}

/// Path in `dir` for `file_name`, suffixed `_<n>` if the name is taken
pub fn unique_path(dir: &Path, file_name: &str) -> PathBuf {
    let candidate = dir.join(file_name);
    if !candidate.exists() {
        return candidate;
    }

    let (stem, ext) = match file_name.rsplit_once('.') {
        Some((stem, ext)) => (stem, format!(".{ext}")),
        None => (file_name, String::new()),
    };
    (1..)
        .map(|n| dir.join(format!("{stem}_{n}{ext}")))
        .find(|p| !p.exists())
        .unwrap_or(candidate)
}

/// Write a header and rows as CSV, atomically replacing `path`
pub fn write_table<I>(path: &Path, header: &[String], rows: I) -> Result<()>
where
    I: IntoIterator<Item = Vec<String>>,
{
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
        }
    }

    let temp_path = path.with_extension("tmp");
    let file = File::create(&temp_path).map_err(|e| PipelineError::io(&temp_path, e))?;
    let mut writer = csv::Writer::from_writer(file);

    writer.write_record(header)?;
    let mut count = 0usize;
    for row in rows {
        writer.write_record(&row)?;
        count += 1;
    }

    let file = writer
        .into_inner()
        .map_err(|e| PipelineError::io(&temp_path, e.into_error()))?;
    file.sync_all()
        .map_err(|e| PipelineError::io(&temp_path, e))?;

    std::fs::rename(&temp_path, path).map_err(|e| PipelineError::io(path, e))?;
    debug!(path = %path.display(), rows = count, "Table written");
    Ok(())
}

/// Persist one feature matrix
pub fn write_matrix(matrix: &FeatureMatrix, path: &Path) -> Result<()> {
    let rows = matrix.rows().map(|row| {
        std::iter::once(row.timestamp)
            .chain(row.values.into_iter().map(format_value))
            .chain(std::iter::once(row.label.to_string()))
            .collect()
    });
    write_table(path, &matrix.header(), rows)
}

/// One row of a reloaded matrix file
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedRow {
    pub timestamp: String,
    /// `None` for empty cells
    pub values: Vec<Option<f64>>,
    pub label: String,
}

/// A matrix file read back from disk
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedMatrix {
    pub path: PathBuf,
    /// Numeric columns, excluding timestamp and label
    pub columns: Vec<String>,
    pub rows: Vec<LoadedRow>,
}

/// Read a persisted matrix, rejecting anything that is not a well-formed table
pub fn read_matrix_file(path: &Path) -> Result<LoadedMatrix> {
    let corrupt = |reason: String| PipelineError::MissingOrCorruptMatrixFile {
        path: path.to_path_buf(),
        reason,
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|e| corrupt(e.to_string()))?;

    let headers = reader.headers().map_err(|e| corrupt(e.to_string()))?.clone();
    if headers.get(0) != Some(TIMESTAMP_COLUMN) {
        return Err(corrupt(format!("first column is not {TIMESTAMP_COLUMN:?}")));
    }
    let label_idx = headers
        .iter()
        .position(|h| h == LABEL_COLUMN)
        .ok_or_else(|| corrupt(format!("missing {LABEL_COLUMN:?} column")))?;

    let columns: Vec<String> = headers
        .iter()
        .enumerate()
        .filter(|(idx, _)| *idx != 0 && *idx != label_idx)
        .map(|(_, h)| h.to_string())
        .collect();

    let mut rows = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record.map_err(|e| corrupt(e.to_string()))?;
        let mut values = Vec::with_capacity(columns.len());
        for (idx, cell) in record.iter().enumerate() {
            if idx == 0 || idx == label_idx {
                continue;
            }
            let cell = cell.trim();
            if cell.is_empty() {
                values.push(None);
                continue;
            }
            let value = cell.parse::<f64>().map_err(|_| {
                corrupt(format!("non-numeric value {cell:?} in data row {}", line + 1))
            })?;
            values.push(Some(value));
        }
        rows.push(LoadedRow {
            timestamp: record.get(0).unwrap_or_default().to_string(),
            values,
            label: record.get(label_idx).unwrap_or_default().to_string(),
        });
    }

    Ok(LoadedMatrix {
        path: path.to_path_buf(),
        columns,
        rows,
    })
}

/// Matrix files in `dir`, sorted by file name
pub fn list_matrix_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|e| PipelineError::io(dir, e))?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .map(|n| {
                    n.starts_with(MATRIX_FILE_PREFIX)
                        && n.ends_with(&format!(".{MATRIX_FILE_EXTENSION}"))
                })
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    Ok(files)
}
