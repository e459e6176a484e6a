//! Metrics tabularization
//!
//! Turns one raw collection run into a row-per-timestamp feature matrix:
//! - canonical grid resolution
//! - per-series alignment with forward/backward/zero fill
//! - event binning into count and indicator columns
//! - CSV persistence of the finished matrix

mod align;
mod events;
mod grid;
mod matrix;
mod persist;

#[cfg(test)]
mod tests;

pub use align::{fill_column, AlignedColumn, AlignmentStrategy, IndexAlignment, TimestampAlignment};
pub use events::{
    bin_events, event_column_names, parse_event_timestamp, BinningStats, EventBinning, EventTime,
    TimeReconciler, TRACKED_EVENT_TYPES, TRACKED_REASONS,
};
pub use grid::{resolve_grid, CanonicalGrid, GridClock, TIMESTAMP_FORMAT};
pub use matrix::{column_name, FeatureMatrix, FeatureMatrixBuilder, FeatureRow};
pub use persist::{
    dataset_file_names, format_value, list_matrix_files, matrix_file_name, read_matrix_file,
    unique_path, write_matrix, write_table, LoadedMatrix, LoadedRow, MATRIX_FILE_PREFIX,
};

/// A named column holding exactly one value per grid row
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: Vec<f64>,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }
}
