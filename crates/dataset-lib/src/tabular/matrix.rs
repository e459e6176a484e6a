//! Feature matrix assembly
//!
//! Collects aligned metric columns, applies the fill policy, appends the
//! fixed event columns and the constant scenario label.

use super::align::{fill_column, AlignedColumn, AlignmentStrategy, IndexAlignment};
use super::events::{bin_events, BinningStats};
use super::grid::CanonicalGrid;
use super::Column;
use crate::models::{EventRecord, IssueType, RawRun, RawSeries, LABEL_COLUMN, TIMESTAMP_COLUMN};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Column name for one metric-entity combination
pub fn column_name(metric: &str, series: &RawSeries) -> String {
    format!("{}_{}", metric, series.entity)
}

/// One row of a feature matrix
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub timestamp: String,
    /// Metric values followed by event values, in header order
    pub values: Vec<f64>,
    pub label: IssueType,
}

/// Row-per-timestamp table for one collection run
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    pub grid: CanonicalGrid,
    pub feature_columns: Vec<Column>,
    pub event_columns: Vec<Column>,
    pub label: IssueType,
    pub event_stats: BinningStats,
    /// Number of series that overwrote an existing column
    pub collisions: usize,
}

impl FeatureMatrix {
    pub fn row_count(&self) -> usize {
        self.grid.len()
    }

    pub fn has_features(&self) -> bool {
        !self.feature_columns.is_empty()
    }

    /// Metric and event column names, in output order
    pub fn column_names(&self) -> Vec<&str> {
        self.feature_columns
            .iter()
            .chain(self.event_columns.iter())
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Full header including the timestamp and label columns
    pub fn header(&self) -> Vec<String> {
        std::iter::once(TIMESTAMP_COLUMN.to_string())
            .chain(self.column_names().into_iter().map(str::to_string))
            .chain(std::iter::once(LABEL_COLUMN.to_string()))
            .collect()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.feature_columns
            .iter()
            .chain(self.event_columns.iter())
            .find(|c| c.name == name)
    }

    pub fn rows(&self) -> impl Iterator<Item = FeatureRow> + '_ {
        (0..self.row_count()).map(move |idx| FeatureRow {
            timestamp: self.grid.format_timestamp(idx),
            values: self
                .feature_columns
                .iter()
                .chain(self.event_columns.iter())
                .map(|c| c.values[idx])
                .collect(),
            label: self.label,
        })
    }
}

/// Builds a [`FeatureMatrix`] from the series of one run
pub struct FeatureMatrixBuilder {
    grid: CanonicalGrid,
    label: IssueType,
    strategy: Arc<dyn AlignmentStrategy>,
    columns: Vec<(String, AlignedColumn)>,
    positions: HashMap<String, usize>,
    collisions: usize,
}

impl FeatureMatrixBuilder {
    pub fn new(grid: CanonicalGrid, label: IssueType) -> Self {
        Self {
            grid,
            label,
            strategy: Arc::new(IndexAlignment),
            columns: Vec::new(),
            positions: HashMap::new(),
            collisions: 0,
        }
    }

    pub fn with_strategy(mut self, strategy: Arc<dyn AlignmentStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    /// Align one series and store it under its column name.
    ///
    /// A name that already exists is overwritten in place; the column keeps
    /// its original position.
    pub fn add_series(&mut self, metric: &str, series: &RawSeries) {
        let name = column_name(metric, series);
        let aligned = self.strategy.align(series, &self.grid);

        match self.positions.get(&name) {
            Some(&idx) => {
                warn!(
                    event = "column_name_collision",
                    column = %name,
                    "Distinct series produced the same column name; overwriting"
                );
                self.collisions += 1;
                self.columns[idx].1 = aligned;
            }
            None => {
                self.positions.insert(name.clone(), self.columns.len());
                self.columns.push((name, aligned));
            }
        }
    }

    /// Add every series of the run, optionally restricted to some categories
    pub fn add_run(&mut self, run: &RawRun, categories: Option<&[String]>) {
        for (category, metric, series) in run.iter_series() {
            let selected = categories
                .map(|allowed| allowed.iter().any(|c| c == category))
                .unwrap_or(true);
            if selected {
                self.add_series(metric, series);
            }
        }
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Fill gaps, bin events and attach the label
    pub fn build(self, events: &[EventRecord]) -> FeatureMatrix {
        let feature_columns: Vec<Column> = self
            .columns
            .into_iter()
            .map(|(name, aligned)| Column::new(name, fill_column(&aligned)))
            .collect();

        if feature_columns.is_empty() {
            warn!(
                event = "no_feature_columns",
                label = %self.label,
                rows = self.grid.len(),
                "No metric columns for run; emitting label-only matrix"
            );
        }

        let binning = bin_events(events, &self.grid);

        debug!(
            columns = feature_columns.len(),
            rows = self.grid.len(),
            strategy = self.strategy.name(),
            collisions = self.collisions,
            "Feature matrix assembled"
        );

        FeatureMatrix {
            grid: self.grid,
            feature_columns,
            event_columns: binning.columns,
            label: self.label,
            event_stats: binning.stats,
            collisions: self.collisions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntityKey, Sample};
    use crate::tabular::grid::GridClock;

    fn grid() -> CanonicalGrid {
        CanonicalGrid::new(vec![0.0, 15.0, 30.0, 45.0], GridClock::Naive)
    }

    fn series(entity: &str, values: &[f64]) -> RawSeries {
        RawSeries::new(
            EntityKey::new(entity),
            values
                .iter()
                .enumerate()
                .map(|(i, v)| Sample::new(i as f64 * 15.0, *v))
                .collect(),
        )
    }

    #[test]
    fn test_columns_filled_and_labelled() {
        let mut builder = FeatureMatrixBuilder::new(grid(), IssueType::Dns);
        builder.add_series("node_cpu_usage", &series("n1", &[1.0, 2.0, 3.0, 4.0]));
        builder.add_series("node_memory_usage", &series("n1", &[5.0, 6.0]));
        builder.add_series("pod_restarts", &series("ns_p", &[]));
        let matrix = builder.build(&[]);

        assert_eq!(matrix.row_count(), 4);
        assert_eq!(
            matrix.column("node_memory_usage_n1").unwrap().values,
            vec![5.0, 6.0, 6.0, 6.0]
        );
        assert_eq!(
            matrix.column("pod_restarts_ns_p").unwrap().values,
            vec![0.0; 4]
        );
        assert!(matrix.rows().all(|r| r.label == IssueType::Dns));
        assert!(matrix
            .rows()
            .all(|r| r.values.iter().all(|v| v.is_finite())));
    }

    #[test]
    fn test_header_order() {
        let mut builder = FeatureMatrixBuilder::new(grid(), IssueType::None);
        builder.add_series("b_metric", &series("x", &[1.0]));
        builder.add_series("a_metric", &series("x", &[1.0]));
        let matrix = builder.build(&[]);

        let header = matrix.header();
        assert_eq!(header[0], "timestamp");
        assert_eq!(header[1], "b_metric_x");
        assert_eq!(header[2], "a_metric_x");
        assert_eq!(header[3], "event_normal_count");
        assert_eq!(header.last().unwrap(), "cluster_issue_type");
        assert_eq!(header.len(), 1 + 2 + 9 + 1);
    }

    #[test]
    fn test_collision_overwrites_in_place() {
        let mut builder = FeatureMatrixBuilder::new(grid(), IssueType::None);
        builder.add_series("m", &series("dup", &[1.0, 1.0, 1.0, 1.0]));
        builder.add_series("other", &series("x", &[0.0]));
        builder.add_series("m", &series("dup", &[9.0, 9.0, 9.0, 9.0]));
        assert_eq!(builder.column_count(), 2);

        let matrix = builder.build(&[]);
        assert_eq!(matrix.collisions, 1);
        assert_eq!(matrix.feature_columns[0].name, "m_dup");
        assert_eq!(matrix.feature_columns[0].values, vec![9.0; 4]);
    }

    #[test]
    fn test_label_only_matrix() {
        let matrix = FeatureMatrixBuilder::new(grid(), IssueType::None).build(&[]);
        assert!(!matrix.has_features());
        assert_eq!(matrix.row_count(), 4);
        assert_eq!(matrix.event_columns.len(), 9);
        assert_eq!(matrix.header().len(), 11);
    }
}
