//! Observability infrastructure for the dataset pipeline
//!
//! Provides:
//! - Prometheus metrics (tabularization latency, run/event/file counters, dataset sizes)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge_vec,
    Encoder, Histogram, IntCounter, IntCounterVec, IntGaugeVec, TextEncoder,
};
use std::path::Path;
use std::sync::OnceLock;
use tracing::{info, warn};

/// Default histogram buckets for latency measurements (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<PipelineMetricsInner> = OnceLock::new();

/// Inner metrics structure that holds the actual Prometheus metrics
struct PipelineMetricsInner {
    tabularize_latency_seconds: Histogram,
    runs_processed: IntCounter,
    runs_skipped: IntCounterVec,
    events_binned: IntCounter,
    events_dropped: IntCounter,
    column_collisions: IntCounter,
    matrix_files_loaded: IntCounter,
    matrix_files_skipped: IntCounter,
    dataset_rows: IntGaugeVec,
}

impl PipelineMetricsInner {
    fn new() -> Self {
        Self {
            tabularize_latency_seconds: register_histogram!(
                "kdataset_tabularize_latency_seconds",
                "Time spent turning one raw run into a feature matrix",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register tabularize_latency_seconds"),

            runs_processed: register_int_counter!(
                "kdataset_runs_processed_total",
                "Collection runs tabularized and persisted"
            )
            .expect("Failed to register runs_processed"),

            runs_skipped: register_int_counter_vec!(
                "kdataset_runs_skipped_total",
                "Collection runs skipped, by reason",
                &["reason"]
            )
            .expect("Failed to register runs_skipped"),

            events_binned: register_int_counter!(
                "kdataset_events_binned_total",
                "Events attached to a grid position"
            )
            .expect("Failed to register events_binned"),

            events_dropped: register_int_counter!(
                "kdataset_events_dropped_total",
                "Events that contributed no column value"
            )
            .expect("Failed to register events_dropped"),

            column_collisions: register_int_counter!(
                "kdataset_column_collisions_total",
                "Series that overwrote an existing column of the same name"
            )
            .expect("Failed to register column_collisions"),

            matrix_files_loaded: register_int_counter!(
                "kdataset_matrix_files_loaded_total",
                "Feature matrix files loaded for dataset assembly"
            )
            .expect("Failed to register matrix_files_loaded"),

            matrix_files_skipped: register_int_counter!(
                "kdataset_matrix_files_skipped_total",
                "Feature matrix files skipped as missing or corrupt"
            )
            .expect("Failed to register matrix_files_skipped"),

            dataset_rows: register_int_gauge_vec!(
                "kdataset_dataset_rows",
                "Rows in the most recently assembled dataset split",
                &["split"]
            )
            .expect("Failed to register dataset_rows"),
        }
    }
}

/// Pipeline metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct PipelineMetrics {
    _private: (),
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(PipelineMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &PipelineMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    pub fn observe_tabularize_latency(&self, duration_secs: f64) {
        self.inner().tabularize_latency_seconds.observe(duration_secs);
    }

    pub fn inc_runs_processed(&self) {
        self.inner().runs_processed.inc();
    }

    pub fn inc_runs_skipped(&self, reason: &str) {
        self.inner().runs_skipped.with_label_values(&[reason]).inc();
    }

    pub fn add_events(&self, binned: usize, dropped: usize) {
        self.inner().events_binned.inc_by(binned as u64);
        self.inner().events_dropped.inc_by(dropped as u64);
    }

    pub fn add_column_collisions(&self, count: usize) {
        self.inner().column_collisions.inc_by(count as u64);
    }

    pub fn inc_matrix_files_loaded(&self) {
        self.inner().matrix_files_loaded.inc();
    }

    pub fn inc_matrix_files_skipped(&self) {
        self.inner().matrix_files_skipped.inc();
    }

    pub fn set_dataset_rows(&self, train: usize, test: usize) {
        self.inner()
            .dataset_rows
            .with_label_values(&["train"])
            .set(train as i64);
        self.inner()
            .dataset_rows
            .with_label_values(&["test"])
            .set(test as i64);
    }

    /// Text exposition of every registered metric
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&prometheus::gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Structured logger for pipeline events
///
/// Provides consistent JSON-formatted logging for processed and skipped
/// runs, skipped matrix files and written datasets.
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    /// Log a run turned into a persisted matrix
    pub fn log_run_processed(
        &self,
        source: &Path,
        output: &Path,
        label: &str,
        rows: usize,
        feature_columns: usize,
        events_binned: usize,
    ) {
        info!(
            event = "run_processed",
            instance = %self.instance,
            source = %source.display(),
            output = %output.display(),
            label = %label,
            rows = rows,
            feature_columns = feature_columns,
            events_binned = events_binned,
            "Saved processed metrics"
        );
    }

    /// Log a run that could not be tabularized
    pub fn log_run_skipped(&self, source: &Path, reason: &str, details: &str) {
        warn!(
            event = "run_skipped",
            instance = %self.instance,
            source = %source.display(),
            reason = %reason,
            details = %details,
            "Skipping collection run"
        );
    }

    /// Log a matrix file left out of dataset assembly
    pub fn log_matrix_skipped(&self, path: &Path, details: &str) {
        warn!(
            event = "matrix_file_skipped",
            instance = %self.instance,
            path = %path.display(),
            details = %details,
            "Skipping missing or corrupt feature matrix file"
        );
    }

    /// Log a written train/test dataset pair
    pub fn log_dataset_written(
        &self,
        train_path: &Path,
        train_rows: usize,
        test_path: &Path,
        test_rows: usize,
    ) {
        info!(
            event = "dataset_written",
            instance = %self.instance,
            train_path = %train_path.display(),
            train_rows = train_rows,
            test_path = %test_path.display(),
            test_rows = test_rows,
            "Saved training and testing data"
        );
    }

    /// Log the share of one label in an assembled dataset
    pub fn log_label_share(&self, label: &str, count: usize, percentage: f64) {
        info!(
            event = "label_distribution",
            instance = %self.instance,
            label = %label,
            count = count,
            percentage = percentage,
            "Dataset label share"
        );
    }

    /// Log pipeline startup
    pub fn log_startup(&self, version: &str, command: &str) {
        info!(
            event = "pipeline_started",
            instance = %self.instance,
            version = %version,
            command = %command,
            "Dataset pipeline started"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_metrics_creation() {
        // The registry is process-global; handles share one set of metrics.
        let metrics = PipelineMetrics::new();

        metrics.observe_tabularize_latency(0.001);
        metrics.inc_runs_processed();
        metrics.inc_runs_skipped("empty_grid");
        metrics.add_events(3, 1);
        metrics.add_column_collisions(0);
        metrics.inc_matrix_files_loaded();
        metrics.inc_matrix_files_skipped();
        metrics.set_dataset_rows(80, 20);

        let text = metrics.render().unwrap();
        assert!(text.contains("kdataset_runs_processed_total"));
        assert!(text.contains("kdataset_dataset_rows"));
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("test-host");
        assert_eq!(logger.instance(), "test-host");
    }
}
