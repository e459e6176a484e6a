//! Run processing: raw collection file in, persisted feature matrix out

use crate::error::{PipelineError, Result};
use crate::models::{IssueType, RawRun};
use crate::observability::{PipelineMetrics, StructuredLogger};
use crate::raw::load_raw_run;
use crate::tabular::{
    matrix_file_name, resolve_grid, unique_path, write_matrix, AlignmentStrategy, BinningStats,
    FeatureMatrix, FeatureMatrixBuilder, GridClock, IndexAlignment, TimestampAlignment,
};
use chrono::{NaiveDateTime, Utc};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Default tolerance for timestamp alignment (half of the 15s query step)
pub const DEFAULT_ALIGNMENT_TOLERANCE_SECS: f64 = 7.5;

/// Which alignment strategy runs use
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum AlignmentKind {
    #[default]
    Index,
    Timestamp { tolerance_secs: f64 },
}

impl AlignmentKind {
    pub fn strategy(&self) -> Arc<dyn AlignmentStrategy> {
        match self {
            AlignmentKind::Index => Arc::new(IndexAlignment),
            AlignmentKind::Timestamp { tolerance_secs } => {
                Arc::new(TimestampAlignment::new(*tolerance_secs))
            }
        }
    }
}

impl FromStr for AlignmentKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "index" => Ok(AlignmentKind::Index),
            "timestamp" => Ok(AlignmentKind::Timestamp {
                tolerance_secs: DEFAULT_ALIGNMENT_TOLERANCE_SECS,
            }),
            other => Err(format!(
                "unknown alignment {other:?}, expected \"index\" or \"timestamp\""
            )),
        }
    }
}

/// Configuration for run processing
#[derive(Debug, Clone, Default)]
pub struct ProcessorConfig {
    pub clock: GridClock,
    pub alignment: AlignmentKind,
    /// Restrict metric columns to these categories; all when `None`
    pub categories: Option<Vec<String>>,
    /// Replaces the label recorded in the run metadata
    pub label_override: Option<IssueType>,
}

/// A run that was tabularized and written
#[derive(Debug, Clone)]
pub struct ProcessedRun {
    pub source: PathBuf,
    pub output: PathBuf,
    pub label: IssueType,
    pub rows: usize,
    pub feature_columns: usize,
    pub event_stats: BinningStats,
}

/// A run left out of a batch
#[derive(Debug, Clone)]
pub struct SkippedRun {
    pub source: PathBuf,
    pub reason: String,
}

/// Result of processing several runs
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    pub processed: Vec<ProcessedRun>,
    pub skipped: Vec<SkippedRun>,
}

/// Turns raw collection runs into persisted feature matrices
pub struct RunProcessor {
    config: ProcessorConfig,
    strategy: Arc<dyn AlignmentStrategy>,
    metrics: PipelineMetrics,
    logger: StructuredLogger,
}

impl RunProcessor {
    pub fn new(config: ProcessorConfig) -> Self {
        let strategy = config.alignment.strategy();
        Self {
            config,
            strategy,
            metrics: PipelineMetrics::new(),
            logger: StructuredLogger::new("local"),
        }
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Build the feature matrix of a run; no I/O
    pub fn tabularize(&self, run: &RawRun) -> Result<FeatureMatrix> {
        let start = Instant::now();

        let label = match self.config.label_override {
            Some(label) => label,
            None => run.metadata.issue_type()?,
        };
        let grid = resolve_grid(run, self.config.clock)?;

        let mut builder =
            FeatureMatrixBuilder::new(grid, label).with_strategy(Arc::clone(&self.strategy));
        builder.add_run(run, self.config.categories.as_deref());
        let matrix = builder.build(&run.events);

        self.metrics
            .observe_tabularize_latency(start.elapsed().as_secs_f64());
        self.metrics
            .add_events(matrix.event_stats.binned, matrix.event_stats.dropped());
        self.metrics.add_column_collisions(matrix.collisions);

        Ok(matrix)
    }

    /// Load, tabularize and persist one raw run file
    pub fn process_file(&self, raw_path: &Path, output_dir: &Path) -> Result<ProcessedRun> {
        self.process_file_at(raw_path, output_dir, Utc::now().naive_utc())
    }

    /// Like [`process_file`](Self::process_file) with an explicit file name timestamp
    pub fn process_file_at(
        &self,
        raw_path: &Path,
        output_dir: &Path,
        at: NaiveDateTime,
    ) -> Result<ProcessedRun> {
        let run = load_raw_run(raw_path)?;
        let matrix = self.tabularize(&run)?;

        std::fs::create_dir_all(output_dir).map_err(|e| PipelineError::io(output_dir, e))?;
        let output = unique_path(output_dir, &matrix_file_name(matrix.label, at));
        write_matrix(&matrix, &output)?;

        let processed = ProcessedRun {
            source: raw_path.to_path_buf(),
            output,
            label: matrix.label,
            rows: matrix.row_count(),
            feature_columns: matrix.feature_columns.len(),
            event_stats: matrix.event_stats,
        };

        self.metrics.inc_runs_processed();
        self.logger.log_run_processed(
            &processed.source,
            &processed.output,
            processed.label.as_str(),
            processed.rows,
            processed.feature_columns,
            processed.event_stats.binned,
        );

        Ok(processed)
    }

    /// Process several runs, skipping the ones that fail.
    ///
    /// Fails only when runs were given and none of them could be used.
    pub fn process_batch(&self, raw_paths: &[PathBuf], output_dir: &Path) -> Result<BatchOutcome> {
        let mut outcome = BatchOutcome::default();

        for path in raw_paths {
            match self.process_file(path, output_dir) {
                Ok(processed) => outcome.processed.push(processed),
                Err(e) if e.is_recoverable() => {
                    let reason = skip_reason(&e);
                    self.metrics.inc_runs_skipped(reason);
                    self.logger.log_run_skipped(path, reason, &e.to_string());
                    outcome.skipped.push(SkippedRun {
                        source: path.clone(),
                        reason: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        debug!(
            processed = outcome.processed.len(),
            skipped = outcome.skipped.len(),
            "Batch complete"
        );

        if outcome.processed.is_empty() && !raw_paths.is_empty() {
            return Err(PipelineError::NoUsableRuns {
                attempted: raw_paths.len(),
            });
        }

        Ok(outcome)
    }
}

fn skip_reason(error: &PipelineError) -> &'static str {
    match error {
        PipelineError::EmptyGrid => "empty_grid",
        PipelineError::UnknownIssueType(_) => "unknown_issue_type",
        PipelineError::Io { .. } => "io",
        PipelineError::Json(_) => "invalid_json",
        PipelineError::Csv(_) => "csv",
        _ => "other",
    }
}
