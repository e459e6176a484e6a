//! Dataset library for cluster issue classification
//!
//! This crate provides the core functionality for:
//! - Loading raw collection runs (metric series plus cluster events)
//! - Tabularizing a run into a row-per-timestamp feature matrix
//! - Persisting matrices and assembling them into train/test datasets
//! - Metrics and structured logging for the pipeline

pub mod dataset;
pub mod error;
pub mod models;
pub mod observability;
pub mod pipeline;
pub mod raw;
pub mod tabular;

pub use dataset::{AssemblerConfig, AssemblyReport, DatasetAssembler, DatasetSplit, LabelStat};
pub use error::{PipelineError, Result};
pub use models::*;
pub use observability::{PipelineMetrics, StructuredLogger};
pub use pipeline::{AlignmentKind, BatchOutcome, ProcessedRun, ProcessorConfig, RunProcessor};
pub use raw::{load_raw_run, parse_raw_run};
pub use tabular::{CanonicalGrid, FeatureMatrix, FeatureMatrixBuilder, GridClock};
