//! Error taxonomy for the dataset pipeline

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// No series in the run carried a single sample
    #[error("no series in the run has any samples; cannot derive a timestamp grid")]
    EmptyGrid,

    #[error("unparseable event timestamp {value:?}")]
    MalformedEventTimestamp { value: String },

    #[error("unknown cluster issue type {0:?}")]
    UnknownIssueType(String),

    #[error("feature matrix file {path:?} is missing or corrupt: {reason}")]
    MissingOrCorruptMatrixFile { path: PathBuf, reason: String },

    #[error("no usable feature matrix files ({skipped} skipped)")]
    NoMatrixFiles { skipped: usize },

    #[error("none of the {attempted} collection runs could be tabularized")]
    NoUsableRuns { attempted: usize },

    #[error("test fraction must be within [0, 1], got {0}")]
    InvalidTestFraction(f64),

    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid raw run JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl PipelineError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether a batch should skip the failing item and carry on
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            PipelineError::NoMatrixFiles { .. }
                | PipelineError::NoUsableRuns { .. }
                | PipelineError::InvalidTestFraction(_)
        )
    }
}
