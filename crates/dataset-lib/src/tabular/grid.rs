//! Canonical timestamp grid resolution
//!
//! One run gets exactly one authoritative grid: the timestamps of the first
//! series (in scan order) that has at least one sample. Other series are
//! aligned onto it and never merged into it.

use crate::error::{PipelineError, Result};
use crate::models::RawRun;
use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};

/// Format used for grid timestamps in persisted files
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// How grid timestamps are presented and compared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GridClock {
    /// Timezone-naive wall clock, rendered in UTC
    #[default]
    Naive,
    /// Timezone-aware with a fixed UTC offset
    Aware(FixedOffset),
}

impl GridClock {
    /// Build a clock from an optional UTC offset in seconds
    pub fn from_offset_secs(offset: Option<i32>) -> Self {
        match offset.and_then(FixedOffset::east_opt) {
            Some(offset) => GridClock::Aware(offset),
            None => GridClock::Naive,
        }
    }

    pub fn is_aware(&self) -> bool {
        matches!(self, GridClock::Aware(_))
    }
}

/// Strictly ordered timestamps (unix seconds) shared by every row of a run
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalGrid {
    timestamps: Vec<f64>,
    clock: GridClock,
}

impl CanonicalGrid {
    pub fn new(timestamps: Vec<f64>, clock: GridClock) -> Self {
        Self { timestamps, clock }
    }

    pub fn timestamps(&self) -> &[f64] {
        &self.timestamps
    }

    pub fn clock(&self) -> GridClock {
        self.clock
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Position of the timestamp closest to `target`; ties go to the earlier position
    pub fn nearest_position(&self, target: f64) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (idx, ts) in self.timestamps.iter().enumerate() {
            let distance = (ts - target).abs();
            match best {
                Some((_, best_distance)) if distance >= best_distance => {}
                _ => best = Some((idx, distance)),
            }
        }
        best.map(|(idx, _)| idx)
    }

    /// Render the timestamp at `position` in the grid's clock
    pub fn format_timestamp(&self, position: usize) -> String {
        let Some(ts) = self.timestamps.get(position) else {
            return String::new();
        };
        let utc = unix_to_utc(*ts);
        match self.clock {
            GridClock::Naive => utc.format(TIMESTAMP_FORMAT).to_string(),
            GridClock::Aware(offset) => utc
                .with_timezone(&offset)
                .format(TIMESTAMP_FORMAT)
                .to_string(),
        }
    }
}

/// Derive the canonical grid of a run
pub fn resolve_grid(run: &RawRun, clock: GridClock) -> Result<CanonicalGrid> {
    run.iter_series()
        .find(|(_, _, series)| !series.is_empty())
        .map(|(_, _, series)| CanonicalGrid::new(series.timestamps(), clock))
        .ok_or(PipelineError::EmptyGrid)
}

pub(crate) fn unix_to_utc(ts: f64) -> DateTime<Utc> {
    let secs = ts.floor();
    let nanos = ((ts - secs) * 1e9).round().clamp(0.0, 999_999_999.0) as u32;
    DateTime::from_timestamp(secs as i64, nanos).unwrap_or_default()
}

/// Seconds since the epoch of a naive wall time read as UTC
pub(crate) fn naive_to_seconds(naive: NaiveDateTime) -> f64 {
    let utc = naive.and_utc();
    utc.timestamp() as f64 + f64::from(utc.timestamp_subsec_nanos()) / 1e9
}
