//! Series alignment onto the canonical grid
//!
//! Alignment only places values; gaps stay `None` until the fill policy runs
//! over the finished column.

use super::grid::CanonicalGrid;
use crate::models::RawSeries;

/// One series projected onto the grid, gaps still unfilled
pub type AlignedColumn = Vec<Option<f64>>;

/// Strategy for mapping a raw series onto grid positions
pub trait AlignmentStrategy: Send + Sync {
    /// Produce a column of exactly `grid.len()` positions
    fn align(&self, series: &RawSeries, grid: &CanonicalGrid) -> AlignedColumn;

    /// Short name used in logs and configuration
    fn name(&self) -> &'static str;
}

/// Sample `i` lands on grid position `i`.
///
/// Valid when every series of a run was queried with the same start, end and
/// step, which is how the collector issues its range queries.
#[derive(Debug, Clone, Copy, Default)]
pub struct IndexAlignment;

impl AlignmentStrategy for IndexAlignment {
    fn align(&self, series: &RawSeries, grid: &CanonicalGrid) -> AlignedColumn {
        let mut column = vec![None; grid.len()];
        for (slot, sample) in column.iter_mut().zip(series.samples.iter()) {
            *slot = sample.value;
        }
        column
    }

    fn name(&self) -> &'static str {
        "index"
    }
}

/// Each sample lands on the nearest grid position within `tolerance_secs`
#[derive(Debug, Clone, Copy)]
pub struct TimestampAlignment {
    pub tolerance_secs: f64,
}

impl TimestampAlignment {
    pub fn new(tolerance_secs: f64) -> Self {
        Self {
            tolerance_secs: tolerance_secs.abs(),
        }
    }
}

impl AlignmentStrategy for TimestampAlignment {
    fn align(&self, series: &RawSeries, grid: &CanonicalGrid) -> AlignedColumn {
        let mut column = vec![None; grid.len()];
        for sample in &series.samples {
            let Some(position) = grid.nearest_position(sample.timestamp) else {
                continue;
            };
            let distance = (grid.timestamps()[position] - sample.timestamp).abs();
            if distance <= self.tolerance_secs && sample.value.is_some() {
                column[position] = sample.value;
            }
        }
        column
    }

    fn name(&self) -> &'static str {
        "timestamp"
    }
}

/// Forward-fill, then back-fill, then zero-fill a column
pub fn fill_column(column: &[Option<f64>]) -> Vec<f64> {
    let mut filled = column.to_vec();

    let mut last = None;
    for slot in filled.iter_mut() {
        if slot.is_some() {
            last = *slot;
        } else {
            *slot = last;
        }
    }

    let mut next = None;
    for slot in filled.iter_mut().rev() {
        if slot.is_some() {
            next = *slot;
        } else {
            *slot = next;
        }
    }

    filled.into_iter().map(|v| v.unwrap_or(0.0)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntityKey, Sample};
    use crate::tabular::grid::GridClock;

    fn grid() -> CanonicalGrid {
        CanonicalGrid::new(vec![0.0, 15.0, 30.0, 45.0], GridClock::Naive)
    }

    fn series(samples: &[(f64, Option<f64>)]) -> RawSeries {
        RawSeries::new(
            EntityKey::new("n1"),
            samples
                .iter()
                .map(|(ts, v)| Sample {
                    timestamp: *ts,
                    value: *v,
                })
                .collect(),
        )
    }

    #[test]
    fn test_index_alignment_leaves_tail_missing() {
        let s = series(&[(100.0, Some(1.0)), (200.0, Some(2.0))]);
        let column = IndexAlignment.align(&s, &grid());
        assert_eq!(column, vec![Some(1.0), Some(2.0), None, None]);
    }

    #[test]
    fn test_index_alignment_truncates_long_series() {
        let samples: Vec<_> = (0..6).map(|i| (i as f64, Some(i as f64))).collect();
        let column = IndexAlignment.align(&series(&samples), &grid());
        assert_eq!(column.len(), 4);
        assert_eq!(column[3], Some(3.0));
    }

    #[test]
    fn test_timestamp_alignment_places_by_time() {
        let s = series(&[(31.0, Some(7.0)), (200.0, Some(9.0))]);
        let column = TimestampAlignment::new(7.5).align(&s, &grid());
        assert_eq!(column, vec![None, None, Some(7.0), None]);
    }

    #[test]
    fn test_fill_policy_order() {
        let filled = fill_column(&[None, Some(2.0), None, Some(4.0), None]);
        assert_eq!(filled, vec![2.0, 2.0, 2.0, 4.0, 4.0]);
    }

    #[test]
    fn test_fill_policy_zero_for_empty_column() {
        assert_eq!(fill_column(&[None, None, None]), vec![0.0, 0.0, 0.0]);
        assert!(fill_column(&[]).is_empty());
    }

    #[test]
    fn test_half_covered_column_is_fully_filled() {
        let s = series(&[(0.0, Some(3.0)), (15.0, Some(5.0))]);
        let filled = fill_column(&IndexAlignment.align(&s, &grid()));
        assert_eq!(filled, vec![3.0, 5.0, 5.0, 5.0]);
    }
}
