//! Event binning onto the canonical grid
//!
//! Events are point-in-time records; each one is attached to the grid
//! position nearest its `last_timestamp`. Tracked event types become per-row
//! counts and tracked reasons become saturating 0/1 indicators.

use super::grid::{naive_to_seconds, CanonicalGrid, GridClock};
use super::Column;
use crate::error::{PipelineError, Result};
use crate::models::{EventRecord, EventType};
use chrono::{DateTime, FixedOffset, NaiveDateTime};
use tracing::{debug, warn};

/// Event types that get a count column
pub const TRACKED_EVENT_TYPES: [&str; 3] = ["Normal", "Warning", "Error"];

/// Event reasons that get an indicator column
pub const TRACKED_REASONS: [&str; 6] = [
    "Killing",
    "Created",
    "Started",
    "BackOff",
    "Failed",
    "Unhealthy",
];

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];
const AWARE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%:z"];

/// Column names produced by [`bin_events`], in output order
pub fn event_column_names() -> Vec<String> {
    TRACKED_EVENT_TYPES
        .iter()
        .map(|t| format!("event_{}_count", t.to_lowercase()))
        .chain(
            TRACKED_REASONS
                .iter()
                .map(|r| format!("event_reason_{}", r.to_lowercase())),
        )
        .collect()
}

/// Counters describing what happened to each input event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BinningStats {
    /// Events that mutated at least one column
    pub binned: usize,
    /// Events whose timestamp could not be parsed
    pub malformed: usize,
    /// Events without a `last_timestamp`
    pub missing_timestamp: usize,
    /// Events whose type and reason are both untracked
    pub untracked: usize,
    /// Events that could not be placed because the grid is empty
    pub unplaced: usize,
}

impl BinningStats {
    pub fn dropped(&self) -> usize {
        self.malformed + self.missing_timestamp + self.untracked + self.unplaced
    }
}

/// Output of one binning call
#[derive(Debug, Clone, PartialEq)]
pub struct EventBinning {
    pub columns: Vec<Column>,
    pub stats: BinningStats,
}

/// Event timestamp before reconciliation with the grid
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EventTime {
    Naive(NaiveDateTime),
    Aware(DateTime<FixedOffset>),
}

impl EventTime {
    pub fn is_aware(&self) -> bool {
        matches!(self, EventTime::Aware(_))
    }
}

/// Parse an ISO-8601 event timestamp, normalising a trailing `Z` to `+00:00`
pub fn parse_event_timestamp(raw: &str) -> Result<EventTime> {
    let trimmed = raw.trim();
    let normalized = match trimmed.strip_suffix('Z') {
        Some(stripped) => format!("{stripped}+00:00"),
        None => trimmed.to_string(),
    };

    if let Ok(dt) = DateTime::parse_from_rfc3339(&normalized) {
        return Ok(EventTime::Aware(dt));
    }
    for format in AWARE_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(&normalized, format) {
            return Ok(EventTime::Aware(dt));
        }
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(&normalized, format) {
            return Ok(EventTime::Naive(naive));
        }
    }

    Err(PipelineError::MalformedEventTimestamp {
        value: raw.to_string(),
    })
}

/// Maps event timestamps into the grid's comparison basis (unix seconds).
///
/// Resolved once per binning call from the grid clock; the event side of
/// the (grid_is_aware, event_is_aware) pair is decided per event.
#[derive(Debug, Clone, Copy)]
pub struct TimeReconciler {
    grid_offset: Option<FixedOffset>,
}

impl TimeReconciler {
    pub fn for_grid(grid: &CanonicalGrid) -> Self {
        let grid_offset = match grid.clock() {
            GridClock::Naive => None,
            GridClock::Aware(offset) => Some(offset),
        };
        Self { grid_offset }
    }

    pub fn grid_is_aware(&self) -> bool {
        self.grid_offset.is_some()
    }

    /// Seconds comparable with grid timestamps
    pub fn to_grid_seconds(&self, time: EventTime) -> f64 {
        match (self.grid_offset, time) {
            (None, EventTime::Naive(naive)) => naive_to_seconds(naive),
            // Zone stripped: the event's own wall time, read like the naive grid
            (None, EventTime::Aware(dt)) => naive_to_seconds(dt.naive_local()),
            // Naive event localised to the grid's zone
            (Some(offset), EventTime::Naive(naive)) => {
                naive_to_seconds(naive) - f64::from(offset.local_minus_utc())
            }
            (Some(_), EventTime::Aware(dt)) => naive_to_seconds(dt.naive_utc()),
        }
    }
}

/// Bin events onto the grid.
///
/// Pure: the result depends only on the arguments, so repeated calls with
/// the same input produce identical columns.
pub fn bin_events(events: &[EventRecord], grid: &CanonicalGrid) -> EventBinning {
    let reconciler = TimeReconciler::for_grid(grid);
    let mut type_counts = vec![vec![0.0_f64; grid.len()]; TRACKED_EVENT_TYPES.len()];
    let mut reason_flags = vec![vec![0.0_f64; grid.len()]; TRACKED_REASONS.len()];
    let mut stats = BinningStats::default();

    for event in events {
        let Some(raw_ts) = event.last_timestamp.as_deref() else {
            stats.missing_timestamp += 1;
            continue;
        };

        let event_time = match parse_event_timestamp(raw_ts) {
            Ok(t) => t,
            Err(e) => {
                warn!(
                    event = "malformed_event_timestamp",
                    namespace = event.namespace.as_deref().unwrap_or("unknown"),
                    name = event.name.as_deref().unwrap_or("unknown"),
                    error = %e,
                    "Skipping event with unparseable timestamp"
                );
                stats.malformed += 1;
                continue;
            }
        };

        let type_idx = match event.kind() {
            EventType::Normal => Some(0),
            EventType::Warning => Some(1),
            EventType::Error => Some(2),
            EventType::Other(_) => None,
        };
        let reason_idx = TRACKED_REASONS.iter().position(|r| *r == event.reason());

        if type_idx.is_none() && reason_idx.is_none() {
            stats.untracked += 1;
            continue;
        }

        let Some(position) = grid.nearest_position(reconciler.to_grid_seconds(event_time)) else {
            stats.unplaced += 1;
            continue;
        };

        if let Some(idx) = type_idx {
            type_counts[idx][position] += 1.0;
        }
        if let Some(idx) = reason_idx {
            reason_flags[idx][position] = 1.0;
        }
        stats.binned += 1;
    }

    debug!(
        binned = stats.binned,
        dropped = stats.dropped(),
        grid_aware = reconciler.grid_is_aware(),
        "Binned events onto grid"
    );

    let columns = event_column_names()
        .into_iter()
        .zip(type_counts.into_iter().chain(reason_flags))
        .map(|(name, values)| Column::new(name, values))
        .collect();

    EventBinning { columns, stats }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> CanonicalGrid {
        // 2024-05-01 10:00:00 UTC, 15s step
        let base = 1_714_557_600.0;
        CanonicalGrid::new(
            vec![base, base + 15.0, base + 30.0, base + 45.0],
            GridClock::Naive,
        )
    }

    fn event(event_type: &str, reason: &str, ts: Option<&str>) -> EventRecord {
        EventRecord {
            event_type: Some(event_type.to_string()),
            reason: Some(reason.to_string()),
            last_timestamp: ts.map(str::to_string),
            ..Default::default()
        }
    }

    fn column<'a>(binning: &'a EventBinning, name: &str) -> &'a [f64] {
        &binning
            .columns
            .iter()
            .find(|c| c.name == name)
            .unwrap()
            .values
    }

    #[test]
    fn test_column_layout() {
        let names = event_column_names();
        assert_eq!(names.len(), 9);
        assert_eq!(names[0], "event_normal_count");
        assert_eq!(names[1], "event_warning_count");
        assert_eq!(names[6], "event_reason_backoff");
        assert_eq!(names[8], "event_reason_unhealthy");
    }

    #[test]
    fn test_warning_lands_on_nearest_position() {
        let events = vec![event("Warning", "Pulled", Some("2024-05-01T10:00:28Z"))];
        let binning = bin_events(&events, &grid());
        assert_eq!(column(&binning, "event_warning_count"), &[0.0, 0.0, 1.0, 0.0]);
        assert_eq!(binning.stats.binned, 1);
    }

    #[test]
    fn test_counts_increment_and_reasons_saturate() {
        let events = vec![
            event("Warning", "BackOff", Some("2024-05-01T10:00:01Z")),
            event("Warning", "BackOff", Some("2024-05-01T10:00:02Z")),
            event("Normal", "Started", Some("2024-05-01T10:00:44Z")),
        ];
        let binning = bin_events(&events, &grid());
        assert_eq!(column(&binning, "event_warning_count"), &[2.0, 0.0, 0.0, 0.0]);
        assert_eq!(column(&binning, "event_reason_backoff"), &[1.0, 0.0, 0.0, 0.0]);
        assert_eq!(column(&binning, "event_normal_count"), &[0.0, 0.0, 0.0, 1.0]);
        assert_eq!(column(&binning, "event_reason_started"), &[0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_untracked_and_malformed_events_are_skipped() {
        let events = vec![
            event("Info", "Pulled", Some("2024-05-01T10:00:00Z")),
            event("Warning", "BackOff", Some("yesterday")),
            event("Warning", "BackOff", None),
            event("Custom", "Killing", Some("2024-05-01T10:00:15Z")),
        ];
        let binning = bin_events(&events, &grid());
        assert_eq!(binning.stats.untracked, 1);
        assert_eq!(binning.stats.malformed, 1);
        assert_eq!(binning.stats.missing_timestamp, 1);
        assert_eq!(binning.stats.binned, 1);
        assert_eq!(column(&binning, "event_reason_killing"), &[0.0, 1.0, 0.0, 0.0]);
        assert!(column(&binning, "event_warning_count").iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_timestamp_parsing_forms() {
        assert!(parse_event_timestamp("2024-05-01T10:00:00Z").unwrap().is_aware());
        assert!(parse_event_timestamp("2024-05-01T10:00:00+02:00").unwrap().is_aware());
        assert!(parse_event_timestamp("2024-05-01 10:00:00+00:00").unwrap().is_aware());
        assert!(!parse_event_timestamp("2024-05-01T10:00:00").unwrap().is_aware());
        assert!(!parse_event_timestamp("2024-05-01 10:00:00.250").unwrap().is_aware());
        assert!(matches!(
            parse_event_timestamp("10:00"),
            Err(PipelineError::MalformedEventTimestamp { .. })
        ));
    }

    #[test]
    fn test_reconciliation_naive_grid() {
        let grid = grid();
        let reconciler = TimeReconciler::for_grid(&grid);
        assert!(!reconciler.grid_is_aware());

        let naive = parse_event_timestamp("2024-05-01T10:00:30").unwrap();
        assert_eq!(reconciler.to_grid_seconds(naive), 1_714_557_630.0);

        // Offset is stripped, wall time kept
        let aware = parse_event_timestamp("2024-05-01T10:00:30+02:00").unwrap();
        assert_eq!(reconciler.to_grid_seconds(aware), 1_714_557_630.0);
    }

    #[test]
    fn test_reconciliation_aware_grid() {
        let base = 1_714_557_600.0;
        let grid = CanonicalGrid::new(
            vec![base, base + 15.0, base + 30.0, base + 45.0],
            GridClock::from_offset_secs(Some(2 * 3600)),
        );
        let reconciler = TimeReconciler::for_grid(&grid);
        assert!(reconciler.grid_is_aware());

        // 12:00:30 local at +02:00 is 10:00:30 UTC
        let naive = parse_event_timestamp("2024-05-01T12:00:30").unwrap();
        assert_eq!(reconciler.to_grid_seconds(naive), base + 30.0);

        let aware = parse_event_timestamp("2024-05-01T10:00:30Z").unwrap();
        assert_eq!(reconciler.to_grid_seconds(aware), base + 30.0);

        let events = vec![event("Warning", "Failed", Some("2024-05-01T12:00:44"))];
        let binning = bin_events(&events, &grid);
        assert_eq!(column(&binning, "event_warning_count"), &[0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_binning_is_deterministic() {
        let events = vec![
            event("Warning", "Unhealthy", Some("2024-05-01T10:00:07Z")),
            event("Error", "Failed", Some("2024-05-01T10:00:38Z")),
        ];
        let first = bin_events(&events, &grid());
        let second = bin_events(&events, &grid());
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_grid_places_nothing() {
        let empty = CanonicalGrid::new(vec![], GridClock::Naive);
        let events = vec![event("Warning", "BackOff", Some("2024-05-01T10:00:00Z"))];
        let binning = bin_events(&events, &empty);
        assert_eq!(binning.stats.unplaced, 1);
        assert!(binning.columns.iter().all(|c| c.values.is_empty()));
    }
}
