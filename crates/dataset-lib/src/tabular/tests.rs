//! End-to-end tabularization tests
//!
//! Each test starts from a raw collection document and checks the finished
//! matrix: row count, fill policy, event placement and the label column.

use super::*;
use crate::models::{IssueType, RawRun};
use crate::raw::parse_raw_run;
use std::sync::Arc;
use tempfile::TempDir;

const BASE: f64 = 1_714_557_600.0;

const RUN: &str = r#"{
    "metadata": {"cluster_issue_type": "pod-failure", "step": "15s"},
    "node_metrics": {
        "node_cpu_usage": [
            {"metric": {"node": "worker-1"},
             "values": [[1714557600, "0.5"], [1714557615, "0.6"],
                        [1714557630, "0.7"], [1714557645, "0.8"]]}
        ],
        "node_memory_usage": [
            {"metric": {"node": "worker-1"},
             "values": [[1714557600, "100"], [1714557615, "110"]]}
        ]
    },
    "pod_metrics": {
        "pod_restarts": [
            {"metric": {"namespace": "default", "pod": "web-0"}, "values": []}
        ]
    },
    "events": [
        {"namespace": "default", "name": "web-0.1", "type": "Warning",
         "reason": "BackOff", "last_timestamp": "2024-05-01T10:00:28Z"}
    ]
}"#;

fn tabularize(run: &RawRun, strategy: Arc<dyn AlignmentStrategy>) -> FeatureMatrix {
    let grid = resolve_grid(run, GridClock::Naive).unwrap();
    let label = run.metadata.issue_type().unwrap();
    let mut builder = FeatureMatrixBuilder::new(grid, label).with_strategy(strategy);
    builder.add_run(run, None);
    builder.build(&run.events)
}

mod scenario_tests {
    use super::*;

    #[test]
    fn test_rows_follow_first_series() {
        let run = parse_raw_run(RUN).unwrap();
        let matrix = tabularize(&run, Arc::new(IndexAlignment));

        assert_eq!(matrix.row_count(), 4);
        assert_eq!(
            matrix.grid.timestamps(),
            &[BASE, BASE + 15.0, BASE + 30.0, BASE + 45.0]
        );
        assert_eq!(matrix.grid.format_timestamp(0), "2024-05-01 10:00:00");
        assert_eq!(
            matrix.column("event_warning_count").unwrap().values,
            vec![0.0, 0.0, 1.0, 0.0]
        );
        assert_eq!(
            matrix.column("event_reason_backoff").unwrap().values,
            vec![0.0, 0.0, 1.0, 0.0]
        );
        assert!(matrix.rows().all(|r| r.label == IssueType::PodFailure));
    }

    #[test]
    fn test_partial_and_empty_series_are_filled() {
        let run = parse_raw_run(RUN).unwrap();
        let matrix = tabularize(&run, Arc::new(IndexAlignment));

        assert_eq!(
            matrix.column("node_memory_usage_worker-1").unwrap().values,
            vec![100.0, 110.0, 110.0, 110.0]
        );
        assert_eq!(
            matrix.column("pod_restarts_default_web-0").unwrap().values,
            vec![0.0; 4]
        );
        for row in matrix.rows() {
            assert_eq!(row.values.len(), matrix.column_names().len());
            assert!(row.values.iter().all(|v| !v.is_nan()));
        }
    }

    #[test]
    fn test_tabularize_is_idempotent() {
        let run = parse_raw_run(RUN).unwrap();
        let first = tabularize(&run, Arc::new(IndexAlignment));
        let second = tabularize(&run, Arc::new(IndexAlignment));
        assert_eq!(first, second);
        assert_eq!(
            first.rows().collect::<Vec<_>>(),
            second.rows().collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_category_filter_can_leave_label_only() {
        let run = parse_raw_run(RUN).unwrap();
        let grid = resolve_grid(&run, GridClock::Naive).unwrap();
        let mut builder = FeatureMatrixBuilder::new(grid, IssueType::None);
        builder.add_run(&run, Some(&["etcd".to_string()]));
        let matrix = builder.build(&run.events);

        assert!(!matrix.has_features());
        assert_eq!(matrix.row_count(), 4);
        assert_eq!(matrix.column_names(), event_column_names());
    }

    #[test]
    fn test_category_filter_keeps_selected() {
        let run = parse_raw_run(RUN).unwrap();
        let grid = resolve_grid(&run, GridClock::Naive).unwrap();
        let mut builder = FeatureMatrixBuilder::new(grid, IssueType::None);
        builder.add_run(&run, Some(&["pod".to_string()]));
        let matrix = builder.build(&[]);

        let names: Vec<&str> = matrix.feature_columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["pod_restarts_default_web-0"]);
    }
}

mod alignment_tests {
    use super::*;

    const JITTERED: &str = r#"{
        "node_metrics": {
            "node_cpu_usage": [
                {"metric": {"node": "a"},
                 "values": [[1714557600, "1"], [1714557615, "2"],
                            [1714557630, "3"], [1714557645, "4"]]}
            ],
            "node_load": [
                {"metric": {"node": "a"},
                 "values": [[1714557631, "7"], [1714557646, "8"]]}
            ]
        }
    }"#;

    #[test]
    fn test_timestamp_alignment_places_by_time() {
        let run = parse_raw_run(JITTERED).unwrap();
        let matrix = tabularize(&run, Arc::new(TimestampAlignment::new(7.5)));
        // Back-filled from the first placed sample
        assert_eq!(
            matrix.column("node_load_a").unwrap().values,
            vec![7.0, 7.0, 7.0, 8.0]
        );
    }

    #[test]
    fn test_index_alignment_places_by_position() {
        let run = parse_raw_run(JITTERED).unwrap();
        let matrix = tabularize(&run, Arc::new(IndexAlignment));
        assert_eq!(
            matrix.column("node_load_a").unwrap().values,
            vec![7.0, 8.0, 8.0, 8.0]
        );
    }
}

mod persistence_tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_written_matrix_reloads() {
        let run = parse_raw_run(RUN).unwrap();
        let matrix = tabularize(&run, Arc::new(IndexAlignment));

        let temp = TempDir::new().unwrap();
        let at = NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(10, 5, 0)
            .unwrap();
        let path = unique_path(temp.path(), &matrix_file_name(matrix.label, at));
        write_matrix(&matrix, &path).unwrap();

        let files = list_matrix_files(temp.path()).unwrap();
        assert_eq!(files, vec![path.clone()]);

        let loaded = read_matrix_file(&path).unwrap();
        assert_eq!(loaded.rows.len(), 4);
        assert_eq!(loaded.columns.len(), matrix.column_names().len());
        assert_eq!(loaded.rows[2].timestamp, "2024-05-01 10:00:30");
        assert!(loaded.rows.iter().all(|r| r.label == "pod-failure"));
        assert!(loaded
            .rows
            .iter()
            .all(|r| r.values.iter().all(|v| v.is_some())));
    }
}
