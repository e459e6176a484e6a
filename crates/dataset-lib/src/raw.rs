//! Raw collection run loading
//!
//! Reads the JSON document written by the metrics collector: run metadata,
//! one `<category>_metrics` object per query category holding Prometheus
//! range-query results, and the Kubernetes events listed for the run.

use crate::error::{PipelineError, Result};
use crate::models::{EntityKey, EventRecord, MetricCategory, RawRun, RawSeries, RunMetadata, Sample};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, warn};

const CATEGORY_SUFFIX: &str = "_metrics";

/// Categories scanned before all others, in this order
const LEADING_CATEGORIES: &[&str] = &["node", "pod"];

#[derive(Debug, Deserialize)]
struct RawDocument {
    #[serde(default)]
    metadata: RunMetadata,
    #[serde(default)]
    events: Vec<EventRecord>,
    #[serde(flatten)]
    sections: BTreeMap<String, Value>,
}

/// One entry of a Prometheus matrix result
#[derive(Debug, Deserialize)]
struct MatrixEntry {
    #[serde(default)]
    metric: BTreeMap<String, Value>,
    #[serde(default)]
    values: Vec<(f64, Value)>,
}

/// Load a raw run from a collector JSON file
pub fn load_raw_run(path: &Path) -> Result<RawRun> {
    let content = std::fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
    let run = parse_raw_run(&content)?;
    debug!(
        path = %path.display(),
        categories = run.categories.len(),
        series = run.series_count(),
        events = run.events.len(),
        "Loaded raw run"
    );
    Ok(run)
}

/// Parse a raw run from its JSON text
pub fn parse_raw_run(content: &str) -> Result<RawRun> {
    let document: RawDocument = serde_json::from_str(content)?;

    let mut categories = Vec::new();
    for (key, section) in document.sections {
        let Some(name) = key.strip_suffix(CATEGORY_SUFFIX) else {
            continue;
        };
        categories.push(parse_category(name, section)?);
    }
    categories.sort_by(|a, b| category_rank(&a.name).cmp(&category_rank(&b.name)));

    Ok(RawRun {
        metadata: document.metadata,
        categories,
        events: document.events,
    })
}

/// Sort key giving the fixed category scan order
fn category_rank(name: &str) -> (usize, String) {
    let leading = LEADING_CATEGORIES
        .iter()
        .position(|c| *c == name)
        .unwrap_or(LEADING_CATEGORIES.len());
    (leading, name.to_string())
}

fn parse_category(name: &str, section: Value) -> Result<MetricCategory> {
    let metrics: BTreeMap<String, Vec<MatrixEntry>> = serde_json::from_value(section)?;
    let mut category = MetricCategory::new(name);

    for (metric, entries) in metrics {
        let series = entries
            .into_iter()
            .map(|entry| {
                let labels = label_strings(entry.metric);
                let samples = entry
                    .values
                    .into_iter()
                    .map(|(ts, value)| match parse_value(&value) {
                        Some(v) => Sample::new(ts, v),
                        None => Sample::missing(ts),
                    })
                    .collect();
                RawSeries::new(EntityKey::from_labels(name, &labels), samples)
            })
            .collect();
        category.metrics.insert(metric, series);
    }

    Ok(category)
}

fn label_strings(labels: BTreeMap<String, Value>) -> BTreeMap<String, String> {
    labels
        .into_iter()
        .map(|(k, v)| {
            let value = match v {
                Value::String(s) => s,
                other => other.to_string(),
            };
            (k, value)
        })
        .collect()
}

/// Prometheus encodes sample values as strings; tolerate plain numbers too
fn parse_value(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    if parsed.is_none() {
        warn!(value = %value, "Non-numeric sample value treated as missing");
    }
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;

    const RAW: &str = r#"{
        "metadata": {
            "start_time": "2024-05-01T10:00:00",
            "end_time": "2024-05-01T10:01:00",
            "duration_minutes": 1,
            "step": "15s",
            "namespaces": ["default"],
            "cluster_issue_type": "network"
        },
        "pod_metrics": {
            "pod_cpu_usage": [
                {"metric": {"namespace": "default", "pod": "web-0"},
                 "values": [[1714557600, "0.25"], [1714557615, "NaN"]]}
            ]
        },
        "etcd_metrics": {
            "etcd_has_leader": [{"metric": {}, "values": [[1714557600, 1]]}]
        },
        "node_metrics": {
            "node_cpu_usage": [
                {"metric": {"node": "worker-1"}, "values": [[1714557600, "1.5"]]}
            ]
        },
        "events": [
            {"namespace": "default", "name": "web-0.1", "reason": "BackOff",
             "type": "Warning", "count": 3,
             "last_timestamp": "2024-05-01T10:00:20+00:00",
             "involved_object": {"kind": "Pod", "name": "web-0"}}
        ]
    }"#;

    #[test]
    fn test_parse_categories_in_scan_order() {
        let run = parse_raw_run(RAW).unwrap();
        let names: Vec<&str> = run.categories.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["node", "pod", "etcd"]);
        assert_eq!(run.series_count(), 3);
    }

    #[test]
    fn test_parse_samples_and_entities() {
        let run = parse_raw_run(RAW).unwrap();
        let pod = &run.categories[1].metrics["pod_cpu_usage"][0];
        assert_eq!(pod.entity.as_str(), "default_web-0");
        assert_eq!(pod.samples[0].value, Some(0.25));
        assert_eq!(pod.samples[1].value, None);

        let etcd = &run.categories[2].metrics["etcd_has_leader"][0];
        assert_eq!(etcd.entity.as_str(), "unknown");
        assert_eq!(etcd.samples[0].value, Some(1.0));
    }

    #[test]
    fn test_parse_metadata_and_events() {
        let run = parse_raw_run(RAW).unwrap();
        assert_eq!(run.metadata.cluster_issue_type.as_deref(), Some("network"));
        assert_eq!(run.events.len(), 1);
        assert_eq!(run.events[0].reason(), "BackOff");
        assert_eq!(run.events[0].involved_object.kind.as_deref(), Some("Pod"));
    }

    #[test]
    fn test_invalid_document_is_json_error() {
        assert!(matches!(
            parse_raw_run("{\"node_metrics\": 5}"),
            Err(PipelineError::Json(_))
        ));
        assert!(matches!(parse_raw_run("not json"), Err(PipelineError::Json(_))));
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = load_raw_run(Path::new("/nonexistent/raw.json")).unwrap_err();
        assert!(matches!(err, PipelineError::Io { .. }));
    }
}
