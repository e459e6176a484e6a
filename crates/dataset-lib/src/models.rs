//! Core data models for the dataset pipeline

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::PipelineError;

/// Name of the label column in every persisted matrix and dataset
pub const LABEL_COLUMN: &str = "cluster_issue_type";

/// Name of the index column in every persisted matrix and dataset
pub const TIMESTAMP_COLUMN: &str = "timestamp";

/// One raw sample as returned by a range query
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Unix timestamp in seconds
    pub timestamp: f64,
    /// Sample value, `None` when missing, non-numeric or NaN
    pub value: Option<f64>,
}

impl Sample {
    pub fn new(timestamp: f64, value: f64) -> Self {
        Self {
            timestamp,
            value: if value.is_nan() { None } else { Some(value) },
        }
    }

    pub fn missing(timestamp: f64) -> Self {
        Self {
            timestamp,
            value: None,
        }
    }
}

/// Entity discriminator distinguishing columns of the same metric
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityKey(String);

impl EntityKey {
    pub fn new(discriminator: impl Into<String>) -> Self {
        Self(discriminator.into())
    }

    /// Build the discriminator for a series from its query labels.
    ///
    /// Known categories use a fixed label list; every other category joins
    /// all label values (except `__name__`) in label-name order.
    pub fn from_labels(category: &str, labels: &BTreeMap<String, String>) -> Self {
        let keyed: &[&str] = match category {
            "node" => &["node"],
            "pod" => &["namespace", "pod"],
            "container_runtime" => &["namespace", "pod", "container"],
            _ => &[],
        };

        if !keyed.is_empty() {
            let parts: Vec<&str> = keyed
                .iter()
                .map(|label| labels.get(*label).map(String::as_str).unwrap_or("unknown"))
                .collect();
            return Self(parts.join("_"));
        }

        let parts: Vec<&str> = labels
            .iter()
            .filter(|(name, _)| name.as_str() != "__name__")
            .map(|(_, value)| value.as_str())
            .collect();
        if parts.is_empty() {
            Self("unknown".to_string())
        } else {
            Self(parts.join("_"))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One metric time series for one entity
#[derive(Debug, Clone, PartialEq)]
pub struct RawSeries {
    pub entity: EntityKey,
    pub samples: Vec<Sample>,
}

impl RawSeries {
    pub fn new(entity: EntityKey, samples: Vec<Sample>) -> Self {
        Self { entity, samples }
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn timestamps(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.timestamp).collect()
    }
}

/// All series of one collection category (node, pod, etcd, ...)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricCategory {
    pub name: String,
    pub metrics: BTreeMap<String, Vec<RawSeries>>,
}

impl MetricCategory {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            metrics: BTreeMap::new(),
        }
    }

    pub fn with_series(mut self, metric: impl Into<String>, series: RawSeries) -> Self {
        self.metrics.entry(metric.into()).or_default().push(series);
        self
    }

    pub fn series_count(&self) -> usize {
        self.metrics.values().map(Vec::len).sum()
    }
}

/// Object an event refers to
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvolvedObject {
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Kubernetes event record as captured by the collector
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub count: Option<u64>,
    #[serde(default, rename = "type")]
    pub event_type: Option<String>,
    #[serde(default)]
    pub first_timestamp: Option<String>,
    #[serde(default)]
    pub last_timestamp: Option<String>,
    #[serde(default)]
    pub involved_object: InvolvedObject,
}

impl EventRecord {
    pub fn kind(&self) -> EventType {
        EventType::parse(self.event_type.as_deref().unwrap_or("Unknown"))
    }

    pub fn reason(&self) -> &str {
        self.reason.as_deref().unwrap_or("Unknown")
    }
}

/// Event type reported by the API server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventType {
    Normal,
    Warning,
    Error,
    Other(String),
}

impl EventType {
    pub fn parse(value: &str) -> Self {
        match value {
            "Normal" => EventType::Normal,
            "Warning" => EventType::Warning,
            "Error" => EventType::Error,
            other => EventType::Other(other.to_string()),
        }
    }
}

/// Scenario label attached to every row of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IssueType {
    Resource,
    Network,
    PodFailure,
    Dns,
    Storage,
    NodeFailure,
    ControlPlane,
    NetworkPolicy,
    /// Baseline collection without an injected fault
    #[default]
    None,
}

impl IssueType {
    pub const ALL: [IssueType; 9] = [
        IssueType::Resource,
        IssueType::Network,
        IssueType::PodFailure,
        IssueType::Dns,
        IssueType::Storage,
        IssueType::NodeFailure,
        IssueType::ControlPlane,
        IssueType::NetworkPolicy,
        IssueType::None,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IssueType::Resource => "resource",
            IssueType::Network => "network",
            IssueType::PodFailure => "pod-failure",
            IssueType::Dns => "dns",
            IssueType::Storage => "storage",
            IssueType::NodeFailure => "node-failure",
            IssueType::ControlPlane => "control-plane",
            IssueType::NetworkPolicy => "network-policy",
            IssueType::None => "none",
        }
    }
}

impl fmt::Display for IssueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IssueType {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        IssueType::ALL
            .iter()
            .copied()
            .find(|issue| issue.as_str() == s)
            .ok_or_else(|| PipelineError::UnknownIssueType(s.to_string()))
    }
}

/// Scalar metadata recorded by the collector for one run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub duration_minutes: Option<f64>,
    #[serde(default)]
    pub step: Option<String>,
    #[serde(default)]
    pub namespaces: Option<Vec<String>>,
    #[serde(default)]
    pub cluster_issue_type: Option<String>,
}

impl RunMetadata {
    /// Scenario label of the run, `none` when the collector recorded no label
    pub fn issue_type(&self) -> Result<IssueType, PipelineError> {
        match self.cluster_issue_type.as_deref() {
            None | Some("") => Ok(IssueType::None),
            Some(label) => label.parse(),
        }
    }
}

/// One fully materialised collection run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRun {
    pub metadata: RunMetadata,
    pub categories: Vec<MetricCategory>,
    pub events: Vec<EventRecord>,
}

impl RawRun {
    pub fn series_count(&self) -> usize {
        self.categories.iter().map(MetricCategory::series_count).sum()
    }

    /// Iterate every series as `(category, metric, series)` in scan order
    pub fn iter_series(&self) -> impl Iterator<Item = (&str, &str, &RawSeries)> {
        self.categories.iter().flat_map(|category| {
            category.metrics.iter().flat_map(move |(metric, series)| {
                series
                    .iter()
                    .map(move |s| (category.name.as_str(), metric.as_str(), s))
            })
        })
    }
}
