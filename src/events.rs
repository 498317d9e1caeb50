//! Core event types for the monitor hierarchy
//!
//! This module defines the data structures that flow through the resolution
//! chain: monitor instances with their labels, leaf state changes coming from
//! the ingestion pipeline, and the per-step output of a hierarchy walk.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Timestamp type for consistent time handling across the application
pub type Timestamp = DateTime<Utc>;

/// Label set attached to a monitor instance
///
/// Ordered so that logging and serialized output are stable across runs.
pub type Labels = BTreeMap<String, String>;

/// A monitor together with the labels of one of its running instances
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MonitorInstance {
    /// Id of the monitor definition this instance belongs to
    pub monitor_id: String,
    /// Labels observed on this instance
    #[serde(default)]
    pub labels: Labels,
}

impl MonitorInstance {
    pub fn new(monitor_id: impl Into<String>, labels: Labels) -> Self {
        Self {
            monitor_id: monitor_id.into(),
            labels,
        }
    }
}

/// Health state reported by a monitor
///
/// Ordered from least to most severe; an aggregate takes the worst state
/// of its children.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    /// No state has been observed yet
    #[default]
    Unknown,
    /// Monitor is healthy
    Pass,
    /// Monitor is degraded
    Warning,
    /// Monitor is unhealthy
    Fail,
}

/// A leaf monitor state change, as produced by the ingestion pipeline
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LeafStateChange {
    /// Leaf monitor id
    pub monitor_id: String,
    /// Labels observed on the leaf instance
    #[serde(default)]
    pub labels: Labels,
    /// New health state of the leaf
    #[serde(default)]
    pub state: HealthState,
    /// When the state was observed
    #[serde(default = "Utc::now")]
    pub timestamp: Timestamp,
}

impl LeafStateChange {
    /// View this event as the monitor instance it describes
    pub fn instance(&self) -> MonitorInstance {
        MonitorInstance::new(self.monitor_id.clone(), self.labels.clone())
    }
}

/// Output of a single upward resolution step
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResolutionStep {
    /// Monitor that was resolved in this step (the child)
    pub monitor_id: String,
    /// Resolved parent monitor id
    pub parent_monitor_id: String,
    /// Labels projected from the child onto the parent
    pub parent_labels: Labels,
    /// Synthesized instance id of the parent aggregate
    pub instance_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_state_ordering() {
        assert!(HealthState::Unknown < HealthState::Pass);
        assert!(HealthState::Pass < HealthState::Warning);
        assert!(HealthState::Warning < HealthState::Fail);
    }

    #[test]
    fn test_health_state_serialization() {
        assert_eq!(
            serde_json::to_string(&HealthState::Pass).unwrap(),
            "\"pass\""
        );
        assert_eq!(
            serde_json::to_string(&HealthState::Fail).unwrap(),
            "\"fail\""
        );
    }

    #[test]
    fn test_leaf_state_change_defaults() {
        let event: LeafStateChange =
            serde_json::from_str(r#"{"monitor_id": "container-cpu"}"#).unwrap();

        assert_eq!(event.monitor_id, "container-cpu");
        assert!(event.labels.is_empty());
        assert_eq!(event.state, HealthState::Unknown);
    }

    #[test]
    fn test_leaf_state_change_instance() {
        let event: LeafStateChange = serde_json::from_str(
            r#"{"monitor_id": "container-cpu", "labels": {"pod": "p1"}, "state": "warning"}"#,
        )
        .unwrap();

        let instance = event.instance();
        assert_eq!(instance.monitor_id, "container-cpu");
        assert_eq!(instance.labels.get("pod").map(String::as_str), Some("p1"));
        assert_eq!(event.state, HealthState::Warning);
    }
}
