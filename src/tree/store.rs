//! In-memory aggregate state store
//!
//! Records the latest state of every monitor instance touched by a hierarchy
//! walk. An aggregate's state is the worst state among its children; each
//! child's latest report replaces its previous one.

use crate::events::{HealthState, LeafStateChange, Labels, ResolutionStep, Timestamp};
use log::debug;
use std::collections::{BTreeMap, HashMap};

/// Latest known state of one monitor instance
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorRecord {
    /// Monitor definition id
    pub monitor_id: String,
    /// Instance id (for aggregates, the synthesized identity)
    pub instance_id: String,
    /// Labels of the instance
    pub labels: Labels,
    /// Current state
    pub state: HealthState,
    /// Latest state reported by each child instance
    pub children: BTreeMap<String, HealthState>,
    /// Instance id of the parent, if any
    pub parent_instance_id: Option<String>,
    /// Time of the last state change applied to this record
    pub last_updated: Timestamp,
}

impl MonitorRecord {
    fn new(monitor_id: &str, instance_id: &str, labels: Labels, now: Timestamp) -> Self {
        Self {
            monitor_id: monitor_id.to_string(),
            instance_id: instance_id.to_string(),
            labels,
            state: HealthState::Unknown,
            children: BTreeMap::new(),
            parent_instance_id: None,
            last_updated: now,
        }
    }

    /// Whether this record aggregates other instances
    pub fn is_aggregate(&self) -> bool {
        !self.children.is_empty()
    }

    fn recompute(&mut self) {
        self.state = self
            .children
            .values()
            .copied()
            .max()
            .unwrap_or(HealthState::Unknown);
    }
}

/// Store of monitor records keyed by instance id
#[derive(Debug, Default)]
pub struct AggregateStore {
    records: HashMap<String, MonitorRecord>,
}

impl AggregateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a leaf state change and the walk computed for it
    ///
    /// `leaf_instance_id` keys the leaf record; `steps` must be the bottom-up
    /// walk starting at that leaf. An instance whose parent changed since its
    /// last report is detached from the previous parent first.
    pub fn apply(
        &mut self,
        event: &LeafStateChange,
        leaf_instance_id: &str,
        steps: &[ResolutionStep],
    ) {
        let now = event.timestamp;
        let leaf_parent = steps.first().map(|step| step.instance_id.clone());

        let leaf = self
            .records
            .entry(leaf_instance_id.to_string())
            .or_insert_with(|| {
                MonitorRecord::new(&event.monitor_id, leaf_instance_id, event.labels.clone(), now)
            });
        leaf.labels = event.labels.clone();
        leaf.state = event.state;
        leaf.last_updated = now;
        let previous_parent =
            std::mem::replace(&mut leaf.parent_instance_id, leaf_parent.clone());
        self.reparent(leaf_instance_id, previous_parent, leaf_parent.as_deref(), now);

        let mut child_instance_id = leaf_instance_id.to_string();
        let mut child_state = event.state;

        for (depth, step) in steps.iter().enumerate() {
            let parent_of_parent = steps.get(depth + 1).map(|next| next.instance_id.clone());

            let record = self
                .records
                .entry(step.instance_id.clone())
                .or_insert_with(|| {
                    MonitorRecord::new(
                        &step.parent_monitor_id,
                        &step.instance_id,
                        step.parent_labels.clone(),
                        now,
                    )
                });
            record.labels = step.parent_labels.clone();
            record.children.insert(child_instance_id, child_state);
            record.recompute();
            record.last_updated = now;
            let previous_parent =
                std::mem::replace(&mut record.parent_instance_id, parent_of_parent.clone());

            debug!(
                "Aggregate '{}' is now {:?} ({} children)",
                record.instance_id,
                record.state,
                record.children.len()
            );

            child_instance_id = record.instance_id.clone();
            child_state = record.state;
            self.reparent(
                &child_instance_id,
                previous_parent,
                parent_of_parent.as_deref(),
                now,
            );
        }
    }

    fn reparent(
        &mut self,
        instance_id: &str,
        previous_parent: Option<String>,
        parent: Option<&str>,
        now: Timestamp,
    ) {
        if let Some(previous_parent) = previous_parent {
            if parent != Some(previous_parent.as_str()) {
                debug!(
                    "Instance '{}' moved from '{}' to {:?}",
                    instance_id, previous_parent, parent
                );
                self.detach(instance_id, &previous_parent, now);
            }
        }
    }

    /// Remove a child from `parent_instance_id` and refresh the ancestors above it
    ///
    /// Aggregates left without children are removed as well.
    fn detach(&mut self, child_instance_id: &str, parent_instance_id: &str, now: Timestamp) {
        let mut child = child_instance_id.to_string();
        // `None` removes the child, `Some` records its new state
        let mut child_state: Option<HealthState> = None;
        let mut next = Some(parent_instance_id.to_string());

        while let Some(instance_id) = next {
            let record = match self.records.get_mut(&instance_id) {
                Some(record) => record,
                None => break,
            };

            match child_state {
                Some(state) => {
                    record.children.insert(child, state);
                }
                None => {
                    record.children.remove(&child);
                }
            }
            next = record.parent_instance_id.clone();

            if record.children.is_empty() {
                debug!("Aggregate '{}' has no children left", instance_id);
                self.records.remove(&instance_id);
                child_state = None;
            } else {
                record.recompute();
                record.last_updated = now;
                child_state = Some(record.state);
            }
            child = instance_id;
        }
    }

    pub fn get(&self, instance_id: &str) -> Option<&MonitorRecord> {
        self.records.get(instance_id)
    }

    /// Records without a parent, sorted by instance id
    pub fn roots(&self) -> Vec<&MonitorRecord> {
        let mut roots: Vec<&MonitorRecord> = self
            .records
            .values()
            .filter(|record| record.parent_instance_id.is_none())
            .collect();
        roots.sort_by(|a, b| a.instance_id.cmp(&b.instance_id));
        roots
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
