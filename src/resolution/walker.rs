//! Upward walk from a leaf monitor to its root
//!
//! Each step resolves the parent, projects labels onto it, and builds the
//! parent's instance id. The parent instance then becomes the child of the
//! next step until no parent applies.

use crate::definitions::{DefinitionTable, InstanceIdentityLabelSet};
use crate::error::ResolutionError;
use crate::events::{MonitorInstance, ResolutionStep};
use crate::resolution::{leaf_instance_id, IdentityBuilder, LabelProjector, ParentResolver};
use log::debug;
use std::sync::Arc;

/// Composes parent resolution, label projection and identity building
#[derive(Debug, Clone)]
pub struct HierarchyWalker {
    table: Arc<DefinitionTable>,
    resolver: ParentResolver,
    projector: LabelProjector,
    identity: IdentityBuilder,
}

impl HierarchyWalker {
    pub fn new(table: Arc<DefinitionTable>, identities: Arc<InstanceIdentityLabelSet>) -> Self {
        Self {
            resolver: ParentResolver::new(Arc::clone(&table)),
            projector: LabelProjector::new(Arc::clone(&table)),
            identity: IdentityBuilder::new(identities),
            table,
        }
    }

    pub fn resolver(&self) -> &ParentResolver {
        &self.resolver
    }

    pub fn projector(&self) -> &LabelProjector {
        &self.projector
    }

    pub fn identity(&self) -> &IdentityBuilder {
        &self.identity
    }

    /// Key of a leaf instance in the aggregate store
    ///
    /// Uses the leaf type's identity labels when they yield any value, and
    /// every label of the instance otherwise, so unregistered leaves never
    /// collapse into one key.
    ///
    /// # Errors
    ///
    /// Returns `ResolutionError::MissingIdentityDefinition` if the leaf's
    /// registration is not a sequence.
    pub fn leaf_instance_id(
        &self,
        instance: &MonitorInstance,
    ) -> Result<String, ResolutionError> {
        let id = self
            .identity
            .build_instance_id(&instance.monitor_id, &instance.labels)?;
        // The builder returns the bare monitor id only for singletons
        if id == instance.monitor_id {
            Ok(leaf_instance_id(&instance.monitor_id, &instance.labels))
        } else {
            Ok(id)
        }
    }

    /// Resolve a single step up from `instance`
    ///
    /// Returns `Ok(None)` when `instance` has no parent.
    pub fn resolve_step(
        &self,
        instance: &MonitorInstance,
    ) -> Result<Option<ResolutionStep>, ResolutionError> {
        let parent_monitor_id = match self.resolver.resolve_parent(instance)? {
            Some(parent) => parent,
            None => return Ok(None),
        };

        let parent_labels = self
            .projector
            .project_labels(&instance.monitor_id, &instance.labels)?;
        let instance_id = self
            .identity
            .build_instance_id(&parent_monitor_id, &parent_labels)?;

        Ok(Some(ResolutionStep {
            monitor_id: instance.monitor_id.clone(),
            parent_monitor_id,
            parent_labels,
            instance_id,
        }))
    }

    /// Walk from `leaf` up to its root
    ///
    /// Steps are returned bottom-up. An empty result means the leaf itself is
    /// a root.
    ///
    /// # Errors
    ///
    /// Fails with the first error of any step. `CyclicDefinition` is returned
    /// if the walk takes more steps than there are definitions.
    pub fn walk(&self, leaf: &MonitorInstance) -> Result<Vec<ResolutionStep>, ResolutionError> {
        let bound = self.table.len();
        let mut steps: Vec<ResolutionStep> = Vec::new();
        let mut current = leaf.clone();

        while let Some(step) = self.resolve_step(&current)? {
            if steps.len() >= bound {
                let mut path: Vec<&str> = steps.iter().map(|s| s.monitor_id.as_str()).collect();
                path.push(&step.monitor_id);
                return Err(ResolutionError::CyclicDefinition(format!(
                    "walk from '{}' exceeded {} steps: {}",
                    leaf.monitor_id,
                    bound,
                    path.join(" -> ")
                )));
            }

            debug!(
                "Resolved {} -> {} ({})",
                step.monitor_id, step.parent_monitor_id, step.instance_id
            );
            current = MonitorInstance::new(
                step.parent_monitor_id.clone(),
                step.parent_labels.clone(),
            );
            steps.push(step);
        }

        Ok(steps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definitions::MonitorDefinition;
    use crate::events::Labels;
    use crate::resolution::Condition;

    fn label_set(pairs: &[(&str, &str)]) -> Labels {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn walker(
        definitions: Vec<MonitorDefinition>,
        identities: InstanceIdentityLabelSet,
    ) -> HierarchyWalker {
        HierarchyWalker::new(
            Arc::new(DefinitionTable::new(definitions).unwrap()),
            Arc::new(identities),
        )
    }

    #[test]
    fn test_container_cpu_resolves_to_singleton_node_agg() {
        let walker = walker(
            vec![
                MonitorDefinition::with_conditions(
                    "container-cpu",
                    vec![Condition::parse("namespace", "==", "ns1", "node-agg").unwrap()],
                ),
                MonitorDefinition::root("node-agg"),
            ],
            InstanceIdentityLabelSet::new(),
        );

        let leaf = MonitorInstance::new(
            "container-cpu",
            label_set(&[("pod", "p1"), ("namespace", "ns1")]),
        );
        let step = walker.resolve_step(&leaf).unwrap().unwrap();

        assert_eq!(step.monitor_id, "container-cpu");
        assert_eq!(step.parent_monitor_id, "node-agg");
        assert!(step.parent_labels.is_empty());
        assert_eq!(step.instance_id, "node-agg");
    }

    #[test]
    fn test_identity_labels_from_projection() {
        let walker = walker(
            vec![
                MonitorDefinition::with_parent("container-cpu", "node-agg")
                    .copy_labels(["region", "cluster"]),
                MonitorDefinition::root("node-agg"),
            ],
            InstanceIdentityLabelSet::new().register("node-agg", ["region", "cluster"]),
        );

        let leaf = MonitorInstance::new(
            "container-cpu",
            label_set(&[("region", "eastus"), ("cluster", "c1"), ("pod", "p1")]),
        );
        let step = walker.resolve_step(&leaf).unwrap().unwrap();

        assert_eq!(
            step.parent_labels,
            label_set(&[("region", "eastus"), ("cluster", "c1")])
        );
        assert_eq!(step.instance_id, "node-agg-eastus-c1");
    }

    #[test]
    fn test_walk_to_root() {
        let walker = walker(
            vec![
                MonitorDefinition::with_parent("container-cpu", "pod-agg")
                    .copy_labels(["pod", "node", "cluster"]),
                MonitorDefinition::with_parent("pod-agg", "node-agg").copy_labels(["node", "cluster"]),
                MonitorDefinition::with_parent("node-agg", "cluster-agg").copy_labels(["cluster"]),
                MonitorDefinition::root("cluster-agg"),
            ],
            InstanceIdentityLabelSet::new()
                .register("pod-agg", ["pod"])
                .register("node-agg", ["node"])
                .register("cluster-agg", ["cluster"]),
        );

        let leaf = MonitorInstance::new(
            "container-cpu",
            label_set(&[("pod", "p1"), ("node", "n1"), ("cluster", "c1")]),
        );
        let steps = walker.walk(&leaf).unwrap();

        let ids: Vec<&str> = steps.iter().map(|s| s.instance_id.as_str()).collect();
        assert_eq!(ids, vec!["pod-agg-p1", "node-agg-n1", "cluster-agg-c1"]);
        assert_eq!(steps[1].monitor_id, "pod-agg");
        assert_eq!(steps[2].parent_labels, label_set(&[("cluster", "c1")]));
    }

    #[test]
    fn test_walk_from_root_is_empty() {
        let walker = walker(
            vec![MonitorDefinition::root("cluster-agg")],
            InstanceIdentityLabelSet::new(),
        );

        let steps = walker
            .walk(&MonitorInstance::new("cluster-agg", Labels::new()))
            .unwrap();
        assert!(steps.is_empty());
    }

    #[test]
    fn test_walk_stops_when_no_condition_matches() {
        let walker = walker(
            vec![
                MonitorDefinition::with_parent("container-cpu", "workload-agg")
                    .copy_labels(["namespace"]),
                MonitorDefinition::with_conditions(
                    "workload-agg",
                    vec![Condition::parse("namespace", "==", "kube-system", "system-agg").unwrap()],
                ),
                MonitorDefinition::root("system-agg"),
            ],
            InstanceIdentityLabelSet::new(),
        );

        let leaf = MonitorInstance::new("container-cpu", label_set(&[("namespace", "ns1")]));
        let steps = walker.walk(&leaf).unwrap();

        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].parent_monitor_id, "workload-agg");
    }

    #[test]
    fn test_walk_into_undefined_parent_fails() {
        let walker = walker(
            vec![MonitorDefinition::with_parent("container-cpu", "node-agg")],
            InstanceIdentityLabelSet::new(),
        );

        let leaf = MonitorInstance::new("container-cpu", Labels::new());
        assert_eq!(
            walker.walk(&leaf),
            Err(ResolutionError::UnknownMonitor("node-agg".to_string()))
        );
    }

    #[test]
    fn test_walk_unknown_leaf_fails() {
        let walker = walker(vec![], InstanceIdentityLabelSet::new());
        let leaf = MonitorInstance::new("container-cpu", Labels::new());

        assert_eq!(
            walker.walk(&leaf),
            Err(ResolutionError::UnknownMonitor("container-cpu".to_string()))
        );
    }

    #[test]
    fn test_leaf_instance_id_prefers_identity_labels() {
        let walker = walker(
            vec![MonitorDefinition::root("container-cpu")],
            InstanceIdentityLabelSet::new().register("container-cpu", ["pod"]),
        );

        let leaf = MonitorInstance::new(
            "container-cpu",
            label_set(&[("pod", "p1"), ("container", "app")]),
        );
        assert_eq!(walker.leaf_instance_id(&leaf).unwrap(), "container-cpu-p1");

        let unlabeled = MonitorInstance::new("container-cpu", label_set(&[("container", "app")]));
        assert_eq!(
            walker.leaf_instance_id(&unlabeled).unwrap(),
            r#"container-cpu{container="app"}"#
        );
    }

    #[test]
    fn test_unregistered_leaf_instance_id_uses_all_labels() {
        let walker = walker(
            vec![MonitorDefinition::root("container-cpu")],
            InstanceIdentityLabelSet::new(),
        );

        let p1 = MonitorInstance::new("container-cpu", label_set(&[("pod", "p1")]));
        let p2 = MonitorInstance::new("container-cpu", label_set(&[("pod", "p2")]));
        assert_ne!(
            walker.leaf_instance_id(&p1).unwrap(),
            walker.leaf_instance_id(&p2).unwrap()
        );
    }
}
