//! Monitor definition table
//!
//! The table is an arena: every definition lives in a `Vec` and candidate
//! parent edges are stored as indices into it. Building the table rejects any
//! cycle among candidate edges, so an upward walk can visit at most
//! `len()` monitors.

use crate::error::ResolutionError;
use crate::resolution::Condition;
use log::{debug, warn};
use std::collections::HashMap;

/// Static definition of a monitor
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MonitorDefinition {
    /// Unique monitor id
    pub monitor_id: String,
    /// Fixed parent, when the parent does not depend on labels
    pub parent_monitor_id: Option<String>,
    /// Ordered candidate parents, first match wins
    pub conditions: Vec<Condition>,
    /// Labels this monitor copies onto its parent
    pub labels_to_copy: Vec<String>,
}

impl MonitorDefinition {
    /// Create a root definition (no parent, no conditions)
    pub fn root(monitor_id: impl Into<String>) -> Self {
        Self {
            monitor_id: monitor_id.into(),
            ..Default::default()
        }
    }

    /// Create a definition with a fixed parent
    pub fn with_parent(monitor_id: impl Into<String>, parent_id: impl Into<String>) -> Self {
        Self {
            monitor_id: monitor_id.into(),
            parent_monitor_id: Some(parent_id.into()),
            ..Default::default()
        }
    }

    /// Create a definition whose parent is chosen by conditions
    pub fn with_conditions(monitor_id: impl Into<String>, conditions: Vec<Condition>) -> Self {
        Self {
            monitor_id: monitor_id.into(),
            conditions,
            ..Default::default()
        }
    }

    /// Set the labels copied onto the parent
    pub fn copy_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels_to_copy = labels.into_iter().map(Into::into).collect();
        self
    }

    /// Fixed parent id, if present and non-empty
    pub fn fixed_parent(&self) -> Option<&str> {
        self.parent_monitor_id
            .as_deref()
            .filter(|parent| !parent.is_empty())
    }

    /// Whether this definition has no way to reach a parent
    pub fn is_root(&self) -> bool {
        self.fixed_parent().is_none() && self.conditions.is_empty()
    }

    /// Every parent this definition can resolve to
    ///
    /// A fixed parent takes precedence, so conditions are not candidates
    /// when one is set.
    pub fn candidate_parents(&self) -> Vec<&str> {
        match self.fixed_parent() {
            Some(parent) => vec![parent],
            None => self
                .conditions
                .iter()
                .map(|condition| condition.parent_id.as_str())
                .collect(),
        }
    }
}

/// Index of a monitor in the definition arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Debug)]
struct MonitorNode {
    definition: MonitorDefinition,
    /// Candidate parents that have definitions of their own
    parents: Vec<NodeId>,
}

/// Immutable table of monitor definitions, keyed by monitor id
#[derive(Debug, Default)]
pub struct DefinitionTable {
    nodes: Vec<MonitorNode>,
    index: HashMap<String, NodeId>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

impl DefinitionTable {
    /// Build the table and check it for cycles
    ///
    /// A later definition with an already-seen id replaces the earlier one.
    ///
    /// # Errors
    ///
    /// Returns `ResolutionError::CyclicDefinition` if following candidate
    /// parents from any monitor can lead back to it.
    pub fn new<I>(definitions: I) -> Result<Self, ResolutionError>
    where
        I: IntoIterator<Item = MonitorDefinition>,
    {
        let mut nodes: Vec<MonitorNode> = Vec::new();
        let mut index: HashMap<String, NodeId> = HashMap::new();

        for definition in definitions {
            if definition.fixed_parent().is_some() && !definition.conditions.is_empty() {
                warn!(
                    "Monitor '{}' has both a fixed parent and conditions; conditions are ignored",
                    definition.monitor_id
                );
            }

            match index.get(&definition.monitor_id) {
                Some(&id) => {
                    warn!(
                        "Duplicate definition for monitor '{}', keeping the last one",
                        definition.monitor_id
                    );
                    nodes[id.0].definition = definition;
                }
                None => {
                    let id = NodeId(nodes.len());
                    index.insert(definition.monitor_id.clone(), id);
                    nodes.push(MonitorNode {
                        definition,
                        parents: Vec::new(),
                    });
                }
            }
        }

        for node in nodes.iter_mut() {
            let mut parents = Vec::new();
            for parent in node.definition.candidate_parents() {
                if let Some(&parent_id) = index.get(parent) {
                    if !parents.contains(&parent_id) {
                        parents.push(parent_id);
                    }
                }
            }
            node.parents = parents;
        }

        let table = Self { nodes, index };
        table.check_acyclic()?;
        debug!("Built definition table with {} monitors", table.len());
        Ok(table)
    }

    /// Look up a monitor definition by id
    ///
    /// # Errors
    ///
    /// Returns `ResolutionError::UnknownMonitor` if the id is not defined.
    pub fn lookup(&self, monitor_id: &str) -> Result<&MonitorDefinition, ResolutionError> {
        self.node_id(monitor_id)
            .map(|id| self.definition(id))
            .ok_or_else(|| ResolutionError::UnknownMonitor(monitor_id.to_string()))
    }

    /// Arena index of a monitor id
    pub fn node_id(&self, monitor_id: &str) -> Option<NodeId> {
        self.index.get(monitor_id).copied()
    }

    /// Definition stored at an arena index
    pub fn definition(&self, id: NodeId) -> &MonitorDefinition {
        &self.nodes[id.0].definition
    }

    /// Defined candidate parents of a monitor
    pub fn parents(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].parents
    }

    pub fn contains(&self, monitor_id: &str) -> bool {
        self.index.contains_key(monitor_id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterate over all definitions in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &MonitorDefinition> {
        self.nodes.iter().map(|node| &node.definition)
    }

    /// Candidate parent references that have no definition
    ///
    /// Returns `(child, parent)` pairs. Walking into such a parent fails with
    /// `UnknownMonitor`, so configuration validation reports them up front.
    pub fn undefined_parents(&self) -> Vec<(String, String)> {
        let mut missing = Vec::new();
        for definition in self.iter() {
            for parent in definition.candidate_parents() {
                if !self.contains(parent) {
                    missing.push((definition.monitor_id.clone(), parent.to_string()));
                }
            }
        }
        missing
    }

    fn check_acyclic(&self) -> Result<(), ResolutionError> {
        let mut marks = vec![Mark::Unvisited; self.nodes.len()];
        let mut path = Vec::new();

        for start in 0..self.nodes.len() {
            if marks[start] == Mark::Unvisited {
                self.visit(NodeId(start), &mut marks, &mut path)?;
            }
        }
        Ok(())
    }

    fn visit(
        &self,
        id: NodeId,
        marks: &mut [Mark],
        path: &mut Vec<NodeId>,
    ) -> Result<(), ResolutionError> {
        marks[id.0] = Mark::InProgress;
        path.push(id);

        for &parent in self.parents(id) {
            match marks[parent.0] {
                Mark::Done => {}
                Mark::Unvisited => self.visit(parent, marks, path)?,
                Mark::InProgress => {
                    let start = path.iter().position(|&node| node == parent).unwrap_or(0);
                    let cycle: Vec<&str> = path[start..]
                        .iter()
                        .chain(std::iter::once(&parent))
                        .map(|&node| self.definition(node).monitor_id.as_str())
                        .collect();
                    return Err(ResolutionError::CyclicDefinition(cycle.join(" -> ")));
                }
            }
        }

        path.pop();
        marks[id.0] = Mark::Done;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn condition(key: &str, value: &str, parent: &str) -> Condition {
        Condition::parse(key, "==", value, parent).unwrap()
    }

    #[test]
    fn test_lookup_known_and_unknown() {
        let table = DefinitionTable::new(vec![
            MonitorDefinition::with_parent("container-cpu", "node-agg"),
            MonitorDefinition::root("node-agg"),
        ])
        .unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(
            table.lookup("container-cpu").unwrap().fixed_parent(),
            Some("node-agg")
        );
        assert_eq!(
            table.lookup("missing").unwrap_err(),
            ResolutionError::UnknownMonitor("missing".to_string())
        );
    }

    #[test]
    fn test_root_and_empty_parent() {
        let root = MonitorDefinition::root("cluster");
        assert!(root.is_root());

        let empty_parent = MonitorDefinition::with_parent("cluster", "");
        assert!(empty_parent.is_root());
        assert_eq!(empty_parent.fixed_parent(), None);
    }

    #[test]
    fn test_candidate_parents_prefer_fixed_parent() {
        let mut definition = MonitorDefinition::with_parent("container-cpu", "node-agg");
        definition.conditions = vec![condition("namespace", "ns1", "namespace-agg")];

        assert_eq!(definition.candidate_parents(), vec!["node-agg"]);
    }

    #[test]
    fn test_arena_parent_edges() {
        let table = DefinitionTable::new(vec![
            MonitorDefinition::with_conditions(
                "container-cpu",
                vec![
                    condition("namespace", "ns1", "node-agg"),
                    condition("namespace", "ns2", "workload-agg"),
                    condition("namespace", "ns3", "node-agg"),
                ],
            ),
            MonitorDefinition::root("node-agg"),
            MonitorDefinition::root("workload-agg"),
        ])
        .unwrap();

        let leaf = table.node_id("container-cpu").unwrap();
        let parents: Vec<&str> = table
            .parents(leaf)
            .iter()
            .map(|&id| table.definition(id).monitor_id.as_str())
            .collect();
        assert_eq!(parents, vec!["node-agg", "workload-agg"]);
    }

    #[test]
    fn test_direct_cycle_rejected() {
        let result = DefinitionTable::new(vec![
            MonitorDefinition::with_parent("a", "b"),
            MonitorDefinition::with_parent("b", "a"),
        ]);

        match result {
            Err(ResolutionError::CyclicDefinition(path)) => assert_eq!(path, "a -> b -> a"),
            other => panic!("expected cycle error, got {:?}", other),
        }
    }

    #[test]
    fn test_self_parent_rejected() {
        let result = DefinitionTable::new(vec![MonitorDefinition::with_parent("a", "a")]);
        assert!(matches!(result, Err(ResolutionError::CyclicDefinition(_))));
    }

    #[test]
    fn test_conditional_cycle_rejected() {
        let result = DefinitionTable::new(vec![
            MonitorDefinition::with_parent("leaf", "mid"),
            MonitorDefinition::with_conditions(
                "mid",
                vec![
                    condition("tier", "top", "top"),
                    condition("tier", "loop", "leaf"),
                ],
            ),
            MonitorDefinition::root("top"),
        ]);

        match result {
            Err(ResolutionError::CyclicDefinition(path)) => {
                assert_eq!(path, "leaf -> mid -> leaf")
            }
            other => panic!("expected cycle error, got {:?}", other),
        }
    }

    #[test]
    fn test_diamond_is_not_a_cycle() {
        let table = DefinitionTable::new(vec![
            MonitorDefinition::with_conditions(
                "leaf",
                vec![condition("k", "a", "left"), condition("k", "b", "right")],
            ),
            MonitorDefinition::with_parent("left", "top"),
            MonitorDefinition::with_parent("right", "top"),
            MonitorDefinition::root("top"),
        ]);

        assert!(table.is_ok());
    }

    #[test]
    fn test_duplicate_definition_keeps_last() {
        let table = DefinitionTable::new(vec![
            MonitorDefinition::with_parent("leaf", "first"),
            MonitorDefinition::with_parent("leaf", "second"),
        ])
        .unwrap();

        assert_eq!(table.len(), 1);
        assert_eq!(table.lookup("leaf").unwrap().fixed_parent(), Some("second"));
    }

    #[test]
    fn test_undefined_parents_reported() {
        let table = DefinitionTable::new(vec![
            MonitorDefinition::with_parent("leaf", "node-agg"),
            MonitorDefinition::with_parent("node-agg", "cluster"),
        ])
        .unwrap();

        assert_eq!(
            table.undefined_parents(),
            vec![("node-agg".to_string(), "cluster".to_string())]
        );
    }
}
