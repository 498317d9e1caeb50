use crate::definitions::DefinitionTable;
use crate::error::ResolutionError;
use crate::events::MonitorInstance;
use log::trace;
use std::sync::Arc;

/// Resolves the parent monitor of a monitor instance
///
/// A fixed parent always wins. Otherwise conditions are evaluated in
/// declaration order and the first one that holds picks the parent.
#[derive(Debug, Clone)]
pub struct ParentResolver {
    table: Arc<DefinitionTable>,
}

impl ParentResolver {
    pub fn new(table: Arc<DefinitionTable>) -> Self {
        Self { table }
    }

    /// Resolve the parent of `instance`
    ///
    /// # Returns
    ///
    /// `Ok(Some(parent_id))` when a parent applies, `Ok(None)` when the
    /// monitor is a root or no condition matched.
    ///
    /// # Errors
    ///
    /// Returns `ResolutionError::UnknownMonitor` if the monitor is not defined.
    pub fn resolve_parent(
        &self,
        instance: &MonitorInstance,
    ) -> Result<Option<String>, ResolutionError> {
        let definition = self.table.lookup(&instance.monitor_id)?;

        if let Some(parent) = definition.fixed_parent() {
            return Ok(Some(parent.to_string()));
        }

        let matched = definition
            .conditions
            .iter()
            .find(|condition| condition.evaluate(&instance.labels))
            .map(|condition| condition.parent_id.clone());

        if matched.is_none() {
            trace!("No parent for monitor '{}'", instance.monitor_id);
        }
        Ok(matched)
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

    fn resolver(definitions: Vec<MonitorDefinition>) -> ParentResolver {
        ParentResolver::new(Arc::new(DefinitionTable::new(definitions).unwrap()))
    }

    #[test]
    fn test_unknown_monitor() {
        let resolver = resolver(vec![]);
        let instance = MonitorInstance::new("container-cpu", Labels::new());

        assert_eq!(
            resolver.resolve_parent(&instance),
            Err(ResolutionError::UnknownMonitor("container-cpu".to_string()))
        );
    }

    #[test]
    fn test_fixed_parent() {
        let resolver = resolver(vec![MonitorDefinition::with_parent(
            "container-cpu",
            "node-agg",
        )]);
        let instance = MonitorInstance::new("container-cpu", label_set(&[("pod", "p1")]));

        assert_eq!(
            resolver.resolve_parent(&instance),
            Ok(Some("node-agg".to_string()))
        );
    }

    #[test]
    fn test_fixed_parent_ignores_conditions() {
        let mut definition = MonitorDefinition::with_parent("container-cpu", "node-agg");
        definition.conditions = vec![Condition::parse("namespace", "==", "ns1", "other").unwrap()];
        let resolver = resolver(vec![definition]);

        let instance = MonitorInstance::new("container-cpu", label_set(&[("namespace", "ns1")]));
        assert_eq!(
            resolver.resolve_parent(&instance),
            Ok(Some("node-agg".to_string()))
        );
    }

    #[test]
    fn test_first_matching_condition_wins() {
        let resolver = resolver(vec![MonitorDefinition::with_conditions(
            "container-cpu",
            vec![
                Condition::parse("namespace", "starts_with", "kube", "system-agg").unwrap(),
                Condition::parse("namespace", "==", "kube-system", "kube-system-agg").unwrap(),
            ],
        )]);

        let instance =
            MonitorInstance::new("container-cpu", label_set(&[("namespace", "kube-system")]));
        assert_eq!(
            resolver.resolve_parent(&instance),
            Ok(Some("system-agg".to_string()))
        );
    }

    #[test]
    fn test_later_condition_used_when_earlier_fails() {
        let resolver = resolver(vec![MonitorDefinition::with_conditions(
            "container-cpu",
            vec![
                Condition::parse("namespace", "==", "kube-system", "system-agg").unwrap(),
                Condition::parse("namespace", "!=", "kube-system", "workload-agg").unwrap(),
            ],
        )]);

        let instance = MonitorInstance::new("container-cpu", label_set(&[("namespace", "ns1")]));
        assert_eq!(
            resolver.resolve_parent(&instance),
            Ok(Some("workload-agg".to_string()))
        );
    }

    #[test]
    fn test_no_matching_condition_is_no_parent() {
        let resolver = resolver(vec![MonitorDefinition::with_conditions(
            "container-cpu",
            vec![Condition::parse("namespace", "==", "ns1", "node-agg").unwrap()],
        )]);

        let instance = MonitorInstance::new("container-cpu", label_set(&[("namespace", "ns2")]));
        assert_eq!(resolver.resolve_parent(&instance), Ok(None));
    }

    #[test]
    fn test_root_has_no_parent() {
        let resolver = resolver(vec![MonitorDefinition::root("cluster")]);
        let instance = MonitorInstance::new("cluster", Labels::new());

        assert_eq!(resolver.resolve_parent(&instance), Ok(None));
    }
}
