use crate::definitions::DefinitionTable;
use crate::error::ResolutionError;
use crate::events::Labels;
use std::sync::Arc;

/// Projects a child's labels onto its parent
///
/// The projected names come from the child's own `labels_to_copy`.
#[derive(Debug, Clone)]
pub struct LabelProjector {
    table: Arc<DefinitionTable>,
}

impl LabelProjector {
    pub fn new(table: Arc<DefinitionTable>) -> Self {
        Self { table }
    }

    /// Build the parent's labels from the child's
    ///
    /// Every declared name appears in the result; names missing from
    /// `child_labels` map to an empty value.
    ///
    /// # Errors
    ///
    /// Returns `ResolutionError::UnknownMonitor` if `monitor_id` is not defined.
    pub fn project_labels(
        &self,
        monitor_id: &str,
        child_labels: &Labels,
    ) -> Result<Labels, ResolutionError> {
        let definition = self.table.lookup(monitor_id)?;

        Ok(definition
            .labels_to_copy
            .iter()
            .map(|name| {
                let value = child_labels.get(name).cloned().unwrap_or_default();
                (name.clone(), value)
            })
            .collect())
    }
}
