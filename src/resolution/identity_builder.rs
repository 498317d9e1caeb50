use crate::definitions::InstanceIdentityLabelSet;
use crate::error::ResolutionError;
use crate::events::Labels;
use std::sync::Arc;

/// Separator placed between the monitor id and each identity value
///
/// Values are not escaped, so values containing the separator can collide.
pub const INSTANCE_ID_SEPARATOR: &str = "-";

/// Builds stable instance ids for aggregate monitors
#[derive(Debug, Clone)]
pub struct IdentityBuilder {
    identities: Arc<InstanceIdentityLabelSet>,
}

impl IdentityBuilder {
    pub fn new(identities: Arc<InstanceIdentityLabelSet>) -> Self {
        Self { identities }
    }

    /// Build the instance id of `monitor_id` from its labels
    ///
    /// Values of the registered identity labels are joined in registration
    /// order after the monitor id, a missing label counting as an empty
    /// value. When every value is empty the id is the monitor id itself
    /// (singleton aggregate).
    ///
    /// # Errors
    ///
    /// Returns `ResolutionError::MissingIdentityDefinition` if the monitor's
    /// registration is not a sequence.
    pub fn build_instance_id(
        &self,
        monitor_id: &str,
        labels: &Labels,
    ) -> Result<String, ResolutionError> {
        let values: Vec<&str> = self
            .identities
            .labels_for(monitor_id)?
            .iter()
            .map(|name| labels.get(name).map(String::as_str).unwrap_or(""))
            .collect();

        if values.iter().all(|value| value.is_empty()) {
            return Ok(monitor_id.to_string());
        }

        let mut instance_id = monitor_id.to_string();
        for value in values {
            instance_id.push_str(INSTANCE_ID_SEPARATOR);
            instance_id.push_str(value);
        }
        Ok(instance_id)
    }
}

/// Instance id of a leaf built from every label it carries
///
/// Used for leaf types without identity labels. Values are quoted and
/// escaped, so distinct label sets never share a key.
pub fn leaf_instance_id(monitor_id: &str, labels: &Labels) -> String {
    if labels.is_empty() {
        return monitor_id.to_string();
    }

    let pairs: Vec<String> = labels
        .iter()
        .map(|(key, value)| format!("{}={:?}", key, value))
        .collect();
    format!("{}{{{}}}", monitor_id, pairs.join(","))
}
