//! Instance identity label registrations
//!
//! Each aggregate monitor type registers the ordered label names whose values
//! distinguish one of its instances from another.

use crate::error::ResolutionError;
use std::collections::HashMap;

/// Registered identity labels for one monitor type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityLabels {
    /// Ordered label names
    Ordered(Vec<String>),
    /// A registration that was not a sequence; `found` names what it was
    NotASequence { found: String },
}

/// Process-wide map from monitor id to its identity labels
#[derive(Debug, Clone, Default)]
pub struct InstanceIdentityLabelSet {
    registrations: HashMap<String, IdentityLabels>,
}

impl InstanceIdentityLabelSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a list of registrations
    pub fn from_registrations<I>(registrations: I) -> Self
    where
        I: IntoIterator<Item = (String, IdentityLabels)>,
    {
        Self {
            registrations: registrations.into_iter().collect(),
        }
    }

    /// Register the ordered identity labels of a monitor type
    pub fn register<I, S>(mut self, monitor_id: impl Into<String>, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.registrations.insert(
            monitor_id.into(),
            IdentityLabels::Ordered(labels.into_iter().map(Into::into).collect()),
        );
        self
    }

    /// Ordered identity labels of a monitor type
    ///
    /// An unregistered monitor has no identity labels.
    ///
    /// # Errors
    ///
    /// Returns `ResolutionError::MissingIdentityDefinition` if the registration
    /// exists but is not a sequence.
    pub fn labels_for(&self, monitor_id: &str) -> Result<&[String], ResolutionError> {
        match self.registrations.get(monitor_id) {
            None => Ok(&[]),
            Some(IdentityLabels::Ordered(labels)) => Ok(labels),
            Some(IdentityLabels::NotASequence { found }) => {
                Err(ResolutionError::MissingIdentityDefinition {
                    monitor_id: monitor_id.to_string(),
                    found: found.clone(),
                })
            }
        }
    }

    /// Check every registration eagerly
    ///
    /// Reports the lexicographically first malformed monitor id so the result
    /// is stable.
    pub fn validate(&self) -> Result<(), ResolutionError> {
        let mut ids: Vec<&String> = self.registrations.keys().collect();
        ids.sort();
        for id in ids {
            self.labels_for(id)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }
}
