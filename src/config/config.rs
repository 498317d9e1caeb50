//! Configuration loading and validation
//!
//! Configuration is a TOML file with three parts: telemetry settings, the
//! monitor definitions, and the identity labels of aggregate monitor types.
//!
//! ```toml
//! [telemetry]
//! push_interval_seconds = 300
//! controller_type = "daemonset"
//!
//! [[monitors]]
//! id = "container-cpu"
//! labels_to_copy = ["namespace"]
//! conditions = [{ key = "namespace", operator = "==", value = "ns1", parent_id = "node-agg" }]
//!
//! [[monitors]]
//! id = "node-agg"
//!
//! [identity]
//! node-agg = ["region", "cluster"]
//! ```

use crate::definitions::{
    DefinitionTable, IdentityLabels, InstanceIdentityLabelSet, MonitorDefinition,
};
use crate::error::ConfigError;
use crate::resolution::Condition;
use crate::telemetry::{parse_push_interval, RollupSettings, DEFAULT_PUSH_INTERVAL_SECONDS};
use log::{info, warn};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Application configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Telemetry rollup settings
    pub telemetry: TelemetryConfig,
    /// Monitor definitions
    pub monitors: Vec<MonitorConfig>,
    /// Identity label registrations, keyed by monitor id
    pub identity: BTreeMap<String, toml::Value>,
}

/// Push interval, accepted either as a number or a string of digits
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum PushInterval {
    Seconds(u64),
    Text(String),
}

impl Default for PushInterval {
    fn default() -> Self {
        PushInterval::Seconds(DEFAULT_PUSH_INTERVAL_SECONDS)
    }
}

/// Telemetry rollup configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Push telemetry at all
    pub enabled: bool,
    /// Seconds between pushes
    pub push_interval_seconds: PushInterval,
    /// Controller type of this agent
    pub controller_type: String,
    /// Agent version reported with every item
    pub agent_version: String,
    /// Extra dimensions reported with every item
    pub properties: BTreeMap<String, String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            push_interval_seconds: PushInterval::default(),
            controller_type: "daemonset".to_string(),
            agent_version: env!("CARGO_PKG_VERSION").to_string(),
            properties: BTreeMap::new(),
        }
    }
}

/// A monitor definition as written in configuration
///
/// Unknown fields are rejected so a misspelled parent never silently turns a
/// monitor into a root.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MonitorConfig {
    #[serde(alias = "monitor_id")]
    pub id: String,
    #[serde(default, alias = "parent_monitor_id")]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub conditions: Vec<ConditionConfig>,
    #[serde(default)]
    pub labels_to_copy: Vec<String>,
}

/// A condition as written in configuration
///
/// `value` may be any TOML scalar; it is compared as a string.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConditionConfig {
    #[serde(alias = "label_key")]
    pub key: String,
    pub operator: String,
    #[serde(alias = "expected_value")]
    pub value: toml::Value,
    pub parent_id: String,
}

fn value_to_string(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl TryFrom<&MonitorConfig> for MonitorDefinition {
    type Error = ConfigError;

    fn try_from(monitor: &MonitorConfig) -> Result<Self, Self::Error> {
        if monitor.id.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "monitor id must not be empty".to_string(),
            ));
        }

        let conditions = monitor
            .conditions
            .iter()
            .map(|condition| {
                if condition.parent_id.trim().is_empty() {
                    return Err(ConfigError::ValidationError(format!(
                        "condition on '{}' in monitor '{}' has an empty parent_id",
                        condition.key, monitor.id
                    )));
                }
                Ok(Condition::parse(
                    condition.key.clone(),
                    &condition.operator,
                    value_to_string(&condition.value),
                    condition.parent_id.clone(),
                )?)
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok(MonitorDefinition {
            monitor_id: monitor.id.clone(),
            parent_monitor_id: monitor.parent_id.clone(),
            conditions,
            labels_to_copy: monitor.labels_to_copy.clone(),
        })
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ReadError` if the file cannot be read and
    /// `ConfigError::TomlError` if it is not valid configuration.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&contents)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Load configuration from an optional path
    ///
    /// A missing or unreadable file falls back to defaults with a warning.
    /// A file that exists but is invalid is an error, since running with the
    /// wrong monitor hierarchy is worse than not starting.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => {
                info!("Loading configuration from: {}", path.display());
                match Self::from_file(path) {
                    Ok(config) => Ok(config),
                    Err(ConfigError::ReadError(reason)) => {
                        warn!("Configuration file not readable ({}), using defaults", reason);
                        Ok(Self::default())
                    }
                    Err(e) => Err(e),
                }
            }
            None => {
                info!("Using default configuration");
                Ok(Self::default())
            }
        }
    }

    /// Convert monitor entries into definitions
    pub fn definitions(&self) -> Result<Vec<MonitorDefinition>, ConfigError> {
        self.monitors.iter().map(MonitorDefinition::try_from).collect()
    }

    /// Build the definition table, rejecting bad operators and cycles
    pub fn definition_table(&self) -> Result<DefinitionTable, ConfigError> {
        Ok(DefinitionTable::new(self.definitions()?)?)
    }

    /// Build the identity label set
    ///
    /// Arrays become ordered label lists (elements compared as strings); any
    /// other value is kept as a malformed registration.
    pub fn identity_labels(&self) -> InstanceIdentityLabelSet {
        InstanceIdentityLabelSet::from_registrations(self.identity.iter().map(|(id, value)| {
            let labels = match value {
                toml::Value::Array(items) => {
                    IdentityLabels::Ordered(items.iter().map(value_to_string).collect())
                }
                other => IdentityLabels::NotASequence {
                    found: other.type_str().to_string(),
                },
            };
            (id.clone(), labels)
        }))
    }

    /// Settings for the telemetry rollup
    pub fn rollup_settings(&self) -> RollupSettings {
        let telemetry = &self.telemetry;
        let interval = match &telemetry.push_interval_seconds {
            PushInterval::Seconds(seconds) => parse_push_interval(&seconds.to_string()),
            PushInterval::Text(text) => parse_push_interval(text),
        };

        let mut common_properties = telemetry.properties.clone();
        common_properties.insert(
            "ControllerType".to_string(),
            telemetry.controller_type.clone(),
        );
        common_properties.insert("AgentVersion".to_string(), telemetry.agent_version.clone());

        RollupSettings {
            interval,
            controller_type: telemetry.controller_type.clone(),
            enabled: telemetry.enabled,
            common_properties,
        }
    }

    /// Validate everything that can be checked before processing events
    ///
    /// Parent references without a definition are only warned about; events
    /// that walk into them fail individually.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let table = self.definition_table()?;
        self.identity_labels().validate()?;

        for (child, parent) in table.undefined_parents() {
            warn!(
                "Monitor '{}' references parent '{}' which has no definition",
                child, parent
            );
        }
        Ok(())
    }
}
