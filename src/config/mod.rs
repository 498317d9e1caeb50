/// Configuration loading and validation
#[allow(clippy::module_inception)]
pub mod config;

pub use config::{ConditionConfig, Config, MonitorConfig, PushInterval, TelemetryConfig};
