//! Telemetry items and the sink they are pushed to
//!
//! The transport to a telemetry backend lives outside this crate; it plugs in
//! by implementing [`TelemetrySink`]. [`LogSink`] writes items to the log.

use crate::error::TelemetryError;
use log::info;
use serde::Serialize;
use std::collections::BTreeMap;

pub const EVENT_PLUGIN_INITIALIZED: &str = "ContainerLogPluginInitialized";
pub const EVENT_DAEMONSET_HEARTBEAT: &str = "ContainerLogDaemonSetHeartbeatEvent";

pub const METRIC_AVG_FLUSH_RATE: &str = "ContainerLogAvgRecordsFlushedPerSec";
pub const METRIC_AVG_LOG_GENERATION_RATE: &str = "ContainerLogsGeneratedPerSec";
pub const METRIC_LOG_SIZE: &str = "ContainerLogsSize";
pub const METRIC_AGENT_MAX_LATENCY_MS: &str = "ContainerLogsAgentSideLatencyMs";
pub const METRIC_TELEGRAF_SENT: &str = "TelegrafMetricsSentCount";
pub const METRIC_TELEGRAF_SEND_ERRORS: &str = "TelegrafMetricsSendErrorCount";
pub const METRIC_TELEGRAF_SEND_429_ERRORS: &str = "TelegrafMetricsSend429ErrorCount";

/// Property naming the container that produced the max latency
pub const PROPERTY_CONTAINER: &str = "Container";

/// A named numeric measurement
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricTelemetry {
    pub name: String,
    pub value: f64,
    pub properties: BTreeMap<String, String>,
}

impl MetricTelemetry {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
            properties: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// A named occurrence with string dimensions
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventTelemetry {
    pub name: String,
    pub properties: BTreeMap<String, String>,
}

impl EventTelemetry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: BTreeMap::new(),
        }
    }
}

/// Destination for telemetry items
#[cfg_attr(test, mockall::automock)]
pub trait TelemetrySink: Send + Sync {
    /// Push a metric
    fn track_metric(&self, metric: MetricTelemetry) -> Result<(), TelemetryError>;

    /// Push an event
    fn track_event(&self, event: EventTelemetry) -> Result<(), TelemetryError>;
}

/// Sink that writes every item to the log as JSON
#[derive(Debug, Default, Clone)]
pub struct LogSink;

impl LogSink {
    pub fn new() -> Self {
        Self
    }

    fn encode<T: Serialize>(item: &T) -> Result<String, TelemetryError> {
        serde_json::to_string(item).map_err(|e| TelemetryError::SinkFailed(e.to_string()))
    }
}

impl TelemetrySink for LogSink {
    fn track_metric(&self, metric: MetricTelemetry) -> Result<(), TelemetryError> {
        info!("telemetry metric: {}", Self::encode(&metric)?);
        Ok(())
    }

    fn track_event(&self, event: EventTelemetry) -> Result<(), TelemetryError> {
        info!("telemetry event: {}", Self::encode(&event)?);
        Ok(())
    }
}
