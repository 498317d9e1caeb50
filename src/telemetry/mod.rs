/// Periodic counter rollup
pub mod rollup;
/// Telemetry items and sinks
pub mod sink;

pub use rollup::{
    channel, parse_push_interval, CounterUpdate, CounterWindow, RollupReport, RollupSettings,
    RollupTask, TelemetryHandle, DEFAULT_PUSH_INTERVAL_SECONDS,
};
pub use sink::{EventTelemetry, LogSink, MetricTelemetry, TelemetrySink};
