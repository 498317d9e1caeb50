//! Periodic counter rollup
//!
//! Producers record counter updates through a cloneable [`TelemetryHandle`].
//! Updates travel over a channel to a single [`RollupTask`] which owns the
//! current window. On every tick the task takes the window, resets it, and
//! pushes the derived metrics to a [`TelemetrySink`].

use crate::error::TelemetryError;
use crate::telemetry::sink::{
    EventTelemetry, MetricTelemetry, TelemetrySink, EVENT_DAEMONSET_HEARTBEAT,
    EVENT_PLUGIN_INITIALIZED, METRIC_AGENT_MAX_LATENCY_MS, METRIC_AVG_FLUSH_RATE,
    METRIC_AVG_LOG_GENERATION_RATE, METRIC_LOG_SIZE, METRIC_TELEGRAF_SENT,
    METRIC_TELEGRAF_SEND_429_ERRORS, METRIC_TELEGRAF_SEND_ERRORS, PROPERTY_CONTAINER,
};
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

/// Push interval used when none is configured or the configured one is invalid
pub const DEFAULT_PUSH_INTERVAL_SECONDS: u64 = 300;

/// Controller type whose node-level log metrics are reported
pub const DAEMONSET_CONTROLLER: &str = "daemonset";

/// Parse a push interval given in seconds
///
/// Falls back to [`DEFAULT_PUSH_INTERVAL_SECONDS`] when the value is not a
/// positive integer.
pub fn parse_push_interval(value: &str) -> Duration {
    match value.trim().parse::<u64>() {
        Ok(seconds) if seconds > 0 => Duration::from_secs(seconds),
        _ => {
            warn!(
                "Invalid telemetry push interval '{}', using default of {}s",
                value, DEFAULT_PUSH_INTERVAL_SECONDS
            );
            Duration::from_secs(DEFAULT_PUSH_INTERVAL_SECONDS)
        }
    }
}

/// A single counter update sent by a producer
#[derive(Debug, Clone, PartialEq)]
pub enum CounterUpdate {
    /// Records flushed downstream, their total size and the time it took
    Flush {
        records: u64,
        size_bytes: u64,
        time_taken_ms: f64,
    },
    /// Processing latency observed for a container's records
    Latency { latency_ms: f64, container: String },
    /// Metrics sent successfully
    MetricsSent(u64),
    /// Metric sends that failed
    SendErrors(u64),
    /// Metric sends rejected with HTTP 429
    SendThrottled(u64),
}

/// Counters accumulated over one push interval
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CounterWindow {
    pub flushed_records: f64,
    pub flushed_bytes: f64,
    pub flush_time_ms: f64,
    pub max_latency_ms: f64,
    pub max_latency_container: String,
    pub metrics_sent: f64,
    pub send_errors: f64,
    pub send_throttled: f64,
}

impl CounterWindow {
    /// Fold an update into the window
    pub fn apply(&mut self, update: CounterUpdate) {
        match update {
            CounterUpdate::Flush {
                records,
                size_bytes,
                time_taken_ms,
            } => {
                self.flushed_records += records as f64;
                self.flushed_bytes += size_bytes as f64;
                self.flush_time_ms += time_taken_ms;
            }
            CounterUpdate::Latency {
                latency_ms,
                container,
            } => {
                if latency_ms > self.max_latency_ms {
                    self.max_latency_ms = latency_ms;
                    self.max_latency_container = container;
                }
            }
            CounterUpdate::MetricsSent(count) => self.metrics_sent += count as f64,
            CounterUpdate::SendErrors(count) => self.send_errors += count as f64,
            CounterUpdate::SendThrottled(count) => self.send_throttled += count as f64,
        }
    }

    /// Take the accumulated counters, leaving the window reset
    pub fn take(&mut self) -> CounterWindow {
        std::mem::take(self)
    }

    /// Derive the items to push for a window that lasted `elapsed`
    ///
    /// Node-level log metrics are only reported for daemonset controllers.
    /// Rates with a zero denominator are reported as 0.
    pub fn report(&self, elapsed: Duration, daemonset: bool) -> RollupReport {
        let mut report = RollupReport::default();
        let elapsed_seconds = elapsed.as_secs_f64();

        if daemonset {
            report
                .events
                .push(EventTelemetry::new(EVENT_DAEMONSET_HEARTBEAT));
            report.metrics.push(MetricTelemetry::new(
                METRIC_AVG_FLUSH_RATE,
                rate(self.flushed_records * 1000.0, self.flush_time_ms),
            ));
            report.metrics.push(MetricTelemetry::new(
                METRIC_AVG_LOG_GENERATION_RATE,
                rate(self.flushed_records, elapsed_seconds),
            ));
            report.metrics.push(MetricTelemetry::new(
                METRIC_LOG_SIZE,
                rate(self.flushed_bytes, elapsed_seconds),
            ));
            report.metrics.push(
                MetricTelemetry::new(METRIC_AGENT_MAX_LATENCY_MS, self.max_latency_ms)
                    .with_property(PROPERTY_CONTAINER, self.max_latency_container.clone()),
            );
        }

        report
            .metrics
            .push(MetricTelemetry::new(METRIC_TELEGRAF_SENT, self.metrics_sent));
        if self.send_errors > 0.0 {
            report.metrics.push(MetricTelemetry::new(
                METRIC_TELEGRAF_SEND_ERRORS,
                self.send_errors,
            ));
        }
        if self.send_throttled > 0.0 {
            report.metrics.push(MetricTelemetry::new(
                METRIC_TELEGRAF_SEND_429_ERRORS,
                self.send_throttled,
            ));
        }

        report
    }
}

fn rate(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

/// Items produced by one tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RollupReport {
    pub events: Vec<EventTelemetry>,
    pub metrics: Vec<MetricTelemetry>,
}

/// Settings for the rollup task
#[derive(Debug, Clone)]
pub struct RollupSettings {
    /// Time between pushes
    pub interval: Duration,
    /// Controller type of this agent (e.g. `daemonset`, `replicaset`)
    pub controller_type: String,
    /// When false, windows are still reset but nothing is pushed
    pub enabled: bool,
    /// Dimensions attached to every pushed item
    pub common_properties: BTreeMap<String, String>,
}

impl Default for RollupSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_PUSH_INTERVAL_SECONDS),
            controller_type: DAEMONSET_CONTROLLER.to_string(),
            enabled: true,
            common_properties: BTreeMap::new(),
        }
    }
}

impl RollupSettings {
    fn is_daemonset(&self) -> bool {
        self.controller_type.eq_ignore_ascii_case(DAEMONSET_CONTROLLER)
    }
}

/// Cloneable producer side of the rollup
#[derive(Debug, Clone)]
pub struct TelemetryHandle {
    sender: mpsc::UnboundedSender<CounterUpdate>,
}

impl TelemetryHandle {
    /// Send a raw counter update
    ///
    /// # Errors
    ///
    /// Returns `TelemetryError::ChannelClosed` once the rollup task has stopped.
    pub fn record(&self, update: CounterUpdate) -> Result<(), TelemetryError> {
        self.sender
            .send(update)
            .map_err(|_| TelemetryError::ChannelClosed)
    }

    pub fn record_flush(
        &self,
        records: u64,
        size_bytes: u64,
        time_taken_ms: f64,
    ) -> Result<(), TelemetryError> {
        self.record(CounterUpdate::Flush {
            records,
            size_bytes,
            time_taken_ms,
        })
    }

    pub fn record_latency(
        &self,
        latency_ms: f64,
        container: impl Into<String>,
    ) -> Result<(), TelemetryError> {
        self.record(CounterUpdate::Latency {
            latency_ms,
            container: container.into(),
        })
    }

    pub fn record_send_success(&self, count: u64) -> Result<(), TelemetryError> {
        self.record(CounterUpdate::MetricsSent(count))
    }

    pub fn record_send_error(&self, count: u64) -> Result<(), TelemetryError> {
        self.record(CounterUpdate::SendErrors(count))
    }

    pub fn record_send_throttled(&self, count: u64) -> Result<(), TelemetryError> {
        self.record(CounterUpdate::SendThrottled(count))
    }
}

/// Create a producer handle and the task that consumes it
pub fn channel(
    settings: RollupSettings,
    sink: Arc<dyn TelemetrySink>,
) -> (TelemetryHandle, RollupTask) {
    let (sender, receiver) = mpsc::unbounded_channel();
    let task = RollupTask {
        settings,
        sink,
        receiver,
        window: CounterWindow::default(),
    };
    (TelemetryHandle { sender }, task)
}

/// Consumer that owns the counter window and pushes it on a timer
pub struct RollupTask {
    settings: RollupSettings,
    sink: Arc<dyn TelemetrySink>,
    receiver: mpsc::UnboundedReceiver<CounterUpdate>,
    window: CounterWindow,
}

impl RollupTask {
    /// Run until `shutdown` turns true or every handle is dropped
    ///
    /// Pushes the init event first; the first window is pushed one interval
    /// later. Pending updates are folded in and a final window is pushed on
    /// shutdown.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Telemetry rollup started with interval {:?}",
            self.settings.interval
        );
        self.push_event(EventTelemetry::new(EVENT_PLUGIN_INITIALIZED));

        let mut timer = tokio::time::interval(self.settings.interval.max(Duration::from_millis(1)));
        timer.tick().await;
        let mut window_start = Instant::now();

        loop {
            tokio::select! {
                update = self.receiver.recv() => match update {
                    Some(update) => self.window.apply(update),
                    None => {
                        debug!("All telemetry handles dropped");
                        break;
                    }
                },
                _ = timer.tick() => {
                    self.flush(window_start.elapsed());
                    window_start = Instant::now();
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("Telemetry rollup received shutdown signal");
                        break;
                    }
                }
            }
        }

        while let Ok(update) = self.receiver.try_recv() {
            self.window.apply(update);
        }
        self.flush(window_start.elapsed());
        info!("Telemetry rollup stopped");
    }

    #[cfg(test)]
    pub(crate) fn try_next_update(&mut self) -> Option<CounterUpdate> {
        self.receiver.try_recv().ok()
    }

    /// Push the current window and reset it
    pub fn flush(&mut self, elapsed: Duration) {
        let window = self.window.take();
        if !self.settings.enabled {
            debug!("Telemetry disabled, dropping window");
            return;
        }

        let report = window.report(elapsed, self.settings.is_daemonset());
        for event in report.events {
            self.push_event(event);
        }
        for metric in report.metrics {
            self.push_metric(metric);
        }
    }

    fn push_event(&self, mut event: EventTelemetry) {
        if !self.settings.enabled {
            return;
        }
        merge_common(&mut event.properties, &self.settings.common_properties);
        debug!("Sending event: {}", event.name);
        if let Err(e) = self.sink.track_event(event) {
            warn!("Failed to push telemetry event: {}", e);
        }
    }

    fn push_metric(&self, mut metric: MetricTelemetry) {
        merge_common(&mut metric.properties, &self.settings.common_properties);
        if let Err(e) = self.sink.track_metric(metric) {
            warn!("Failed to push telemetry metric: {}", e);
        }
    }
}

/// Item-specific properties take precedence over common ones
fn merge_common(properties: &mut BTreeMap<String, String>, common: &BTreeMap<String, String>) {
    for (key, value) in common {
        properties
            .entry(key.clone())
            .or_insert_with(|| value.clone());
    }
}
