//! Leaf event processing
//!
//! Turns leaf state changes into hierarchy walks, applies them to the
//! aggregate store, and records throughput and latency counters for the
//! telemetry rollup. Events that fail resolution are logged and dropped so a
//! single bad label set cannot stall the stream.

use crate::config::Config;
use crate::definitions::{DefinitionTable, InstanceIdentityLabelSet};
use crate::error::{ConfigError, IngestError, ResolutionError};
use crate::events::{LeafStateChange, ResolutionStep};
use crate::resolution::HierarchyWalker;
use crate::telemetry::TelemetryHandle;
use crate::tree::AggregateStore;
use chrono::Utc;
use log::{debug, error, warn};
use std::io::BufRead;
use std::sync::Arc;
use std::time::Instant;

/// Counts of handled events
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessingStats {
    pub processed: u64,
    pub dropped: u64,
}

/// Applies leaf state changes to the monitor tree
pub struct EventProcessor {
    walker: HierarchyWalker,
    store: AggregateStore,
    telemetry: Option<TelemetryHandle>,
    stats: ProcessingStats,
}

impl EventProcessor {
    pub fn new(walker: HierarchyWalker) -> Self {
        Self {
            walker,
            store: AggregateStore::new(),
            telemetry: None,
            stats: ProcessingStats::default(),
        }
    }

    /// Build a processor from validated configuration
    ///
    /// # Errors
    ///
    /// Returns the first configuration error found by [`Config::validate`].
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        config.validate()?;
        let table: Arc<DefinitionTable> = Arc::new(config.definition_table()?);
        let identities: Arc<InstanceIdentityLabelSet> = Arc::new(config.identity_labels());
        Ok(Self::new(HierarchyWalker::new(table, identities)))
    }

    /// Record flush and latency counters through `telemetry`
    pub fn with_telemetry(mut self, telemetry: TelemetryHandle) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Resolve an event and apply it to the store
    ///
    /// # Errors
    ///
    /// Returns the resolution error; the store is left untouched in that case.
    pub fn process(
        &mut self,
        event: &LeafStateChange,
    ) -> Result<Vec<ResolutionStep>, ResolutionError> {
        let started = Instant::now();
        let instance = event.instance();

        let steps = self.walker.walk(&instance)?;
        let leaf_instance_id = self.walker.leaf_instance_id(&instance)?;
        self.store.apply(event, &leaf_instance_id, &steps);

        if let Some(telemetry) = &self.telemetry {
            let size_bytes = serde_json::to_vec(event)
                .map(|bytes| bytes.len() as u64)
                .unwrap_or(0);
            let time_taken_ms = started.elapsed().as_secs_f64() * 1000.0;
            let latency_ms = (Utc::now() - event.timestamp).num_milliseconds().max(0) as f64;

            let recorded = telemetry
                .record_flush(1, size_bytes, time_taken_ms)
                .and_then(|_| telemetry.record_latency(latency_ms, leaf_instance_id.as_str()));
            if let Err(e) = recorded {
                debug!("Telemetry not recorded: {}", e);
            }
        }

        Ok(steps)
    }

    /// Process an event, logging and dropping it on failure
    ///
    /// Returns `true` if the event was applied.
    pub fn handle(&mut self, event: &LeafStateChange) -> bool {
        match self.process(event) {
            Ok(steps) => {
                self.stats.processed += 1;
                debug!(
                    "Applied '{}' through {} aggregate levels",
                    event.monitor_id,
                    steps.len()
                );
                true
            }
            Err(e @ ResolutionError::MissingIdentityDefinition { .. }) => {
                self.stats.dropped += 1;
                error!(
                    "Configuration error while resolving '{}': {}",
                    event.monitor_id, e
                );
                false
            }
            Err(e) => {
                self.stats.dropped += 1;
                warn!("Dropping event for '{}': {}", event.monitor_id, e);
                false
            }
        }
    }

    pub fn store(&self) -> &AggregateStore {
        &self.store
    }

    pub fn stats(&self) -> ProcessingStats {
        self.stats
    }
}

/// Read leaf state changes from JSON lines
///
/// Blank lines are skipped. Each malformed line yields an error but does not
/// end the stream.
pub fn read_events<R: BufRead>(
    reader: R,
) -> impl Iterator<Item = Result<LeafStateChange, IngestError>> {
    reader
        .lines()
        .enumerate()
        .filter_map(|(index, line)| match line {
            Err(e) => Some(Err(IngestError::IoError(e))),
            Ok(line) if line.trim().is_empty() => None,
            Ok(line) => Some(serde_json::from_str(&line).map_err(|e| {
                IngestError::ParseError {
                    line: index + 1,
                    reason: e.to_string(),
                }
            })),
        })
}
