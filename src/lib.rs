//! Health monitor tree engine
//!
//! Leaf monitors report state changes for instances identified by labels.
//! Each change is resolved up a configured hierarchy of aggregate monitors:
//! the parent is picked by fixed assignment or by label conditions, selected
//! labels are projected onto the parent, and the parent instance id is built
//! from its identity labels.

/// Error types for the monitor tree engine
pub mod error;

/// Monitor instances, health states and state changes
pub mod events;

/// Monitor definitions and identity label registrations
pub mod definitions;

/// Parent resolution, label projection and instance identity
pub mod resolution;

/// Aggregate health store
pub mod tree;

/// Counter rollup and telemetry sinks
pub mod telemetry;

/// Leaf event processing
pub mod processor;

/// Configuration management
pub mod config;

// Re-export commonly used types
pub use error::{ConfigError, IngestError, ResolutionError, TelemetryError};
pub use events::{HealthState, Labels, LeafStateChange, MonitorInstance, ResolutionStep};
