use thiserror::Error;

/// Errors that can occur while resolving a monitor's place in the hierarchy
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("Unknown monitor id: {0}")]
    UnknownMonitor(String),

    #[error("Unsupported condition operator: {0}")]
    UnsupportedOperator(String),

    #[error("Identity labels for monitor '{monitor_id}' are not a sequence (found {found})")]
    MissingIdentityDefinition { monitor_id: String, found: String },

    #[error("Cyclic monitor definition: {0}")]
    CyclicDefinition(String),
}

/// Errors that can occur during configuration loading
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),

    #[error("Invalid configuration value: {0}")]
    ValidationError(String),

    #[error("Invalid monitor configuration: {0}")]
    Resolution(#[from] ResolutionError),

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),
}

/// Errors that can occur in the telemetry rollup
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Telemetry channel closed")]
    ChannelClosed,

    #[error("Telemetry sink failed: {0}")]
    SinkFailed(String),
}

/// Errors that can occur while reading leaf state-change events
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Failed to parse event on line {line}: {reason}")]
    ParseError { line: usize, reason: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
