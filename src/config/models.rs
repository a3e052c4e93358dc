use garde::Validate;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::logging::{RotationPolicy, Template, level_filter};

pub const DEFAULT_LOG_FORMAT: &str =
    "{time:YYYY-MM-DD HH:mm:ss.SSS} | {level:<8} | {name}:{function}:{line} | {message} | {extra}";

/// Snapshot cap for logged arguments and results, in characters.
pub const DEFAULT_MAX_SNAPSHOT_LEN: usize = 200;

pub const LOG_PATH_ENV: &str = "LOGLOCAL_PATH";
pub const TRACE_SERVICE_NAME_ENV: &str = "LOGLOCAL_TRACE_SERVICE_NAME";
pub const TRACE_VERSION_ENV: &str = "LOGLOCAL_TRACE_VERSION";

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct LogLocalConfig {
    #[garde(skip)]
    #[serde(default = "default_log_path")]
    pub log_path: PathBuf,

    #[garde(length(min = 1), custom(validate_template))]
    #[serde(default = "default_log_format")]
    pub log_format: String,

    #[garde(dive)]
    #[serde(default)]
    pub log_config: LogConfig,

    /// Extra destinations receiving every record as JSON, unfiltered.
    #[garde(skip)]
    #[serde(default)]
    pub sinks: Vec<PathBuf>,

    #[garde(dive)]
    #[serde(default)]
    pub trace: TraceOptions,

    #[garde(dive)]
    #[serde(default)]
    pub instrumentation: InstrumentConfig,
}

fn default_log_path() -> PathBuf {
    std::env::var(LOG_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("logs").join("app.log"))
}

fn default_log_format() -> String {
    DEFAULT_LOG_FORMAT.to_string()
}

impl Default for LogLocalConfig {
    fn default() -> Self {
        Self {
            log_path: default_log_path(),
            log_format: default_log_format(),
            log_config: LogConfig::default(),
            sinks: Vec::new(),
            trace: TraceOptions::default(),
            instrumentation: InstrumentConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct LogConfig {
    #[garde(custom(validate_level))]
    #[serde(default = "default_level")]
    pub level: String,

    #[garde(custom(validate_policy))]
    #[serde(default = "default_file_rotation")]
    pub file_rotation: String,

    #[garde(custom(validate_policy))]
    #[serde(default = "default_file_retention")]
    pub file_retention: String,

    /// Write the primary file sink as JSON instead of the text template.
    #[garde(skip)]
    #[serde(default = "default_true")]
    pub serialize: bool,

    /// Hand file writes to a background worker.
    #[garde(skip)]
    #[serde(default = "default_true")]
    pub enqueue: bool,

    /// Render error values with their `Debug` form. Off by default so
    /// error records do not leak internal values.
    #[garde(skip)]
    #[serde(default)]
    pub diagnose: bool,
}

fn default_level() -> String {
    "DEBUG".to_string()
}

fn default_file_rotation() -> String {
    "30 days".to_string()
}

fn default_file_retention() -> String {
    "90 days".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            file_rotation: default_file_rotation(),
            file_retention: default_file_retention(),
            serialize: true,
            enqueue: true,
            diagnose: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct TraceOptions {
    #[garde(length(min = 1))]
    #[serde(default = "default_service_name")]
    pub service_name: String,

    #[garde(length(min = 1))]
    #[serde(default = "default_service_version")]
    pub version: String,

    /// Install the provider as the OpenTelemetry global provider.
    #[garde(skip)]
    #[serde(default = "default_true")]
    pub set_global_provider: bool,

    /// Export spans opened through `tracing` (e.g. `#[tracing::instrument]`)
    /// to the same provider.
    #[garde(skip)]
    #[serde(default)]
    pub bridge_tracing_spans: bool,
}

fn default_service_name() -> String {
    std::env::var(TRACE_SERVICE_NAME_ENV).unwrap_or_else(|_| "loglocal".to_string())
}

fn default_service_version() -> String {
    std::env::var(TRACE_VERSION_ENV).unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string())
}

impl Default for TraceOptions {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            version: default_service_version(),
            set_global_provider: true,
            bridge_tracing_spans: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct InstrumentConfig {
    #[garde(range(min = 1))]
    #[serde(default = "default_max_snapshot_len")]
    pub max_snapshot_len: usize,

    #[garde(skip)]
    #[serde(default)]
    pub on_backend_failure: BackendFailure,
}

fn default_max_snapshot_len() -> usize {
    DEFAULT_MAX_SNAPSHOT_LEN
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            max_snapshot_len: DEFAULT_MAX_SNAPSHOT_LEN,
            on_backend_failure: BackendFailure::default(),
        }
    }
}

/// What the wrapper does when the logging or tracing backend fails.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendFailure {
    /// Report on stderr and carry on with the call.
    #[default]
    Warn,
    /// Panic, unless that would hide a failure of the instrumented call.
    Panic,
}

fn validate_level(value: &str, _: &()) -> garde::Result {
    level_filter(value)
        .map(|_| ())
        .map_err(|e| garde::Error::new(e.to_string()))
}

fn validate_policy(value: &str, _: &()) -> garde::Result {
    value
        .parse::<RotationPolicy>()
        .map(|_| ())
        .map_err(|e| garde::Error::new(e.to_string()))
}

fn validate_template(value: &str, _: &()) -> garde::Result {
    Template::parse(value)
        .map(|_| ())
        .map_err(|e| garde::Error::new(e.to_string()))
}
