use std::path::{Path, PathBuf};
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter, Layer, Registry, layer::SubscriberExt, util::SubscriberInitExt,
};

use super::{RotationPolicy, TemplateFormat};
use crate::config::LogLocalConfig;
use crate::error::LogLocalError;

pub type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Keeps background log writers alive. Records queued for file sinks are
/// flushed when this is dropped.
#[must_use = "dropping the guard stops background log writers"]
pub struct LoggingGuard {
    guards: Vec<WorkerGuard>,
}

impl LoggingGuard {
    pub fn writers(&self) -> usize {
        self.guards.len()
    }
}

impl std::fmt::Debug for LoggingGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoggingGuard").field("writers", &self.guards.len()).finish()
    }
}

pub fn level_filter(level: &str) -> Result<LevelFilter, LogLocalError> {
    match level.to_ascii_lowercase().as_str() {
        "trace" => Ok(LevelFilter::TRACE),
        "debug" => Ok(LevelFilter::DEBUG),
        "info" => Ok(LevelFilter::INFO),
        "warn" | "warning" => Ok(LevelFilter::WARN),
        "error" => Ok(LevelFilter::ERROR),
        other => Err(LogLocalError::Config(format!("unknown log level '{other}'"))),
    }
}

/// Level filter for the primary sinks. `RUST_LOG` directives refine it.
fn primary_filter(level: LevelFilter) -> Result<EnvFilter, LogLocalError> {
    let directive = std::env::var(EnvFilter::DEFAULT_ENV).unwrap_or_default();
    Ok(EnvFilter::builder()
        .with_default_directive(level.into())
        .parse(directive)?)
}

fn split_log_path(path: &Path) -> (PathBuf, String, Option<String>) {
    let directory = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let prefix = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "app".to_string());
    let suffix = path.extension().map(|s| s.to_string_lossy().into_owned());
    (directory, prefix, suffix)
}

fn file_appender(
    path: &Path,
    rotation: Rotation,
    max_files: Option<usize>,
) -> Result<RollingFileAppender, LogLocalError> {
    let (directory, prefix, suffix) = split_log_path(path);
    let mut builder = RollingFileAppender::builder()
        .rotation(rotation)
        .filename_prefix(prefix);
    if let Some(suffix) = suffix {
        builder = builder.filename_suffix(suffix);
    }
    if let Some(max_files) = max_files {
        builder = builder.max_log_files(max_files);
    }
    Ok(builder.build(directory)?)
}

fn json_layer<W>(writer: W) -> BoxedLayer
where
    W: for<'w> tracing_subscriber::fmt::MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::fmt::layer()
        .json()
        .flatten_event(true)
        .with_current_span(false)
        .with_span_list(false)
        .with_ansi(false)
        .with_writer(writer)
        .boxed()
}

fn text_layer<W>(template: &TemplateFormat, writer: W, ansi: bool) -> BoxedLayer
where
    W: for<'w> tracing_subscriber::fmt::MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::fmt::layer()
        .with_ansi(ansi)
        .event_format(template.clone())
        .with_writer(writer)
        .boxed()
}

/// Build the sink layers described by `config`:
///
/// - stderr, rendered with the format template and coloured
/// - the rotating file at `log_path`, JSON when `serialize` is set
/// - one unfiltered JSON layer per extra sink
pub fn build_logging(config: &LogLocalConfig) -> Result<(Vec<BoxedLayer>, LoggingGuard), LogLocalError> {
    let log = &config.log_config;
    let level = level_filter(&log.level)?;
    let template = TemplateFormat::new(&config.log_format)?;
    let mut guards = Vec::new();
    let mut layers = Vec::new();

    layers.push(
        text_layer(&template, std::io::stderr, true)
            .with_filter(primary_filter(level)?)
            .boxed(),
    );

    let rotation: RotationPolicy = log.file_rotation.parse()?;
    let retention: RotationPolicy = log.file_retention.parse()?;
    let appender = file_appender(
        &config.log_path,
        rotation.rotation(),
        retention.retained_files(&rotation),
    )?;
    let file_layer = match (log.enqueue, log.serialize) {
        (true, serialize) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            guards.push(guard);
            if serialize { json_layer(writer) } else { text_layer(&template, writer, false) }
        }
        (false, true) => json_layer(appender),
        (false, false) => text_layer(&template, appender, false),
    };
    layers.push(file_layer.with_filter(primary_filter(level)?).boxed());

    for sink in &config.sinks {
        let appender = file_appender(sink, Rotation::NEVER, None)?;
        if log.enqueue {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            guards.push(guard);
            layers.push(json_layer(writer));
        } else {
            layers.push(json_layer(appender));
        }
    }

    Ok((layers, LoggingGuard { guards }))
}

/// Install the configured sinks, plus any `extra` layers, as the global subscriber.
pub fn init_logging(
    config: &LogLocalConfig,
    extra: Vec<BoxedLayer>,
) -> Result<LoggingGuard, LogLocalError> {
    let (mut layers, guard) = build_logging(config)?;
    layers.extend(extra);
    tracing_subscriber::registry().with(layers).try_init()?;

    tracing::debug!(
        target: "loglocal",
        level = %config.log_config.level,
        path = %config.log_path.display(),
        sinks = config.sinks.len(),
        "Logging initialized"
    );

    Ok(guard)
}
