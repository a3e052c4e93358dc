use thiserror::Error;

/// Errors raised while configuring or initializing the facade.
#[derive(Error, Debug)]
pub enum LogLocalError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration: {0}")]
    Validation(#[from] garde::Report),

    #[error("Failed to load configuration: {0}")]
    Figment(#[from] Box<figment::Error>),

    #[error("Invalid log format template: {0}")]
    Template(String),

    #[error("Failed to initialize rolling file appender: {0}")]
    FileAppender(#[from] tracing_appender::rolling::InitError),

    #[error("Failed to install global subscriber: {0}")]
    SubscriberInit(#[from] tracing_subscriber::util::TryInitError),

    #[error("Failed to parse level filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),

    #[error("Tracing error: {0}")]
    Tracing(#[from] opentelemetry::trace::TraceError),
}

impl From<figment::Error> for LogLocalError {
    fn from(err: figment::Error) -> Self {
        LogLocalError::Figment(Box::new(err))
    }
}

/// Failures of the logging or tracing backend while instrumenting a call.
///
/// These never replace the outcome of the instrumented call; see
/// [`BackendFailure`](crate::config::BackendFailure) for how they are surfaced.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InstrumentError {
    #[error("Log backend failure: {0}")]
    Log(String),

    #[error("Span backend failure: {0}")]
    Span(String),

    #[error("Span requested but no tracer is configured")]
    NoTracer,
}
