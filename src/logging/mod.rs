//! Logging backend: the [`LogSink`] port, its `tracing` adapter, and the
//! `tracing_subscriber` sinks (stderr, rotating file, extra JSON sinks).

pub mod format;
pub mod rotation;
pub mod sink;
pub mod subscriber;

pub use format::{RecordView, Template, TemplateFormat};
pub use rotation::{RotationPolicy, TimeUnit};
pub use sink::{Fields, Level, LogSink, TracingLog};
pub use subscriber::{BoxedLayer, LoggingGuard, build_logging, init_logging, level_filter};
