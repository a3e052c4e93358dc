//! Configurable logging-and-tracing facade with call instrumentation.
//!
//! [`LogLocal`] owns a structured logger (`tracing-subscriber` sinks) and an
//! OpenTelemetry tracer provider. Wrapped callables emit paired
//! started/terminal records around every invocation and can run inside a
//! span.

pub mod config;
pub mod error;
pub mod instrument;
pub mod logging;
pub mod loglocal;
pub mod telemetry;

pub use config::{BackendFailure, LogLocalConfig, load_config};
pub use error::{InstrumentError, LogLocalError};
pub use instrument::{
    AsyncTarget, CallContext, CallOutcome, CallSite, InstrumentationSettings, InstrumentedCall,
    Launch, Outcome, Ports, StreamingResponse, SyncTarget, Wrapper,
};
pub use logging::{Fields, Level, LogSink, TracingLog};
pub use loglocal::{LogLocal, LogLocalBuilder};
pub use telemetry::{OtelSpans, ScopedSpan, SpanGuard, SpanSource};
