//! Span management: the [`SpanSource`] port and its OpenTelemetry adapter,
//! plus construction of the SDK tracer provider.

pub mod provider;
pub mod span;

pub use provider::{TRACER_NAME, TraceHooks, bridge_layer, build_tracer_provider, shutdown, tracer};
pub use span::{NoopSpan, OtelSpans, ScopedSpan, SpanGuard, SpanSource};
