use opentelemetry::{
    Context,
    trace::{Span as _, Status, TraceContextExt, Tracer},
};
use std::any::Any;

use crate::error::InstrumentError;

/// Source of spans for instrumented calls
pub trait SpanSource: Send + Sync {
    /// Start a span named `name`, as a child of whatever span is current.
    fn start_span(&self, name: &str) -> Result<Box<dyn ScopedSpan>, InstrumentError>;
}

/// A span owned by one in-flight call.
pub trait ScopedSpan: Send {
    /// Make the span current on this thread until the guard is dropped.
    fn enter(&self) -> SpanGuard;

    /// Mark the span as failed. Called at most once, before [`close`](Self::close).
    fn record_error(&mut self, _message: &str) {}

    /// Hex trace id, when the backend assigns one.
    fn trace_id(&self) -> Option<String> {
        None
    }

    /// End the span. Calling it again has no effect.
    fn close(&mut self);
}

/// Restores the previous current span when dropped
#[must_use = "the span is only current while the guard is alive"]
pub struct SpanGuard {
    _inner: Option<Box<dyn Any>>,
}

impl SpanGuard {
    pub fn new<G: Any>(guard: G) -> Self {
        Self { _inner: Some(Box::new(guard)) }
    }

    pub fn none() -> Self {
        Self { _inner: None }
    }
}

/// Scope that does no tracing work
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSpan;

impl ScopedSpan for NoopSpan {
    fn enter(&self) -> SpanGuard {
        SpanGuard::none()
    }

    fn close(&mut self) {}
}

/// [`SpanSource`] backed by an OpenTelemetry tracer
#[derive(Debug, Clone)]
pub struct OtelSpans<T = opentelemetry_sdk::trace::Tracer> {
    tracer: T,
}

impl<T> OtelSpans<T> {
    pub fn new(tracer: T) -> Self {
        Self { tracer }
    }
}

impl<T> SpanSource for OtelSpans<T>
where
    T: Tracer + Send + Sync,
    T::Span: Send + Sync + 'static,
{
    /// Fails when the tracer hands back a span without a valid context,
    /// as no-op tracers do.
    fn start_span(&self, name: &str) -> Result<Box<dyn ScopedSpan>, InstrumentError> {
        let span = self.tracer.start(name.to_string());
        if !span.span_context().is_valid() {
            return Err(InstrumentError::Span(format!(
                "tracer produced no valid span context for '{name}'"
            )));
        }
        Ok(Box::new(OtelSpan {
            cx: Context::current_with_span(span),
            closed: false,
        }))
    }
}

struct OtelSpan {
    cx: Context,
    closed: bool,
}

impl ScopedSpan for OtelSpan {
    fn enter(&self) -> SpanGuard {
        SpanGuard::new(self.cx.clone().attach())
    }

    fn record_error(&mut self, message: &str) {
        self.cx.span().set_status(Status::error(message.to_string()));
    }

    fn trace_id(&self) -> Option<String> {
        let span = self.cx.span();
        let span_context = span.span_context();
        span_context
            .is_valid()
            .then(|| format!("{:032x}", span_context.trace_id()))
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.cx.span().end();
        }
    }
}

impl Drop for OtelSpan {
    fn drop(&mut self) {
        self.close();
    }
}
