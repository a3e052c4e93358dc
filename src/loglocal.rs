//! The `LogLocal` facade: owns the configured logging and tracing backends
//! and hands out instrumentation bound to them.

use garde::Validate;
use opentelemetry_sdk::export::trace::SpanExporter;
use opentelemetry_sdk::trace::{SpanProcessor, Tracer, TracerProvider};
use std::sync::Arc;

use crate::config::{InstrumentConfig, LogLocalConfig, TraceOptions};
use crate::error::LogLocalError;
use crate::instrument::{
    AsyncTarget, CallContext, CallSite, InstrumentationSettings, Ports, SyncTarget, Wrapper,
};
use crate::logging::{BoxedLayer, LogSink, LoggingGuard, TracingLog, init_logging};
use crate::telemetry::{self, OtelSpans, SpanSource, TraceHooks};

/// Process-wide logging and tracing context.
///
/// Built once, either from configuration (installing the global subscriber
/// and tracer provider) or from explicit ports, and passed to the code that
/// wraps callables.
pub struct LogLocal {
    ports: Arc<Ports>,
    provider: Option<TracerProvider>,
    trace: TraceOptions,
    logging: Option<LoggingGuard>,
}

impl LogLocal {
    /// Initialize logging and tracing from `config`.
    pub fn from_config(config: &LogLocalConfig) -> Result<Self, LogLocalError> {
        Self::builder(config.clone()).init()
    }

    pub fn builder(config: LogLocalConfig) -> LogLocalBuilder {
        LogLocalBuilder {
            config,
            hooks: TraceHooks::new(),
            layers: Vec::new(),
        }
    }

    /// Context over caller-supplied backends. Installs nothing globally.
    pub fn with_ports(
        sink: Arc<dyn LogSink>,
        spans: Option<Arc<dyn SpanSource>>,
        instrumentation: &InstrumentConfig,
    ) -> Self {
        let mut ports = Ports::new(sink).with_instrumentation(instrumentation);
        ports.spans = spans;
        Self {
            ports: Arc::new(ports),
            provider: None,
            trace: TraceOptions::default(),
            logging: None,
        }
    }

    pub fn ports(&self) -> &Arc<Ports> {
        &self.ports
    }

    /// A configurator for spans and span names; reusable across callables.
    pub fn wrapper(&self) -> Wrapper {
        Wrapper::new(self.ports.clone())
    }

    pub fn context(&self, site: CallSite, settings: &InstrumentationSettings) -> CallContext {
        CallContext::new(self.ports.clone(), site, settings)
    }

    /// Wrap a synchronous callable with default settings (no span).
    pub fn wrap<Args, T: SyncTarget<Args>>(&self, site: CallSite, target: T) -> T::Wrapped {
        self.wrapper().wrap(site, target)
    }

    /// Wrap an asynchronous callable with default settings (no span).
    pub fn wrap_async<Args, T: AsyncTarget<Args>>(&self, site: CallSite, target: T) -> T::Wrapped {
        self.wrapper().wrap_async(site, target)
    }

    pub fn tracer_provider(&self) -> Option<&TracerProvider> {
        self.provider.as_ref()
    }

    /// Tracer for spans created outside the wrapper, scoped like the
    /// wrapper's own.
    pub fn tracer(&self) -> Option<Tracer> {
        self.provider
            .as_ref()
            .map(|provider| telemetry::tracer(provider, &self.trace))
    }

    /// Flush spans, release the tracer provider and stop background log
    /// writers. A span flush failure is returned once the log writers
    /// have been stopped.
    pub fn shutdown(mut self) -> Result<(), LogLocalError> {
        let flushed = match self.provider.take() {
            Some(provider) => telemetry::shutdown(&provider, &self.trace),
            None => Ok(()),
        };
        tracing::debug!(target: "loglocal", "LogLocal shut down");
        drop(self.logging.take());
        flushed
    }
}

impl std::fmt::Debug for LogLocal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogLocal")
            .field("ports", &self.ports)
            .field("tracing", &self.provider.is_some())
            .field("logging", &self.logging)
            .finish()
    }
}

/// Builder for [`LogLocal`] carrying the runtime-only tracing options.
pub struct LogLocalBuilder {
    config: LogLocalConfig,
    hooks: TraceHooks,
    layers: Vec<BoxedLayer>,
}

impl LogLocalBuilder {
    pub fn span_processor<P: SpanProcessor + 'static>(mut self, processor: P) -> Self {
        self.hooks = self.hooks.span_processor(processor);
        self
    }

    pub fn span_exporter<E: SpanExporter + 'static>(mut self, exporter: E) -> Self {
        self.hooks = self.hooks.span_exporter(exporter);
        self
    }

    /// Called with the tracer provider once it is built, e.g. to hook up
    /// library instrumentation.
    pub fn registrar<F>(mut self, registrar: F) -> Self
    where
        F: FnOnce(&TracerProvider) + Send + 'static,
    {
        self.hooks = self.hooks.registrar(registrar);
        self
    }

    /// An additional subscriber layer, installed next to the configured sinks.
    pub fn layer(mut self, layer: BoxedLayer) -> Self {
        self.layers.push(layer);
        self
    }

    pub fn init(self) -> Result<LogLocal, LogLocalError> {
        let Self { config, hooks, mut layers } = self;
        config.validate()?;

        let provider = telemetry::build_tracer_provider(&config.trace, hooks);
        let tracer = telemetry::tracer(&provider, &config.trace);
        if config.trace.bridge_tracing_spans {
            layers.push(telemetry::bridge_layer(tracer.clone()));
        }
        let logging = init_logging(&config, layers)?;

        let ports = Ports::new(Arc::new(TracingLog))
            .with_spans(Arc::new(OtelSpans::new(tracer)))
            .with_instrumentation(&config.instrumentation)
            .with_diagnose(config.log_config.diagnose);

        tracing::info!(
            target: "loglocal",
            service = %config.trace.service_name,
            version = %config.trace.version,
            "LogLocal initialized"
        );

        Ok(LogLocal {
            ports: Arc::new(ports),
            provider: Some(provider),
            trace: config.trace,
            logging: Some(logging),
        })
    }
}

impl std::fmt::Debug for LogLocalBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogLocalBuilder")
            .field("config", &self.config)
            .field("hooks", &self.hooks)
            .field("layers", &self.layers.len())
            .finish()
    }
}
