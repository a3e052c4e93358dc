use opentelemetry::{KeyValue, global, trace::TracerProvider as _};
use opentelemetry_sdk::{
    Resource,
    export::trace::SpanExporter,
    trace::{Builder, Config, SpanProcessor, Tracer, TracerProvider},
};
use tracing_subscriber::{Layer, Registry};

use crate::config::TraceOptions;
use crate::error::LogLocalError;
use crate::logging::BoxedLayer;

/// Instrumentation scope name used for every span this crate starts
pub const TRACER_NAME: &str = "loglocal";

type BuilderHook = Box<dyn FnOnce(Builder) -> Builder + Send>;
type Registrar = Box<dyn FnOnce(&TracerProvider) + Send>;

/// Caller-supplied additions to the tracer provider: span processors,
/// exporters, and a registrar that runs once the provider is built.
#[derive(Default)]
pub struct TraceHooks {
    builder_hooks: Vec<BuilderHook>,
    registrar: Option<Registrar>,
}

impl TraceHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn span_processor<P>(mut self, processor: P) -> Self
    where
        P: SpanProcessor + 'static,
    {
        self.builder_hooks
            .push(Box::new(move |builder| builder.with_span_processor(processor)));
        self
    }

    /// Export finished spans synchronously through `exporter`.
    pub fn span_exporter<E>(mut self, exporter: E) -> Self
    where
        E: SpanExporter + 'static,
    {
        self.builder_hooks
            .push(Box::new(move |builder| builder.with_simple_exporter(exporter)));
        self
    }

    pub fn registrar<F>(mut self, registrar: F) -> Self
    where
        F: FnOnce(&TracerProvider) + Send + 'static,
    {
        self.registrar = Some(Box::new(registrar));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.builder_hooks.is_empty() && self.registrar.is_none()
    }
}

impl std::fmt::Debug for TraceHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceHooks")
            .field("builder_hooks", &self.builder_hooks.len())
            .field("registrar", &self.registrar.is_some())
            .finish()
    }
}

pub fn resource(options: &TraceOptions) -> Resource {
    Resource::new(vec![
        KeyValue::new("service.name", options.service_name.clone()),
        KeyValue::new("service.version", options.version.clone()),
    ])
}

/// Build the tracer provider for `options`, apply `hooks`, and optionally
/// install it as the global provider.
pub fn build_tracer_provider(options: &TraceOptions, hooks: TraceHooks) -> TracerProvider {
    let TraceHooks { builder_hooks, registrar } = hooks;

    let builder = TracerProvider::builder()
        .with_config(Config::default().with_resource(resource(options)));
    let provider = builder_hooks
        .into_iter()
        .fold(builder, |builder, hook| hook(builder))
        .build();

    if options.set_global_provider {
        global::set_tracer_provider(provider.clone());
    }
    if let Some(registrar) = registrar {
        registrar(&provider);
    }

    tracing::debug!(
        target: "loglocal",
        service = %options.service_name,
        version = %options.version,
        global = options.set_global_provider,
        "Tracer provider initialized"
    );

    provider
}

#[allow(deprecated)]
pub fn tracer(provider: &TracerProvider, options: &TraceOptions) -> Tracer {
    provider.versioned_tracer(
        TRACER_NAME,
        Some(options.version.clone()),
        None::<&'static str>,
        None,
    )
}

/// Layer that mirrors `tracing` spans into the OpenTelemetry tracer.
pub fn bridge_layer(tracer: Tracer) -> BoxedLayer {
    tracing_opentelemetry::layer::<Registry>()
        .with_tracer(tracer)
        .boxed()
}

/// Flush pending spans. The global provider is released as well when
/// this provider was installed as global. The first flush failure is
/// returned after every processor has been flushed.
pub fn shutdown(provider: &TracerProvider, options: &TraceOptions) -> Result<(), LogLocalError> {
    let mut first_error = None;
    for result in provider.force_flush() {
        if let Err(e) = result {
            tracing::warn!(target: "loglocal", error = %e, "Span flush failed");
            first_error.get_or_insert(e);
        }
    }
    if options.set_global_provider {
        global::shutdown_tracer_provider();
    }
    match first_error {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}
