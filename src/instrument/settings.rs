use serde::{Deserialize, Serialize};

use super::CallSite;

/// Per-callable instrumentation options, fixed once the callable is wrapped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentationSettings {
    #[serde(default)]
    pub start_span: bool,
    #[serde(default)]
    pub span_name: Option<String>,
}

impl InstrumentationSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_span(mut self, start_span: bool) -> Self {
        self.start_span = start_span;
        self
    }

    pub fn span_name(mut self, name: impl Into<String>) -> Self {
        self.span_name = Some(name.into());
        self
    }

    /// Name of the span to open for `site`, or `None` when spans are off.
    pub fn resolve_span_name(&self, site: &CallSite) -> Option<String> {
        self.start_span.then(|| {
            self.span_name
                .clone()
                .unwrap_or_else(|| site.function.to_string())
        })
    }
}
