use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use super::outcome::{CallOutcome, Failure, Outcome};
use super::record::{
    CallRecord, CallSite, OutcomeKind, OutcomeRecord, STARTED, STREAMING_PLACEHOLDER,
    render_capped,
};
use super::settings::InstrumentationSettings;
use crate::config::{BackendFailure, DEFAULT_MAX_SNAPSHOT_LEN, InstrumentConfig};
use crate::error::InstrumentError;
use crate::logging::{Fields, Level, LogSink};
use crate::telemetry::{NoopSpan, ScopedSpan, SpanSource};

/// The logging and tracing backends shared by every wrapped callable.
#[derive(Clone)]
pub struct Ports {
    pub sink: Arc<dyn LogSink>,
    pub spans: Option<Arc<dyn SpanSource>>,
    pub max_snapshot_len: usize,
    pub on_backend_failure: BackendFailure,
    /// Log `Debug` renderings of errors instead of `Display`.
    pub diagnose: bool,
}

impl Ports {
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self {
            sink,
            spans: None,
            max_snapshot_len: DEFAULT_MAX_SNAPSHOT_LEN,
            on_backend_failure: BackendFailure::default(),
            diagnose: false,
        }
    }

    pub fn with_spans(mut self, spans: Arc<dyn SpanSource>) -> Self {
        self.spans = Some(spans);
        self
    }

    pub fn with_instrumentation(mut self, config: &InstrumentConfig) -> Self {
        self.max_snapshot_len = config.max_snapshot_len;
        self.on_backend_failure = config.on_backend_failure;
        self
    }

    pub fn with_diagnose(mut self, diagnose: bool) -> Self {
        self.diagnose = diagnose;
        self
    }
}

impl fmt::Debug for Ports {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ports")
            .field("spans", &self.spans.is_some())
            .field("max_snapshot_len", &self.max_snapshot_len)
            .field("on_backend_failure", &self.on_backend_failure)
            .field("diagnose", &self.diagnose)
            .finish()
    }
}

/// Instrumentation bound to one wrapped callable.
///
/// Holds the call site fields and span settings; each [`run`](Self::run) or
/// [`instrument_future`](Self::instrument_future) is one independent invocation.
#[derive(Clone)]
pub struct CallContext {
    inner: Arc<Binding>,
}

struct Binding {
    ports: Arc<Ports>,
    site: CallSite,
    bound: Fields,
    span_name: Option<String>,
}

impl CallContext {
    pub fn new(ports: Arc<Ports>, site: CallSite, settings: &InstrumentationSettings) -> Self {
        Self {
            inner: Arc::new(Binding {
                span_name: settings.resolve_span_name(&site),
                bound: site.fields(),
                ports,
                site,
            }),
        }
    }

    pub fn site(&self) -> &CallSite {
        &self.inner.site
    }

    pub fn span_name(&self) -> Option<&str> {
        self.inner.span_name.as_deref()
    }

    /// Capped `Debug` snapshot of a call's arguments.
    pub fn snapshot_args(&self, args: &dyn fmt::Debug) -> String {
        render_capped(args, self.inner.ports.max_snapshot_len)
    }

    /// Run `call` as one instrumented invocation.
    ///
    /// Returns exactly what `call` returns. A panic inside `call` is logged
    /// and then resumed with its original payload.
    pub fn run<R, F>(&self, args: String, call: F) -> R
    where
        R: CallOutcome,
        F: FnOnce() -> R,
    {
        let (record, span) = self.start(args);
        let result = {
            let _entered = span.enter();
            panic::catch_unwind(AssertUnwindSafe(call))
        };
        match result {
            Ok(value) => {
                self.finish(record, span, &value);
                value
            }
            Err(payload) => {
                self.finish_panic(record, span, payload.as_ref());
                panic::resume_unwind(payload)
            }
        }
    }

    /// Instrument an existing `future` as one invocation. Nothing is
    /// recorded until the returned future is first polled.
    pub fn instrument_future<Fut: Future>(
        &self,
        args: String,
        future: Fut,
    ) -> InstrumentedCall<Prepared<Fut>> {
        self.launch(args, Prepared(future))
    }

    /// Instrument the future `launch` produces. The launch itself runs on
    /// first poll, after the started record and inside the span.
    pub fn launch<L: Launch>(&self, args: String, launch: L) -> InstrumentedCall<L> {
        InstrumentedCall {
            context: self.clone(),
            state: CallState::Idle { args, launch },
        }
    }

    fn start(&self, args: String) -> (CallRecord, Box<dyn ScopedSpan>) {
        let ports = &self.inner.ports;
        let record = CallRecord::begin(args, ports.max_snapshot_len);

        let mut fields = self.inner.bound.clone();
        record.write_fields(&mut fields);
        if let Err(error) = ports.sink.log(Level::Info, STARTED, &fields) {
            self.backend_failure(error, false);
        }

        match self.open_span() {
            Ok(span) => (record, span),
            Err(error) => {
                if ports.on_backend_failure == BackendFailure::Panic {
                    let message = error.to_string();
                    self.conclude(record.finish(OutcomeKind::Error { message }), Box::new(NoopSpan));
                    self.abort(&error);
                }
                self.backend_failure(error, false);
                (record, Box::new(NoopSpan))
            }
        }
    }

    fn open_span(&self) -> Result<Box<dyn ScopedSpan>, InstrumentError> {
        let Some(name) = &self.inner.span_name else {
            return Ok(Box::new(NoopSpan));
        };
        match &self.inner.ports.spans {
            Some(spans) => spans.start_span(name),
            None => Err(InstrumentError::NoTracer),
        }
    }

    fn begin_future<L: Launch>(&self, args: String, launch: L) -> CallState<L> {
        let (record, span) = self.start(args);
        let launched = {
            let _entered = span.enter();
            panic::catch_unwind(AssertUnwindSafe(|| launch.launch()))
        };
        match launched {
            Ok(future) => CallState::Running {
                record,
                span,
                future: Box::pin(future),
            },
            Err(payload) => {
                self.finish_panic(record, span, payload.as_ref());
                panic::resume_unwind(payload)
            }
        }
    }

    fn finish<R: CallOutcome>(&self, record: CallRecord, span: Box<dyn ScopedSpan>, value: &R) {
        let kind = match value.outcome() {
            Outcome::Value(value) => OutcomeKind::Success {
                result: render_capped(value, self.inner.ports.max_snapshot_len),
            },
            Outcome::Streaming => OutcomeKind::Success {
                result: STREAMING_PLACEHOLDER.to_string(),
            },
            Outcome::Failed(error) => OutcomeKind::Error {
                message: self.describe(error),
            },
        };
        self.conclude(record.finish(kind), span);
    }

    fn finish_panic(&self, record: CallRecord, span: Box<dyn ScopedSpan>, payload: &(dyn Any + Send)) {
        let message = panic_message(payload);
        self.conclude(record.finish(OutcomeKind::Error { message }), span);
    }

    fn cancel(&self, record: CallRecord, span: Box<dyn ScopedSpan>) {
        self.conclude(record.finish(OutcomeKind::Cancelled), span);
    }

    fn conclude(&self, outcome: OutcomeRecord, mut span: Box<dyn ScopedSpan>) {
        match &outcome.kind {
            OutcomeKind::Error { message } => span.record_error(message),
            OutcomeKind::Cancelled => span.record_error("cancelled"),
            OutcomeKind::Success { .. } => {}
        }
        let trace_id = span.trace_id();
        span.close();

        let mut fields = self.inner.bound.clone();
        outcome.write_fields(&mut fields);
        if let Some(trace_id) = trace_id {
            fields.insert("trace_id", trace_id);
        }
        if let Err(error) = self
            .inner
            .ports
            .sink
            .log(outcome.level(), outcome.message(), &fields)
        {
            self.backend_failure(error, !outcome.is_success());
        }
    }

    fn describe(&self, error: &dyn Failure) -> String {
        if self.inner.ports.diagnose {
            format!("{error:?}")
        } else {
            error.to_string()
        }
    }

    /// Apply the backend failure policy. Never panics while the call itself
    /// has failed, so the call's own outcome stays visible.
    fn backend_failure(&self, error: InstrumentError, call_failed: bool) {
        let function = self.inner.site.function;
        match self.inner.ports.on_backend_failure {
            BackendFailure::Panic if !call_failed => self.abort(&error),
            _ => eprintln!("loglocal: instrumentation of `{function}` failed: {error}"),
        }
    }

    fn abort(&self, error: &InstrumentError) -> ! {
        let function = self.inner.site.function;
        panic!("loglocal: instrumentation of `{function}` failed: {error}")
    }
}

impl fmt::Debug for CallContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallContext")
            .field("site", &self.inner.site)
            .field("span_name", &self.inner.span_name)
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

/// Produces the future of an asynchronous call once it is first polled.
pub trait Launch {
    type Future: Future;

    fn launch(self) -> Self::Future;
}

/// A future created before instrumentation took over.
#[derive(Debug)]
pub struct Prepared<Fut>(pub Fut);

impl<Fut: Future> Launch for Prepared<Fut> {
    type Future = Fut;

    fn launch(self) -> Fut {
        self.0
    }
}

enum CallState<L: Launch> {
    Idle {
        args: String,
        launch: L,
    },
    Running {
        record: CallRecord,
        span: Box<dyn ScopedSpan>,
        future: Pin<Box<L::Future>>,
    },
    Done,
}

/// Future returned by asynchronously wrapped callables.
///
/// The span is current during every poll of the inner future. Dropping the
/// future while it is in flight closes the span and records a cancellation.
#[must_use = "futures do nothing unless polled"]
pub struct InstrumentedCall<L: Launch> {
    context: CallContext,
    state: CallState<L>,
}

// `launch` is only ever moved out by value and the launched future is boxed.
impl<L: Launch> Unpin for InstrumentedCall<L> {}

impl<L: Launch> InstrumentedCall<L> {
    fn take_running(&mut self) -> Option<(CallRecord, Box<dyn ScopedSpan>)> {
        match std::mem::replace(&mut self.state, CallState::Done) {
            CallState::Running { record, span, .. } => Some((record, span)),
            other => {
                self.state = other;
                None
            }
        }
    }
}

impl<L> Future for InstrumentedCall<L>
where
    L: Launch,
    <L::Future as Future>::Output: CallOutcome,
{
    type Output = <L::Future as Future>::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        this.state = match std::mem::replace(&mut this.state, CallState::Done) {
            CallState::Idle { args, launch } => this.context.begin_future(args, launch),
            other => other,
        };
        let CallState::Running { span, future, .. } = &mut this.state else {
            panic!("`InstrumentedCall` polled after completion");
        };

        let polled = {
            let _entered = span.enter();
            panic::catch_unwind(AssertUnwindSafe(|| future.as_mut().poll(cx)))
        };

        match polled {
            Ok(Poll::Pending) => Poll::Pending,
            Ok(Poll::Ready(value)) => {
                if let Some((record, span)) = this.take_running() {
                    this.context.finish(record, span, &value);
                }
                Poll::Ready(value)
            }
            Err(payload) => {
                if let Some((record, span)) = this.take_running() {
                    this.context.finish_panic(record, span, payload.as_ref());
                }
                panic::resume_unwind(payload)
            }
        }
    }
}

impl<L: Launch> Drop for InstrumentedCall<L> {
    fn drop(&mut self) {
        if let Some((record, span)) = self.take_running() {
            self.context.cancel(record, span);
        }
    }
}

impl<L: Launch> fmt::Debug for InstrumentedCall<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state {
            CallState::Idle { .. } => "idle",
            CallState::Running { .. } => "running",
            CallState::Done => "done",
        };
        f.debug_struct("InstrumentedCall")
            .field("context", &self.context)
            .field("state", &state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::record::{CANCELLED, FAILED, FINISHED};
    use crate::telemetry::SpanGuard;
    use futures::FutureExt;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    type Journal = Arc<Mutex<Vec<String>>>;

    #[derive(Default)]
    struct RecordingSink {
        records: Mutex<Vec<(Level, String, Fields)>>,
        journal: Journal,
        fail_on: Option<&'static str>,
    }

    impl RecordingSink {
        fn records(&self) -> Vec<(Level, String, Fields)> {
            self.records.lock().unwrap().clone()
        }
    }

    impl LogSink for RecordingSink {
        fn log(&self, level: Level, message: &str, fields: &Fields) -> Result<(), InstrumentError> {
            if self.fail_on == Some(message) || self.fail_on == Some("*") {
                return Err(InstrumentError::Log("sink closed".to_string()));
            }
            self.journal.lock().unwrap().push(format!("log {message}"));
            self.records
                .lock()
                .unwrap()
                .push((level, message.to_string(), fields.clone()));
            Ok(())
        }
    }

    struct JournalSpans {
        journal: Journal,
    }

    struct JournalSpan {
        name: String,
        journal: Journal,
    }

    struct ExitOnDrop(Journal);

    impl Drop for ExitOnDrop {
        fn drop(&mut self) {
            self.0.lock().unwrap().push("span exit".to_string());
        }
    }

    impl SpanSource for JournalSpans {
        fn start_span(&self, name: &str) -> Result<Box<dyn ScopedSpan>, InstrumentError> {
            self.journal.lock().unwrap().push(format!("span start {name}"));
            Ok(Box::new(JournalSpan {
                name: name.to_string(),
                journal: self.journal.clone(),
            }))
        }
    }

    impl ScopedSpan for JournalSpan {
        fn enter(&self) -> SpanGuard {
            self.journal.lock().unwrap().push("span enter".to_string());
            SpanGuard::new(ExitOnDrop(self.journal.clone()))
        }

        fn record_error(&mut self, message: &str) {
            self.journal.lock().unwrap().push(format!("span error {message}"));
        }

        fn trace_id(&self) -> Option<String> {
            Some("0af7651916cd43dd8448eb211c80319c".to_string())
        }

        fn close(&mut self) {
            self.journal.lock().unwrap().push(format!("span close {}", self.name));
        }
    }

    struct RefusingSpans;

    impl SpanSource for RefusingSpans {
        fn start_span(&self, _name: &str) -> Result<Box<dyn ScopedSpan>, InstrumentError> {
            Err(InstrumentError::Span("collector unreachable".to_string()))
        }
    }

    struct JournalLaunch(Journal);

    impl Launch for JournalLaunch {
        type Future = std::future::Ready<i32>;

        fn launch(self) -> Self::Future {
            self.0.lock().unwrap().push("launch".to_string());
            std::future::ready(7)
        }
    }

    struct PanickingLaunch;

    impl Launch for PanickingLaunch {
        type Future = std::future::Ready<i32>;

        fn launch(self) -> Self::Future {
            panic!("rejected before the first await")
        }
    }

    struct Harness {
        sink: Arc<RecordingSink>,
        journal: Journal,
    }

    impl Harness {
        fn new() -> Self {
            Self::failing(None)
        }

        fn failing(fail_on: Option<&'static str>) -> Self {
            let journal = Journal::default();
            let sink = Arc::new(RecordingSink {
                journal: journal.clone(),
                fail_on,
                ..RecordingSink::default()
            });
            Self { sink, journal }
        }

        fn ports(&self) -> Ports {
            Ports::new(self.sink.clone()).with_spans(Arc::new(JournalSpans {
                journal: self.journal.clone(),
            }))
        }

        fn context(&self, settings: InstrumentationSettings) -> CallContext {
            CallContext::new(Arc::new(self.ports()), crate::callsite!(divide), &settings)
        }

        fn journal(&self) -> Vec<String> {
            self.journal.lock().unwrap().clone()
        }
    }

    fn divide(a: i32, b: i32) -> Result<i32, String> {
        if b == 0 {
            Err("division by zero".to_string())
        } else {
            Ok(a / b)
        }
    }

    #[test]
    fn test_run_success_pairs_records() {
        let harness = Harness::new();
        let context = harness.context(InstrumentationSettings::new());

        let value = context.run(context.snapshot_args(&(&10, &2)), || divide(10, 2));
        assert_eq!(value, Ok(5));

        let records = harness.sink.records();
        assert_eq!(records.len(), 2);
        let (level, message, started) = &records[0];
        assert_eq!((*level, message.as_str()), (Level::Info, STARTED));
        assert_eq!(started["args"], "(10, 2)");
        assert_eq!(started["kwargs"], "{}");

        let (level, message, finished) = &records[1];
        assert_eq!((*level, message.as_str()), (Level::Info, FINISHED));
        assert_eq!(finished["result"], "5");
        for key in ["function", "module", "file", "line", "call_id"] {
            assert_eq!(started[key], finished[key], "{key} differs");
        }
        assert_eq!(finished["function"], "divide");
        assert!(!finished.contains_key("trace_id"));
    }

    #[test]
    fn test_run_error_returns_same_err() {
        let harness = Harness::new();
        let context = harness.context(InstrumentationSettings::new());

        let value = context.run("(10, 0)".to_string(), || divide(10, 0));
        assert_eq!(value, Err("division by zero".to_string()));

        let records = harness.sink.records();
        let (level, message, failed) = &records[1];
        assert_eq!((*level, message.as_str()), (Level::Error, FAILED));
        assert_eq!(failed["exception"], "division by zero");
        assert!(failed.contains_key("duration"));
        assert!(!failed.contains_key("result"));
    }

    #[test]
    fn test_diagnose_uses_debug_rendering() {
        let harness = Harness::new();
        let ports = harness.ports().with_diagnose(true);
        let context = CallContext::new(
            Arc::new(ports),
            crate::callsite!(divide),
            &InstrumentationSettings::new(),
        );

        let _ = context.run("(1, 0)".to_string(), || divide(1, 0));
        assert_eq!(harness.sink.records()[1].2["exception"], "\"division by zero\"");
    }

    #[test]
    fn test_run_resumes_panics() {
        let harness = Harness::new();
        let context = harness.context(InstrumentationSettings::new());

        let caught = panic::catch_unwind(AssertUnwindSafe(|| {
            context.run("()".to_string(), || -> i32 { panic!("ledger corrupted") })
        }));
        let payload = caught.unwrap_err();
        assert_eq!(payload.downcast_ref::<&str>(), Some(&"ledger corrupted"));

        let records = harness.sink.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].1, FAILED);
        assert_eq!(records[1].2["exception"], "ledger corrupted");
    }

    #[test]
    fn test_span_lifecycle_order() {
        let harness = Harness::new();
        let context = harness.context(InstrumentationSettings::new().start_span(true));

        let _ = context.run("(10, 0)".to_string(), || divide(10, 0));

        assert_eq!(
            harness.journal(),
            vec![
                format!("log {STARTED}"),
                "span start divide".to_string(),
                "span enter".to_string(),
                "span exit".to_string(),
                "span error division by zero".to_string(),
                "span close divide".to_string(),
                format!("log {FAILED}"),
            ]
        );
        let records = harness.sink.records();
        assert_eq!(records[1].2["trace_id"], "0af7651916cd43dd8448eb211c80319c");
    }

    #[test]
    fn test_no_span_port_calls_when_disabled() {
        let harness = Harness::new();
        let context = harness.context(InstrumentationSettings::new().span_name("ignored"));

        let _ = context.run("()".to_string(), || divide(4, 2));

        assert!(harness.journal().iter().all(|entry| !entry.starts_with("span")));
        assert_eq!(context.span_name(), None);
    }

    #[test]
    fn test_missing_tracer_warns_and_runs() {
        let harness = Harness::new();
        let context = CallContext::new(
            Arc::new(Ports::new(harness.sink.clone())),
            crate::callsite!(divide),
            &InstrumentationSettings::new().start_span(true),
        );

        assert_eq!(context.run("()".to_string(), || divide(9, 3)), Ok(3));
        assert_eq!(harness.sink.records().len(), 2);
    }

    #[test]
    fn test_failing_sink_is_soft_by_default() {
        let harness = Harness::failing(Some("*"));
        let context = harness.context(InstrumentationSettings::new());

        assert_eq!(context.run("()".to_string(), || divide(8, 2)), Ok(4));
        assert!(harness.sink.records().is_empty());
    }

    #[test]
    fn test_panic_policy_stops_before_target() {
        let harness = Harness::failing(Some(STARTED));
        let mut ports = harness.ports();
        ports.on_backend_failure = BackendFailure::Panic;
        let context = CallContext::new(
            Arc::new(ports),
            crate::callsite!(divide),
            &InstrumentationSettings::new().start_span(true),
        );
        let ran = AtomicBool::new(false);

        let caught = panic::catch_unwind(AssertUnwindSafe(|| {
            context.run("()".to_string(), || {
                ran.store(true, Ordering::SeqCst);
            })
        }));

        assert!(caught.is_err());
        assert!(!ran.load(Ordering::SeqCst));
        assert!(harness.journal().is_empty(), "no span before the started record");
    }

    fn unreachable_collector(on_backend_failure: BackendFailure) -> (Arc<RecordingSink>, CallContext) {
        let sink = Arc::new(RecordingSink::default());
        let mut ports = Ports::new(sink.clone()).with_spans(Arc::new(RefusingSpans));
        ports.on_backend_failure = on_backend_failure;
        let context = CallContext::new(
            Arc::new(ports),
            crate::callsite!(divide),
            &InstrumentationSettings::new().start_span(true),
        );
        (sink, context)
    }

    #[test]
    fn test_span_failure_under_panic_policy_pairs_records() {
        let (sink, context) = unreachable_collector(BackendFailure::Panic);
        let ran = AtomicBool::new(false);

        let caught = panic::catch_unwind(AssertUnwindSafe(|| {
            context.run("(6, 3)".to_string(), || {
                ran.store(true, Ordering::SeqCst);
                divide(6, 3)
            })
        }));

        assert!(caught.is_err());
        assert!(!ran.load(Ordering::SeqCst));
        let records = sink.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].1, STARTED);
        assert_eq!((records[1].0, records[1].1.as_str()), (Level::Error, FAILED));
        assert_eq!(records[0].2["call_id"], records[1].2["call_id"]);
        assert!(records[1].2["exception"].contains("collector unreachable"));
    }

    #[test]
    fn test_span_failure_warns_and_runs_without_span() {
        let (sink, context) = unreachable_collector(BackendFailure::Warn);

        assert_eq!(context.run("(6, 3)".to_string(), || divide(6, 3)), Ok(2));
        let records = sink.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].1, FINISHED);
        assert!(!records[1].2.contains_key("trace_id"));
    }

    #[test]
    fn test_panic_policy_never_masks_call_failure() {
        let harness = Harness::failing(Some(FAILED));
        let mut ports = harness.ports();
        ports.on_backend_failure = BackendFailure::Panic;
        let context = CallContext::new(
            Arc::new(ports),
            crate::callsite!(divide),
            &InstrumentationSettings::new(),
        );

        let value = context.run("(1, 0)".to_string(), || divide(1, 0));
        assert_eq!(value, Err("division by zero".to_string()));
    }

    #[tokio::test]
    async fn test_future_records_on_first_poll() {
        let harness = Harness::new();
        let context = harness.context(InstrumentationSettings::new().start_span(true));

        let call = context.instrument_future("()".to_string(), async {
            tokio::task::yield_now().await;
            "done".to_string()
        });
        assert!(harness.sink.records().is_empty());

        assert_eq!(call.await, "done");
        let records = harness.sink.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].2["result"], "\"done\"");

        let journal = harness.journal();
        let enters = journal.iter().filter(|e| *e == "span enter").count();
        let exits = journal.iter().filter(|e| *e == "span exit").count();
        assert!(enters >= 2);
        assert_eq!(enters, exits);
        assert_eq!(journal.last().unwrap(), &format!("log {FINISHED}"));
    }

    #[test]
    fn test_started_record_waits_for_first_poll() {
        let harness = Harness::new();
        let context = harness.context(InstrumentationSettings::new());

        let mut call = tokio_test::task::spawn(
            context.instrument_future("()".to_string(), std::future::pending::<()>()),
        );
        assert!(harness.sink.records().is_empty());

        tokio_test::assert_pending!(call.poll());
        tokio_test::assert_pending!(call.poll());
        assert_eq!(harness.sink.records().len(), 1);

        drop(call);
        let records = harness.sink.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].1, CANCELLED);
    }

    #[tokio::test]
    async fn test_unpolled_future_records_nothing() {
        let harness = Harness::new();
        let context = harness.context(InstrumentationSettings::new().start_span(true));

        drop(context.instrument_future("()".to_string(), async { 1 }));

        assert!(harness.sink.records().is_empty());
        assert!(harness.journal().is_empty());
    }

    #[tokio::test]
    async fn test_dropped_future_records_cancellation() {
        let harness = Harness::new();
        let context = harness.context(InstrumentationSettings::new().start_span(true));

        let call = context.instrument_future("()".to_string(), std::future::pending::<()>());
        let timed_out = tokio::time::timeout(Duration::from_millis(10), call).await;
        assert!(timed_out.is_err());

        let records = harness.sink.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].0, Level::Error);
        assert_eq!(records[1].1, CANCELLED);
        assert_eq!(records[1].2["outcome"], "cancelled");

        let journal = harness.journal();
        let closes = journal.iter().filter(|e| e.starts_with("span close")).count();
        assert_eq!(closes, 1);
    }

    #[tokio::test]
    async fn test_launch_runs_after_started_record_inside_span() {
        let harness = Harness::new();
        let context = harness.context(InstrumentationSettings::new().start_span(true));

        let call = context.launch("()".to_string(), JournalLaunch(harness.journal.clone()));
        assert!(harness.journal().is_empty());

        assert_eq!(call.await, 7);
        assert_eq!(
            harness.journal()[..5],
            [
                format!("log {STARTED}"),
                "span start divide".to_string(),
                "span enter".to_string(),
                "launch".to_string(),
                "span exit".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_launch_panic_is_paired_and_resumed() {
        let harness = Harness::new();
        let context = harness.context(InstrumentationSettings::new().start_span(true));

        let call = context.launch("()".to_string(), PanickingLaunch);
        let caught = AssertUnwindSafe(call).catch_unwind().await;

        let payload = caught.unwrap_err();
        assert_eq!(payload.downcast_ref::<&str>(), Some(&"rejected before the first await"));
        let records = harness.sink.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].1, STARTED);
        assert_eq!(records[1].1, FAILED);
        assert_eq!(records[1].2["exception"], "rejected before the first await");
        assert_eq!(records[0].2["call_id"], records[1].2["call_id"]);
        let closes = harness
            .journal()
            .iter()
            .filter(|e| e.starts_with("span close"))
            .count();
        assert_eq!(closes, 1);
    }

    #[tokio::test]
    async fn test_future_panic_is_resumed() {
        let harness = Harness::new();
        let context = harness.context(InstrumentationSettings::new());

        let call = context.instrument_future("()".to_string(), async {
            tokio::task::yield_now().await;
            if true {
                panic!("settlement failed");
            }
        });
        let caught = AssertUnwindSafe(call).catch_unwind().await;

        assert!(caught.is_err());
        let records = harness.sink.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].2["exception"], "settlement failed");
    }
}
