use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;

use super::call::{CallContext, InstrumentedCall, Launch, Ports};
use super::outcome::CallOutcome;
use super::record::CallSite;
use super::settings::InstrumentationSettings;

/// Synchronous callables that can be instrumented.
///
/// Implemented for `Fn` values of up to six arguments whose arguments are
/// `Debug` and whose return type is a [`CallOutcome`]. Borrowed arguments
/// are accepted; the lifetime is fixed when the callable is wrapped, so the
/// wrapped value can only be called with borrows that outlive it.
pub trait SyncTarget<Args>: Send + Sync + 'static {
    type Output: CallOutcome;
    /// The instrumented replacement, callable exactly like the target.
    type Wrapped;

    fn instrument(self, context: CallContext) -> Self::Wrapped;
}

/// Asynchronous callables (returning a `Future`) that can be instrumented.
///
/// The replacement returns an [`InstrumentedCall`] the caller awaits in
/// place of the original future. The target itself is only called on the
/// first poll, so code that runs before its first `.await` is covered by
/// the started record and the span.
pub trait AsyncTarget<Args>: Send + Sync + 'static {
    type Output: CallOutcome;
    type Future: Future<Output = Self::Output>;
    type Wrapped;

    fn instrument(self, context: CallContext) -> Self::Wrapped;
}

/// A wrapped asynchronous target together with the arguments of one call.
pub struct Deferred<Func, Args> {
    target: Arc<Func>,
    args: Args,
}

macro_rules! impl_targets {
    ($($arg:ident: $ty:ident),*) => {
        impl<Func, Ret, $($ty,)*> SyncTarget<($($ty,)*)> for Func
        where
            Func: Fn($($ty),*) -> Ret + Send + Sync + 'static,
            Ret: CallOutcome,
            $($ty: Debug,)*
        {
            type Output = Ret;
            type Wrapped = Box<dyn Fn($($ty),*) -> Ret + Send + Sync>;

            fn instrument(self, context: CallContext) -> Self::Wrapped {
                let target = self;
                Box::new(move |$($arg: $ty),*| {
                    let args = context.snapshot_args(&($(&$arg,)*));
                    context.run(args, || target($($arg),*))
                })
            }
        }

        impl<Func, Fut, $($ty,)*> Launch for Deferred<Func, ($($ty,)*)>
        where
            Func: Fn($($ty),*) -> Fut,
            Fut: Future,
        {
            type Future = Fut;

            fn launch(self) -> Fut {
                let ($($arg,)*) = self.args;
                (self.target)($($arg),*)
            }
        }

        impl<Func, Fut, $($ty,)*> AsyncTarget<($($ty,)*)> for Func
        where
            Func: Fn($($ty),*) -> Fut + Send + Sync + 'static,
            Fut: Future,
            Fut::Output: CallOutcome,
            $($ty: Debug,)*
        {
            type Output = Fut::Output;
            type Future = Fut;
            type Wrapped = Box<dyn Fn($($ty),*) -> InstrumentedCall<Deferred<Func, ($($ty,)*)>> + Send + Sync>;

            fn instrument(self, context: CallContext) -> Self::Wrapped {
                let target = Arc::new(self);
                Box::new(move |$($arg: $ty),*| {
                    let args = context.snapshot_args(&($(&$arg,)*));
                    let deferred = Deferred {
                        target: target.clone(),
                        args: ($($arg,)*),
                    };
                    context.launch(args, deferred)
                })
            }
        }
    };
}

impl_targets!();
impl_targets!(a: A);
impl_targets!(a: A, b: B);
impl_targets!(a: A, b: B, c: C);
impl_targets!(a: A, b: B, c: C, d: D);
impl_targets!(a: A, b: B, c: C, d: D, e: E);
impl_targets!(a: A, b: B, c: C, d: D, e: E, f: F);

/// Reusable, configured instrumentation.
///
/// ```ignore
/// let traced = loglocal.wrapper().start_span(true).span_name("reports.fetch");
/// let fetch = traced.wrap_async(callsite!(fetch), fetch);
/// ```
#[derive(Debug, Clone)]
pub struct Wrapper {
    ports: Arc<Ports>,
    settings: InstrumentationSettings,
}

impl Wrapper {
    pub fn new(ports: Arc<Ports>) -> Self {
        Self {
            ports,
            settings: InstrumentationSettings::default(),
        }
    }

    pub fn with_settings(ports: Arc<Ports>, settings: InstrumentationSettings) -> Self {
        Self { ports, settings }
    }

    pub fn start_span(mut self, start_span: bool) -> Self {
        self.settings = self.settings.start_span(start_span);
        self
    }

    pub fn span_name(mut self, name: impl Into<String>) -> Self {
        self.settings = self.settings.span_name(name);
        self
    }

    pub fn settings(&self) -> &InstrumentationSettings {
        &self.settings
    }

    /// Bind these settings to `site` for instrumenting calls by hand.
    pub fn context(&self, site: CallSite) -> CallContext {
        CallContext::new(self.ports.clone(), site, &self.settings)
    }

    pub fn wrap<Args, T: SyncTarget<Args>>(&self, site: CallSite, target: T) -> T::Wrapped {
        target.instrument(self.context(site))
    }

    pub fn wrap_async<Args, T: AsyncTarget<Args>>(&self, site: CallSite, target: T) -> T::Wrapped {
        target.instrument(self.context(site))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InstrumentError;
    use crate::logging::{Fields, Level, LogSink};
    use std::sync::Mutex;

    #[derive(Default)]
    struct MessageSink {
        records: Mutex<Vec<(String, Fields)>>,
    }

    impl LogSink for MessageSink {
        fn log(&self, _level: Level, message: &str, fields: &Fields) -> Result<(), InstrumentError> {
            self.records
                .lock()
                .unwrap()
                .push((message.to_string(), fields.clone()));
            Ok(())
        }
    }

    fn wrapper() -> (Wrapper, Arc<MessageSink>) {
        let sink = Arc::new(MessageSink::default());
        (Wrapper::new(Arc::new(Ports::new(sink.clone()))), sink)
    }

    fn ping() -> &'static str {
        "pong"
    }

    fn describe(name: &'static str, age: u32, tags: Vec<&'static str>) -> String {
        format!("{name} ({age}) {}", tags.join(","))
    }

    async fn lookup(id: u64) -> Option<u64> {
        (id > 0).then_some(id * 10)
    }

    #[test]
    fn test_wrap_each_arity_preserves_results() {
        let (wrapper, sink) = wrapper();

        let ping = wrapper.wrap(crate::callsite!(ping), ping);
        let describe = wrapper.wrap(crate::callsite!(describe), describe);
        let sum6 = wrapper.wrap(
            crate::callsite!("sum6"),
            |a: u8, b: u8, c: u8, d: u8, e: u8, f: u8| a + b + c + d + e + f,
        );

        assert_eq!(ping(), "pong");
        assert_eq!(describe("ada", 36, vec!["x", "y"]), "ada (36) x,y");
        assert_eq!(sum6(1, 2, 3, 4, 5, 6), 21);

        let records = sink.records.lock().unwrap();
        assert_eq!(records.len(), 6);
        assert_eq!(records[0].1["args"], "()");
        assert_eq!(records[2].1["args"], "(\"ada\", 36, [\"x\", \"y\"])");
        assert_eq!(records[4].1["function"], "sum6");
    }

    #[test]
    fn test_wrap_truncates_large_arguments() {
        let sink = Arc::new(MessageSink::default());
        let mut ports = Ports::new(sink.clone());
        ports.max_snapshot_len = 32;
        let wrapper = Wrapper::new(Arc::new(ports));

        let count = wrapper.wrap(crate::callsite!("count"), |text: String| text.len());
        assert_eq!(count("z".repeat(1_000)), 1_000);

        let records = sink.records.lock().unwrap();
        assert_eq!(records[0].1["args"].chars().count(), 32);
        assert_eq!(records[1].1["result"], "1000");
    }

    #[tokio::test]
    async fn test_wrap_async_awaits_target() {
        let (wrapper, sink) = wrapper();

        let lookup = wrapper.wrap_async(crate::callsite!(lookup), lookup);
        let pending = lookup(4);
        assert!(sink.records.lock().unwrap().is_empty());

        assert_eq!(pending.await, Some(40));
        assert_eq!(lookup(0).await, None);

        let records = sink.records.lock().unwrap();
        assert_eq!(records.len(), 4);
        assert_eq!(records[0].1["args"], "(4,)");
        assert_eq!(records[1].1["result"], "Some(40)");
    }

    #[tokio::test]
    async fn test_wrap_async_defers_target_until_polled() {
        let (wrapper, sink) = wrapper();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let watched = sink.clone();
        let observed = seen.clone();
        let prepare = wrapper.wrap_async(crate::callsite!("prepare"), move |id: u32| {
            observed
                .lock()
                .unwrap()
                .push(watched.records.lock().unwrap().len());
            async move { id + 1 }
        });

        let pending = prepare(41);
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(pending.await, 42);
        assert_eq!(*seen.lock().unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn test_wrap_async_records_panic_before_first_await() {
        use futures::FutureExt;

        let (wrapper, sink) = wrapper();
        let validate = wrapper.wrap_async(crate::callsite!("validate"), |id: u32| {
            if id == 0 {
                panic!("id must be positive");
            }
            std::future::ready(id)
        });

        let caught = std::panic::AssertUnwindSafe(validate(0)).catch_unwind().await;
        assert!(caught.is_err());

        let records = sink.records.lock().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].0, "→ started");
        assert_eq!(records[1].0, "❌ ←→ error");
        assert_eq!(records[1].1["exception"], "id must be positive");
        assert_eq!(records[0].1["call_id"], records[1].1["call_id"]);
    }

    fn shout(text: &str) -> String {
        text.to_uppercase()
    }

    #[test]
    fn test_wrap_accepts_borrowed_arguments() {
        let greeting = String::from("hello");
        let (wrapper, sink) = wrapper();

        let shout = wrapper.wrap(crate::callsite!(shout), shout);
        assert_eq!(shout(&greeting), "HELLO");
        assert_eq!(shout(greeting.as_str()), "HELLO");

        let records = sink.records.lock().unwrap();
        assert_eq!(records[0].1["args"], "(\"hello\",)");
        assert_eq!(records[1].1["result"], "\"HELLO\"");
    }

    #[test]
    fn test_configured_wrapper_is_reusable() {
        let (wrapper, _sink) = wrapper();
        let traced = wrapper.start_span(true).span_name("reports");

        let first = traced.context(crate::callsite!(ping));
        let second = traced.context(crate::callsite!(describe));

        assert_eq!(first.span_name(), Some("reports"));
        assert_eq!(second.span_name(), Some("reports"));
        assert_eq!(second.site().function, "describe");
        assert!(traced.settings().start_span);
    }
}
