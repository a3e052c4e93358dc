use std::fmt::{self, Write as _};
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::logging::{Fields, Level};

pub const STARTED: &str = "→ started";
pub const FINISHED: &str = "← finished";
pub const FAILED: &str = "❌ ←→ error";
pub const CANCELLED: &str = "⊘ cancelled";

/// Logged in place of a streaming result, whose body is never read.
pub const STREAMING_PLACEHOLDER: &str = "StreamingResponse";

/// Rust has no keyword arguments; the field is kept so record shapes match.
pub const NO_KWARGS: &str = "{}";

/// Identity of a wrapped callable, bound once and merged into every
/// record it emits. Build it with [`callsite!`](crate::callsite).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallSite {
    pub function: &'static str,
    pub module: &'static str,
    pub file: &'static str,
    pub line: u32,
}

impl CallSite {
    pub const fn new(function: &'static str, module: &'static str, file: &'static str, line: u32) -> Self {
        Self { function, module, file, line }
    }

    pub fn fields(&self) -> Fields {
        Fields::from([
            ("function", self.function.to_string()),
            ("module", self.module.to_string()),
            ("file", self.file.to_string()),
            ("line", self.line.to_string()),
        ])
    }
}

/// Capture a [`CallSite`] for `function` at the invocation point.
///
/// ```
/// let site = loglocal::callsite!(divide);
/// assert_eq!(site.function, "divide");
/// assert_eq!(site.module, module_path!());
/// ```
#[macro_export]
macro_rules! callsite {
    ($function:ident) => {
        $crate::CallSite::new(stringify!($function), module_path!(), file!(), line!())
    };
    ($function:expr) => {
        $crate::CallSite::new($function, module_path!(), file!(), line!())
    };
}

/// Wrap a named function, binding its call site at the macro invocation.
///
/// `wrap!(log, f)` wraps a synchronous function, `wrap!(async log, f)`
/// an asynchronous one. `log` is anything with `wrap`/`wrap_async`
/// methods: a [`LogLocal`](crate::LogLocal) or a [`Wrapper`](crate::Wrapper).
#[macro_export]
macro_rules! wrap {
    (async $log:expr, $function:ident) => {
        $log.wrap_async($crate::callsite!($function), $function)
    };
    ($log:expr, $function:ident) => {
        $log.wrap($crate::callsite!($function), $function)
    };
}

/// Shorten `rendered` to at most `cap` characters.
pub fn snapshot(mut rendered: String, cap: usize) -> String {
    if let Some((end, _)) = rendered.char_indices().nth(cap) {
        rendered.truncate(end);
    }
    rendered
}

/// `Debug`-render `value`, stopping once `cap` characters are written.
pub fn render_capped(value: &dyn fmt::Debug, cap: usize) -> String {
    let mut out = CappedWriter {
        buf: String::new(),
        remaining: cap,
    };
    // Err means the cap was reached.
    let _ = write!(out, "{value:?}");
    out.buf
}

struct CappedWriter {
    buf: String,
    remaining: usize,
}

impl fmt::Write for CappedWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for c in s.chars() {
            if self.remaining == 0 {
                return Err(fmt::Error);
            }
            self.buf.push(c);
            self.remaining -= 1;
        }
        Ok(())
    }
}

/// Per-invocation bookkeeping, created at call entry.
#[derive(Debug)]
pub struct CallRecord {
    pub start: Instant,
    pub call_id: String,
    pub args: String,
    pub kwargs: String,
}

impl CallRecord {
    pub fn begin(args: String, cap: usize) -> Self {
        Self {
            start: Instant::now(),
            call_id: Uuid::new_v4().to_string(),
            args: snapshot(args, cap),
            kwargs: snapshot(NO_KWARGS.to_string(), cap),
        }
    }

    pub fn write_fields(&self, fields: &mut Fields) {
        fields.insert("call_id", self.call_id.clone());
        fields.insert("args", self.args.clone());
        fields.insert("kwargs", self.kwargs.clone());
    }

    pub fn finish(self, kind: OutcomeKind) -> OutcomeRecord {
        OutcomeRecord {
            call_id: self.call_id,
            duration: self.start.elapsed(),
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutcomeKind {
    Success { result: String },
    Error { message: String },
    Cancelled,
}

/// How an invocation ended. Produced exactly once per [`CallRecord`].
#[derive(Debug, Clone)]
pub struct OutcomeRecord {
    pub call_id: String,
    pub duration: Duration,
    pub kind: OutcomeKind,
}

impl OutcomeRecord {
    pub fn duration_seconds(&self) -> f64 {
        self.duration.as_secs_f64()
    }

    pub fn is_success(&self) -> bool {
        matches!(self.kind, OutcomeKind::Success { .. })
    }

    pub fn level(&self) -> Level {
        match self.kind {
            OutcomeKind::Success { .. } => Level::Info,
            OutcomeKind::Error { .. } | OutcomeKind::Cancelled => Level::Error,
        }
    }

    pub fn message(&self) -> &'static str {
        match self.kind {
            OutcomeKind::Success { .. } => FINISHED,
            OutcomeKind::Error { .. } => FAILED,
            OutcomeKind::Cancelled => CANCELLED,
        }
    }

    pub fn write_fields(&self, fields: &mut Fields) {
        fields.insert("call_id", self.call_id.clone());
        fields.insert("duration", format!("{:.6}s", self.duration_seconds()));
        match &self.kind {
            OutcomeKind::Success { result } => {
                fields.insert("outcome", "success".to_string());
                fields.insert("result", result.clone());
            }
            OutcomeKind::Error { message } => {
                fields.insert("outcome", "error".to_string());
                fields.insert("exception", message.clone());
            }
            OutcomeKind::Cancelled => {
                fields.insert("outcome", "cancelled".to_string());
            }
        }
    }
}
