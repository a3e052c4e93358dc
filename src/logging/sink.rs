use std::collections::BTreeMap;
use std::fmt;

use crate::error::InstrumentError;

/// Severity of an emitted record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    Info,
    Warn,
    Error,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        })
    }
}

/// Structured fields attached to a record
pub type Fields = BTreeMap<&'static str, String>;

/// Destination for the records an instrumented call emits.
///
/// Implementations are shared by every wrapped callable and must keep
/// records from one thread of control in order.
pub trait LogSink: Send + Sync {
    fn log(&self, level: Level, message: &str, fields: &Fields) -> Result<(), InstrumentError>;
}

/// [`LogSink`] that forwards records as `tracing` events with target `loglocal`.
///
/// The wrapper's field names become event fields; anything else is folded
/// into a single `extra` field.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLog;

const KNOWN_FIELDS: [&str; 12] = [
    "function", "module", "file", "line", "call_id", "args", "kwargs", "duration", "result",
    "exception", "trace_id", "outcome",
];

macro_rules! emit {
    ($level:ident, $message:expr, $fields:expr, $extra:expr) => {{
        let get = |key: &str| $fields.get(key).map(String::as_str);
        tracing::$level!(
            target: "loglocal",
            function = get("function"),
            module = get("module"),
            file = get("file"),
            line = get("line"),
            call_id = get("call_id"),
            args = get("args"),
            kwargs = get("kwargs"),
            duration = get("duration"),
            result = get("result"),
            exception = get("exception"),
            trace_id = get("trace_id"),
            outcome = get("outcome"),
            extra = $extra,
            "{}",
            $message
        )
    }};
}

impl LogSink for TracingLog {
    fn log(&self, level: Level, message: &str, fields: &Fields) -> Result<(), InstrumentError> {
        let extra: Vec<String> = fields
            .iter()
            .filter(|(key, _)| !KNOWN_FIELDS.contains(key))
            .map(|(key, value)| format!("{key}={value}"))
            .collect();
        let extra = (!extra.is_empty()).then(|| extra.join(" "));
        let extra = extra.as_deref();

        match level {
            Level::Info => emit!(info, message, fields, extra),
            Level::Warn => emit!(warn, message, fields, extra),
            Level::Error => emit!(error, message, fields, extra),
        }
        Ok(())
    }
}
