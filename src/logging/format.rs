//! Text rendering of log records from a format template.
//!
//! Templates use `{token}` or `{token:spec}` placeholders:
//!
//! | token      | spec                          | value                                   |
//! |------------|-------------------------------|-----------------------------------------|
//! | `time`     | `YYYY MM DD HH mm ss SSS ZZ`  | local timestamp                         |
//! | `level`    | `<N` / `>N` (padding)         | severity                                |
//! | `name`     | padding                       | `module` field, else the module path    |
//! | `function` | padding                       | `function` field                        |
//! | `line`     | padding                       | `line` field, else the event's line     |
//! | `message`  | padding                       | the record message                      |
//! | `extra`    | padding                       | every remaining field                   |

use chrono::Local;
use regex::Regex;
use std::fmt::{self, Write as _};
use std::sync::OnceLock;
use tracing::{Event, Level, Subscriber, field::Field};
use tracing_subscriber::{
    fmt::{FmtContext, FormatEvent, FormatFields, format::Writer},
    registry::LookupSpan,
};

use crate::error::LogLocalError;

const DEFAULT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Fields consumed by the `name`, `function` and `line` tokens.
const IDENTITY_FIELDS: [&str; 4] = ["module", "function", "line", "file"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Align {
    Left(usize),
    Right(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(String),
    Time(String),
    Level(Option<Align>),
    Name(Option<Align>),
    Function(Option<Align>),
    Line(Option<Align>),
    Message(Option<Align>),
    Extra(Option<Align>),
}

/// A parsed format template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    tokens: Vec<Token>,
}

static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
static TIME_PART: OnceLock<Regex> = OnceLock::new();

fn placeholder_pattern() -> &'static Regex {
    PLACEHOLDER.get_or_init(|| Regex::new(r"\{(\w+)(?::([^}]*))?\}").expect("static placeholder regex"))
}

fn time_part_pattern() -> &'static Regex {
    TIME_PART.get_or_init(|| Regex::new(r"YYYY|YY|MM|DD|HH|mm|ss|SSS|ZZ").expect("static time regex"))
}

fn parse_align(token: &str, spec: Option<&str>) -> Result<Option<Align>, LogLocalError> {
    let Some(spec) = spec.filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    let invalid = || LogLocalError::Template(format!("bad alignment '{spec}' for {{{token}}}"));
    let (left, width) = if let Some(width) = spec.strip_prefix('<') {
        (true, width)
    } else if let Some(width) = spec.strip_prefix('>') {
        (false, width)
    } else {
        (true, spec)
    };
    let width: usize = width.parse().map_err(|_| invalid())?;
    Ok(Some(if left { Align::Left(width) } else { Align::Right(width) }))
}

fn translate_time_format(spec: &str) -> String {
    let escaped = spec.replace('%', "%%");
    time_part_pattern()
        .replace_all(&escaped, |caps: &regex::Captures<'_>| match &caps[0] {
            "YYYY" => "%Y",
            "YY" => "%y",
            "MM" => "%m",
            "DD" => "%d",
            "HH" => "%H",
            "mm" => "%M",
            "ss" => "%S",
            "SSS" => "%3f",
            _ => "%z",
        })
        .into_owned()
}

impl Template {
    pub fn parse(source: &str) -> Result<Self, LogLocalError> {
        let mut tokens = Vec::new();
        let mut cursor = 0;

        for caps in placeholder_pattern().captures_iter(source) {
            let Some(whole) = caps.get(0) else { continue };
            if whole.start() > cursor {
                tokens.push(Token::Literal(source[cursor..whole.start()].to_string()));
            }
            cursor = whole.end();

            let name = &caps[1];
            let spec = caps.get(2).map(|m| m.as_str());
            let token = match name {
                "time" => Token::Time(
                    spec.map(translate_time_format)
                        .unwrap_or_else(|| DEFAULT_TIME_FORMAT.to_string()),
                ),
                "level" => Token::Level(parse_align(name, spec)?),
                "name" => Token::Name(parse_align(name, spec)?),
                "function" => Token::Function(parse_align(name, spec)?),
                "line" => Token::Line(parse_align(name, spec)?),
                "message" => Token::Message(parse_align(name, spec)?),
                "extra" => Token::Extra(parse_align(name, spec)?),
                other => {
                    return Err(LogLocalError::Template(format!("unknown token {{{other}}}")));
                }
            };
            tokens.push(token);
        }

        if cursor < source.len() {
            tokens.push(Token::Literal(source[cursor..].to_string()));
        }

        Ok(Self { tokens })
    }

    /// Render a record. Level names are coloured when `ansi` is set.
    pub fn render(&self, out: &mut dyn fmt::Write, record: &RecordView<'_>, ansi: bool) -> fmt::Result {
        for token in &self.tokens {
            match token {
                Token::Literal(text) => out.write_str(text)?,
                Token::Time(format) => write!(out, "{}", Local::now().format(format))?,
                Token::Level(align) => {
                    let padded = pad(record.level.as_str(), *align);
                    if ansi {
                        write!(out, "\x1b[{}m{padded}\x1b[0m", level_colour(record.level))?;
                    } else {
                        out.write_str(&padded)?;
                    }
                }
                Token::Name(align) => out.write_str(&pad(record.name, *align))?,
                Token::Function(align) => out.write_str(&pad(record.function, *align))?,
                Token::Line(align) => out.write_str(&pad(&record.line, *align))?,
                Token::Message(align) => out.write_str(&pad(record.message, *align))?,
                Token::Extra(align) => out.write_str(&pad(&render_extra(record.extra), *align))?,
            }
        }
        Ok(())
    }
}

fn pad(value: &str, align: Option<Align>) -> String {
    match align {
        None => value.to_string(),
        Some(Align::Left(width)) => format!("{value:<width$}"),
        Some(Align::Right(width)) => format!("{value:>width$}"),
    }
}

fn level_colour(level: Level) -> &'static str {
    match level {
        Level::ERROR => "1;31",
        Level::WARN => "1;33",
        Level::INFO => "1;32",
        Level::DEBUG => "1;34",
        _ => "1;35",
    }
}

fn render_extra(extra: &[(String, String)]) -> String {
    let mut rendered = String::from("{");
    for (index, (key, value)) in extra.iter().enumerate() {
        if index > 0 {
            rendered.push_str(", ");
        }
        let _ = write!(rendered, "{key}: {value:?}");
    }
    rendered.push('}');
    rendered
}

/// The parts of a record a template can reference
pub struct RecordView<'a> {
    pub level: Level,
    pub name: &'a str,
    pub function: &'a str,
    pub line: String,
    pub message: &'a str,
    pub extra: &'a [(String, String)],
}

#[derive(Default)]
struct FieldCollector {
    message: String,
    fields: Vec<(String, String)>,
}

impl FieldCollector {
    fn take(&mut self, name: &str) -> Option<String> {
        let index = self.fields.iter().position(|(key, _)| key == name)?;
        Some(self.fields.remove(index).1)
    }
}

impl tracing::field::Visit for FieldCollector {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.push((field.name().to_string(), value.to_string()));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            self.fields.push((field.name().to_string(), format!("{value:?}")));
        }
    }
}

/// `tracing_subscriber` event formatter backed by a [`Template`]
#[derive(Debug, Clone)]
pub struct TemplateFormat {
    template: Template,
}

impl TemplateFormat {
    pub fn new(source: &str) -> Result<Self, LogLocalError> {
        Ok(Self { template: Template::parse(source)? })
    }
}

impl<S, N> FormatEvent<S, N> for TemplateFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let meta = event.metadata();
        let mut collector = FieldCollector::default();
        event.record(&mut collector);

        let module = collector.take("module");
        let function = collector.take("function");
        let line = collector.take("line");
        collector.fields.retain(|(key, _)| !IDENTITY_FIELDS.contains(&key.as_str()));

        let record = RecordView {
            level: *meta.level(),
            name: module.as_deref().or(meta.module_path()).unwrap_or(meta.target()),
            function: function.as_deref().unwrap_or("-"),
            line: line
                .or_else(|| meta.line().map(|l| l.to_string()))
                .unwrap_or_default(),
            message: &collector.message,
            extra: &collector.fields,
        };

        let ansi = writer.has_ansi_escapes();
        self.template.render(&mut writer, &record, ansi)?;
        writeln!(writer)
    }
}
