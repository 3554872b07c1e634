//! Structured logging for the supervisor.
//!
//! Every record is a set of named values, written as a single line to stderr:
//!
//! ```ignore
//! log::info!(event = "START", service = name)
//! ```
//!
//! Any value serializable by `serde` can be logged. If the name and value are
//! the same, pass it by name:
//!
//! ```ignore
//! log::warning!(event = "STATUS", service, error)
//! ```
//!
//! `std::io::Error` is not serializable; call `.log()` on it to get something
//! that is.
//!
//! Records are JSON when stderr is not a terminal, and a readable text format
//! otherwise. Both the format and the minimum severity can be changed with
//! [`configure`].

use std::io::Write;
use std::sync::RwLock;

use lazy_static::lazy_static;

pub trait Loggable {
    type Serialized;

    fn log(&self) -> Self::Serialized;
}

impl Loggable for std::io::Error {
    type Serialized = LoggableIoError;

    fn log(&self) -> Self::Serialized {
        self.into()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct LoggableIoError {
    kind: String,
    message: String,
}

impl From<&std::io::Error> for LoggableIoError {
    fn from(value: &std::io::Error) -> Self {
        Self {
            kind: format!("{:?}", value.kind()),
            message: value.to_string(),
        }
    }
}

impl From<std::io::Error> for LoggableIoError {
    fn from(value: std::io::Error) -> Self {
        (&value).into()
    }
}

impl std::fmt::Display for LoggableIoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

/// Severity levels, for logging.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    serde::Serialize,
    serde::Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Trace,
    Debug,
    Info,
    Warning,
    Error,
    Fatal,
}

impl Severity {
    fn as_fixed_length_str(&self) -> &'static str {
        match self {
            Severity::Trace => "TRACE",
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO ",
            Severity::Warning => "WARN ",
            Severity::Error => "ERROR",
            Severity::Fatal => "FATAL",
        }
    }
}

#[allow(unused_macros)]
macro_rules! trace {
    ( $($tokens:tt)+ ) => {
        $crate::log::log!($crate::log::Severity::Trace, $($tokens)+)
    };
}

#[allow(unused_macros)]
macro_rules! debug {
    ( $($tokens:tt)+ ) => {
        $crate::log::log!($crate::log::Severity::Debug, $($tokens)+)
    };
}

#[allow(unused_macros)]
macro_rules! info {
    ( $($tokens:tt)+ ) => {
        $crate::log::log!($crate::log::Severity::Info, $($tokens)+)
    };
}

#[allow(unused_macros)]
macro_rules! warning {
    ( $($tokens:tt)+ ) => {
        $crate::log::log!($crate::log::Severity::Warning, $($tokens)+)
    };
}

#[allow(unused_macros)]
macro_rules! error {
    ( $($tokens:tt)+ ) => {
        $crate::log::log!($crate::log::Severity::Error, $($tokens)+)
    };
}

#[allow(unused_macros)]
macro_rules! fatal {
    ( $($tokens:tt)+ ) => {
        $crate::log::log!($crate::log::Severity::Fatal, $($tokens)+)
    };
}

/// Logs the values given to stderr, along with the current time and the given
/// severity, if that severity is enabled.
///
/// ```ignore
/// log!(Severity::Debug, name = "value", ...)
/// ```
macro_rules! log {
    ( $severity:expr, $($tokens:tt)+ ) => {
        if $crate::log::enabled($severity) {
            $crate::log::log_explicitly!(
                std::io::stderr(),
                $crate::log::global_log_format(),
                chrono::offset::Utc::now(),
                $severity,
                $($tokens)+
            )
        }
    };
}

/// Internal; subject to change.
///
/// ```ignore
/// log_explicitly!(stderr(), LogFormat::Json, now(), Severity::Info, name = "value", ...)
/// ```
#[doc(hidden)]
macro_rules! log_explicitly {
    ( $output: expr, $log_format: expr, $timestamp: expr, $severity: expr, $($rest:tt)+ ) => {{
        #[allow(unused_imports)]
        use $crate::log::Loggable;
        let mut record = $crate::log::Record::new($timestamp, $severity);
        $crate::log::add_log_pairs!(record, $($rest)+);
        record.write_to($output, $log_format);
    }};
}

#[doc(hidden)]
macro_rules! add_log_pairs {
    ( $record:ident, $name: ident = $value:expr, $($rest:tt)* ) => {
        $crate::log::add_log_pairs!($record, $name = $value);
        $crate::log::add_log_pairs!($record, $($rest)*)
    };

    ( $record:ident, $name: ident = $value:expr ) => {
        $record.add(stringify!($name), &$value);
    };

    ( $record:ident, $name: ident, $($rest:tt)* ) => {
        $crate::log::add_log_pairs!($record, $name);
        $crate::log::add_log_pairs!($record, $($rest)*)
    };

    ( $record:ident, $name: ident ) => {
        $crate::log::add_log_pairs!($record, $name = $name);
    };

    // trailing comma
    ( $record:ident, ) => {};
}

pub(crate) use add_log_pairs;
pub(crate) use log;
pub(crate) use log_explicitly;

#[allow(unused_imports)]
pub(crate) use debug;
#[allow(unused_imports)]
pub(crate) use error;
#[allow(unused_imports)]
pub(crate) use fatal;
#[allow(unused_imports)]
pub(crate) use info;
#[allow(unused_imports)]
pub(crate) use trace;
#[allow(unused_imports)]
pub(crate) use warning;

/// The textual format used when writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    Json,
    Text,
}

/// A single log record, built up one value at a time.
///
/// Values are serialized as they are added, so that a value which fails to
/// serialize is recorded as its error rather than losing the whole record.
pub struct Record {
    timestamp: chrono::DateTime<chrono::FixedOffset>,
    severity: Severity,
    pairs: Vec<(&'static str, Rendered)>,
}

struct Rendered {
    json: serde_json::Value,
    text: String,
}

impl Record {
    pub fn new(timestamp: chrono::DateTime<impl chrono::TimeZone>, severity: Severity) -> Self {
        Self {
            timestamp: timestamp.fixed_offset(),
            severity,
            pairs: Vec::new(),
        }
    }

    pub fn add(&mut self, name: &'static str, value: &dyn erased_serde::Serialize) {
        let json = serde_json::to_value(value)
            .unwrap_or_else(|error| serde_json::Value::String(format!("<{}>", error)));
        let text = TEXT_SERIALIZER
            .to_string(value)
            .unwrap_or_else(|error| format!("<{}>", error));
        self.pairs.push((name, Rendered { json, text }));
    }

    /// Writes the record as a single line. Failures to write are ignored;
    /// there is nowhere left to report them.
    pub fn write_to(&self, mut writer: impl Write, format: LogFormat) {
        let line = match format {
            LogFormat::Json => self.to_json_line(),
            LogFormat::Text => self.to_text_line(),
        };
        let _ = writer.write_all(line.as_bytes());
    }

    fn to_json_line(&self) -> String {
        let mut object = serde_json::map::Map::new();
        object.insert(
            "timestamp".to_owned(),
            serde_json::Value::String(
                self.timestamp
                    .to_rfc3339_opts(chrono::SecondsFormat::AutoSi, true),
            ),
        );
        object.insert(
            "severity".to_owned(),
            serde_json::to_value(self.severity).unwrap_or(serde_json::Value::Null),
        );
        for (name, rendered) in &self.pairs {
            object.insert((*name).to_owned(), rendered.json.clone());
        }
        serde_json::Value::Object(object).to_string() + "\n"
    }

    fn to_text_line(&self) -> String {
        let mut line = format!(
            "{} [{}]",
            self.timestamp
                .to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            self.severity.as_fixed_length_str()
        );
        let mut separator = " ";
        for (name, rendered) in &self.pairs {
            line.push_str(separator);
            line.push_str(name);
            line.push_str(" = ");
            line.push_str(&rendered.text);
            separator = ", ";
        }
        line.push('\n');
        line
    }
}

#[derive(Debug, Clone, Copy)]
struct Settings {
    format: LogFormat,
    minimum: Severity,
}

lazy_static! {
    static ref TEXT_SERIALIZER: ron::Options = ron::Options::default()
        .with_default_extension(ron::extensions::Extensions::IMPLICIT_SOME)
        .with_default_extension(ron::extensions::Extensions::UNWRAP_NEWTYPES)
        .with_default_extension(ron::extensions::Extensions::UNWRAP_VARIANT_NEWTYPES);
    static ref SETTINGS: RwLock<Settings> = RwLock::new(Settings {
        format: detect_log_format(),
        minimum: Severity::Info,
    });
}

fn detect_log_format() -> LogFormat {
    if std::io::IsTerminal::is_terminal(&std::io::stderr()) {
        LogFormat::Text
    } else {
        LogFormat::Json
    }
}

fn settings() -> Settings {
    match SETTINGS.read() {
        Ok(settings) => *settings,
        Err(poisoned) => *poisoned.into_inner(),
    }
}

/// Overrides the detected format (if given) and the minimum severity.
pub fn configure(format: Option<LogFormat>, minimum: Severity) {
    let mut settings = match SETTINGS.write() {
        Ok(settings) => settings,
        Err(poisoned) => poisoned.into_inner(),
    };
    if let Some(format) = format {
        settings.format = format;
    }
    settings.minimum = minimum;
}

pub fn global_log_format() -> LogFormat {
    settings().format
}

pub fn enabled(severity: Severity) -> bool {
    severity >= settings().minimum
}
