//! Structured logging.
//!
//! # Responsibilities
//! - Build leveled loggers with inheritable context
//! - Emit one JSON record per call to the right output stream
//! - Normalize error values to a serializable shape
//!
//! # Design Decisions
//! - Severity threshold comes from the deployment environment
//! - `child` merges context eagerly; the returned logger is independent
//! - Error/Fatal → stderr, everything else → stdout
//! - A capture sink exists so tests can assert on emitted records

use serde::Serialize;
use serde_json::{json, Map, Value};
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::schema::Environment;
use crate::resources::cache::CacheResource;
use crate::resources::Fingerprint;

/// Log severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Fatal => "fatal",
        }
    }
}

/// Extra key/value fields attached to a single log record.
pub type LogPayload = Map<String, Value>;

/// Convert a `json!({..})` object literal into a payload map.
pub fn fields(value: Value) -> LogPayload {
    match value {
        Value::Object(map) => map,
        _ => LogPayload::new(),
    }
}

/// Payload carrying a normalized error under the `err` key.
pub fn err_field(err: &dyn std::error::Error) -> LogPayload {
    fields(json!({ "err": ErrorDetail::from_error(err).to_value() }))
}

/// An error normalized to a serializable `{message, stack}` pair.
///
/// `stack` is the rendered source chain, one cause per line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorDetail {
    pub message: String,
    pub stack: Option<String>,
}

impl ErrorDetail {
    pub fn from_error(err: &dyn std::error::Error) -> Self {
        let mut causes = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            causes.push(cause.to_string());
            source = cause.source();
        }
        Self {
            message: err.to_string(),
            stack: if causes.is_empty() {
                None
            } else {
                Some(causes.join("\n"))
            },
        }
    }

    pub fn from_message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack: None,
        }
    }

    pub fn to_value(&self) -> Value {
        json!({ "message": self.message, "stack": self.stack })
    }
}

/// Which output stream a record was written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStream {
    Stdout,
    Stderr,
}

/// A record retained by the capture sink.
#[derive(Debug, Clone)]
pub struct CapturedRecord {
    pub level: LogLevel,
    pub stream: LogStream,
    pub record: Value,
}

impl CapturedRecord {
    pub fn message(&self) -> &str {
        self.record
            .get("msg")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }
}

#[derive(Clone)]
enum LogSink {
    Standard,
    Capture(Arc<Mutex<Vec<CapturedRecord>>>),
}

/// Handle over records emitted through a capture-sink logger.
#[derive(Clone)]
pub struct CaptureHandle(Arc<Mutex<Vec<CapturedRecord>>>);

impl CaptureHandle {
    pub fn records(&self) -> Vec<CapturedRecord> {
        self.0.lock().expect("capture buffer poisoned").clone()
    }

    /// Records whose `msg` field equals the given message.
    pub fn records_with_message(&self, message: &str) -> Vec<CapturedRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.message() == message)
            .collect()
    }
}

/// A leveled, structured logger with inheritable context.
#[derive(Clone)]
pub struct Logger {
    min_level: LogLevel,
    context: Arc<LogPayload>,
    sink: LogSink,
}

impl Logger {
    /// Derive a logger whose context is this logger's merged with `extra`.
    ///
    /// On key collision the extra value wins. The child owns its merged
    /// context, so neither later parent changes nor reuse of the `extra`
    /// map can affect it.
    pub fn child(&self, extra: LogPayload) -> Logger {
        let mut merged = (*self.context).clone();
        for (key, value) in extra {
            merged.insert(key, value);
        }
        Logger {
            min_level: self.min_level,
            context: Arc::new(merged),
            sink: self.sink.clone(),
        }
    }

    /// Emit one structured record. Calls below the severity threshold are
    /// dropped with no side effect.
    pub fn log(&self, level: LogLevel, msg: &str, payload: Option<LogPayload>) {
        if level < self.min_level {
            return;
        }

        let mut record = LogPayload::new();
        record.insert("level".into(), json!(level.as_str()));
        record.insert("time".into(), json!(epoch_millis()));
        for (key, value) in self.context.iter() {
            record.insert(key.clone(), value.clone());
        }
        if let Some(payload) = payload {
            for (key, value) in payload {
                record.insert(key, value);
            }
        }
        record.insert("msg".into(), json!(msg));

        self.write(level, Value::Object(record));
    }

    pub fn debug(&self, msg: &str) {
        self.log(LogLevel::Debug, msg, None);
    }

    pub fn info(&self, msg: &str) {
        self.log(LogLevel::Info, msg, None);
    }

    pub fn warn(&self, msg: &str) {
        self.log(LogLevel::Warn, msg, None);
    }

    pub fn error(&self, msg: &str) {
        self.log(LogLevel::Error, msg, None);
    }

    pub fn fatal(&self, msg: &str) {
        self.log(LogLevel::Fatal, msg, None);
    }

    pub fn debug_with(&self, msg: &str, payload: LogPayload) {
        self.log(LogLevel::Debug, msg, Some(payload));
    }

    pub fn info_with(&self, msg: &str, payload: LogPayload) {
        self.log(LogLevel::Info, msg, Some(payload));
    }

    pub fn warn_with(&self, msg: &str, payload: LogPayload) {
        self.log(LogLevel::Warn, msg, Some(payload));
    }

    pub fn error_with(&self, msg: &str, payload: LogPayload) {
        self.log(LogLevel::Error, msg, Some(payload));
    }

    pub fn fatal_with(&self, msg: &str, payload: LogPayload) {
        self.log(LogLevel::Fatal, msg, Some(payload));
    }

    /// Flush both output streams. Called before process exit, which skips
    /// destructors.
    pub fn flush(&self) {
        let _ = std::io::stdout().flush();
        let _ = std::io::stderr().flush();
    }

    fn write(&self, level: LogLevel, record: Value) {
        let stream = if level >= LogLevel::Error {
            LogStream::Stderr
        } else {
            LogStream::Stdout
        };

        match &self.sink {
            LogSink::Standard => {
                // The locked handle keeps per-stream ordering intact under
                // concurrent writers.
                let line = record.to_string();
                match stream {
                    LogStream::Stderr => {
                        let stderr = std::io::stderr();
                        let mut handle = stderr.lock();
                        let _ = writeln!(handle, "{line}");
                    }
                    LogStream::Stdout => {
                        let stdout = std::io::stdout();
                        let mut handle = stdout.lock();
                        let _ = writeln!(handle, "{line}");
                    }
                }
            }
            LogSink::Capture(buffer) => {
                buffer
                    .lock()
                    .expect("capture buffer poisoned")
                    .push(CapturedRecord {
                        level,
                        stream,
                        record,
                    });
            }
        }
    }
}

impl CacheResource for Logger {}

/// Builds loggers for a deployment environment.
pub struct LoggerFactory;

impl LoggerFactory {
    /// Build the root logger for an environment. Development keeps debug
    /// records; every other environment starts at info.
    pub fn create(env: Environment) -> Logger {
        Logger {
            min_level: min_level_for(env),
            context: Arc::new(LogPayload::new()),
            sink: LogSink::Standard,
        }
    }

    /// Build a logger whose records are retained in memory instead of
    /// written to the output streams.
    pub fn with_capture(env: Environment) -> (Logger, CaptureHandle) {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let logger = Logger {
            min_level: min_level_for(env),
            context: Arc::new(LogPayload::new()),
            sink: LogSink::Capture(Arc::clone(&buffer)),
        };
        (logger, CaptureHandle(buffer))
    }
}

/// Fingerprint over every input that affects how a logger is built.
pub fn logger_fingerprint(env: Environment) -> Fingerprint {
    Fingerprint::builder("logger")
        .input("environment", env.as_str())
        .finish()
}

fn min_level_for(env: Environment) -> LogLevel {
    if env.is_development() {
        LogLevel::Debug
    } else {
        LogLevel::Info
    }
}

fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
