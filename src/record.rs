//! # Record Model
//!
//! In-memory representation of a single log event as it moves from a producer
//! through the gate, the ingestion channel, the dispatcher, and finally into
//! each destination's formatter.

use ahash::AHashMap;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Severity of a log record, ordered `Trace < Debug < Info < Warn < Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Level {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
}

impl Level {
    /// Parse a level name, case-insensitively. Accepts a few common aliases
    /// (`success` -> Info, `critical`/`fatal` -> Error) so callers migrating
    /// configuration strings from other logging libraries keep working.
    pub fn from_str(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "trace" => Some(Level::Trace),
            "debug" => Some(Level::Debug),
            "info" | "success" => Some(Level::Info),
            "warn" | "warning" => Some(Level::Warn),
            "error" | "critical" | "fatal" => Some(Level::Error),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "TRACE",
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        }
    }

    /// Single-letter symbol rendering, for formatters configured with `level_symbol`.
    pub fn as_symbol(&self) -> char {
        match self {
            Level::Trace => 'T',
            Level::Debug => 'D',
            Level::Info => 'I',
            Level::Warn => 'W',
            Level::Error => 'E',
        }
    }

    /// Syslog severity per RFC3164: Trace/Debug -> 7, Info -> 6, Warn -> 4, Error -> 3.
    pub fn syslog_severity(&self) -> u8 {
        match self {
            Level::Trace | Level::Debug => 7,
            Level::Info => 6,
            Level::Warn => 4,
            Level::Error => 3,
        }
    }
}

/// A dynamically typed field value. Structured entries carry heterogeneous
/// values; formatters and the redactor operate on this tagged sum rather than
/// a language-native map, so cyclic structures and depth limits are explicit.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Map(AHashMap<String, Value>),
}

impl Value {
    pub fn as_str_leaf(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}
impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}
impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}
impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}
impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

/// Field map attached to a record: a small map of names to dynamically typed
/// values. Insertion order is preserved for stable text-format rendering.
pub type Fields = Vec<(String, Value)>;

/// A fully-formed structured log entry (the "structured" variant of
/// [`RecordBody`]).
#[derive(Debug, Clone)]
pub struct StructuredEntry {
    pub level_name: String,
    pub message: String,
    pub fields: Fields,
    pub stack_trace: Option<String>,
    pub file: Option<String>,
    pub line: Option<u32>,
    /// Pre-formatted timestamp string, stamped once at submission time so that
    /// every destination renders the identical instant even if formatting
    /// happens slightly later on the dispatcher thread.
    pub timestamp: String,
}

/// The payload of a [`Record`]: either a raw pre-formatted byte blob that
/// bypasses the formatter entirely, a printf-style message plus its
/// already-rendered text, or a fully structured entry.
#[derive(Debug, Clone)]
pub enum RecordBody {
    Raw(Arc<[u8]>),
    Text(String),
    Structured(StructuredEntry),
}

/// One submitted log event. Created per producer call, consumed by exactly
/// one dispatcher, and released after all destinations have processed it.
#[derive(Debug, Clone)]
pub struct Record {
    pub level: Level,
    pub timestamp: DateTime<Utc>,
    pub body: RecordBody,
    pub fields: Fields,
}

impl Record {
    pub fn new_text(level: Level, message: impl Into<String>, fields: Fields) -> Self {
        Record {
            level,
            timestamp: Utc::now(),
            body: RecordBody::Text(message.into()),
            fields,
        }
    }

    pub fn new_structured(level: Level, entry: StructuredEntry) -> Self {
        let fields = entry.fields.clone();
        Record {
            level,
            timestamp: Utc::now(),
            body: RecordBody::Structured(entry),
            fields,
        }
    }

    pub fn new_raw(level: Level, bytes: impl Into<Arc<[u8]>>) -> Self {
        Record {
            level,
            timestamp: Utc::now(),
            body: RecordBody::Raw(bytes.into()),
            fields: Vec::new(),
        }
    }

    /// Plain text of the message, for filters/samplers that only look at the
    /// rendered message rather than the full formatted line.
    pub fn message(&self) -> &str {
        match &self.body {
            RecordBody::Raw(_) => "",
            RecordBody::Text(s) => s,
            RecordBody::Structured(e) => &e.message,
        }
    }
}
