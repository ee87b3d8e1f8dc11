//! Structured logging for the shell and its engines.
//!
//! Every record is a single JSON object:
//! `{ts, seq, lvl, component, event, msg, code?, cause?, fatal?, data}`.
//! Records are handed to a [`LogSink`]; the default sink prints JSON lines to
//! stdout, the memory sink keeps them around for assertions.
//!
//! Callers pass loose fields through [`obj`]; the well-known keys `msg`,
//! `code`, `cause` and `fatal` are lifted to the top level of the record.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::element::Element;

/// Numeric triage codes carried on notable records.
pub mod codes {
    pub const STARTUP_COMPLETE: u32 = 560;
    pub const ENGINE_LOAD_FAILED: u32 = 2155;
    pub const NO_ENGINES: u32 = 2156;
    pub const HANDLER_FAILED: u32 = 2157;
    pub const SHELL_DISABLED: u32 = 2158;
    pub const BOOT_FAILED: u32 = 2159;
}

// =============================================================================
// Log Levels
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
    Fatal = 5,
}

impl Level {
    pub fn from_env() -> Self {
        match std::env::var("LOG_LEVEL").as_deref() {
            Ok("trace") => Level::Trace,
            Ok("debug") => Level::Debug,
            Ok("info") => Level::Info,
            Ok("warn") => Level::Warn,
            Ok("error") => Level::Error,
            Ok("fatal") => Level::Fatal,
            _ => Level::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Fatal => "fatal",
        }
    }
}

// =============================================================================
// Log Domains (categories for filtering)
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    System,   // Startup, shutdown, identity
    Engine,   // Discovery and loading of engines
    Bus,      // Handler registration and dispatch
    Config,   // Config fetch and normalization
    Server,   // Network-facing subsystem
    Protocol, // Rendered chat messages
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::System => "system",
            Domain::Engine => "engine",
            Domain::Bus => "bus",
            Domain::Config => "config",
            Domain::Server => "server",
            Domain::Protocol => "protocol",
        }
    }

    pub fn is_enabled(&self) -> bool {
        // Check LOG_DOMAINS env var (comma-separated list or "all")
        match std::env::var("LOG_DOMAINS").as_deref() {
            Ok("all") | Err(_) => true,
            Ok(domains) => domains.split(',').any(|d| d.trim() == self.as_str()),
        }
    }
}

// =============================================================================
// Records and sinks
// =============================================================================

static LOG_SEQ: AtomicU64 = AtomicU64::new(0);

fn next_seq() -> u64 {
    LOG_SEQ.fetch_add(1, Ordering::SeqCst)
}

#[derive(Debug, Clone, Serialize)]
pub struct Record {
    pub ts: String,
    pub seq: u64,
    pub lvl: Level,
    pub component: &'static str,
    pub event: String,
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub fatal: bool,
    pub data: Map<String, Value>,
}

pub trait LogSink: Send + Sync {
    fn write(&self, record: &Record);
}

/// Prints each record as one JSON line.
pub struct StdoutSink;

impl LogSink for StdoutSink {
    fn write(&self, record: &Record) {
        match serde_json::to_string(record) {
            Ok(line) => println!("{}", line),
            Err(err) => eprintln!("[log] failed to encode record: {}", err),
        }
    }
}

/// Keeps every record in memory.
#[derive(Default)]
pub struct MemorySink {
    records: Mutex<Vec<Record>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<Record> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn with_code(&self, code: u32) -> Vec<Record> {
        self.records()
            .into_iter()
            .filter(|r| r.code == Some(code))
            .collect()
    }

    pub fn with_event(&self, event: &str) -> Vec<Record> {
        self.records()
            .into_iter()
            .filter(|r| r.event == event)
            .collect()
    }
}

impl LogSink for MemorySink {
    fn write(&self, record: &Record) {
        if let Ok(mut records) = self.records.lock() {
            records.push(record.clone());
        }
    }
}

fn sanitize_fields(mut fields: Map<String, Value>) -> Map<String, Value> {
    let redacted = Value::String("[REDACTED]".to_string());
    for key in ["authorization", "Authorization", "token", "password"] {
        if fields.contains_key(key) {
            fields.insert(key.to_string(), redacted.clone());
        }
    }
    fields
}

// =============================================================================
// Logger handle
// =============================================================================

/// Cheap to clone; every clone writes to the same sink.
#[derive(Clone)]
pub struct Logger {
    sink: Arc<dyn LogSink>,
    min_level: Level,
    domain: Domain,
}

impl Logger {
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self {
            sink,
            min_level: Level::from_env(),
            domain: Domain::System,
        }
    }

    pub fn stdout() -> Self {
        Self::new(Arc::new(StdoutSink))
    }

    pub fn with_min_level(mut self, level: Level) -> Self {
        self.min_level = level;
        self
    }

    /// Same sink, records tagged with another domain.
    pub fn domain(&self, domain: Domain) -> Logger {
        Logger {
            sink: self.sink.clone(),
            min_level: self.min_level,
            domain,
        }
    }

    pub fn log(&self, level: Level, event: &str, fields: Map<String, Value>) {
        if level < self.min_level || !self.domain.is_enabled() {
            return;
        }

        let mut data = sanitize_fields(fields);
        let msg = match data.remove("msg") {
            Some(Value::String(s)) => s,
            Some(other) => other.to_string(),
            None => String::new(),
        };
        let code = data
            .remove("code")
            .and_then(|v| v.as_u64())
            .map(|c| c as u32);
        let cause = data.remove("cause").map(|v| match v {
            Value::String(s) => s,
            other => other.to_string(),
        });
        let fatal = data
            .remove("fatal")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        let record = Record {
            ts: ts_now(),
            seq: next_seq(),
            lvl: level,
            component: self.domain.as_str(),
            event: event.to_string(),
            msg,
            code,
            cause,
            fatal,
            data,
        };
        self.sink.write(&record);
    }

    pub fn trace(&self, event: &str, fields: Map<String, Value>) {
        self.log(Level::Trace, event, fields);
    }

    pub fn debug(&self, event: &str, fields: Map<String, Value>) {
        self.log(Level::Debug, event, fields);
    }

    pub fn info(&self, event: &str, fields: Map<String, Value>) {
        self.log(Level::Info, event, fields);
    }

    pub fn warn(&self, event: &str, fields: Map<String, Value>) {
        self.log(Level::Warn, event, fields);
    }

    pub fn error(&self, event: &str, fields: Map<String, Value>) {
        self.log(Level::Error, event, fields);
    }

    /// Error record carrying the full cause chain of `err`.
    pub fn error_with_cause(&self, event: &str, err: &anyhow::Error, code: u32, fatal: bool) {
        let level = if fatal { Level::Fatal } else { Level::Error };
        self.log(
            level,
            event,
            obj(&[
                ("msg", v_str(&err.to_string())),
                ("cause", v_str(&format!("{:#}", err))),
                ("code", json!(code)),
                ("fatal", Value::Bool(fatal)),
            ]),
        );
    }

    /// Human-readable rendering of a protocol element.
    pub fn parse(&self, element: &Element) {
        self.domain(Domain::Protocol).log(
            Level::Info,
            "message",
            obj(&[
                ("msg", v_str(&element.to_string())),
                ("tag", v_str(element.tag())),
            ]),
        );
    }
}

// =============================================================================
// Utility Functions
// =============================================================================

/// RFC3339 timestamp with milliseconds
pub fn ts_now() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

pub fn obj(pairs: &[(&str, Value)]) -> Map<String, Value> {
    let mut map = Map::new();
    for (k, v) in pairs {
        map.insert((*k).to_string(), v.clone());
    }
    map
}

pub fn v_str(s: &str) -> Value {
    Value::String(s.to_string())
}

pub fn v_num(n: f64) -> Value {
    json!(n)
}

// =============================================================================
// Tests
// =============================================================================
