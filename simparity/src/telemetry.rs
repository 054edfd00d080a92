//! telemetry.rs
//!
//! Lightweight JSONL event sink for harness runs.
//!
//! One JSON object per event (variant started / completed / failed, one
//! per artifact verdict, final report) so CI can archive a machine-readable
//! trace next to the console report.
//!
//! # Environment variables
//!
//! - `SIMPARITY_TELEMETRY_PATH`: JSONL file path. Setting it enables the sink.
//! - `SIMPARITY_TELEMETRY_MODE`: `"off"` forces the sink off even when a path
//!   is set; `"jsonl"` without a path warns and stays off.
//! - `SIMPARITY_TELEMETRY_APPEND`: `"1"`/`"true"`/`"yes"` appends instead of
//!   truncating.
//!
//! Every record carries `schema_version` and `event`.

use std::env;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use serde_json::{Map, Value as JsonValue};

/// Current telemetry schema version.
pub const SCHEMA_VERSION: i64 = 1;

/// Telemetry mode, controlled by SIMPARITY_TELEMETRY_MODE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelemetryMode {
    Off,
    Jsonl,
}

impl TelemetryMode {
    /// Parse a mode name. Unknown values are Off.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "jsonl" => TelemetryMode::Jsonl,
            _ => TelemetryMode::Off,
        }
    }
}

/// Configuration for the telemetry sink.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub mode: TelemetryMode,
    pub path: Option<PathBuf>,
    pub append: bool,
}

impl TelemetryConfig {
    /// Telemetry disabled.
    pub fn off() -> Self {
        Self {
            mode: TelemetryMode::Off,
            path: None,
            append: false,
        }
    }

    /// JSONL telemetry to `path`, truncating.
    pub fn jsonl(path: impl Into<PathBuf>) -> Self {
        Self {
            mode: TelemetryMode::Jsonl,
            path: Some(path.into()),
            append: false,
        }
    }

    /// Construct from environment variables.
    pub fn from_env() -> Self {
        let path = env::var("SIMPARITY_TELEMETRY_PATH")
            .ok()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);

        let mode = match env::var("SIMPARITY_TELEMETRY_MODE") {
            Ok(s) => TelemetryMode::parse(&s),
            Err(_) if path.is_some() => TelemetryMode::Jsonl,
            Err(_) => TelemetryMode::Off,
        };

        let append = env::var("SIMPARITY_TELEMETRY_APPEND")
            .ok()
            .map(|value| matches!(value.to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        TelemetryConfig { mode, path, append }
    }
}

/// A JSONL telemetry sink.
///
/// When mode == Off, all methods are no-ops. The file is opened lazily on the
/// first event; open or write errors disable the sink for the rest of the
/// process instead of failing the comparison.
#[derive(Debug)]
pub struct TelemetrySink {
    mode: TelemetryMode,
    path: Option<PathBuf>,
    append: bool,
    writer: Option<BufWriter<File>>,
}

impl Default for TelemetrySink {
    fn default() -> Self {
        Self::from_config(TelemetryConfig::off())
    }
}

impl TelemetrySink {
    /// Construct a sink from environment configuration.
    pub fn from_env() -> Self {
        Self::from_config(TelemetryConfig::from_env())
    }

    pub fn from_config(cfg: TelemetryConfig) -> Self {
        TelemetrySink {
            mode: cfg.mode,
            path: cfg.path,
            append: cfg.append,
            writer: None,
        }
    }

    fn ensure_writer(&mut self) -> Option<&mut BufWriter<File>> {
        if self.mode != TelemetryMode::Jsonl {
            return None;
        }

        if self.writer.is_none() {
            let path = match &self.path {
                Some(p) => p.clone(),
                None => {
                    tracing::warn!("SIMPARITY_TELEMETRY_MODE=jsonl without SIMPARITY_TELEMETRY_PATH; telemetry off");
                    self.mode = TelemetryMode::Off;
                    return None;
                }
            };

            if let Some(parent) = path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }

            let mut options = OpenOptions::new();
            options.create(true).write(true);
            if self.append {
                options.append(true);
            } else {
                options.truncate(true);
            }

            match options.open(&path) {
                Ok(file) => self.writer = Some(BufWriter::new(file)),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "cannot open telemetry file; telemetry off");
                    self.mode = TelemetryMode::Off;
                    return None;
                }
            }
        }

        self.writer.as_mut()
    }

    /// Log a JSON value as a single line.
    pub fn log_json(&mut self, value: &JsonValue) {
        if self.mode != TelemetryMode::Jsonl {
            return;
        }

        let writer = match self.ensure_writer() {
            Some(w) => w,
            None => return,
        };

        let line = match serde_json::to_string(value) {
            Ok(s) => s,
            Err(_) => return,
        };

        if writeln!(writer, "{}", line).is_err() {
            self.mode = TelemetryMode::Off;
            self.writer = None;
        }
    }

    /// Log a named event with extra fields merged in.
    ///
    /// `fields` should be a JSON object; anything else is stored under
    /// `"data"`.
    pub fn event(&mut self, name: &str, fields: JsonValue) {
        if self.mode != TelemetryMode::Jsonl {
            return;
        }

        let mut record = Map::new();
        record.insert("schema_version".to_string(), SCHEMA_VERSION.into());
        record.insert("event".to_string(), name.into());
        match fields {
            JsonValue::Object(map) => record.extend(map),
            JsonValue::Null => {}
            other => {
                record.insert("data".to_string(), other);
            }
        }
        self.log_json(&JsonValue::Object(record));
    }

    /// Flush the underlying writer, if any.
    pub fn flush(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            let _ = writer.flush();
        }
    }
}

impl Drop for TelemetrySink {
    fn drop(&mut self) {
        self.flush();
    }
}
