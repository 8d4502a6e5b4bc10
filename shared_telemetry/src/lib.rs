#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Structured JSON telemetry shared across AURA crates: append-only
//! diagnostic logging, per-utterance trace records, and persisted
//! session counters.

use std::{
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::Result;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Log severity level.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    /// Debug information.
    Debug,
    /// Informational events.
    Info,
    /// Warning indicator.
    Warn,
    /// Error indicator.
    Error,
}

/// Structured diagnostic log record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    /// Timestamp in ISO8601.
    pub timestamp: DateTime<Utc>,
    /// Module emitting the log.
    pub module: String,
    /// Severity.
    pub level: LogLevel,
    /// Human-readable message.
    pub message: String,
    /// Arbitrary JSON payload for metrics/fields.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl LogRecord {
    /// Creates a record with the provided info.
    #[must_use]
    pub fn new(module: impl Into<String>, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            module: module.into(),
            level,
            message: message.into(),
            metadata: serde_json::Map::new(),
        }
    }

    /// Attaches a JSON metadata object.
    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        if let serde_json::Value::Object(map) = metadata {
            self.metadata = map;
        }
        self
    }
}

/// One persisted line per processed utterance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UtteranceTrace {
    /// Monotonically increasing utterance id.
    pub id: u64,
    /// Raw utterance text.
    pub utterance: String,
    /// Layer that produced the result.
    pub layer: String,
    /// Tool invoked, when one was.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    /// Whether the utterance succeeded.
    pub ok: bool,
    /// End-to-end latency in milliseconds.
    pub elapsed_ms: u64,
    /// Short error cause when `ok` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Thread-safe JSON-lines writer with append-only semantics.
#[derive(Debug)]
pub struct JsonLogger {
    path: PathBuf,
    writer: Mutex<File>,
}

impl JsonLogger {
    /// Creates or opens a logger at the desired path.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        Ok(Self {
            path,
            writer: Mutex::new(file),
        })
    }

    /// Writes a diagnostic record as one JSON line.
    pub fn log(&self, record: &LogRecord) -> Result<()> {
        self.append(record)
    }

    /// Writes an utterance trace as one JSON line.
    pub fn trace(&self, trace: &UtteranceTrace) -> Result<()> {
        self.append(trace)
    }

    /// Returns the underlying file path (useful for tests).
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append<T: Serialize>(&self, value: &T) -> Result<()> {
        let mut writer = self.writer.lock();
        serde_json::to_writer(&mut *writer, value)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }
}

/// Running counters for one assistant process.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionStats {
    /// Commands resolved without any LLM call.
    pub local_commands: u64,
    /// Commands that required at least one LLM call.
    pub llm_commands: u64,
    /// Rough estimate of tokens avoided by local routing.
    pub tokens_saved_estimate: u64,
    /// Utterances handled by the reflex layer.
    pub layer1_local: u64,
    /// Utterances handled by single-shot code generation.
    pub layer1_codegen: u64,
    /// Utterances handled by the agentic planner.
    pub layer2_agentic: u64,
    /// Recoveries performed by the self-healing loop.
    pub layer3_healing: u64,
    /// Conversational replies with no execution.
    pub conversations: u64,
    /// Capabilities promoted into the local router.
    pub skills_promoted: u64,
}

/// Average token cost of one locally short-circuited command.
const TOKENS_PER_LOCAL_COMMAND: u64 = 500;

impl SessionStats {
    /// Records a command that never left the local router.
    pub fn record_local(&mut self) {
        self.local_commands += 1;
        self.layer1_local += 1;
        self.tokens_saved_estimate += TOKENS_PER_LOCAL_COMMAND;
    }

    /// Records a command that consumed LLM tokens.
    pub fn record_llm(&mut self) {
        self.llm_commands += 1;
    }

    /// Loads counters from a JSON file, defaulting when absent.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Persists counters as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn writes_json_lines() {
        let dir = tempdir().unwrap();
        let logger = JsonLogger::new(dir.path().join("aura.log")).unwrap();
        logger
            .log(&LogRecord::new("router", LogLevel::Info, "classified"))
            .unwrap();
        let content = fs::read_to_string(logger.path()).unwrap();
        assert!(content.contains("\"message\":\"classified\""));
    }

    #[test]
    fn traces_round_trip() {
        let dir = tempdir().unwrap();
        let logger = JsonLogger::new(dir.path().join("trace.jsonl")).unwrap();
        let trace = UtteranceTrace {
            id: 7,
            utterance: "set volume to 50".into(),
            layer: "local".into(),
            tool: Some("set_volume".into()),
            ok: true,
            elapsed_ms: 12,
            error: None,
        };
        logger.trace(&trace).unwrap();
        let line = fs::read_to_string(logger.path()).unwrap();
        let parsed: UtteranceTrace = serde_json::from_str(line.trim()).unwrap();
        assert_eq!(parsed, trace);
    }

    #[test]
    fn stats_persist_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stats.json");
        let mut stats = SessionStats::default();
        stats.record_local();
        stats.record_llm();
        stats.save(&path).unwrap();
        let reloaded = SessionStats::load(&path).unwrap();
        assert_eq!(reloaded, stats);
        assert_eq!(reloaded.tokens_saved_estimate, TOKENS_PER_LOCAL_COMMAND);
    }
}
