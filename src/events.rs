//! Prompt response records and the append-only event log.
//!
//! Each prompt is persisted exactly once, when it resolves. The file-backed
//! log replaces its JSON document atomically on every save.

use crate::error::{NudgeError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Default number of records kept by [`JsonEventLog`].
pub const DEFAULT_MAX_EVENTS: usize = 10_000;

/// Opaque prompt identifier.
pub type PromptId = uuid::Uuid;

/// Terminal outcome of a prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptResponse {
    /// User marked the task complete.
    Complete,
    /// User dismissed the prompt.
    Dismiss,
    /// User asked to be reminded later.
    Snooze,
    /// No response inside the response window.
    Timeout,
}

impl PromptResponse {
    /// Wire name of the response.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::Dismiss => "dismiss",
            Self::Snooze => "snooze",
            Self::Timeout => "timeout",
        }
    }
}

/// Responses a user can give. Timeouts are only ever produced by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserResponse {
    Complete,
    Dismiss,
    Snooze,
}

impl UserResponse {
    /// Parse a wire name.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "complete" => Some(Self::Complete),
            "dismiss" => Some(Self::Dismiss),
            "snooze" => Some(Self::Snooze),
            _ => None,
        }
    }
}

impl From<UserResponse> for PromptResponse {
    fn from(response: UserResponse) -> Self {
        match response {
            UserResponse::Complete => Self::Complete,
            UserResponse::Dismiss => Self::Dismiss,
            UserResponse::Snooze => Self::Snooze,
        }
    }
}

/// One prompt and how it resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptRecord {
    pub prompt_id: PromptId,
    pub task_id: String,
    pub prompted_at: DateTime<Utc>,
    pub response: PromptResponse,
    pub responded_at: Option<DateTime<Utc>>,
}

impl PromptRecord {
    /// A fresh record whose default outcome is a timeout.
    #[must_use]
    pub fn new(prompt_id: PromptId, task_id: impl Into<String>, prompted_at: DateTime<Utc>) -> Self {
        Self {
            prompt_id,
            task_id: task_id.into(),
            prompted_at,
            response: PromptResponse::Timeout,
            responded_at: None,
        }
    }
}

/// Persistence contract for resolved prompt records.
pub trait EventLog: Send + Sync {
    /// Load every persisted record, oldest first.
    fn load_prompt_events(&self) -> Result<Vec<PromptRecord>>;

    /// Replace the persisted records, all-or-nothing.
    fn save_prompt_events(&self, records: &[PromptRecord]) -> Result<()>;

    /// Append one record.
    fn append(&self, record: &PromptRecord) -> Result<()> {
        let mut records = self.load_prompt_events()?;
        records.push(record.clone());
        self.save_prompt_events(&records)
    }
}

/// JSON file-backed event log.
#[derive(Debug)]
pub struct JsonEventLog {
    path: PathBuf,
    max_events: usize,
    write_lock: Mutex<()>,
}

impl JsonEventLog {
    /// Log backed by the file at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_events: DEFAULT_MAX_EVENTS,
            write_lock: Mutex::new(()),
        }
    }

    /// Log backed by the default data path.
    #[must_use]
    pub fn at_default_path() -> Self {
        Self::new(crate::paths::prompt_events_file())
    }

    /// Override how many of the newest records are retained.
    #[must_use]
    pub fn with_max_events(mut self, max_events: usize) -> Self {
        self.max_events = max_events.max(1);
        self
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_records(&self) -> Result<Vec<PromptRecord>> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(NudgeError::EventLog(format!("cannot read events: {e}")));
            }
        };
        serde_json::from_slice(&bytes)
            .map_err(|e| NudgeError::EventLog(format!("cannot parse events: {e}")))
    }

    fn write_records(&self, records: &[PromptRecord]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| NudgeError::EventLog(format!("cannot create events dir: {e}")))?;
        }

        let start = records.len().saturating_sub(self.max_events);
        let json = serde_json::to_string_pretty(&records[start..])
            .map_err(|e| NudgeError::EventLog(format!("cannot serialize events: {e}")))?;

        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, json)
            .map_err(|e| NudgeError::EventLog(format!("cannot write events tmp: {e}")))?;
        std::fs::rename(&tmp_path, &self.path)
            .map_err(|e| NudgeError::EventLog(format!("cannot rename events: {e}")))?;
        Ok(())
    }
}

impl EventLog for JsonEventLog {
    fn load_prompt_events(&self) -> Result<Vec<PromptRecord>> {
        self.read_records()
    }

    fn save_prompt_events(&self, records: &[PromptRecord]) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        self.write_records(records)
    }

    fn append(&self, record: &PromptRecord) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut records = self.read_records()?;
        records.push(record.clone());
        self.write_records(&records)
    }
}

/// Process-local event log.
#[derive(Debug, Default)]
pub struct MemoryEventLog {
    records: Mutex<Vec<PromptRecord>>,
}

impl MemoryEventLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the stored records.
    #[must_use]
    pub fn records(&self) -> Vec<PromptRecord> {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl EventLog for MemoryEventLog {
    fn load_prompt_events(&self) -> Result<Vec<PromptRecord>> {
        Ok(self.records())
    }

    fn save_prompt_events(&self, records: &[PromptRecord]) -> Result<()> {
        *self.records.lock().unwrap_or_else(|e| e.into_inner()) = records.to_vec();
        Ok(())
    }

    fn append(&self, record: &PromptRecord) -> Result<()> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(record.clone());
        Ok(())
    }
}

/// Aggregate view of resolved prompts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptStats {
    pub total: usize,
    pub completed: usize,
    pub dismissed: usize,
    pub snoozed: usize,
    pub timed_out: usize,
    /// Share of prompts the user answered at all, 0.0 to 1.0.
    pub response_rate: f64,
    /// Mean seconds from prompt to answer, over answered prompts.
    pub mean_response_secs: Option<f64>,
}

impl PromptStats {
    /// Summarize a set of records.
    #[must_use]
    pub fn from_records(records: &[PromptRecord]) -> Self {
        let mut stats = Self {
            total: records.len(),
            ..Self::default()
        };
        let mut latency_total = 0.0;
        let mut latency_count = 0usize;

        for record in records {
            match record.response {
                PromptResponse::Complete => stats.completed += 1,
                PromptResponse::Dismiss => stats.dismissed += 1,
                PromptResponse::Snooze => stats.snoozed += 1,
                PromptResponse::Timeout => stats.timed_out += 1,
            }
            if let Some(responded_at) = record.responded_at {
                let millis = (responded_at - record.prompted_at).num_milliseconds().max(0);
                latency_total += millis as f64 / 1000.0;
                latency_count += 1;
            }
        }

        if stats.total > 0 {
            let answered = stats.total - stats.timed_out;
            stats.response_rate = answered as f64 / stats.total as f64;
        }
        if latency_count > 0 {
            stats.mean_response_secs = Some(latency_total / latency_count as f64);
        }
        stats
    }
}
