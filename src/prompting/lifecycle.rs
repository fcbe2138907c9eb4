//! Pending prompt lifecycle: open, answer, or time out.
//!
//! A prompt resolves exactly once. A user response disarms the timeout
//! before touching the record, and a fired timeout only acts if the entry is
//! still pending, so whichever happens first wins and the other is a no-op.

use crate::error::Result;
use crate::events::{EventLog, PromptId, PromptRecord, UserResponse};
use crate::prompting::timers::{TimerId, TimerKind, TimerQueue};
use crate::tasks::Task;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Prompt emitted to the notification sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProactivePrompt {
    /// Identifier the client echoes back when responding.
    pub prompt_id: PromptId,
    pub task_id: String,
    pub task_text: String,
    pub prompted_at: DateTime<Utc>,
}

#[derive(Debug)]
struct PendingEntry {
    record: PromptRecord,
    timeout: TimerId,
}

/// Owns every prompt between emission and resolution.
pub struct PromptTracker {
    pending: HashMap<PromptId, PendingEntry>,
    event_log: Arc<dyn EventLog>,
    response_timeout: Duration,
}

impl PromptTracker {
    /// Tracker persisting resolutions to `event_log`.
    #[must_use]
    pub fn new(event_log: Arc<dyn EventLog>, response_timeout: Duration) -> Self {
        Self {
            pending: HashMap::new(),
            event_log,
            response_timeout,
        }
    }

    /// Open a prompt for `task`: fresh id, timeout armed, record pending.
    pub fn open(
        &mut self,
        task: &Task,
        now: DateTime<Utc>,
        timers: &mut TimerQueue<TimerKind>,
    ) -> ProactivePrompt {
        let prompt_id = uuid::Uuid::new_v4();
        let record = PromptRecord::new(prompt_id, task.id.clone(), now);
        let timeout = timers.arm(
            now + self.response_timeout,
            TimerKind::PromptTimeout(prompt_id),
        );
        self.pending.insert(prompt_id, PendingEntry { record, timeout });

        debug!(prompt_id = %prompt_id, task_id = %task.id, "prompt opened");
        ProactivePrompt {
            prompt_id,
            task_id: task.id.clone(),
            task_text: task.text.clone(),
            prompted_at: now,
        }
    }

    /// Resolve a pending prompt with the user's answer.
    ///
    /// Unknown ids (already timed out, or answered twice) return `Ok(None)`.
    /// Persistence failures are returned to the caller.
    pub fn record_response(
        &mut self,
        prompt_id: PromptId,
        response: UserResponse,
        now: DateTime<Utc>,
        timers: &mut TimerQueue<TimerKind>,
    ) -> Result<Option<PromptRecord>> {
        let Some(entry) = self.pending.remove(&prompt_id) else {
            info!(prompt_id = %prompt_id, "response for unknown or expired prompt ignored");
            return Ok(None);
        };
        timers.cancel(entry.timeout);

        let mut record = entry.record;
        record.response = response.into();
        record.responded_at = Some(now);

        self.event_log.append(&record)?;
        info!(
            prompt_id = %prompt_id,
            task_id = %record.task_id,
            response = record.response.as_str(),
            "prompt answered"
        );
        Ok(Some(record))
    }

    /// Resolve a pending prompt as timed out. Called when its timer fires.
    ///
    /// Inside a tokio runtime the record is written on the blocking pool so
    /// the timer loop never waits on the log; outside one it is written
    /// inline. Persistence failures are logged and swallowed.
    pub fn record_timeout(&mut self, prompt_id: PromptId) -> Option<PromptRecord> {
        let entry = self.pending.remove(&prompt_id)?;
        let record = entry.record;

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let event_log = Arc::clone(&self.event_log);
                let pending = record.clone();
                runtime.spawn_blocking(move || persist_timeout(event_log.as_ref(), &pending));
            }
            Err(_) => persist_timeout(self.event_log.as_ref(), &record),
        }
        Some(record)
    }

    /// Whether `prompt_id` is still awaiting resolution.
    #[must_use]
    pub fn is_pending(&self, prompt_id: PromptId) -> bool {
        self.pending.contains_key(&prompt_id)
    }

    /// The in-flight record for `prompt_id`.
    #[must_use]
    pub fn pending_record(&self, prompt_id: PromptId) -> Option<&PromptRecord> {
        self.pending.get(&prompt_id).map(|entry| &entry.record)
    }

    /// When the response window of `prompt_id` closes.
    #[must_use]
    pub fn timeout_at(&self, prompt_id: PromptId, timers: &TimerQueue<TimerKind>) -> Option<DateTime<Utc>> {
        let entry = self.pending.get(&prompt_id)?;
        timers.deadline(entry.timeout)
    }

    /// Number of pending prompts.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Drop every pending prompt without persisting. Returns how many were dropped.
    pub fn clear(&mut self, timers: &mut TimerQueue<TimerKind>) -> usize {
        let dropped = self.pending.len();
        for (_, entry) in self.pending.drain() {
            timers.cancel(entry.timeout);
        }
        dropped
    }
}

fn persist_timeout(event_log: &dyn EventLog, record: &PromptRecord) {
    match event_log.append(record) {
        Ok(()) => info!(prompt_id = %record.prompt_id, task_id = %record.task_id, "prompt timed out"),
        Err(e) => warn!(prompt_id = %record.prompt_id, "cannot persist prompt timeout: {e}"),
    }
}
