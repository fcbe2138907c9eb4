//! Versioned command/event envelopes for the host bridge.

use serde::{Deserialize, Serialize};

/// Contract version for host command/event envelopes.
pub const EVENT_VERSION: u32 = 1;

/// Event name for prompts forwarded from the engine.
pub const PROMPT_EVENT: &str = "prompt.emitted";

/// Command set understood by the host bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandName {
    #[serde(rename = "host.ping")]
    HostPing,
    #[serde(rename = "scheduler.start")]
    SchedulerStart,
    #[serde(rename = "scheduler.stop")]
    SchedulerStop,
    #[serde(rename = "scheduler.reconfigure")]
    SchedulerReconfigure,
    #[serde(rename = "scheduler.status")]
    SchedulerStatus,
    #[serde(rename = "scheduler.next_prompt_time")]
    SchedulerNextPromptTime,
    #[serde(rename = "prompt.trigger_now")]
    PromptTriggerNow,
    #[serde(rename = "prompt.respond")]
    PromptRespond,
    #[serde(rename = "prompt.stats")]
    PromptStats,
    #[serde(rename = "task.add")]
    TaskAdd,
    #[serde(rename = "task.list")]
    TaskList,
    #[serde(rename = "task.complete")]
    TaskComplete,
    #[serde(rename = "task.delete")]
    TaskDelete,
    #[serde(rename = "snooze.set")]
    SnoozeSet,
    #[serde(rename = "snooze.cancel")]
    SnoozeCancel,
}

impl CommandName {
    /// Render command name to wire format.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HostPing => "host.ping",
            Self::SchedulerStart => "scheduler.start",
            Self::SchedulerStop => "scheduler.stop",
            Self::SchedulerReconfigure => "scheduler.reconfigure",
            Self::SchedulerStatus => "scheduler.status",
            Self::SchedulerNextPromptTime => "scheduler.next_prompt_time",
            Self::PromptTriggerNow => "prompt.trigger_now",
            Self::PromptRespond => "prompt.respond",
            Self::PromptStats => "prompt.stats",
            Self::TaskAdd => "task.add",
            Self::TaskList => "task.list",
            Self::TaskComplete => "task.complete",
            Self::TaskDelete => "task.delete",
            Self::SnoozeSet => "snooze.set",
            Self::SnoozeCancel => "snooze.cancel",
        }
    }

    /// Parse a command name from wire format.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "host.ping" => Some(Self::HostPing),
            "scheduler.start" => Some(Self::SchedulerStart),
            "scheduler.stop" => Some(Self::SchedulerStop),
            "scheduler.reconfigure" => Some(Self::SchedulerReconfigure),
            "scheduler.status" => Some(Self::SchedulerStatus),
            "scheduler.next_prompt_time" => Some(Self::SchedulerNextPromptTime),
            "prompt.trigger_now" => Some(Self::PromptTriggerNow),
            "prompt.respond" => Some(Self::PromptRespond),
            "prompt.stats" => Some(Self::PromptStats),
            "task.add" => Some(Self::TaskAdd),
            "task.list" => Some(Self::TaskList),
            "task.complete" => Some(Self::TaskComplete),
            "task.delete" => Some(Self::TaskDelete),
            "snooze.set" => Some(Self::SnoozeSet),
            "snooze.cancel" => Some(Self::SnoozeCancel),
            _ => None,
        }
    }
}

/// A versioned response envelope from bridge to frontend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub v: u32,
    pub request_id: String,
    pub ok: bool,
    pub payload: serde_json::Value,
    pub error: Option<String>,
}

impl ResponseEnvelope {
    /// Build a successful response envelope.
    #[must_use]
    pub fn ok(request_id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            v: EVENT_VERSION,
            request_id: request_id.into(),
            ok: true,
            payload,
            error: None,
        }
    }

    /// Build an error response envelope.
    #[must_use]
    pub fn error(request_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            v: EVENT_VERSION,
            request_id: request_id.into(),
            ok: false,
            payload: serde_json::Value::Null,
            error: Some(message.into()),
        }
    }
}

/// A versioned command envelope from frontend to bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub v: u32,
    pub request_id: String,
    pub command: CommandName,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl CommandEnvelope {
    /// Build a v1 command envelope.
    #[must_use]
    pub fn new(
        request_id: impl Into<String>,
        command: CommandName,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            v: EVENT_VERSION,
            request_id: request_id.into(),
            command,
            payload,
        }
    }

    /// Validate envelope version and required identifiers.
    pub fn validate(&self) -> Result<(), ContractError> {
        if self.v != EVENT_VERSION {
            return Err(ContractError::new(
                ContractErrorKind::UnsupportedVersion,
                format!(
                    "unsupported contract version {}; expected {}",
                    self.v, EVENT_VERSION
                ),
            ));
        }
        if self.request_id.trim().is_empty() {
            return Err(ContractError::new(
                ContractErrorKind::InvalidEnvelope,
                "request_id cannot be empty".to_owned(),
            ));
        }
        Ok(())
    }
}

/// A versioned event envelope from bridge to frontend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub v: u32,
    pub event_id: String,
    pub event: String,
    pub payload: serde_json::Value,
}

impl EventEnvelope {
    /// Build a v1 event envelope with a fresh id.
    #[must_use]
    pub fn new(event: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            v: EVENT_VERSION,
            event_id: uuid::Uuid::new_v4().to_string(),
            event: event.into(),
            payload,
        }
    }
}

/// Contract validation error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractErrorKind {
    UnsupportedVersion,
    InvalidEnvelope,
}

/// Contract validation error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind:?}: {message}")]
pub struct ContractError {
    pub kind: ContractErrorKind,
    pub message: String,
}

impl ContractError {
    #[must_use]
    pub fn new(kind: ContractErrorKind, message: String) -> Self {
        Self { kind, message }
    }
}
