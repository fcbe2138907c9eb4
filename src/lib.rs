//! Nudge: proactive prompting for a single-user task tracker.
//!
//! Periodically suggests one active task to the user and records how the
//! user responds.
//!
//! # Architecture
//!
//! The engine is a single-owner state machine driven by one deadline-ordered
//! timer queue:
//! - **Selector**: picks an eligible active task, honouring the 24h cooldown
//! - **Prompt tracker**: pending prompts with a bounded response window
//! - **Snooze manager**: per-task one-hour deferrals, last snooze wins
//! - **Cooldown tracker**: recently prompted tasks, swept hourly
//! - **Scheduler**: jittered cadence, minimum-interval guard, start/stop
//!
//! [`prompting::SchedulerService`] wraps the engine in a tokio actor so
//! inbound commands and timer firings are serialized.

pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod host;
pub mod paths;
pub mod prompting;
pub mod tasks;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::{ConfigStore, FileConfigStore, MemoryConfigStore, PromptTimings, PromptingConfig};
pub use error::{NudgeError, Result};
pub use events::{EventLog, JsonEventLog, MemoryEventLog, PromptRecord, PromptResponse, UserResponse};
pub use prompting::{
    PromptScheduler, ProactivePrompt, SchedulerHandle, SchedulerService, SchedulerStatus,
    TickOutcome,
};
pub use tasks::{MemoryTaskStore, Task, TaskStatus, TaskStore};
