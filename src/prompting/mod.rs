//! Proactive prompting engine.
//!
//! Suggests one active task at a jittered cadence, tracks each prompt until
//! the user answers or the response window closes, and keeps recently
//! prompted tasks out of rotation for a day.

pub mod controller;
pub mod cooldown;
pub mod lifecycle;
pub mod selector;
pub mod service;
pub mod snooze;
pub mod timers;

pub use controller::{PromptScheduler, SchedulerStatus, SkipReason, TickOutcome};
pub use cooldown::CooldownTracker;
pub use lifecycle::{PromptTracker, ProactivePrompt};
pub use selector::{Selection, SelectionStrategy, Selector, UniformSelection};
pub use service::{SchedulerHandle, SchedulerService};
pub use snooze::SnoozeManager;
pub use timers::{Fired, TimerId, TimerKind, TimerQueue};
