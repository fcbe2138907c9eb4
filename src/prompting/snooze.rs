//! Per-task snooze timers, independent of the cadence.

use crate::error::{NudgeError, Result};
use crate::prompting::timers::{TimerId, TimerKind, TimerQueue};
use crate::tasks::{Task, TaskStatus, TaskStore};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tracing::{debug, info};

/// At most one snooze timer per task; the latest request wins.
#[derive(Debug)]
pub struct SnoozeManager {
    delay: Duration,
    timers_by_task: HashMap<String, TimerId>,
}

impl SnoozeManager {
    /// Manager re-prompting `delay` after each snooze.
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            timers_by_task: HashMap::new(),
        }
    }

    /// Defer `task_id` by the snooze delay, replacing any earlier snooze.
    ///
    /// Returns when the snooze fires, or [`NudgeError::TaskNotFound`].
    pub fn snooze(
        &mut self,
        task_id: &str,
        store: &dyn TaskStore,
        now: DateTime<Utc>,
        timers: &mut TimerQueue<TimerKind>,
    ) -> Result<DateTime<Utc>> {
        if store.task_by_id(task_id)?.is_none() {
            return Err(NudgeError::TaskNotFound(task_id.to_owned()));
        }

        let replaced = self.cancel(task_id, timers);
        let fire_at = now + self.delay;
        let timer = timers.arm(fire_at, TimerKind::Snooze(task_id.to_owned()));
        self.timers_by_task.insert(task_id.to_owned(), timer);

        info!(task_id = %task_id, replaced, fire_at = %fire_at, "task snoozed");
        Ok(fire_at)
    }

    /// Cancel the snooze for `task_id`. Returns `true` if one was armed.
    pub fn cancel(&mut self, task_id: &str, timers: &mut TimerQueue<TimerKind>) -> bool {
        match self.timers_by_task.remove(task_id) {
            Some(timer) => {
                timers.cancel(timer);
                true
            }
            None => false,
        }
    }

    /// Handle a fired snooze timer.
    ///
    /// Returns the task only if it still exists and is still active; a task
    /// completed or deleted while snoozed is silently dropped here.
    pub fn fire(
        &mut self,
        task_id: &str,
        timer: TimerId,
        store: &dyn TaskStore,
    ) -> Result<Option<Task>> {
        if self.timers_by_task.get(task_id) == Some(&timer) {
            self.timers_by_task.remove(task_id);
        }

        match store.task_by_id(task_id)? {
            Some(task) if task.status == TaskStatus::Active => Ok(Some(task)),
            Some(_) => {
                debug!(task_id = %task_id, "snoozed task no longer active; dropping");
                Ok(None)
            }
            None => {
                debug!(task_id = %task_id, "snoozed task no longer exists; dropping");
                Ok(None)
            }
        }
    }

    /// When the snooze for `task_id` fires, if one is armed.
    #[must_use]
    pub fn snoozed_until(
        &self,
        task_id: &str,
        timers: &TimerQueue<TimerKind>,
    ) -> Option<DateTime<Utc>> {
        let timer = self.timers_by_task.get(task_id)?;
        timers.deadline(*timer)
    }

    /// Number of armed snoozes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.timers_by_task.len()
    }

    /// Whether no snoozes are armed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.timers_by_task.is_empty()
    }

    /// Cancel every snooze.
    pub fn clear(&mut self, timers: &mut TimerQueue<TimerKind>) {
        for (_, timer) in self.timers_by_task.drain() {
            timers.cancel(timer);
        }
    }
}
