//! Task store contract consumed by the prompting engine.
//!
//! The engine only reads tasks. [`MemoryTaskStore`] additionally offers the
//! handful of mutations the host bridge and tests need.

use crate::error::{NudgeError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Captured but not being worked on.
    Todo,
    /// In progress; the only status eligible for prompting.
    Active,
    /// Done.
    Completed,
}

impl TaskStatus {
    /// Wire name of the status.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::Active => "active",
            Self::Completed => "completed",
        }
    }

    /// Parse a wire name.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "todo" => Some(Self::Todo),
            "active" => Some(Self::Active),
            "completed" | "done" => Some(Self::Completed),
            _ => None,
        }
    }
}

/// A single task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Unique task identifier.
    pub id: String,
    /// User-facing description.
    pub text: String,
    /// Current status.
    pub status: TaskStatus,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// Read-only view of tasks used by the scheduler.
pub trait TaskStore: Send + Sync {
    /// All tasks, optionally restricted to one status.
    fn all_tasks(&self, status: Option<TaskStatus>) -> Result<Vec<Task>>;

    /// Look up a task by id.
    fn task_by_id(&self, id: &str) -> Result<Option<Task>>;

    /// Number of tasks currently [`TaskStatus::Active`].
    fn active_task_count(&self) -> Result<usize> {
        Ok(self.all_tasks(Some(TaskStatus::Active))?.len())
    }
}

/// Process-local task store.
#[derive(Debug, Default)]
pub struct MemoryTaskStore {
    tasks: Mutex<Vec<Task>>,
}

impl MemoryTaskStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a task with a fresh id.
    pub fn add(&self, text: impl Into<String>, status: TaskStatus) -> Task {
        let task = Task {
            id: uuid::Uuid::new_v4().to_string(),
            text: text.into(),
            status,
            created_at: Utc::now(),
        };
        self.insert(task.clone());
        task
    }

    /// Insert (or replace) a task with a caller-chosen id.
    pub fn insert(&self, task: Task) {
        let mut tasks = self.lock();
        if let Some(existing) = tasks.iter_mut().find(|t| t.id == task.id) {
            *existing = task;
        } else {
            tasks.push(task);
        }
    }

    /// Change a task's status.
    pub fn set_status(&self, id: &str, status: TaskStatus) -> Result<Task> {
        let mut tasks = self.lock();
        let task = tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| NudgeError::TaskNotFound(id.to_owned()))?;
        task.status = status;
        Ok(task.clone())
    }

    /// Remove a task.
    pub fn remove(&self, id: &str) -> Result<Task> {
        let mut tasks = self.lock();
        let idx = tasks
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| NudgeError::TaskNotFound(id.to_owned()))?;
        Ok(tasks.remove(idx))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Task>> {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl TaskStore for MemoryTaskStore {
    fn all_tasks(&self, status: Option<TaskStatus>) -> Result<Vec<Task>> {
        Ok(self
            .lock()
            .iter()
            .filter(|t| status.is_none_or(|s| t.status == s))
            .cloned()
            .collect())
    }

    fn task_by_id(&self, id: &str) -> Result<Option<Task>> {
        Ok(self.lock().iter().find(|t| t.id == id).cloned())
    }
}
