//! Task selection for cadence and manual prompts.

use crate::error::Result;
use crate::prompting::cooldown::CooldownTracker;
use crate::tasks::{Task, TaskStatus, TaskStore};
use chrono::{DateTime, Utc};
use rand::{Rng, RngCore};

/// Result of a selection attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// An eligible task was chosen.
    Selected(Task),
    /// There are no active tasks at all.
    NoActiveTasks,
    /// Active tasks exist but every one is cooling down.
    AllCoolingDown {
        /// Number of active tasks that were excluded.
        active: usize,
    },
}

impl Selection {
    /// The chosen task, if any.
    #[must_use]
    pub fn task(&self) -> Option<&Task> {
        match self {
            Self::Selected(task) => Some(task),
            _ => None,
        }
    }
}

/// Policy for picking one task among the eligible candidates.
///
/// Implement this to weight by priority or age without touching the
/// scheduler.
pub trait SelectionStrategy: Send {
    /// Index into `candidates` of the chosen task. `candidates` is never
    /// empty; out-of-range indices are clamped to the last candidate.
    fn choose(&mut self, candidates: &[Task], rng: &mut dyn RngCore) -> usize;
}

/// Uniform random choice.
#[derive(Debug, Clone, Copy, Default)]
pub struct UniformSelection;

impl SelectionStrategy for UniformSelection {
    fn choose(&mut self, candidates: &[Task], rng: &mut dyn RngCore) -> usize {
        rng.gen_range(0..candidates.len().max(1))
    }
}

/// Filters active tasks by cooldown and delegates the pick to a strategy.
pub struct Selector {
    strategy: Box<dyn SelectionStrategy>,
}

impl Default for Selector {
    fn default() -> Self {
        Self::new(Box::new(UniformSelection))
    }
}

impl Selector {
    /// Selector using `strategy`.
    #[must_use]
    pub fn new(strategy: Box<dyn SelectionStrategy>) -> Self {
        Self { strategy }
    }

    /// Pick an eligible active task.
    pub fn select(
        &mut self,
        store: &dyn TaskStore,
        cooldowns: &CooldownTracker,
        now: DateTime<Utc>,
        rng: &mut dyn RngCore,
    ) -> Result<Selection> {
        let active = store.all_tasks(Some(TaskStatus::Active))?;
        if active.is_empty() {
            return Ok(Selection::NoActiveTasks);
        }

        let active_count = active.len();
        let mut eligible: Vec<Task> = active
            .into_iter()
            .filter(|task| cooldowns.is_eligible(&task.id, now))
            .collect();
        if eligible.is_empty() {
            return Ok(Selection::AllCoolingDown {
                active: active_count,
            });
        }

        let idx = self
            .strategy
            .choose(&eligible, rng)
            .min(eligible.len() - 1);
        Ok(Selection::Selected(eligible.swap_remove(idx)))
    }
}
