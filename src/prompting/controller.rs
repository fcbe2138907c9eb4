//! Scheduler controller: cadence, guards, and lifecycle of the engine.
//!
//! [`PromptScheduler`] owns every piece of prompting state and the single
//! timer queue behind it. It never sleeps; callers (the tokio service or a
//! test) advance the clock and call [`PromptScheduler::run_due`].

use crate::clock::{Clock, MonotonicClock};
use crate::config::{ConfigStore, PromptTimings, PromptingConfig, hours_to_duration};
use crate::error::Result;
use crate::events::{EventLog, PromptId, PromptRecord, UserResponse};
use crate::prompting::cooldown::CooldownTracker;
use crate::prompting::lifecycle::{PromptTracker, ProactivePrompt};
use crate::prompting::selector::{Selection, SelectionStrategy, Selector};
use crate::prompting::snooze::SnoozeManager;
use crate::prompting::timers::{Fired, TimerId, TimerKind, TimerQueue};
use crate::tasks::{Task, TaskStore};
use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Why a cadence tick did not prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Config says prompting is off.
    Disabled,
    /// Config could not be read.
    ConfigUnavailable,
    /// Not enough time has passed since the last prompt.
    TooSoon {
        elapsed: Duration,
        required: Duration,
    },
    /// There are no active tasks.
    NoActiveTasks,
    /// Every active task is cooling down.
    AllCoolingDown,
    /// The task store could not be read.
    TaskStoreUnavailable,
}

/// Result of a cadence tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// A prompt was emitted.
    Prompted(ProactivePrompt),
    /// Nothing was emitted.
    Skipped(SkipReason),
}

impl TickOutcome {
    /// The emitted prompt, if any.
    #[must_use]
    pub fn prompt(&self) -> Option<&ProactivePrompt> {
        match self {
            Self::Prompted(prompt) => Some(prompt),
            Self::Skipped(_) => None,
        }
    }
}

/// Point-in-time view of the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStatus {
    pub enabled: bool,
    pub frequency_hours: f64,
    /// Jittered cadence interval chosen at start, in seconds.
    pub cadence_interval_secs: Option<i64>,
    pub last_prompt_time: Option<DateTime<Utc>>,
    pub next_prompt_time: Option<DateTime<Utc>>,
    pub pending_prompts: usize,
    pub snoozed_tasks: usize,
    pub cooled_down_tasks: usize,
    pub armed_timers: usize,
}

#[derive(Debug, Clone)]
struct SchedulerState {
    cadence_timer: Option<TimerId>,
    sweep_timer: Option<TimerId>,
    cadence_interval: Option<Duration>,
    last_prompt_time: Option<DateTime<Utc>>,
    enabled: bool,
    frequency_hours: f64,
}

impl Default for SchedulerState {
    fn default() -> Self {
        Self {
            cadence_timer: None,
            sweep_timer: None,
            cadence_interval: None,
            last_prompt_time: None,
            enabled: false,
            frequency_hours: PromptingConfig::default().prompting_frequency_hours,
        }
    }
}

/// The proactive prompting engine.
pub struct PromptScheduler {
    task_store: Arc<dyn TaskStore>,
    config_store: Arc<dyn ConfigStore>,
    event_log: Arc<dyn EventLog>,
    clock: Arc<dyn Clock>,
    rng: Box<dyn RngCore + Send>,
    timings: PromptTimings,
    prompt_tx: mpsc::UnboundedSender<ProactivePrompt>,
    timers: TimerQueue<TimerKind>,
    selector: Selector,
    tracker: PromptTracker,
    snoozes: SnoozeManager,
    cooldowns: CooldownTracker,
    state: SchedulerState,
}

impl PromptScheduler {
    /// Create a stopped scheduler emitting prompts on `prompt_tx`.
    pub fn new(
        task_store: Arc<dyn TaskStore>,
        config_store: Arc<dyn ConfigStore>,
        event_log: Arc<dyn EventLog>,
        prompt_tx: mpsc::UnboundedSender<ProactivePrompt>,
    ) -> Self {
        let timings = PromptTimings::default();
        Self {
            task_store,
            config_store,
            tracker: PromptTracker::new(Arc::clone(&event_log), timings.response_timeout),
            event_log,
            clock: Arc::new(MonotonicClock::new()),
            rng: Box::new(StdRng::from_entropy()),
            timings,
            prompt_tx,
            timers: TimerQueue::new(),
            selector: Selector::default(),
            snoozes: SnoozeManager::new(timings.snooze_delay),
            cooldowns: CooldownTracker::new(timings.cooldown_window),
            state: SchedulerState::default(),
        }
    }

    /// Use a custom time source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Use a custom randomness source for jitter and selection.
    #[must_use]
    pub fn with_rng(mut self, rng: Box<dyn RngCore + Send>) -> Self {
        self.rng = rng;
        self
    }

    /// Use a deterministic seed for jitter and selection.
    #[must_use]
    pub fn with_seed(self, seed: u64) -> Self {
        self.with_rng(Box::new(StdRng::seed_from_u64(seed)))
    }

    /// Override engine timings. Resets prompt, snooze, and cooldown state.
    #[must_use]
    pub fn with_timings(mut self, timings: PromptTimings) -> Self {
        self.timers = TimerQueue::new();
        self.state = SchedulerState::default();
        self.timings = timings;
        self.tracker = PromptTracker::new(Arc::clone(&self.event_log), timings.response_timeout);
        self.snoozes = SnoozeManager::new(timings.snooze_delay);
        self.cooldowns = CooldownTracker::new(timings.cooldown_window);
        self
    }

    /// Use a custom task selection policy.
    #[must_use]
    pub fn with_strategy(mut self, strategy: Box<dyn SelectionStrategy>) -> Self {
        self.selector = Selector::new(strategy);
        self
    }

    /// Start the cadence and sweep timers if prompting is enabled.
    ///
    /// Config load failures and invalid timings are returned. Calling
    /// `start` while running re-arms both timers with a freshly jittered
    /// interval, or stops the scheduler if the config now disables it;
    /// callers should go through [`Self::reconfigure`] instead.
    pub fn start(&mut self) -> Result<()> {
        self.timings.validate()?;
        let config = self.config_store.load_config()?;
        config.validate()?;
        self.state.frequency_hours = config.prompting_frequency_hours;

        if !config.prompting_enabled {
            if self.is_running() {
                self.stop();
            }
            self.state.enabled = false;
            info!("proactive prompting disabled; scheduler not started");
            return Ok(());
        }

        if self.state.cadence_timer.is_some() {
            warn!("scheduler already running; re-arming cadence");
            self.disarm_repeating();
        }

        let now = self.clock.now();
        let interval = self.jittered_interval(config.frequency());
        self.state.cadence_timer = Some(self.timers.arm(now + interval, TimerKind::Cadence));
        self.state.sweep_timer = Some(
            self.timers
                .arm(now + self.timings.sweep_interval, TimerKind::Sweep),
        );
        self.state.cadence_interval = Some(interval);
        self.state.enabled = true;

        info!(
            frequency_hours = config.prompting_frequency_hours,
            interval_secs = interval.num_seconds(),
            "proactive prompting scheduler started"
        );
        Ok(())
    }

    /// Cancel every timer and forget all pending, snooze, and cooldown state.
    pub fn stop(&mut self) {
        self.disarm_repeating();
        let snoozed = self.snoozes.len();
        self.snoozes.clear(&mut self.timers);
        let dropped = self.tracker.clear(&mut self.timers);
        self.cooldowns.clear();
        self.timers.clear();
        self.state.cadence_interval = None;
        self.state.enabled = false;

        info!(
            dropped_pending = dropped,
            cancelled_snoozes = snoozed,
            "proactive prompting scheduler stopped"
        );
    }

    /// Persist new settings and restart the scheduler accordingly.
    ///
    /// The new frequency applies from the next cadence tick onward.
    pub fn reconfigure(&mut self, enabled: bool, frequency_hours: f64) -> Result<()> {
        let config = PromptingConfig::new(enabled, frequency_hours);
        config.validate()?;

        self.stop();
        self.config_store.save_config(&config)?;
        self.state.frequency_hours = frequency_hours;
        if enabled {
            self.start()?;
        }
        Ok(())
    }

    /// Run one cadence tick now: guards first, then selection.
    pub fn tick(&mut self) -> TickOutcome {
        let now = self.clock.now();
        self.tick_at(now)
    }

    /// Select an eligible task and emit a prompt for it, skipping the
    /// minimum-interval guard.
    pub fn generate_prompt(&mut self) -> Result<Option<ProactivePrompt>> {
        let now = self.clock.now();
        match self.select_and_open(now)? {
            TickOutcome::Prompted(prompt) => Ok(Some(prompt)),
            TickOutcome::Skipped(reason) => {
                debug!(?reason, "no prompt generated");
                Ok(None)
            }
        }
    }

    /// Manual prompt for testing the flow; bypasses cadence and guards but
    /// still honours selection eligibility.
    pub fn trigger_immediate_prompt(&mut self) -> Result<Option<ProactivePrompt>> {
        info!("immediate prompt requested");
        self.generate_prompt()
    }

    /// Record the user's answer to a prompt.
    pub fn record_response(
        &mut self,
        prompt_id: PromptId,
        response: UserResponse,
    ) -> Result<Option<PromptRecord>> {
        let now = self.clock.now();
        self.tracker
            .record_response(prompt_id, response, now, &mut self.timers)
    }

    /// Snooze `task_id`; it is prompted again after the snooze delay if it is
    /// still active then.
    pub fn snooze(&mut self, task_id: &str) -> Result<DateTime<Utc>> {
        let now = self.clock.now();
        self.snoozes
            .snooze(task_id, self.task_store.as_ref(), now, &mut self.timers)
    }

    /// Cancel a pending snooze. Returns `true` if one was armed.
    pub fn cancel_snooze(&mut self, task_id: &str) -> bool {
        let cancelled = self.snoozes.cancel(task_id, &mut self.timers);
        if cancelled {
            debug!(task_id = %task_id, "snooze cancelled");
        }
        cancelled
    }

    /// Fire every timer whose deadline has passed. Returns how many fired.
    pub fn run_due(&mut self) -> usize {
        let now = self.clock.now();
        let mut fired = 0;
        while let Some(timer) = self.timers.pop_due(now) {
            fired += 1;
            self.dispatch(timer, now);
        }
        fired
    }

    /// Earliest armed deadline.
    pub fn next_deadline(&mut self) -> Option<DateTime<Utc>> {
        self.timers.next_deadline()
    }

    /// Real time to wait before the next timer is due; zero if overdue.
    pub fn until_next_deadline(&mut self) -> Option<std::time::Duration> {
        let deadline = self.timers.next_deadline()?;
        Some(
            (deadline - self.clock.now())
                .to_std()
                .unwrap_or(std::time::Duration::ZERO),
        )
    }

    /// Rough estimate of the next cadence prompt: last prompt plus frequency.
    ///
    /// Jitter and the cooldown make this approximate.
    #[must_use]
    pub fn next_prompt_time(&self) -> Option<DateTime<Utc>> {
        if !self.state.enabled {
            return None;
        }
        match self.state.last_prompt_time {
            Some(last) => Some(last + hours_to_duration(self.state.frequency_hours)),
            None => self
                .state
                .cadence_timer
                .and_then(|timer| self.timers.deadline(timer)),
        }
    }

    /// Snapshot of scheduler state.
    #[must_use]
    pub fn status(&self) -> SchedulerStatus {
        SchedulerStatus {
            enabled: self.state.enabled,
            frequency_hours: self.state.frequency_hours,
            cadence_interval_secs: self.state.cadence_interval.map(|d| d.num_seconds()),
            last_prompt_time: self.state.last_prompt_time,
            next_prompt_time: self.next_prompt_time(),
            pending_prompts: self.tracker.pending_count(),
            snoozed_tasks: self.snoozes.len(),
            cooled_down_tasks: self.cooldowns.len(),
            armed_timers: self.timers.len(),
        }
    }

    /// Whether the cadence is armed.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state.cadence_timer.is_some()
    }

    /// Number of armed timers of every kind.
    #[must_use]
    pub fn armed_timers(&self) -> usize {
        self.timers.len()
    }

    /// Jittered cadence interval chosen at the last start.
    #[must_use]
    pub fn cadence_interval(&self) -> Option<Duration> {
        self.state.cadence_interval
    }

    /// Time of the most recent prompt from any path.
    #[must_use]
    pub fn last_prompt_time(&self) -> Option<DateTime<Utc>> {
        self.state.last_prompt_time
    }

    /// When `task_id` was last prompted, while its cooldown entry exists.
    #[must_use]
    pub fn cooldown_since(&self, task_id: &str) -> Option<DateTime<Utc>> {
        self.cooldowns.last_prompted(task_id)
    }

    /// Whether `prompt_id` is still awaiting a response.
    #[must_use]
    pub fn is_pending(&self, prompt_id: PromptId) -> bool {
        self.tracker.is_pending(prompt_id)
    }

    /// When the response window of `prompt_id` closes.
    #[must_use]
    pub fn prompt_timeout_at(&self, prompt_id: PromptId) -> Option<DateTime<Utc>> {
        self.tracker.timeout_at(prompt_id, &self.timers)
    }

    /// When the snooze for `task_id` fires.
    #[must_use]
    pub fn snoozed_until(&self, task_id: &str) -> Option<DateTime<Utc>> {
        self.snoozes.snoozed_until(task_id, &self.timers)
    }

    /// The event log prompts are persisted to.
    #[must_use]
    pub fn event_log(&self) -> &Arc<dyn EventLog> {
        &self.event_log
    }

    fn tick_at(&mut self, now: DateTime<Utc>) -> TickOutcome {
        let config = match self.config_store.load_config() {
            Ok(config) => config,
            Err(e) => {
                warn!("cannot load prompting config, skipping tick: {e}");
                return TickOutcome::Skipped(SkipReason::ConfigUnavailable);
            }
        };
        if !config.prompting_enabled {
            debug!("prompting disabled in config; skipping tick");
            return TickOutcome::Skipped(SkipReason::Disabled);
        }
        self.state.frequency_hours = config.prompting_frequency_hours;

        if let Some(last) = self.state.last_prompt_time {
            let elapsed = now - last;
            let required = self.timings.min_interval(config.frequency());
            if elapsed < required {
                debug!(
                    elapsed_secs = elapsed.num_seconds(),
                    required_secs = required.num_seconds(),
                    "too soon since last prompt; skipping tick"
                );
                return TickOutcome::Skipped(SkipReason::TooSoon { elapsed, required });
            }
        }

        match self.task_store.active_task_count() {
            Ok(0) => {
                debug!("no active tasks; skipping tick");
                return TickOutcome::Skipped(SkipReason::NoActiveTasks);
            }
            Ok(_) => {}
            Err(e) => {
                warn!("cannot count active tasks, skipping tick: {e}");
                return TickOutcome::Skipped(SkipReason::TaskStoreUnavailable);
            }
        }

        match self.select_and_open(now) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("task selection failed, skipping tick: {e}");
                TickOutcome::Skipped(SkipReason::TaskStoreUnavailable)
            }
        }
    }

    fn select_and_open(&mut self, now: DateTime<Utc>) -> Result<TickOutcome> {
        let selection = self.selector.select(
            self.task_store.as_ref(),
            &self.cooldowns,
            now,
            self.rng.as_mut(),
        )?;

        Ok(match selection {
            Selection::Selected(task) => TickOutcome::Prompted(self.open_prompt(&task, now)),
            Selection::NoActiveTasks => TickOutcome::Skipped(SkipReason::NoActiveTasks),
            Selection::AllCoolingDown { active } => {
                debug!(active, "every active task is cooling down");
                TickOutcome::Skipped(SkipReason::AllCoolingDown)
            }
        })
    }

    fn open_prompt(&mut self, task: &Task, now: DateTime<Utc>) -> ProactivePrompt {
        let prompt = self.tracker.open(task, now, &mut self.timers);
        self.cooldowns.record(&task.id, now);
        self.state.last_prompt_time = Some(now);

        info!(
            prompt_id = %prompt.prompt_id,
            task_id = %prompt.task_id,
            "emitting proactive prompt"
        );
        if self.prompt_tx.send(prompt.clone()).is_err() {
            debug!("prompt sink closed; prompt not delivered");
        }
        prompt
    }

    fn dispatch(&mut self, timer: Fired<TimerKind>, now: DateTime<Utc>) {
        match timer.payload {
            TimerKind::Cadence => {
                if self.state.cadence_timer != Some(timer.id) {
                    return;
                }
                let interval = self
                    .state
                    .cadence_interval
                    .unwrap_or(self.timings.min_cadence_interval);
                let next = next_deadline_after(timer.deadline, interval, now);
                self.state.cadence_timer = Some(self.timers.arm(next, TimerKind::Cadence));

                let outcome = self.tick_at(now);
                debug!(?outcome, "cadence tick");
            }
            TimerKind::Sweep => {
                if self.state.sweep_timer != Some(timer.id) {
                    return;
                }
                let next = next_deadline_after(timer.deadline, self.timings.sweep_interval, now);
                self.state.sweep_timer = Some(self.timers.arm(next, TimerKind::Sweep));

                let removed = self.cooldowns.sweep(now);
                debug!(removed, remaining = self.cooldowns.len(), "cooldown sweep");
            }
            TimerKind::PromptTimeout(prompt_id) => {
                self.tracker.record_timeout(prompt_id);
            }
            TimerKind::Snooze(task_id) => {
                match self
                    .snoozes
                    .fire(&task_id, timer.id, self.task_store.as_ref())
                {
                    Ok(Some(task)) => {
                        info!(task_id = %task_id, "snooze elapsed; prompting again");
                        self.open_prompt(&task, now);
                    }
                    Ok(None) => {}
                    Err(e) => warn!(task_id = %task_id, "cannot re-validate snoozed task: {e}"),
                }
            }
        }
    }

    fn jittered_interval(&mut self, frequency: Duration) -> Duration {
        let bound = self.timings.jitter.num_milliseconds().max(0);
        let jitter = Duration::milliseconds(self.rng.gen_range(-bound..=bound));
        (frequency + jitter).max(self.timings.min_cadence_interval)
    }

    fn disarm_repeating(&mut self) {
        if let Some(timer) = self.state.cadence_timer.take() {
            self.timers.cancel(timer);
        }
        if let Some(timer) = self.state.sweep_timer.take() {
            self.timers.cancel(timer);
        }
    }
}

/// Next slot of a repeating timer, without replaying missed slots.
fn next_deadline_after(
    fired_at: DateTime<Utc>,
    interval: Duration,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    let next = fired_at + interval;
    if next > now { next } else { now + interval }
}
