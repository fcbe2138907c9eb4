//! End-to-end prompting scenarios driven by a manual clock.
//!
//! Every test owns its scheduler, stores and clock; time only moves when a
//! test advances it and timers only fire on `run_due`.

use chrono::{DateTime, Duration, TimeZone, Utc};
use nudge::prompting::SkipReason;
use nudge::{
    ConfigStore, FileConfigStore, ManualClock, MemoryConfigStore, MemoryEventLog, MemoryTaskStore,
    NudgeError, PromptResponse, PromptScheduler, PromptTimings, PromptingConfig, ProactivePrompt,
    Result, TaskStatus, TickOutcome, UserResponse,
};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap()
}

struct Fixture {
    scheduler: PromptScheduler,
    clock: ManualClock,
    tasks: Arc<MemoryTaskStore>,
    log: Arc<MemoryEventLog>,
    prompts: mpsc::UnboundedReceiver<ProactivePrompt>,
}

impl Fixture {
    fn new(frequency_hours: f64) -> Self {
        Self::with_config_store(Arc::new(MemoryConfigStore::new(PromptingConfig::new(
            true,
            frequency_hours,
        ))))
    }

    fn with_config_store(config: Arc<dyn ConfigStore>) -> Self {
        let clock = ManualClock::new(t0());
        let tasks = Arc::new(MemoryTaskStore::new());
        let log = Arc::new(MemoryEventLog::new());
        let (prompt_tx, prompts) = mpsc::unbounded_channel();
        let scheduler = PromptScheduler::new(tasks.clone(), config, log.clone(), prompt_tx)
            .with_clock(Arc::new(clock.clone()))
            .with_seed(42);
        Self {
            scheduler,
            clock,
            tasks,
            log,
            prompts,
        }
    }

    fn without_jitter(mut self) -> Self {
        self.scheduler = self.scheduler.with_timings(PromptTimings {
            jitter: Duration::zero(),
            ..PromptTimings::default()
        });
        self
    }

    fn advance(&mut self, by: Duration) -> usize {
        self.clock.advance(by);
        self.scheduler.run_due()
    }

    fn drain_prompts(&mut self) -> Vec<ProactivePrompt> {
        std::iter::from_fn(|| self.prompts.try_recv().ok()).collect()
    }
}

struct FailingConfigStore;

impl ConfigStore for FailingConfigStore {
    fn load_config(&self) -> Result<PromptingConfig> {
        Err(NudgeError::Config("config file is corrupt".to_owned()))
    }

    fn save_config(&self, _config: &PromptingConfig) -> Result<()> {
        Err(NudgeError::Config("read-only".to_owned()))
    }
}

#[test]
fn no_active_tasks_yields_nothing() {
    let mut fx = Fixture::new(2.0);
    fx.tasks.add("someday", TaskStatus::Todo);

    assert!(fx.scheduler.generate_prompt().unwrap().is_none());
    assert!(fx.drain_prompts().is_empty());
    assert_eq!(fx.scheduler.status().pending_prompts, 0);
    assert_eq!(fx.scheduler.armed_timers(), 0);
    assert!(fx.log.records().is_empty());
}

#[test]
fn first_prompt_arms_timeout_and_cooldown() {
    let mut fx = Fixture::new(2.0);
    let task = fx.tasks.add("write report", TaskStatus::Active);

    let prompt = fx.scheduler.generate_prompt().unwrap().unwrap();

    assert_eq!(prompt.task_id, task.id);
    assert_eq!(prompt.task_text, "write report");
    assert_eq!(prompt.prompted_at, t0());
    assert_eq!(fx.scheduler.cooldown_since(&task.id), Some(t0()));
    assert!(fx.scheduler.is_pending(prompt.prompt_id));
    assert_eq!(
        fx.scheduler.prompt_timeout_at(prompt.prompt_id),
        Some(t0() + Duration::seconds(30))
    );
    assert_eq!(fx.scheduler.last_prompt_time(), Some(t0()));
    assert_eq!(fx.drain_prompts(), vec![prompt]);
}

#[test]
fn cooling_down_task_is_not_prompted_again() {
    let mut fx = Fixture::new(2.0);
    fx.tasks.add("write report", TaskStatus::Active);
    fx.scheduler.generate_prompt().unwrap().unwrap();

    fx.advance(Duration::minutes(30));
    assert!(fx.scheduler.generate_prompt().unwrap().is_none());

    // past the minimum interval the cadence still finds nothing eligible,
    // and says so differently from an empty task list
    fx.clock.advance(Duration::hours(2));
    assert_eq!(
        fx.scheduler.tick(),
        TickOutcome::Skipped(SkipReason::AllCoolingDown)
    );
    assert_eq!(fx.drain_prompts().len(), 1);
}

#[test]
fn snoozed_task_deleted_before_fire_is_not_prompted() {
    let mut fx = Fixture::new(2.0);
    let task = fx.tasks.add("write report", TaskStatus::Active);

    let fire_at = fx.scheduler.snooze(&task.id).unwrap();
    assert_eq!(fire_at, t0() + Duration::hours(1));
    fx.tasks.remove(&task.id).unwrap();

    assert_eq!(fx.advance(Duration::hours(1)), 1);
    assert!(fx.drain_prompts().is_empty());
    assert!(fx.scheduler.snoozed_until(&task.id).is_none());
    assert!(fx.scheduler.last_prompt_time().is_none());
}

#[test]
fn snoozed_task_completed_before_fire_is_not_prompted() {
    let mut fx = Fixture::new(2.0);
    let task = fx.tasks.add("write report", TaskStatus::Active);

    fx.scheduler.snooze(&task.id).unwrap();
    fx.tasks.set_status(&task.id, TaskStatus::Completed).unwrap();

    fx.advance(Duration::hours(2));
    assert!(fx.drain_prompts().is_empty());
}

#[test]
fn snooze_fire_prompts_active_task_despite_cooldown() {
    let mut fx = Fixture::new(2.0);
    let task = fx.tasks.add("write report", TaskStatus::Active);
    let first = fx.scheduler.generate_prompt().unwrap().unwrap();
    fx.scheduler
        .record_response(first.prompt_id, UserResponse::Snooze)
        .unwrap();
    fx.scheduler.snooze(&task.id).unwrap();

    fx.advance(Duration::hours(1));

    let prompts = fx.drain_prompts();
    assert_eq!(prompts.len(), 2);
    assert_eq!(prompts[1].task_id, task.id);
    assert_eq!(prompts[1].prompted_at, t0() + Duration::hours(1));
    assert_ne!(prompts[1].prompt_id, first.prompt_id);
    assert_eq!(fx.scheduler.cooldown_since(&task.id), Some(t0() + Duration::hours(1)));
    assert_eq!(fx.scheduler.last_prompt_time(), Some(t0() + Duration::hours(1)));
    assert!(fx.scheduler.is_pending(prompts[1].prompt_id));
}

#[test]
fn response_before_timeout_is_recorded() {
    let mut fx = Fixture::new(2.0);
    fx.tasks.add("write report", TaskStatus::Active);
    let prompt = fx.scheduler.generate_prompt().unwrap().unwrap();

    fx.advance(Duration::seconds(5));
    let record = fx
        .scheduler
        .record_response(prompt.prompt_id, UserResponse::Complete)
        .unwrap()
        .unwrap();

    assert_eq!(record.response, PromptResponse::Complete);
    assert_eq!(record.responded_at, Some(t0() + Duration::seconds(5)));

    // the timeout was disarmed, so nothing else is persisted
    fx.advance(Duration::minutes(1));
    let records = fx.log.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].response, PromptResponse::Complete);
}

#[test]
fn late_response_after_timeout_is_ignored() {
    let mut fx = Fixture::new(2.0);
    fx.tasks.add("write report", TaskStatus::Active);
    let prompt = fx.scheduler.generate_prompt().unwrap().unwrap();

    assert_eq!(fx.advance(Duration::seconds(30)), 1);
    assert!(!fx.scheduler.is_pending(prompt.prompt_id));

    let late = fx
        .scheduler
        .record_response(prompt.prompt_id, UserResponse::Dismiss)
        .unwrap();
    assert!(late.is_none());

    let records = fx.log.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].response, PromptResponse::Timeout);
    assert!(records[0].responded_at.is_none());
}

#[test]
fn duplicate_response_persists_once() {
    let mut fx = Fixture::new(2.0);
    fx.tasks.add("write report", TaskStatus::Active);
    let prompt = fx.scheduler.generate_prompt().unwrap().unwrap();

    assert!(
        fx.scheduler
            .record_response(prompt.prompt_id, UserResponse::Dismiss)
            .unwrap()
            .is_some()
    );
    assert!(
        fx.scheduler
            .record_response(prompt.prompt_id, UserResponse::Complete)
            .unwrap()
            .is_none()
    );
    assert_eq!(fx.log.records().len(), 1);
    assert_eq!(fx.log.records()[0].response, PromptResponse::Dismiss);
}

#[test]
fn second_snooze_replaces_first() {
    let mut fx = Fixture::new(2.0);
    let task = fx.tasks.add("write report", TaskStatus::Active);

    fx.scheduler.snooze(&task.id).unwrap();
    fx.clock.advance(Duration::minutes(10));
    let second = fx.scheduler.snooze(&task.id).unwrap();
    assert_eq!(second, t0() + Duration::minutes(70));
    assert_eq!(fx.scheduler.status().snoozed_tasks, 1);

    fx.advance(Duration::minutes(50));
    assert!(fx.drain_prompts().is_empty());

    fx.advance(Duration::minutes(10));
    let prompts = fx.drain_prompts();
    assert_eq!(prompts.len(), 1);
    assert_eq!(prompts[0].prompted_at, second);
}

#[test]
fn cancel_snooze_prevents_prompt() {
    let mut fx = Fixture::new(2.0);
    let task = fx.tasks.add("write report", TaskStatus::Active);

    fx.scheduler.snooze(&task.id).unwrap();
    assert!(fx.scheduler.cancel_snooze(&task.id));
    assert!(!fx.scheduler.cancel_snooze(&task.id));

    assert_eq!(fx.advance(Duration::hours(2)), 0);
    assert!(fx.drain_prompts().is_empty());
}

#[test]
fn snooze_unknown_task_is_not_found() {
    let mut fx = Fixture::new(2.0);
    let err = fx.scheduler.snooze("missing").unwrap_err();
    assert!(matches!(err, NudgeError::TaskNotFound(id) if id == "missing"));
    assert_eq!(fx.scheduler.armed_timers(), 0);
}

#[test]
fn stop_leaves_zero_timers() {
    let mut fx = Fixture::new(1.0);
    let task = fx.tasks.add("write report", TaskStatus::Active);
    fx.tasks.add("ship release", TaskStatus::Active);

    fx.scheduler.start().unwrap();
    fx.scheduler.snooze(&task.id).unwrap();
    fx.scheduler.generate_prompt().unwrap().unwrap();
    assert_eq!(fx.scheduler.armed_timers(), 4);
    fx.drain_prompts();

    fx.scheduler.stop();
    assert_eq!(fx.scheduler.armed_timers(), 0);
    assert!(!fx.scheduler.is_running());
    assert!(fx.scheduler.next_deadline().is_none());

    assert_eq!(fx.advance(Duration::hours(48)), 0);
    assert!(fx.drain_prompts().is_empty());
    // pending prompts are dropped, not timed out
    assert!(fx.log.records().is_empty());
}

#[test]
fn minimum_interval_guard() {
    let mut fx = Fixture::new(2.0);
    fx.tasks.add("write report", TaskStatus::Active);
    fx.tasks.add("ship release", TaskStatus::Active);
    fx.scheduler.generate_prompt().unwrap().unwrap();

    fx.clock.advance(Duration::hours(1));
    match fx.scheduler.tick() {
        TickOutcome::Skipped(SkipReason::TooSoon { elapsed, required }) => {
            assert_eq!(elapsed, Duration::hours(1));
            assert_eq!(required, Duration::minutes(108));
        }
        other => panic!("expected TooSoon, got {other:?}"),
    }

    fx.clock.set(t0() + Duration::minutes(114));
    let outcome = fx.scheduler.tick();
    assert!(outcome.prompt().is_some(), "got {outcome:?}");
    assert_eq!(fx.drain_prompts().len(), 2);
}

#[test]
fn tick_without_active_tasks_skips() {
    let mut fx = Fixture::new(2.0);
    assert_eq!(
        fx.scheduler.tick(),
        TickOutcome::Skipped(SkipReason::NoActiveTasks)
    );
}

#[test]
fn tick_honours_disabled_config() {
    let config = Arc::new(MemoryConfigStore::new(PromptingConfig::new(false, 2.0)));
    let mut fx = Fixture::with_config_store(config);
    fx.tasks.add("write report", TaskStatus::Active);

    fx.scheduler.start().unwrap();
    assert!(!fx.scheduler.is_running());
    assert_eq!(fx.scheduler.armed_timers(), 0);
    assert_eq!(fx.scheduler.tick(), TickOutcome::Skipped(SkipReason::Disabled));
}

#[test]
fn restart_after_disabling_stops_running_scheduler() {
    let config = Arc::new(MemoryConfigStore::new(PromptingConfig::new(true, 2.0)));
    let mut fx = Fixture::with_config_store(config.clone());
    fx.tasks.add("write report", TaskStatus::Active);

    fx.scheduler.start().unwrap();
    assert_eq!(fx.scheduler.armed_timers(), 2);

    config.save_config(&PromptingConfig::new(false, 2.0)).unwrap();
    fx.scheduler.start().unwrap();

    assert!(!fx.scheduler.is_running());
    assert_eq!(fx.scheduler.armed_timers(), 0);
    assert!(!fx.scheduler.status().enabled);
    assert!(fx.scheduler.next_prompt_time().is_none());
    assert_eq!(fx.advance(Duration::hours(48)), 0);
    assert!(fx.drain_prompts().is_empty());
}

#[test]
fn zero_sweep_interval_is_rejected_at_start() {
    let mut fx = Fixture::new(2.0);
    fx.scheduler = fx.scheduler.with_timings(PromptTimings {
        sweep_interval: Duration::zero(),
        ..PromptTimings::default()
    });
    fx.tasks.add("write report", TaskStatus::Active);

    assert!(matches!(fx.scheduler.start(), Err(NudgeError::Config(_))));
    assert!(!fx.scheduler.is_running());
    assert_eq!(fx.scheduler.armed_timers(), 0);
    assert_eq!(fx.advance(Duration::hours(3)), 0);
}

#[test]
fn cadence_interval_stays_within_jitter_bounds() {
    let mut seen = HashSet::new();
    for seed in 0..64 {
        let clock = ManualClock::new(t0());
        let (prompt_tx, _prompts) = mpsc::unbounded_channel();
        let mut scheduler = PromptScheduler::new(
            Arc::new(MemoryTaskStore::new()),
            Arc::new(MemoryConfigStore::new(PromptingConfig::new(true, 2.0))),
            Arc::new(MemoryEventLog::new()),
            prompt_tx,
        )
        .with_clock(Arc::new(clock))
        .with_seed(seed);

        scheduler.start().unwrap();
        let interval = scheduler.cadence_interval().unwrap();
        assert!(interval >= Duration::minutes(105), "seed {seed}: {interval}");
        assert!(interval <= Duration::minutes(135), "seed {seed}: {interval}");
        assert_eq!(scheduler.next_prompt_time(), Some(t0() + interval));
        seen.insert(interval.num_milliseconds());
    }
    assert!(seen.len() > 1, "jitter never varied");
}

#[test]
fn same_seed_gives_same_interval() {
    let interval = |seed| {
        let (prompt_tx, _prompts) = mpsc::unbounded_channel();
        let mut scheduler = PromptScheduler::new(
            Arc::new(MemoryTaskStore::new()),
            Arc::new(MemoryConfigStore::new(PromptingConfig::default())),
            Arc::new(MemoryEventLog::new()),
            prompt_tx,
        )
        .with_clock(Arc::new(ManualClock::new(t0())))
        .with_seed(seed);
        scheduler.start().unwrap();
        scheduler.cadence_interval()
    };
    assert_eq!(interval(7), interval(7));
}

#[test]
fn cadence_prompts_and_rearms() {
    let mut fx = Fixture::new(1.0).without_jitter();
    fx.tasks.add("write report", TaskStatus::Active);
    fx.tasks.add("ship release", TaskStatus::Active);
    fx.scheduler.start().unwrap();
    let interval = fx.scheduler.cadence_interval().unwrap();
    assert_eq!(interval, Duration::hours(1));

    fx.advance(interval);
    let first = fx.drain_prompts();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].prompted_at, t0() + interval);
    assert_eq!(
        fx.scheduler.next_prompt_time(),
        Some(t0() + interval + Duration::hours(1))
    );

    fx.advance(interval);
    let second = fx.drain_prompts();
    assert_eq!(second.len(), 1);
    assert_ne!(second[0].task_id, first[0].task_id);
}

#[test]
fn each_active_task_is_prompted_once_per_cooldown() {
    let mut fx = Fixture::new(2.0);
    for text in ["write report", "ship release", "file taxes"] {
        fx.tasks.add(text, TaskStatus::Active);
    }

    let ids: HashSet<String> = (0..3)
        .map(|_| fx.scheduler.trigger_immediate_prompt().unwrap().unwrap().task_id)
        .collect();
    assert_eq!(ids.len(), 3);
    assert!(fx.scheduler.trigger_immediate_prompt().unwrap().is_none());

    fx.clock.advance(Duration::hours(24));
    assert!(fx.scheduler.trigger_immediate_prompt().unwrap().is_some());
}

#[test]
fn sweep_evicts_stale_cooldowns() {
    // a weekly cadence keeps the cadence timer out of the way
    let mut fx = Fixture::new(168.0);
    let task = fx.tasks.add("write report", TaskStatus::Active);
    fx.scheduler.start().unwrap();
    fx.scheduler.generate_prompt().unwrap().unwrap();

    fx.advance(Duration::hours(23));
    assert_eq!(fx.scheduler.cooldown_since(&task.id), Some(t0()));

    fx.advance(Duration::hours(2));
    assert!(fx.scheduler.cooldown_since(&task.id).is_none());
    assert_eq!(fx.scheduler.status().cooled_down_tasks, 0);
    assert!(fx.scheduler.is_running());
}

#[test]
fn reconfigure_persists_and_restarts() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileConfigStore::new(dir.path().join("config.toml")));
    let mut fx = Fixture::with_config_store(store.clone());

    fx.scheduler.start().unwrap();
    assert!(fx.scheduler.is_running());

    fx.scheduler.reconfigure(false, 3.0).unwrap();
    assert!(!fx.scheduler.is_running());
    assert_eq!(fx.scheduler.armed_timers(), 0);
    assert!(fx.scheduler.next_prompt_time().is_none());
    assert_eq!(store.load_config().unwrap(), PromptingConfig::new(false, 3.0));

    fx.scheduler.reconfigure(true, 4.0).unwrap();
    assert!(fx.scheduler.is_running());
    let interval = fx.scheduler.cadence_interval().unwrap();
    assert!(interval >= Duration::minutes(225) && interval <= Duration::minutes(255));
    assert_eq!(store.load_config().unwrap(), PromptingConfig::new(true, 4.0));
}

#[test]
fn reconfigure_rejects_invalid_frequency() {
    let mut fx = Fixture::new(2.0);
    fx.scheduler.start().unwrap();

    let err = fx.scheduler.reconfigure(true, 0.0).unwrap_err();
    assert!(matches!(err, NudgeError::Config(_)));
    assert!(fx.scheduler.is_running());
}

#[test]
fn config_load_failure_is_surfaced() {
    let mut fx = Fixture::with_config_store(Arc::new(FailingConfigStore));
    fx.tasks.add("write report", TaskStatus::Active);

    assert!(matches!(fx.scheduler.start(), Err(NudgeError::Config(_))));
    assert!(!fx.scheduler.is_running());
    assert_eq!(
        fx.scheduler.tick(),
        TickOutcome::Skipped(SkipReason::ConfigUnavailable)
    );
    // manual prompts do not depend on config
    assert!(fx.scheduler.trigger_immediate_prompt().unwrap().is_some());
}
