//! Tokio actor around [`PromptScheduler`].
//!
//! One task owns the scheduler, so inbound commands and timer firings are
//! processed strictly one at a time. The loop sleeps until the earliest
//! armed deadline or the next command, whichever comes first.

use crate::error::{NudgeError, Result};
use crate::events::{PromptId, PromptRecord, UserResponse};
use crate::prompting::controller::{PromptScheduler, SchedulerStatus};
use crate::prompting::lifecycle::ProactivePrompt;
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Default command channel capacity.
const COMMAND_CAPACITY: usize = 64;

enum Command {
    Start(oneshot::Sender<Result<()>>),
    Stop(oneshot::Sender<()>),
    Reconfigure {
        enabled: bool,
        frequency_hours: f64,
        reply: oneshot::Sender<Result<()>>,
    },
    Snooze {
        task_id: String,
        reply: oneshot::Sender<Result<DateTime<Utc>>>,
    },
    CancelSnooze {
        task_id: String,
        reply: oneshot::Sender<bool>,
    },
    RecordResponse {
        prompt_id: PromptId,
        response: UserResponse,
        reply: oneshot::Sender<Result<Option<PromptRecord>>>,
    },
    TriggerNow(oneshot::Sender<Result<Option<ProactivePrompt>>>),
    NextPromptTime(oneshot::Sender<Option<DateTime<Utc>>>),
    Status(oneshot::Sender<SchedulerStatus>),
    Shutdown(oneshot::Sender<()>),
}

/// Cloneable async client for a running [`SchedulerService`].
#[derive(Clone)]
pub struct SchedulerHandle {
    command_tx: mpsc::Sender<Command>,
}

impl SchedulerHandle {
    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(build(reply_tx))
            .await
            .map_err(|e| NudgeError::Channel(format!("scheduler service is gone: {e}")))?;
        reply_rx
            .await
            .map_err(|e| NudgeError::Channel(format!("scheduler reply dropped: {e}")))
    }

    /// Start prompting per the stored config.
    pub async fn start(&self) -> Result<()> {
        self.request(Command::Start).await?
    }

    /// Stop prompting and cancel every timer.
    pub async fn stop(&self) -> Result<()> {
        self.request(Command::Stop).await
    }

    /// Persist new settings and restart if enabled.
    pub async fn reconfigure(&self, enabled: bool, frequency_hours: f64) -> Result<()> {
        self.request(|reply| Command::Reconfigure {
            enabled,
            frequency_hours,
            reply,
        })
        .await?
    }

    /// Snooze a task. Returns when it will be prompted again.
    pub async fn snooze(&self, task_id: impl Into<String>) -> Result<DateTime<Utc>> {
        let task_id = task_id.into();
        self.request(|reply| Command::Snooze { task_id, reply })
            .await?
    }

    /// Cancel a task's snooze, e.g. after it was completed or deleted.
    pub async fn cancel_snooze(&self, task_id: impl Into<String>) -> Result<bool> {
        let task_id = task_id.into();
        self.request(|reply| Command::CancelSnooze { task_id, reply })
            .await
    }

    /// Record the user's response to a prompt.
    pub async fn record_response(
        &self,
        prompt_id: PromptId,
        response: UserResponse,
    ) -> Result<Option<PromptRecord>> {
        self.request(|reply| Command::RecordResponse {
            prompt_id,
            response,
            reply,
        })
        .await?
    }

    /// Prompt now, bypassing the cadence.
    pub async fn trigger_immediate_prompt(&self) -> Result<Option<ProactivePrompt>> {
        self.request(Command::TriggerNow).await?
    }

    /// Best-effort estimate of the next cadence prompt.
    pub async fn next_prompt_time(&self) -> Result<Option<DateTime<Utc>>> {
        self.request(Command::NextPromptTime).await
    }

    /// Snapshot of scheduler state.
    pub async fn status(&self) -> Result<SchedulerStatus> {
        self.request(Command::Status).await
    }

    /// Stop the scheduler and end the service task.
    pub async fn shutdown(&self) -> Result<()> {
        self.request(Command::Shutdown).await
    }
}

/// Runs a [`PromptScheduler`] on its own tokio task.
pub struct SchedulerService;

impl SchedulerService {
    /// Spawn the service loop. The loop ends on [`SchedulerHandle::shutdown`]
    /// or when every handle is dropped; either way the scheduler is stopped.
    pub fn spawn(scheduler: PromptScheduler) -> (SchedulerHandle, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let handle = tokio::spawn(run(scheduler, command_rx));
        (SchedulerHandle { command_tx }, handle)
    }
}

async fn run(mut scheduler: PromptScheduler, mut command_rx: mpsc::Receiver<Command>) {
    debug!("scheduler service started");
    loop {
        let wait = scheduler.until_next_deadline();
        tokio::select! {
            command = command_rx.recv() => match command {
                Some(command) => {
                    if !apply(&mut scheduler, command) {
                        break;
                    }
                }
                None => {
                    scheduler.stop();
                    break;
                }
            },
            () = sleep_for(wait) => {
                scheduler.run_due();
            }
        }
    }
    info!("scheduler service exited");
}

async fn sleep_for(wait: Option<std::time::Duration>) {
    match wait {
        Some(wait) => tokio::time::sleep(wait).await,
        None => std::future::pending().await,
    }
}

/// Apply one command. Returns `false` once the loop should exit.
fn apply(scheduler: &mut PromptScheduler, command: Command) -> bool {
    match command {
        Command::Start(reply) => {
            let _ = reply.send(scheduler.start());
        }
        Command::Stop(reply) => {
            scheduler.stop();
            let _ = reply.send(());
        }
        Command::Reconfigure {
            enabled,
            frequency_hours,
            reply,
        } => {
            let _ = reply.send(scheduler.reconfigure(enabled, frequency_hours));
        }
        Command::Snooze { task_id, reply } => {
            let _ = reply.send(scheduler.snooze(&task_id));
        }
        Command::CancelSnooze { task_id, reply } => {
            let _ = reply.send(scheduler.cancel_snooze(&task_id));
        }
        Command::RecordResponse {
            prompt_id,
            response,
            reply,
        } => {
            let _ = reply.send(scheduler.record_response(prompt_id, response));
        }
        Command::TriggerNow(reply) => {
            let _ = reply.send(scheduler.trigger_immediate_prompt());
        }
        Command::NextPromptTime(reply) => {
            let _ = reply.send(scheduler.next_prompt_time());
        }
        Command::Status(reply) => {
            let _ = reply.send(scheduler.status());
        }
        Command::Shutdown(reply) => {
            scheduler.stop();
            let _ = reply.send(());
            return false;
        }
    }
    true
}
