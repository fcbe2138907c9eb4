//! Host command channel and router.
//!
//! The router turns command envelopes into calls on a [`SchedulerHandle`]
//! and the process-local task store, and broadcasts an event for every
//! state change it makes.

use crate::error::{NudgeError, Result};
use crate::events::{EventLog, PromptStats, UserResponse};
use crate::host::contract::{CommandEnvelope, CommandName, EventEnvelope, ResponseEnvelope};
use crate::prompting::SchedulerHandle;
use crate::tasks::{MemoryTaskStore, TaskStatus, TaskStore};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::warn;

struct HostCommandRequest {
    envelope: CommandEnvelope,
    response_tx: oneshot::Sender<ResponseEnvelope>,
}

/// Sending side of the command channel.
#[derive(Clone)]
pub struct HostCommandClient {
    request_tx: mpsc::Sender<HostCommandRequest>,
    event_tx: broadcast::Sender<EventEnvelope>,
}

impl HostCommandClient {
    /// Validate and dispatch one command, waiting for its response.
    pub async fn send(&self, envelope: CommandEnvelope) -> Result<ResponseEnvelope> {
        envelope.validate().map_err(|e| {
            NudgeError::Protocol(format!(
                "invalid host command envelope {}: {}",
                envelope.request_id, e
            ))
        })?;

        let (response_tx, response_rx) = oneshot::channel();
        self.request_tx
            .send(HostCommandRequest {
                envelope,
                response_tx,
            })
            .await
            .map_err(|e| NudgeError::Channel(format!("failed to send host command request: {e}")))?;

        response_rx
            .await
            .map_err(|e| NudgeError::Channel(format!("host command response dropped: {e}")))
    }

    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<EventEnvelope> {
        self.event_tx.subscribe()
    }

    /// Sender for events that originate outside the router, such as prompts.
    #[must_use]
    pub fn event_sender(&self) -> broadcast::Sender<EventEnvelope> {
        self.event_tx.clone()
    }
}

/// Receiving side of the command channel; owns the router.
pub struct HostCommandServer {
    request_rx: mpsc::Receiver<HostCommandRequest>,
    router: HostRouter,
}

impl HostCommandServer {
    /// Serve requests until every client is dropped.
    pub async fn run(mut self) {
        while let Some(request) = self.request_rx.recv().await {
            let response = self.router.dispatch(&request.envelope).await;
            let _ = request.response_tx.send(response);
        }
    }
}

/// Everything the router talks to.
#[derive(Clone)]
pub struct HostRouter {
    scheduler: SchedulerHandle,
    tasks: Arc<MemoryTaskStore>,
    event_log: Arc<dyn EventLog>,
    event_tx: broadcast::Sender<EventEnvelope>,
}

/// Create a connected client/server pair.
#[must_use]
pub fn command_channel(
    request_capacity: usize,
    event_capacity: usize,
    scheduler: SchedulerHandle,
    tasks: Arc<MemoryTaskStore>,
    event_log: Arc<dyn EventLog>,
) -> (HostCommandClient, HostCommandServer) {
    let (event_tx, _event_rx) = broadcast::channel(event_capacity.max(1));
    let (request_tx, request_rx) = mpsc::channel(request_capacity.max(1));

    (
        HostCommandClient {
            request_tx,
            event_tx: event_tx.clone(),
        },
        HostCommandServer {
            request_rx,
            router: HostRouter {
                scheduler,
                tasks,
                event_log,
                event_tx,
            },
        },
    )
}

impl HostRouter {
    /// Route a command and render failures as error envelopes.
    pub async fn dispatch(&self, envelope: &CommandEnvelope) -> ResponseEnvelope {
        match self.route(envelope).await {
            Ok(response) => response,
            Err(e) => {
                warn!(
                    command = envelope.command.as_str(),
                    request_id = %envelope.request_id,
                    "host command failed: {e}"
                );
                ResponseEnvelope::error(envelope.request_id.clone(), e.to_string())
            }
        }
    }

    /// Route a command envelope to the appropriate handler.
    pub async fn route(&self, envelope: &CommandEnvelope) -> Result<ResponseEnvelope> {
        match envelope.command {
            CommandName::HostPing => Ok(ResponseEnvelope::ok(
                envelope.request_id.clone(),
                serde_json::json!({
                    "pong": true,
                    "contract_version": crate::host::contract::EVENT_VERSION
                }),
            )),
            CommandName::SchedulerStart => self.handle_scheduler_start(envelope).await,
            CommandName::SchedulerStop => self.handle_scheduler_stop(envelope).await,
            CommandName::SchedulerReconfigure => self.handle_scheduler_reconfigure(envelope).await,
            CommandName::SchedulerStatus => {
                let status = self.scheduler.status().await?;
                Ok(ResponseEnvelope::ok(
                    envelope.request_id.clone(),
                    to_value(&status)?,
                ))
            }
            CommandName::SchedulerNextPromptTime => {
                let next = self.scheduler.next_prompt_time().await?;
                Ok(ResponseEnvelope::ok(
                    envelope.request_id.clone(),
                    serde_json::json!({"nextPromptTime": next}),
                ))
            }
            CommandName::PromptTriggerNow => {
                let prompt = self.scheduler.trigger_immediate_prompt().await?;
                Ok(ResponseEnvelope::ok(
                    envelope.request_id.clone(),
                    serde_json::json!({"prompt": prompt}),
                ))
            }
            CommandName::PromptRespond => self.handle_prompt_respond(envelope).await,
            CommandName::PromptStats => {
                let records = self.event_log.load_prompt_events()?;
                let stats = PromptStats::from_records(&records);
                Ok(ResponseEnvelope::ok(
                    envelope.request_id.clone(),
                    to_value(&stats)?,
                ))
            }
            CommandName::TaskAdd => self.handle_task_add(envelope),
            CommandName::TaskList => self.handle_task_list(envelope),
            CommandName::TaskComplete => self.handle_task_complete(envelope).await,
            CommandName::TaskDelete => self.handle_task_delete(envelope).await,
            CommandName::SnoozeSet => {
                let task_id = parse_non_empty_field(&envelope.payload, "taskId", "snooze.set")?;
                let until = self.scheduler.snooze(task_id.clone()).await?;
                self.emit_event(
                    "snooze.set",
                    serde_json::json!({"taskId": task_id, "snoozedUntil": until}),
                );
                Ok(ResponseEnvelope::ok(
                    envelope.request_id.clone(),
                    serde_json::json!({"taskId": task_id, "snoozedUntil": until}),
                ))
            }
            CommandName::SnoozeCancel => {
                let task_id = parse_non_empty_field(&envelope.payload, "taskId", "snooze.cancel")?;
                let cancelled = self.scheduler.cancel_snooze(task_id.clone()).await?;
                Ok(ResponseEnvelope::ok(
                    envelope.request_id.clone(),
                    serde_json::json!({"taskId": task_id, "cancelled": cancelled}),
                ))
            }
        }
    }

    async fn handle_scheduler_start(&self, envelope: &CommandEnvelope) -> Result<ResponseEnvelope> {
        self.scheduler.start().await?;
        let status = self.scheduler.status().await?;
        self.emit_event("scheduler.started", to_value(&status)?);
        Ok(ResponseEnvelope::ok(
            envelope.request_id.clone(),
            serde_json::json!({"accepted": true, "enabled": status.enabled}),
        ))
    }

    async fn handle_scheduler_stop(&self, envelope: &CommandEnvelope) -> Result<ResponseEnvelope> {
        self.scheduler.stop().await?;
        self.emit_event("scheduler.stopped", serde_json::json!({}));
        Ok(ResponseEnvelope::ok(
            envelope.request_id.clone(),
            serde_json::json!({"accepted": true}),
        ))
    }

    async fn handle_scheduler_reconfigure(
        &self,
        envelope: &CommandEnvelope,
    ) -> Result<ResponseEnvelope> {
        let (enabled, frequency_hours) = parse_reconfigure(&envelope.payload)?;
        self.scheduler.reconfigure(enabled, frequency_hours).await?;
        let payload = serde_json::json!({
            "promptingEnabled": enabled,
            "promptingFrequencyHours": frequency_hours
        });
        self.emit_event("scheduler.reconfigured", payload.clone());
        Ok(ResponseEnvelope::ok(envelope.request_id.clone(), payload))
    }

    async fn handle_prompt_respond(&self, envelope: &CommandEnvelope) -> Result<ResponseEnvelope> {
        let (prompt_id, response) = parse_prompt_respond(&envelope.payload)?;
        let record = self.scheduler.record_response(prompt_id, response).await?;

        let Some(record) = record else {
            return Ok(ResponseEnvelope::ok(
                envelope.request_id.clone(),
                serde_json::json!({"accepted": false, "reason": "prompt is no longer pending"}),
            ));
        };

        let mut snoozed_until = None;
        if response == UserResponse::Snooze {
            match self.scheduler.snooze(record.task_id.clone()).await {
                Ok(until) => snoozed_until = Some(until),
                Err(e) => warn!(task_id = %record.task_id, "cannot snooze answered prompt: {e}"),
            }
        }

        self.emit_event("prompt.resolved", to_value(&record)?);
        Ok(ResponseEnvelope::ok(
            envelope.request_id.clone(),
            serde_json::json!({
                "accepted": true,
                "record": record,
                "snoozedUntil": snoozed_until
            }),
        ))
    }

    fn handle_task_add(&self, envelope: &CommandEnvelope) -> Result<ResponseEnvelope> {
        let text = parse_non_empty_field(&envelope.payload, "text", "task.add")?;
        let status = match envelope.payload.get("status").and_then(serde_json::Value::as_str) {
            None => TaskStatus::Active,
            Some(raw) => TaskStatus::parse(raw).ok_or_else(|| {
                NudgeError::Protocol(format!("task.add: unknown status `{raw}`"))
            })?,
        };
        let task = self.tasks.add(text, status);
        self.emit_event("task.added", to_value(&task)?);
        Ok(ResponseEnvelope::ok(
            envelope.request_id.clone(),
            to_value(&task)?,
        ))
    }

    fn handle_task_list(&self, envelope: &CommandEnvelope) -> Result<ResponseEnvelope> {
        let status = match envelope.payload.get("status").and_then(serde_json::Value::as_str) {
            None => None,
            Some(raw) => Some(TaskStatus::parse(raw).ok_or_else(|| {
                NudgeError::Protocol(format!("task.list: unknown status `{raw}`"))
            })?),
        };
        let tasks = self.tasks.all_tasks(status)?;
        Ok(ResponseEnvelope::ok(
            envelope.request_id.clone(),
            serde_json::json!({"tasks": tasks}),
        ))
    }

    async fn handle_task_complete(&self, envelope: &CommandEnvelope) -> Result<ResponseEnvelope> {
        let id = parse_non_empty_field(&envelope.payload, "id", "task.complete")?;
        let task = self.tasks.set_status(&id, TaskStatus::Completed)?;
        self.scheduler.cancel_snooze(id).await?;
        self.emit_event("task.completed", to_value(&task)?);
        Ok(ResponseEnvelope::ok(
            envelope.request_id.clone(),
            to_value(&task)?,
        ))
    }

    async fn handle_task_delete(&self, envelope: &CommandEnvelope) -> Result<ResponseEnvelope> {
        let id = parse_non_empty_field(&envelope.payload, "id", "task.delete")?;
        let task = self.tasks.remove(&id)?;
        self.scheduler.cancel_snooze(id).await?;
        self.emit_event("task.deleted", serde_json::json!({"id": task.id}));
        Ok(ResponseEnvelope::ok(
            envelope.request_id.clone(),
            serde_json::json!({"accepted": true, "id": task.id}),
        ))
    }

    fn emit_event(&self, event: &str, payload: serde_json::Value) {
        let _ = self.event_tx.send(EventEnvelope::new(event, payload));
    }
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<serde_json::Value> {
    serde_json::to_value(value)
        .map_err(|e| NudgeError::Protocol(format!("failed to serialize payload: {e}")))
}

fn parse_non_empty_field(
    payload: &serde_json::Value,
    field: &str,
    command: &str,
) -> Result<String> {
    let Some(raw) = payload.get(field).and_then(serde_json::Value::as_str) else {
        return Err(NudgeError::Protocol(format!(
            "{command} requires payload.{field}"
        )));
    };
    let value = raw.trim();
    if value.is_empty() {
        return Err(NudgeError::Protocol(format!(
            "{command} requires a non-empty payload.{field}"
        )));
    }
    Ok(value.to_owned())
}

fn parse_reconfigure(payload: &serde_json::Value) -> Result<(bool, f64)> {
    let Some(enabled) = payload
        .get("promptingEnabled")
        .and_then(serde_json::Value::as_bool)
    else {
        return Err(NudgeError::Protocol(
            "scheduler.reconfigure requires payload.promptingEnabled (boolean)".to_owned(),
        ));
    };
    let Some(hours) = payload
        .get("promptingFrequencyHours")
        .and_then(serde_json::Value::as_f64)
    else {
        return Err(NudgeError::Protocol(
            "scheduler.reconfigure requires payload.promptingFrequencyHours (number)".to_owned(),
        ));
    };
    Ok((enabled, hours))
}

fn parse_prompt_respond(payload: &serde_json::Value) -> Result<(uuid::Uuid, UserResponse)> {
    let raw_id = parse_non_empty_field(payload, "promptId", "prompt.respond")?;
    let prompt_id = uuid::Uuid::parse_str(&raw_id).map_err(|e| {
        NudgeError::Protocol(format!("prompt.respond: invalid promptId `{raw_id}`: {e}"))
    })?;
    let raw_response = parse_non_empty_field(payload, "response", "prompt.respond")?;
    let response = UserResponse::parse(&raw_response).ok_or_else(|| {
        NudgeError::Protocol(format!(
            "prompt.respond: response must be complete, dismiss or snooze, got `{raw_response}`"
        ))
    })?;
    Ok((prompt_id, response))
}
