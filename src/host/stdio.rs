//! Stdin/stdout JSON bridge for the host command channel.
//!
//! Reads newline-delimited JSON `CommandEnvelope` messages from stdin,
//! dispatches them through the command router, and writes
//! `ResponseEnvelope` and `EventEnvelope` messages as newline-delimited
//! JSON to stdout. Prompts emitted by the scheduler are forwarded as
//! `prompt.emitted` events.
//!
//! Stdout is exclusively reserved for the JSON protocol; all diagnostic
//! output (tracing, logs) must be routed to stderr.

use crate::error::{NudgeError, Result};
use crate::events::EventLog;
use crate::host::channel::{HostCommandClient, command_channel};
use crate::host::contract::{CommandEnvelope, EventEnvelope, PROMPT_EVENT, ResponseEnvelope};
use crate::prompting::{ProactivePrompt, SchedulerHandle};
use crate::tasks::MemoryTaskStore;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{Mutex, broadcast, mpsc};

/// Default request channel capacity for the stdio bridge.
const REQUEST_CAPACITY: usize = 64;

/// Default event broadcast channel capacity for the stdio bridge.
const EVENT_CAPACITY: usize = 128;

/// Run the bridge over the process's stdin and stdout until stdin closes.
pub async fn run_stdio_bridge(
    scheduler: SchedulerHandle,
    tasks: Arc<MemoryTaskStore>,
    event_log: Arc<dyn EventLog>,
    prompt_rx: mpsc::UnboundedReceiver<ProactivePrompt>,
) -> Result<()> {
    run_bridge(
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
        scheduler,
        tasks,
        event_log,
        prompt_rx,
    )
    .await
}

/// Run the bridge over arbitrary line-oriented IO.
///
/// Four tasks cooperate:
///
/// 1. **Reader** -- reads commands, dispatches each through the client,
///    and writes the response.
/// 2. **Event forwarder** -- writes broadcast events.
/// 3. **Prompt forwarder** -- wraps scheduler prompts as events.
/// 4. **Server** -- runs the command router.
///
/// The bridge exits when the reader hits EOF. Dropping the client lets the
/// server task finish on its own.
pub async fn run_bridge<R, W>(
    reader: R,
    writer: W,
    scheduler: SchedulerHandle,
    tasks: Arc<MemoryTaskStore>,
    event_log: Arc<dyn EventLog>,
    mut prompt_rx: mpsc::UnboundedReceiver<ProactivePrompt>,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (client, server) = command_channel(
        REQUEST_CAPACITY,
        EVENT_CAPACITY,
        scheduler,
        tasks,
        event_log,
    );
    let writer = Arc::new(Mutex::new(writer));

    let server_handle = tokio::spawn(server.run());

    let prompt_events = client.event_sender();
    let prompt_handle = tokio::spawn(async move {
        while let Some(prompt) = prompt_rx.recv().await {
            match serde_json::to_value(&prompt) {
                Ok(payload) => {
                    let _ = prompt_events.send(EventEnvelope::new(PROMPT_EVENT, payload));
                }
                Err(e) => tracing::error!(error = %e, "failed to serialize prompt; skipping"),
            }
        }
    });

    let event_writer = Arc::clone(&writer);
    let mut event_rx = client.subscribe_events();
    let event_handle = tokio::spawn(async move {
        loop {
            match event_rx.recv().await {
                Ok(event_envelope) => match serde_json::to_string(&event_envelope) {
                    Ok(json) => {
                        let mut w = event_writer.lock().await;
                        if let Err(e) = write_line(&mut *w, &json).await {
                            tracing::warn!(
                                error = %e,
                                "failed to write event envelope; stopping event forwarder"
                            );
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "failed to serialize event envelope; skipping");
                    }
                },
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(lagged = n, "event forwarder lagged; some events were dropped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("event broadcast channel closed; stopping event forwarder");
                    break;
                }
            }
        }
    });

    let reader_result = run_reader(reader, client, Arc::clone(&writer)).await;

    prompt_handle.abort();
    event_handle.abort();
    let _ = prompt_handle.await;
    let _ = event_handle.await;
    let _ = server_handle.await;

    reader_result
}

async fn run_reader<R, W>(
    mut reader: R,
    client: HostCommandClient,
    writer: Arc<Mutex<W>>,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader
            .read_line(&mut line)
            .await
            .map_err(|e| NudgeError::Channel(format!("failed to read command line: {e}")))?;

        if bytes_read == 0 {
            tracing::info!("input closed (EOF); shutting down bridge");
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<CommandEnvelope>(trimmed) {
            Ok(envelope) => {
                let request_id = envelope.request_id.clone();
                match client.send(envelope).await {
                    Ok(resp) => resp,
                    Err(e) => {
                        tracing::error!(error = %e, "host command dispatch failed");
                        ResponseEnvelope::error(request_id, format!("dispatch failed: {e}"))
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, raw_line = %trimmed, "failed to parse command envelope");
                ResponseEnvelope::error(
                    "parse-error",
                    format!("failed to parse command envelope: {e}"),
                )
            }
        };

        let json = serde_json::to_string(&response).map_err(|e| {
            NudgeError::Protocol(format!("failed to serialize response envelope: {e}"))
        })?;
        let mut w = writer.lock().await;
        write_line(&mut *w, &json).await?;
    }

    Ok(())
}

/// Write a single JSON line and flush.
async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, json: &str) -> Result<()> {
    writer
        .write_all(json.as_bytes())
        .await
        .map_err(|e| NudgeError::Channel(format!("failed to write output: {e}")))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| NudgeError::Channel(format!("failed to write newline: {e}")))?;
    writer
        .flush()
        .await
        .map_err(|e| NudgeError::Channel(format!("failed to flush output: {e}")))?;
    Ok(())
}
