//! Headless host bridge binary for stdin/stdout JSON communication.
//!
//! Reads `CommandEnvelope` messages as newline-delimited JSON from stdin and
//! writes `ResponseEnvelope` and `EventEnvelope` messages to stdout. Prompts
//! produced by the scheduler are pushed to stdout as `prompt.emitted` events.
//!
//! All tracing/diagnostic output goes to stderr so that stdout remains a
//! clean JSON protocol channel.

use nudge::host::stdio::run_stdio_bridge;
use nudge::{
    EventLog, FileConfigStore, JsonEventLog, MemoryTaskStore, PromptScheduler, SchedulerService,
};
use std::sync::Arc;
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Stdout is reserved for the JSON protocol.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("nudge-host starting");

    let config_store = Arc::new(FileConfigStore::at_default_path());
    let event_log: Arc<dyn EventLog> = Arc::new(JsonEventLog::at_default_path());
    let tasks = Arc::new(MemoryTaskStore::new());
    tracing::info!(
        config = %config_store.path().display(),
        "using prompting config"
    );

    let (prompt_tx, prompt_rx) = mpsc::unbounded_channel();
    let scheduler =
        PromptScheduler::new(tasks.clone(), config_store, Arc::clone(&event_log), prompt_tx);
    let (handle, service) = SchedulerService::spawn(scheduler);

    if let Err(e) = handle.start().await {
        tracing::warn!(error = %e, "scheduler did not start; waiting for scheduler.start");
    }

    let bridge_result = run_stdio_bridge(handle.clone(), tasks, event_log, prompt_rx).await;

    handle
        .shutdown()
        .await
        .map_err(|e| anyhow::anyhow!("scheduler shutdown failed: {e}"))?;
    service
        .await
        .map_err(|e| anyhow::anyhow!("scheduler service panicked: {e}"))?;

    bridge_result.map_err(|e| {
        tracing::error!(error = %e, "nudge-host exited with error");
        anyhow::anyhow!("nudge-host failed: {e}")
    })?;

    tracing::info!("nudge-host shut down cleanly");
    Ok(())
}
