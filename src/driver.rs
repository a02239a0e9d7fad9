//! Orchestrator-facing surface of the executor.
//!
//! The wire format between executor and orchestrator is not owned by this
//! crate; embedders implement [`OrchestratorClient`] over whatever
//! transport their orchestrator speaks. The standalone binary uses
//! [`JsonLineClient`], which writes one JSON object per status update to
//! stdout for the launching process to consume.

use std::io::Write;

use async_trait::async_trait;
use tracing::info;

use crate::error::{ExecutorError, Result};
use crate::task::StatusUpdate;

/// Outbound calls to the orchestrator.
#[async_trait]
pub trait OrchestratorClient: Send + Sync + 'static {
    /// Deliver a status update. Fire-and-forget from the core's
    /// perspective: failures are logged and swallowed by the caller.
    async fn send_status_update(&self, update: StatusUpdate) -> Result<()>;

    /// Ask the orchestrator-facing driver to stop. Used only on an
    /// unrecoverable launch failure.
    async fn stop(&self);
}

/// Standalone driver: one JSON line per status update on stdout.
///
/// Logs go to stderr, so stdout stays a clean machine-readable channel.
#[derive(Debug, Default)]
pub struct JsonLineClient;

impl JsonLineClient {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl OrchestratorClient for JsonLineClient {
    async fn send_status_update(&self, update: StatusUpdate) -> Result<()> {
        let line = serde_json::to_string(&update)
            .map_err(|e| ExecutorError::ReportTransport(e.to_string()))?;

        // SIGPIPE is routed by the signal router, so a vanished consumer
        // surfaces here as EPIPE instead of killing the process.
        let mut out = std::io::stdout().lock();
        writeln!(out, "{line}")
            .and_then(|()| out.flush())
            .map_err(|e| ExecutorError::ReportTransport(e.to_string()))
    }

    async fn stop(&self) {
        info!("Driver stop requested");
    }
}
