//! Worker dispatch: deliver a "work this phase" instruction to the
//! capability bound to the active phase.
//!
//! Dispatch is fire-and-forget and at-least-once: the reconciler may repeat
//! it on every idle tick, and workers are responsible for de-duplicating
//! `(workflow_id, phase)` pairs. A dispatch failure is logged and retried
//! on the next tick, bounded only by the overall phase timeout.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{info, warn};
use uuid::Uuid;

/// Everything a worker needs to act without further queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchRequest {
    pub workflow_id: Uuid,
    pub phase: String,
    pub worker: String,
    /// Dispatch attempts for this phase so far, including this one
    pub attempt: u32,
    /// Artifact references from previously completed phases
    pub artifacts: Vec<String>,
}

#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Deliver the instruction. Returning `Ok` means "accepted", not
    /// "completed" — completion is only ever observed through the log.
    async fn dispatch(&self, request: DispatchRequest) -> Result<()>;
}

/// Dispatcher that spawns the capability's configured command, feeding the
/// request as JSON on stdin and detaching immediately.
pub struct CommandDispatcher {
    /// Capability name -> shell-less command line (program + args)
    workers: HashMap<String, String>,
    working_dir: PathBuf,
}

impl CommandDispatcher {
    pub fn new(workers: HashMap<String, String>, working_dir: PathBuf) -> Self {
        Self {
            workers,
            working_dir,
        }
    }

    fn command_for(&self, worker: &str) -> Result<Command> {
        let line = self
            .workers
            .get(worker)
            .ok_or_else(|| anyhow!("No command configured for worker capability '{}'", worker))?;

        let mut parts = line.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| anyhow!("Empty command for worker capability '{}'", worker))?;

        let mut cmd = Command::new(program);
        cmd.args(parts);
        cmd.current_dir(&self.working_dir);
        Ok(cmd)
    }
}

#[async_trait]
impl Dispatcher for CommandDispatcher {
    async fn dispatch(&self, request: DispatchRequest) -> Result<()> {
        let payload =
            serde_json::to_vec(&request).context("Failed to serialize dispatch request")?;

        let mut cmd = self.command_for(&request.worker)?;
        let mut child = cmd
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()
            .with_context(|| format!("Failed to spawn worker '{}'", request.worker))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&payload)
                .await
                .context("Failed to write dispatch request to worker stdin")?;
            stdin.shutdown().await.context("Failed to close stdin")?;
        }

        info!(
            workflow = %request.workflow_id,
            phase = %request.phase,
            worker = %request.worker,
            attempt = request.attempt,
            "dispatched phase to worker"
        );

        // Detach: reap the child in the background so a long-running worker
        // never blocks a tick. The exit status is informational only.
        let workflow_id = request.workflow_id;
        let phase = request.phase.clone();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) if status.success() => {}
                Ok(status) => {
                    warn!(
                        workflow = %workflow_id,
                        phase = %phase,
                        code = status.code().unwrap_or(-1),
                        "worker process exited non-zero"
                    );
                }
                Err(e) => {
                    warn!(workflow = %workflow_id, phase = %phase, error = %e, "failed to reap worker process");
                }
            }
        });

        Ok(())
    }
}
