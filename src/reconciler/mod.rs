//! The reconciler: observe the commit log, decide, persist.
//!
//! One reconciler owns one workflow instance. `run` drives a fixed-interval
//! loop; each `tick` loads the persisted record, polls the log past the
//! watermark with a bounded timeout, feeds the observations to the pure
//! decision logic in [`tick`], and persists the resulting transition
//! through the store's compare-and-set path. A conflict aborts the tick; a
//! timed-out or failed log read counts as "no new data this tick".

pub mod tick;

use crate::analytics::{AnalyticsSink, TransitionRecord};
use crate::dispatch::{DispatchRequest, Dispatcher};
use crate::errors::{ReconcileError, StoreError};
use crate::journal::{JournalReader, PhaseJournalEntry};
use crate::log::CommitLog;
use crate::store::WorkflowStore;
use crate::workflow::{TerminalState, WorkflowInstance};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub use tick::{Observation, TickDecision, apply, decide, force_fail};

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Instance already terminal
    Idle,
    /// No qualifying journal entry; worker (re-)dispatched
    Dispatched,
    /// Phase advanced
    Advanced,
    /// Final phase completed the workflow
    Completed,
    /// Workflow failed (reported or timed out)
    Failed,
    /// Another update won the compare-and-set; tick aborted
    Conflict,
}

pub struct Reconciler {
    store: Arc<WorkflowStore>,
    repo_dir: PathBuf,
    journal: JournalReader,
    dispatcher: Arc<dyn Dispatcher>,
    analytics: AnalyticsSink,
    /// Bound on each external log read; a slow repository must not wedge
    /// the loop
    read_timeout: Duration,
}

impl Reconciler {
    pub fn new(
        store: Arc<WorkflowStore>,
        repo_dir: PathBuf,
        journal: JournalReader,
        dispatcher: Arc<dyn Dispatcher>,
        analytics: AnalyticsSink,
        read_timeout: Duration,
    ) -> Self {
        Self {
            store,
            repo_dir,
            journal,
            dispatcher,
            analytics,
            read_timeout,
        }
    }

    /// Run the reconcile loop until the instance reaches a terminal state.
    ///
    /// Ticks are strictly sequential: tick N+1 is not scheduled until tick
    /// N has completed.
    pub async fn run(
        &self,
        id: &Uuid,
        poll_interval: Duration,
    ) -> Result<TerminalState, ReconcileError> {
        let mut interval = tokio::time::interval(poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            let outcome = self.tick(id).await?;
            if matches!(
                outcome,
                TickOutcome::Idle | TickOutcome::Completed | TickOutcome::Failed
            ) {
                let record = self.store.load(id)?;
                if record.instance.is_terminal() {
                    return Ok(record.instance.terminal_state);
                }
            }
        }
    }

    /// Execute one reconcile tick.
    pub async fn tick(&self, id: &Uuid) -> Result<TickOutcome, ReconcileError> {
        let record = self.store.load(id)?;
        let instance = record.instance;
        if instance.is_terminal() {
            return Ok(TickOutcome::Idle);
        }

        let observations = self.observe(&instance).await;
        let now = Utc::now();
        let decision = decide(&instance, now, &observations)?;

        match &decision {
            TickDecision::Idle => Ok(TickOutcome::Idle),
            TickDecision::Dispatch { phase } => {
                if !observations.is_empty() {
                    debug!(
                        workflow = %instance.id,
                        phase = %phase.name,
                        new_commits = observations.len(),
                        "new commits without a qualifying journal entry; re-dispatching"
                    );
                }
                let mut updated = instance.clone();
                apply(&mut updated, &decision, now);
                match self.store.update(record.version, &updated) {
                    Ok(_) => {}
                    Err(StoreError::Conflict { .. }) => {
                        warn!(workflow = %instance.id, "tick lost compare-and-set; aborting");
                        return Ok(TickOutcome::Conflict);
                    }
                    Err(e) => return Err(e.into()),
                }

                let request = DispatchRequest {
                    workflow_id: updated.id,
                    phase: phase.name.clone(),
                    worker: phase.worker.clone(),
                    attempt: updated.attempt_count,
                    artifacts: updated.artifacts.clone(),
                };
                match self.dispatcher.dispatch(request).await {
                    Ok(()) => {
                        self.analytics.record(&TransitionRecord {
                            workflow_id: updated.id,
                            timestamp: now,
                            kind: "dispatch".to_string(),
                            phase: Some(phase.name.clone()),
                            from_index: updated.current_phase_index,
                            to_index: updated.current_phase_index,
                            watermark: updated.watermark.clone(),
                            entry_digest: None,
                            detail: Some(format!("attempt {}", updated.attempt_count)),
                        });
                    }
                    Err(e) => {
                        warn!(
                            workflow = %updated.id,
                            phase = %phase.name,
                            error = %e,
                            "dispatch failed; retrying next tick"
                        );
                    }
                }
                Ok(TickOutcome::Dispatched)
            }
            TickDecision::Advance { entry, position }
            | TickDecision::Complete { entry, position } => {
                let mut updated = instance.clone();
                apply(&mut updated, &decision, now);
                match self.store.update(record.version, &updated) {
                    Ok(_) => {}
                    Err(StoreError::Conflict { .. }) => {
                        warn!(workflow = %instance.id, "tick lost compare-and-set; aborting");
                        return Ok(TickOutcome::Conflict);
                    }
                    Err(e) => return Err(e.into()),
                }

                let completed = updated.is_terminal();
                let kind = if completed { "complete" } else { "advance" };
                info!(
                    workflow = %updated.id,
                    phase = %entry.phase,
                    result = ?entry.result,
                    commit = %position.commit_id,
                    to_index = updated.current_phase_index,
                    "{}",
                    if completed { "workflow completed" } else { "phase advanced" }
                );
                self.analytics.record(&TransitionRecord {
                    workflow_id: updated.id,
                    timestamp: now,
                    kind: kind.to_string(),
                    phase: Some(entry.phase.clone()),
                    from_index: instance.current_phase_index,
                    to_index: updated.current_phase_index,
                    watermark: updated.watermark.clone(),
                    entry_digest: Some(entry_digest(entry)),
                    detail: None,
                });
                Ok(if completed {
                    TickOutcome::Completed
                } else {
                    TickOutcome::Advanced
                })
            }
            TickDecision::FailReported { entry, position } => {
                let mut updated = instance.clone();
                apply(&mut updated, &decision, now);
                match self.store.update(record.version, &updated) {
                    Ok(_) => {}
                    Err(StoreError::Conflict { .. }) => {
                        warn!(workflow = %instance.id, "tick lost compare-and-set; aborting");
                        return Ok(TickOutcome::Conflict);
                    }
                    Err(e) => return Err(e.into()),
                }

                info!(
                    workflow = %updated.id,
                    phase = %entry.phase,
                    commit = %position.commit_id,
                    reason = updated.failure_reason.as_deref().unwrap_or(""),
                    "workflow failed: worker reported failure"
                );
                self.analytics.record(&TransitionRecord {
                    workflow_id: updated.id,
                    timestamp: now,
                    kind: "fail".to_string(),
                    phase: Some(entry.phase.clone()),
                    from_index: instance.current_phase_index,
                    to_index: updated.current_phase_index,
                    watermark: updated.watermark.clone(),
                    entry_digest: Some(entry_digest(entry)),
                    detail: updated.failure_reason.clone(),
                });
                Ok(TickOutcome::Failed)
            }
            TickDecision::FailTimeout { phase, reason } => {
                let mut updated = instance.clone();
                apply(&mut updated, &decision, now);
                match self.store.update(record.version, &updated) {
                    Ok(_) => {}
                    Err(StoreError::Conflict { .. }) => {
                        warn!(workflow = %instance.id, "tick lost compare-and-set; aborting");
                        return Ok(TickOutcome::Conflict);
                    }
                    Err(e) => return Err(e.into()),
                }

                info!(
                    workflow = %updated.id,
                    phase = %phase,
                    reason = %reason,
                    "workflow failed: phase timed out"
                );
                self.analytics.record(&TransitionRecord {
                    workflow_id: updated.id,
                    timestamp: now,
                    kind: "fail".to_string(),
                    phase: Some(phase.clone()),
                    from_index: instance.current_phase_index,
                    to_index: updated.current_phase_index,
                    watermark: updated.watermark.clone(),
                    entry_digest: None,
                    detail: Some(reason.clone()),
                });
                Ok(TickOutcome::Failed)
            }
        }
    }

    /// Poll the log past the watermark and look up the journal at every new
    /// position. Bounded by `read_timeout`; a timeout or read error reports
    /// "no new data" and is retried next tick.
    async fn observe(&self, instance: &WorkflowInstance) -> Vec<Observation> {
        let Some(phase) = instance.current_phase().map(|p| p.name.clone()) else {
            return Vec::new();
        };
        let repo_dir = self.repo_dir.clone();
        let journal = self.journal.clone();
        let watermark = instance.watermark.clone();

        let task = tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<Observation>> {
            let log = CommitLog::open(&repo_dir)?;
            let positions = log.list_since(watermark.as_deref())?;
            Ok(positions
                .into_iter()
                .map(|position| {
                    let read = journal.read(&log, &phase, &position);
                    Observation { position, read }
                })
                .collect())
        });

        match tokio::time::timeout(self.read_timeout, task).await {
            Ok(Ok(Ok(observations))) => observations,
            Ok(Ok(Err(e))) => {
                warn!(workflow = %instance.id, error = %e, "log read failed; treating as no new data");
                Vec::new()
            }
            Ok(Err(e)) => {
                warn!(workflow = %instance.id, error = %e, "log read task panicked; treating as no new data");
                Vec::new()
            }
            Err(_) => {
                warn!(workflow = %instance.id, "log read timed out; treating as no new data");
                Vec::new()
            }
        }
    }
}

/// External cancellation: force the instance into `Failed` through the same
/// compare-and-set path the reconciler uses. Returns `false` if the
/// instance was already terminal (a no-op, not an error).
pub fn cancel(store: &WorkflowStore, id: &Uuid, reason: &str) -> Result<bool, StoreError> {
    let record = store.load(id)?;
    let mut instance = record.instance;
    if !force_fail(&mut instance, reason, Utc::now()) {
        return Ok(false);
    }
    store.update(record.version, &instance)?;
    Ok(true)
}

fn entry_digest(entry: &PhaseJournalEntry) -> String {
    let bytes = serde_json::to_vec(entry).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    format!("{:x}", hasher.finalize())
}
