//! Pure per-tick decision logic.
//!
//! `decide` is a pure function of the persisted instance plus the
//! externally observed log; `apply` folds a decision back into the record.
//! Keeping both free of timers and I/O means every transition can be
//! replayed: running the same tick twice against the same log and state
//! produces the same decision, and the surrounding compare-and-set update
//! makes the second application a conflict or a no-op.

use crate::errors::ReconcileError;
use crate::journal::{JournalRead, PhaseJournalEntry};
use crate::log::LogPosition;
use crate::workflow::{PhaseSpec, TerminalState, WorkflowInstance};
use chrono::{DateTime, Utc};

/// One observed log position paired with the journal lookup at it.
#[derive(Debug, Clone)]
pub struct Observation {
    pub position: LogPosition,
    pub read: JournalRead,
}

/// What a tick decided to do.
#[derive(Debug, Clone)]
pub enum TickDecision {
    /// Instance is terminal; nothing to do
    Idle,
    /// No qualifying journal entry past the watermark, whether or not new
    /// commits exist: (re-)dispatch the active phase's worker
    Dispatch { phase: PhaseSpec },
    /// Entry advanced a non-final phase
    Advance {
        entry: PhaseJournalEntry,
        position: LogPosition,
    },
    /// Entry advanced the final phase
    Complete {
        entry: PhaseJournalEntry,
        position: LogPosition,
    },
    /// Worker reported failure
    FailReported {
        entry: PhaseJournalEntry,
        position: LogPosition,
    },
    /// No qualifying entry within the phase timeout
    FailTimeout { phase: String, reason: String },
}

/// Decide what this tick does, given the loaded instance and the
/// observations past its watermark (oldest first).
pub fn decide(
    instance: &WorkflowInstance,
    now: DateTime<Utc>,
    observations: &[Observation],
) -> Result<TickDecision, ReconcileError> {
    if instance.is_terminal() {
        return Ok(TickDecision::Idle);
    }

    let phase = instance
        .current_phase()
        .ok_or(ReconcileError::PhaseIndexOutOfRange {
            id: instance.id,
            index: instance.current_phase_index,
        })?;

    // Timeout is the only forcible-termination path for a stuck worker.
    if now - instance.phase_started_at > instance.phase_timeout() {
        return Ok(TickDecision::FailTimeout {
            phase: phase.name.clone(),
            reason: format!(
                "phase {} timed out after {}s without a journal entry",
                phase.name, instance.phase_timeout_secs
            ),
        });
    }

    // Earliest parseable entry for the active phase wins.
    for observation in observations {
        if let JournalRead::Entry(entry) = &observation.read {
            let decision = if entry.result.advances_phase() {
                if instance.current_phase_index + 1 == instance.phases.len() {
                    TickDecision::Complete {
                        entry: entry.clone(),
                        position: observation.position.clone(),
                    }
                } else {
                    TickDecision::Advance {
                        entry: entry.clone(),
                        position: observation.position.clone(),
                    }
                }
            } else {
                TickDecision::FailReported {
                    entry: entry.clone(),
                    position: observation.position.clone(),
                }
            };
            return Ok(decision);
        }
    }

    // No qualifying entry, with or without new commits: the worker has not
    // reported yet. Dispatch is at-least-once and workers de-duplicate, so
    // repeating it keeps a workflow from starving when the log carries
    // unrelated history the watermark never consumes.
    Ok(TickDecision::Dispatch {
        phase: phase.clone(),
    })
}

/// Fold a decision into the instance. Returns `true` if the record changed
/// and must be persisted.
pub fn apply(instance: &mut WorkflowInstance, decision: &TickDecision, now: DateTime<Utc>) -> bool {
    match decision {
        TickDecision::Idle => false,
        TickDecision::Dispatch { .. } => {
            instance.attempt_count += 1;
            true
        }
        TickDecision::Advance { entry, position } => {
            instance.watermark = Some(position.commit_id.clone());
            instance.current_phase_index += 1;
            instance.phase_started_at = now;
            instance.attempt_count = 0;
            instance.artifacts.extend(entry.artifacts.iter().cloned());
            true
        }
        TickDecision::Complete { entry, position } => {
            instance.watermark = Some(position.commit_id.clone());
            instance.current_phase_index += 1;
            instance.artifacts.extend(entry.artifacts.iter().cloned());
            instance.terminal_state = TerminalState::Completed;
            instance.terminal_at = Some(now);
            true
        }
        TickDecision::FailReported { entry, position } => {
            instance.watermark = Some(position.commit_id.clone());
            instance.terminal_state = TerminalState::Failed;
            instance.failure_reason = entry.reason.clone();
            instance.terminal_at = Some(now);
            true
        }
        TickDecision::FailTimeout { reason, .. } => {
            instance.terminal_state = TerminalState::Failed;
            instance.failure_reason = Some(reason.clone());
            instance.terminal_at = Some(now);
            true
        }
    }
}

/// Force the instance into `Failed` (external cancellation). Uses the same
/// record shape as every other terminal transition; the caller persists it
/// through the usual compare-and-set path. Returns `false` if the instance
/// is already terminal.
pub fn force_fail(instance: &mut WorkflowInstance, reason: &str, now: DateTime<Utc>) -> bool {
    if instance.is_terminal() {
        return false;
    }
    instance.terminal_state = TerminalState::Failed;
    instance.failure_reason = Some(reason.to_string());
    instance.terminal_at = Some(now);
    true
}
