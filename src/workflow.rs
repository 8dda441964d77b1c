//! Workflow definition and instance types.
//!
//! This module provides:
//! - `PhaseSpec` — one named phase bound to a worker capability
//! - `WorkflowDefinition` — the static, ordered phase list plus timeouts,
//!   loaded from `.cadence/workflow.json`
//! - `WorkflowInstance` — the single mutable record the reconciler owns
//! - `WorkflowStatus` — the read-only view for dashboards and the CLI

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;
use uuid::Uuid;

/// One phase of the static workflow: a name bound to exactly one worker
/// capability. The binding is resolved at definition load time, never at
/// runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseSpec {
    /// Phase name (e.g., "SPECIFY", "VERIFY")
    pub name: String,
    /// Worker capability that executes this phase
    pub worker: String,
}

impl PhaseSpec {
    pub fn new(name: &str, worker: &str) -> Self {
        Self {
            name: name.to_string(),
            worker: worker.to_string(),
        }
    }
}

/// The full workflow definition file format.
///
/// The phase list is immutable once an instance has been created from it:
/// no phase is ever inserted, removed, or reordered at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Digest of the phase list, recorded when the definition was written
    #[serde(default)]
    pub digest: String,
    /// Timestamp when the definition was generated
    #[serde(default)]
    pub generated_at: String,
    /// Ordered list of phases
    pub phases: Vec<PhaseSpec>,
    /// Maximum wall-clock duration a single phase may take
    pub phase_timeout_secs: u64,
    /// How long a terminal instance's environment is retained before reclaim
    pub retention_secs: u64,
}

impl WorkflowDefinition {
    pub fn new(phases: Vec<PhaseSpec>, phase_timeout_secs: u64, retention_secs: u64) -> Self {
        let digest = Self::digest_of(&phases);
        Self {
            digest,
            generated_at: Utc::now().to_rfc3339(),
            phases,
            phase_timeout_secs,
            retention_secs,
        }
    }

    fn digest_of(phases: &[PhaseSpec]) -> String {
        let mut hasher = Sha256::new();
        for p in phases {
            hasher.update(p.name.as_bytes());
            hasher.update(b"\0");
            hasher.update(p.worker.as_bytes());
            hasher.update(b"\n");
        }
        format!("{:x}", hasher.finalize())
    }

    /// Load a definition from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read workflow file: {}", path.display()))?;

        let definition: WorkflowDefinition = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse workflow JSON: {}", path.display()))?;

        definition.validate()?;
        Ok(definition)
    }

    /// Save the definition to a JSON file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            serde_json::to_string_pretty(self).context("Failed to serialize workflow to JSON")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write workflow file: {}", path.display()))?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.phases.is_empty() {
            return Err(anyhow!("Workflow definition has no phases"));
        }
        for phase in &self.phases {
            if phase.name.is_empty() {
                return Err(anyhow!("Workflow definition contains an unnamed phase"));
            }
            if phase.worker.is_empty() {
                return Err(anyhow!("Phase {} has no worker capability", phase.name));
            }
        }
        if self.phase_timeout_secs == 0 {
            return Err(anyhow!("phase_timeout_secs must be greater than zero"));
        }
        Ok(())
    }

    /// Check every phase's worker capability against the configured worker
    /// table. Unresolved capabilities are a load-time error, not a runtime
    /// branch.
    pub fn resolve_workers(&self, workers: &HashMap<String, String>) -> Result<()> {
        for phase in &self.phases {
            if !workers.contains_key(&phase.worker) {
                return Err(anyhow!(
                    "Phase {} names unknown worker capability '{}'. Add it to [workers] in cadence.toml",
                    phase.name,
                    phase.worker
                ));
            }
        }
        Ok(())
    }

    pub fn phase_timeout(&self) -> Duration {
        Duration::seconds(self.phase_timeout_secs as i64)
    }

    pub fn retention_window(&self) -> Duration {
        Duration::seconds(self.retention_secs as i64)
    }
}

/// Terminal state of a workflow instance. Once `Completed` or `Failed` the
/// instance accepts no further transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TerminalState {
    #[default]
    None,
    Completed,
    Failed,
}

impl std::fmt::Display for TerminalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TerminalState::None => write!(f, "running"),
            TerminalState::Completed => write!(f, "completed"),
            TerminalState::Failed => write!(f, "failed"),
        }
    }
}

/// The single mutable record for one workflow instance.
///
/// Mutated exclusively by the reconciler through the state store's
/// compare-and-set path. `current_phase_index` and `watermark` are
/// monotonically non-decreasing; `terminal_state` transitions at most once
/// away from `None`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowInstance {
    pub id: Uuid,
    pub phases: Vec<PhaseSpec>,
    pub current_phase_index: usize,
    /// Commit id of the last consumed log position, `None` before the
    /// first journal entry has been acted on
    pub watermark: Option<String>,
    pub phase_started_at: DateTime<Utc>,
    /// Dispatch attempts for the current phase; reset on phase advance
    pub attempt_count: u32,
    pub terminal_state: TerminalState,
    /// Non-empty iff `terminal_state == Failed`
    pub failure_reason: Option<String>,
    /// Set with the terminal transition; drives the retention window
    pub terminal_at: Option<DateTime<Utc>>,
    /// Artifact references accumulated from consumed journal entries,
    /// handed to subsequent dispatches as context
    #[serde(default)]
    pub artifacts: Vec<String>,
    pub phase_timeout_secs: u64,
    pub retention_secs: u64,
    pub created_at: DateTime<Utc>,
}

impl WorkflowInstance {
    pub fn new(definition: &WorkflowDefinition) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            phases: definition.phases.clone(),
            current_phase_index: 0,
            watermark: None,
            phase_started_at: now,
            attempt_count: 0,
            terminal_state: TerminalState::None,
            failure_reason: None,
            terminal_at: None,
            artifacts: Vec::new(),
            phase_timeout_secs: definition.phase_timeout_secs,
            retention_secs: definition.retention_secs,
            created_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal_state != TerminalState::None
    }

    /// The active phase, or `None` once all phases have completed.
    pub fn current_phase(&self) -> Option<&PhaseSpec> {
        self.phases.get(self.current_phase_index)
    }

    pub fn phase_timeout(&self) -> Duration {
        Duration::seconds(self.phase_timeout_secs as i64)
    }

    pub fn retention_window(&self) -> Duration {
        Duration::seconds(self.retention_secs as i64)
    }

    pub fn status(&self) -> WorkflowStatus {
        WorkflowStatus {
            id: self.id,
            phase: self.current_phase().map(|p| p.name.clone()),
            current_phase_index: self.current_phase_index,
            total_phases: self.phases.len(),
            watermark: self.watermark.clone(),
            attempt_count: self.attempt_count,
            terminal_state: self.terminal_state,
            failure_reason: self.failure_reason.clone(),
        }
    }
}

/// Read-only status view. Safe for external dashboards and the CLI; reading
/// it never mutates anything.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStatus {
    pub id: Uuid,
    pub phase: Option<String>,
    pub current_phase_index: usize,
    pub total_phases: usize,
    pub watermark: Option<String>,
    pub attempt_count: u32,
    pub terminal_state: TerminalState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}
