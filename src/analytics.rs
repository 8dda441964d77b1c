//! Best-effort analytics records of workflow transitions.
//!
//! One JSON line per state transition, appended to a per-instance file.
//! This sits outside the reconciler's consistency boundary: a failed write
//! is logged and dropped, never allowed to block or fail reconciliation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub workflow_id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// Transition kind: "advance", "complete", "fail", "dispatch"
    pub kind: String,
    pub phase: Option<String>,
    pub from_index: usize,
    pub to_index: usize,
    pub watermark: Option<String>,
    /// Sha-256 of the journal entry bytes that drove the transition
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_digest: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AnalyticsSink {
    path: PathBuf,
}

impl AnalyticsSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Append one record. Never returns an error; failures are logged.
    pub fn record(&self, record: &TransitionRecord) {
        if let Err(e) = self.try_record(record) {
            warn!(
                workflow = %record.workflow_id,
                kind = %record.kind,
                error = %e,
                "failed to write analytics record; dropping"
            );
        }
    }

    fn try_record(&self, record: &TransitionRecord) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?
            .write_all(line.as_bytes())?;
        Ok(())
    }

    /// Read back all records, skipping unparseable lines.
    pub fn read_all(&self) -> Vec<TransitionRecord> {
        let Ok(content) = fs::read_to_string(&self.path) else {
            return Vec::new();
        };
        content
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect()
    }
}
