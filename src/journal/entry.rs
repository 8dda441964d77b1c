//! Journal entry types.
//!
//! A worker writes exactly one journal entry per successful phase attempt,
//! committed into the shared log. The reconciler treats the first parseable
//! entry after the previous watermark as authoritative for that phase.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Outcome a worker reports for a phase attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseResult {
    Success,
    Failed,
    Skipped,
}

impl PhaseResult {
    /// `success` and `skipped` both advance the phase index.
    pub fn advances_phase(&self) -> bool {
        matches!(self, PhaseResult::Success | PhaseResult::Skipped)
    }
}

/// A human escalation that happened during worker execution.
///
/// Informational only: the reconciler never reads escalations for control
/// flow, it only sees the elapsed wall-clock time against the phase timeout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Escalation {
    pub question: String,
    pub answer: String,
    pub responder: String,
    pub wait_secs: u64,
}

/// The structured result record a worker commits for a phase attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseJournalEntry {
    /// Phase this entry reports on
    pub phase: String,
    /// Worker capability that produced it
    pub worker: String,
    pub result: PhaseResult,
    /// Required iff `result == failed`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// Free-form numeric facts (test counts, durations, ...)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metrics: BTreeMap<String, f64>,
    /// References to produced resources
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub escalations: Vec<Escalation>,
}

impl PhaseJournalEntry {
    pub fn new(phase: &str, worker: &str, result: PhaseResult) -> Self {
        Self {
            phase: phase.to_string(),
            worker: worker.to_string(),
            result,
            reason: None,
            timestamp: Utc::now(),
            metrics: BTreeMap::new(),
            artifacts: Vec::new(),
            escalations: Vec::new(),
        }
    }

    pub fn with_reason(mut self, reason: &str) -> Self {
        self.reason = Some(reason.to_string());
        self
    }

    /// Parse and validate an entry from raw journal bytes.
    pub fn from_json(bytes: &[u8]) -> Result<Self, String> {
        let entry: PhaseJournalEntry =
            serde_json::from_slice(bytes).map_err(|e| format!("invalid JSON: {}", e))?;
        entry.validate()?;
        Ok(entry)
    }

    /// Structural validation beyond what serde enforces.
    pub fn validate(&self) -> Result<(), String> {
        if self.phase.is_empty() {
            return Err("journal entry has empty phase".to_string());
        }
        match (self.result, &self.reason) {
            (PhaseResult::Failed, None) => {
                Err("failed entry is missing a reason".to_string())
            }
            (PhaseResult::Failed, Some(reason)) if reason.is_empty() => {
                Err("failed entry has an empty reason".to_string())
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_advances_phase() {
        assert!(PhaseResult::Success.advances_phase());
        assert!(PhaseResult::Skipped.advances_phase());
        assert!(!PhaseResult::Failed.advances_phase());
    }

    #[test]
    fn test_from_json_minimal_entry() {
        let json = r#"{
            "phase": "SPECIFY",
            "worker": "baron",
            "result": "success",
            "timestamp": "2026-01-05T12:00:00Z"
        }"#;
        let entry = PhaseJournalEntry::from_json(json.as_bytes()).unwrap();
        assert_eq!(entry.phase, "SPECIFY");
        assert_eq!(entry.worker, "baron");
        assert_eq!(entry.result, PhaseResult::Success);
        assert!(entry.reason.is_none());
        assert!(entry.metrics.is_empty());
    }

    #[test]
    fn test_from_json_full_entry() {
        let json = r#"{
            "phase": "VERIFY",
            "worker": "marie",
            "result": "failed",
            "reason": "3 tests failed",
            "timestamp": "2026-01-05T12:00:00Z",
            "metrics": {"tests_run": 41, "tests_failed": 3},
            "artifacts": ["reports/junit.xml"],
            "escalations": [{
                "question": "Is flaky test X known?",
                "answer": "yes, ignore it",
                "responder": "oncall",
                "wait_secs": 900
            }]
        }"#;
        let entry = PhaseJournalEntry::from_json(json.as_bytes()).unwrap();
        assert_eq!(entry.result, PhaseResult::Failed);
        assert_eq!(entry.reason.as_deref(), Some("3 tests failed"));
        assert_eq!(entry.metrics.get("tests_failed"), Some(&3.0));
        assert_eq!(entry.artifacts, vec!["reports/junit.xml"]);
        assert_eq!(entry.escalations.len(), 1);
        assert_eq!(entry.escalations[0].wait_secs, 900);
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        assert!(PhaseJournalEntry::from_json(b"{ half a record").is_err());
        assert!(PhaseJournalEntry::from_json(b"").is_err());
    }

    #[test]
    fn test_validate_failed_requires_reason() {
        let entry = PhaseJournalEntry::new("VERIFY", "marie", PhaseResult::Failed);
        assert!(entry.validate().is_err());

        let entry = entry.with_reason("timeout in suite");
        assert!(entry.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_reason() {
        let entry = PhaseJournalEntry::new("VERIFY", "marie", PhaseResult::Failed).with_reason("");
        assert!(entry.validate().is_err());
    }

    #[test]
    fn test_success_without_reason_is_valid() {
        let entry = PhaseJournalEntry::new("SPECIFY", "baron", PhaseResult::Success);
        assert!(entry.validate().is_ok());
    }
}
