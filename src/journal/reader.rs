//! Journal reader: looks up a phase's journal entry at a commit.
//!
//! Workers commit their result record to `<journal_dir>/<phase>.json`. The
//! reader never fails a workflow: a missing file is `Absent`, a parse or
//! validation failure is `Malformed` (logged, and treated by the reconciler
//! exactly like `Absent`). Only an explicit `failed` entry or a phase
//! timeout can fail a workflow.

use crate::journal::entry::PhaseJournalEntry;
use crate::log::{CommitLog, LogPosition};
use std::path::PathBuf;
use tracing::{debug, warn};

/// Result of a journal lookup at one log position.
#[derive(Debug, Clone)]
pub enum JournalRead {
    Entry(PhaseJournalEntry),
    /// No entry for this phase at this position
    Absent,
    /// An entry exists but could not be parsed or validated; treated as
    /// still-in-progress, never as failure
    Malformed,
}

#[derive(Debug, Clone)]
pub struct JournalReader {
    /// Directory inside the log repository holding per-phase entries,
    /// relative to the repository root
    journal_dir: PathBuf,
}

impl JournalReader {
    pub fn new(journal_dir: impl Into<PathBuf>) -> Self {
        Self {
            journal_dir: journal_dir.into(),
        }
    }

    /// Path of a phase's journal entry, relative to the repository root.
    pub fn entry_path(&self, phase: &str) -> PathBuf {
        self.journal_dir.join(format!("{}.json", phase))
    }

    /// Read the journal entry for `phase` at `position`.
    ///
    /// An entry whose `phase` field names a different phase than requested
    /// (e.g., a stale worker retry) is reported as `Absent`.
    pub fn read(&self, log: &CommitLog, phase: &str, position: &LogPosition) -> JournalRead {
        let path = self.entry_path(phase);

        let bytes = match log.read_blob(&position.commit_id, &path) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return JournalRead::Absent,
            Err(e) => {
                // Read errors on this side channel are transient; retried
                // on the next tick.
                warn!(
                    commit = %position.commit_id,
                    phase,
                    error = %e,
                    "journal read failed; treating as absent"
                );
                return JournalRead::Absent;
            }
        };

        let entry = match PhaseJournalEntry::from_json(&bytes) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(
                    commit = %position.commit_id,
                    phase,
                    error = %e,
                    "malformed journal entry; treating as not yet available"
                );
                return JournalRead::Malformed;
            }
        };

        if entry.phase != phase {
            debug!(
                commit = %position.commit_id,
                expected = phase,
                found = %entry.phase,
                "journal entry for a different phase; ignoring"
            );
            return JournalRead::Absent;
        }

        JournalRead::Entry(entry)
    }
}
