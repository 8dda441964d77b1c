//! Typed error hierarchy for the Cadence reconciler.
//!
//! Three top-level enums cover the three subsystems:
//! - `StoreError` — workflow state store failures (including CAS conflicts)
//! - `ReconcileError` — per-tick reconciliation failures
//! - `LifecycleError` — environment provisioning and reclamation failures

use thiserror::Error;
use uuid::Uuid;

/// Errors from the workflow state store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Workflow {id} not found")]
    NotFound { id: Uuid },

    #[error("Workflow {id} already exists")]
    AlreadyExists { id: Uuid },

    /// The record changed since it was loaded. The caller must abort the
    /// current tick and re-read on the next interval.
    #[error("Concurrent update of workflow {id}: expected version {expected}, found {found}")]
    Conflict {
        id: Uuid,
        expected: u64,
        found: u64,
    },

    #[error("Failed to access store record at {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt store record at {path}: {source}")]
    Corrupt {
        path: std::path::PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors from a single reconciler tick.
///
/// Transient log-read and dispatch failures are absorbed inside the tick
/// (logged, retried next interval) and never surface here; what remains is
/// store access and genuine programming errors.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Workflow {id} has no phase at index {index}")]
    PhaseIndexOutOfRange { id: Uuid, index: usize },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors from the lifecycle manager.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Workflow {id} is not terminal; refusing to reclaim")]
    NotTerminal { id: Uuid },

    #[error("Retention window for workflow {id} has not elapsed")]
    RetentionActive { id: Uuid },

    #[error("Failed to provision environment at {path}: {source}")]
    Provision {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to reclaim environment at {path}: {source}")]
    Reclaim {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}
