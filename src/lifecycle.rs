//! Lifecycle manager: provision and reclaim per-instance environments.
//!
//! Every workflow instance gets an isolated directory under
//! `.cadence/instances/<id>` so concurrent workflows never share mutable
//! state. Once an instance is terminal and its retention window has
//! elapsed, the environment and the store record are reclaimed. Reclaiming
//! is destructive and irreversible, so it is also idempotent: reclaiming an
//! already-reclaimed environment is a no-op.
//!
//! The lifecycle manager never mutates workflow state fields; it only
//! creates and destroys whole records and directories.

use crate::errors::LifecycleError;
use crate::store::WorkflowStore;
use crate::workflow::{WorkflowDefinition, WorkflowInstance};
use chrono::{DateTime, Utc};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Observable state of an instance's environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvState {
    /// Record exists and the workflow is still running
    Active,
    /// Workflow is terminal; environment held for the retention window
    Retained,
    /// Record and environment are gone
    Reclaimed,
}

pub struct LifecycleManager {
    instances_dir: PathBuf,
    store: Arc<WorkflowStore>,
}

impl LifecycleManager {
    pub fn new(instances_dir: impl Into<PathBuf>, store: Arc<WorkflowStore>) -> Self {
        Self {
            instances_dir: instances_dir.into(),
            store,
        }
    }

    pub fn env_dir(&self, id: &Uuid) -> PathBuf {
        self.instances_dir.join(id.to_string())
    }

    /// Create the environment and the store record for a new instance.
    pub fn provision(
        &self,
        definition: &WorkflowDefinition,
    ) -> Result<WorkflowInstance, LifecycleError> {
        let instance = WorkflowInstance::new(definition);
        let env = self.env_dir(&instance.id);

        for dir in [env.clone(), env.join("logs"), env.join("work")] {
            fs::create_dir_all(&dir)
                .map_err(|source| LifecycleError::Provision { path: dir, source })?;
        }

        self.store.create(&instance)?;
        info!(workflow = %instance.id, env = %env.display(), "provisioned workflow environment");
        Ok(instance)
    }

    pub fn env_state(&self, id: &Uuid) -> EnvState {
        match self.store.load(id) {
            Ok(record) if record.instance.is_terminal() => EnvState::Retained,
            Ok(_) => EnvState::Active,
            Err(_) => EnvState::Reclaimed,
        }
    }

    /// Destroy the environment and record of a terminal instance whose
    /// retention window has elapsed.
    ///
    /// Idempotent: an already-reclaimed id succeeds. A non-terminal
    /// instance or an active retention window is an error.
    pub fn reclaim(&self, id: &Uuid, now: DateTime<Utc>) -> Result<(), LifecycleError> {
        let record = match self.store.load(id) {
            Ok(record) => record,
            Err(crate::errors::StoreError::NotFound { .. }) => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let instance = record.instance;
        if !instance.is_terminal() {
            return Err(LifecycleError::NotTerminal { id: *id });
        }
        let terminal_at = instance.terminal_at.unwrap_or(instance.created_at);
        if now - terminal_at < instance.retention_window() {
            return Err(LifecycleError::RetentionActive { id: *id });
        }

        let env = self.env_dir(id);
        match fs::remove_dir_all(&env) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => return Err(LifecycleError::Reclaim { path: env, source }),
        }
        self.store.remove(id)?;
        info!(workflow = %id, "reclaimed workflow environment");
        Ok(())
    }

    /// Reclaim every terminal instance past its retention window. Returns
    /// the reclaimed ids; instances still running or still retained are
    /// skipped.
    pub fn sweep(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, LifecycleError> {
        let mut reclaimed = Vec::new();
        for id in self.store.list()? {
            match self.reclaim(&id, now) {
                Ok(()) => reclaimed.push(id),
                Err(LifecycleError::NotTerminal { .. })
                | Err(LifecycleError::RetentionActive { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(reclaimed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::{PhaseSpec, TerminalState};
    use chrono::Duration;
    use tempfile::tempdir;

    fn make_manager() -> (LifecycleManager, Arc<WorkflowStore>, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let store = Arc::new(WorkflowStore::new(dir.path().join("store")));
        let manager = LifecycleManager::new(dir.path().join("instances"), store.clone());
        (manager, store, dir)
    }

    fn definition(retention_secs: u64) -> WorkflowDefinition {
        WorkflowDefinition::new(
            vec![PhaseSpec::new("SPECIFY", "baron")],
            3600,
            retention_secs,
        )
    }

    fn make_terminal(store: &WorkflowStore, id: &Uuid, terminal_at: DateTime<Utc>) {
        let record = store.load(id).unwrap();
        let mut instance = record.instance;
        instance.terminal_state = TerminalState::Completed;
        instance.current_phase_index = instance.phases.len();
        instance.terminal_at = Some(terminal_at);
        store.update(record.version, &instance).unwrap();
    }

    #[test]
    fn test_provision_creates_env_and_record() {
        let (manager, store, _dir) = make_manager();
        let instance = manager.provision(&definition(600)).unwrap();

        assert!(manager.env_dir(&instance.id).join("logs").exists());
        assert!(manager.env_dir(&instance.id).join("work").exists());
        assert!(store.load(&instance.id).is_ok());
        assert_eq!(manager.env_state(&instance.id), EnvState::Active);
    }

    #[test]
    fn test_env_state_transitions() {
        let (manager, store, _dir) = make_manager();
        let instance = manager.provision(&definition(0)).unwrap();
        assert_eq!(manager.env_state(&instance.id), EnvState::Active);

        make_terminal(&store, &instance.id, Utc::now());
        assert_eq!(manager.env_state(&instance.id), EnvState::Retained);

        manager.reclaim(&instance.id, Utc::now()).unwrap();
        assert_eq!(manager.env_state(&instance.id), EnvState::Reclaimed);
    }

    #[test]
    fn test_reclaim_refuses_running_instance() {
        let (manager, _store, _dir) = make_manager();
        let instance = manager.provision(&definition(0)).unwrap();

        assert!(matches!(
            manager.reclaim(&instance.id, Utc::now()),
            Err(LifecycleError::NotTerminal { .. })
        ));
    }

    #[test]
    fn test_reclaim_honors_retention_window() {
        let (manager, store, _dir) = make_manager();
        let instance = manager.provision(&definition(600)).unwrap();
        make_terminal(&store, &instance.id, Utc::now());

        assert!(matches!(
            manager.reclaim(&instance.id, Utc::now()),
            Err(LifecycleError::RetentionActive { .. })
        ));

        let later = Utc::now() + Duration::seconds(601);
        manager.reclaim(&instance.id, later).unwrap();
        assert!(!manager.env_dir(&instance.id).exists());
    }

    #[test]
    fn test_reclaim_is_idempotent() {
        let (manager, store, _dir) = make_manager();
        let instance = manager.provision(&definition(0)).unwrap();
        make_terminal(&store, &instance.id, Utc::now() - Duration::seconds(10));

        manager.reclaim(&instance.id, Utc::now()).unwrap();
        // Second reclaim of the same id is a no-op, not an error.
        manager.reclaim(&instance.id, Utc::now()).unwrap();
    }

    #[test]
    fn test_sweep_reclaims_only_expired_terminal_instances() {
        let (manager, store, _dir) = make_manager();

        let running = manager.provision(&definition(600)).unwrap();
        let retained = manager.provision(&definition(600)).unwrap();
        let expired = manager.provision(&definition(600)).unwrap();

        make_terminal(&store, &retained.id, Utc::now());
        make_terminal(&store, &expired.id, Utc::now() - Duration::seconds(700));

        let reclaimed = manager.sweep(Utc::now()).unwrap();
        assert_eq!(reclaimed, vec![expired.id]);

        assert_eq!(manager.env_state(&running.id), EnvState::Active);
        assert_eq!(manager.env_state(&retained.id), EnvState::Retained);
        assert_eq!(manager.env_state(&expired.id), EnvState::Reclaimed);
    }
}
