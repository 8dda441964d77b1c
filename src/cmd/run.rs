//! Reconcile a workflow instance to a terminal state — `cadence run`.

use anyhow::{Context, Result, anyhow};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use cadence::analytics::AnalyticsSink;
use cadence::config::{Config, JOURNAL_DIR};
use cadence::dispatch::CommandDispatcher;
use cadence::journal::JournalReader;
use cadence::lifecycle::LifecycleManager;
use cadence::reconciler::Reconciler;
use cadence::store::WorkflowStore;
use cadence::workflow::{TerminalState, WorkflowDefinition};

pub async fn cmd_run(
    project_dir: &Path,
    resume: Option<Uuid>,
    poll_interval_secs: Option<u64>,
) -> Result<()> {
    let config = Config::new(project_dir.to_path_buf())?;
    if !config.workflow_file.exists() {
        anyhow::bail!("No workflow definition found. Run 'cadence init' first.");
    }
    config.ensure_directories()?;

    let definition = WorkflowDefinition::load(&config.workflow_file)?;
    definition.resolve_workers(&config.workers)?;

    let store = Arc::new(WorkflowStore::new(config.store_dir.clone()));
    let lifecycle = LifecycleManager::new(config.instances_dir.clone(), store.clone());

    let id = match resume {
        Some(id) => {
            let record = store
                .load(&id)
                .with_context(|| format!("Cannot resume workflow {}", id))?;
            if record.instance.is_terminal() {
                anyhow::bail!(
                    "Workflow {} is already {}",
                    id,
                    record.instance.terminal_state
                );
            }
            println!(
                "Resuming workflow {} at phase {}/{}",
                id,
                record.instance.current_phase_index,
                record.instance.phases.len()
            );
            id
        }
        None => {
            let instance = lifecycle.provision(&definition)?;
            println!("Provisioned workflow {}", instance.id);
            instance.id
        }
    };

    let dispatcher = Arc::new(CommandDispatcher::new(
        config.workers.clone(),
        config.repo_dir.clone(),
    ));
    let reconciler = Reconciler::new(
        store.clone(),
        config.repo_dir.clone(),
        JournalReader::new(JOURNAL_DIR),
        dispatcher,
        AnalyticsSink::new(config.analytics_file.clone()),
        config.read_timeout,
    );

    let poll_interval = poll_interval_secs
        .map(Duration::from_secs)
        .unwrap_or(config.poll_interval);

    let terminal = reconciler.run(&id, poll_interval).await?;
    match terminal {
        TerminalState::Completed => {
            println!("Workflow {} completed", id);
            Ok(())
        }
        TerminalState::Failed => {
            let record = store.load(&id)?;
            Err(anyhow!(
                "Workflow {} failed: {}",
                id,
                record
                    .instance
                    .failure_reason
                    .unwrap_or_else(|| "unknown reason".to_string())
            ))
        }
        TerminalState::None => unreachable!("run returned without a terminal state"),
    }
}
