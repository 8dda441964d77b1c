//! Instance inspection and operations — `cadence status`, `cadence cancel`,
//! `cadence reclaim`.

use anyhow::{Context, Result};
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

use cadence::config::Config;
use cadence::lifecycle::LifecycleManager;
use cadence::reconciler;
use cadence::store::WorkflowStore;
use cadence::workflow::WorkflowStatus;

pub fn cmd_status(project_dir: &Path, id: Option<Uuid>, json: bool) -> Result<()> {
    let config = Config::new(project_dir.to_path_buf())?;
    let store = WorkflowStore::new(config.store_dir.clone());

    let statuses: Vec<WorkflowStatus> = match id {
        Some(id) => vec![store.load(&id)?.instance.status()],
        None => {
            let mut statuses = Vec::new();
            for id in store.list()? {
                statuses.push(store.load(&id)?.instance.status());
            }
            statuses
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&statuses)?);
        return Ok(());
    }

    if statuses.is_empty() {
        println!("No workflow instances.");
        return Ok(());
    }

    for status in &statuses {
        let phase = status.phase.as_deref().unwrap_or("-");
        let watermark = status
            .watermark
            .as_deref()
            .map(|w| &w[..w.len().min(8)])
            .unwrap_or("-");
        print!(
            "{}  {}  phase {} ({}/{})  attempts {}  watermark {}",
            status.id,
            status.terminal_state,
            phase,
            status.current_phase_index,
            status.total_phases,
            status.attempt_count,
            watermark
        );
        if let Some(reason) = &status.failure_reason {
            print!("  reason: {}", reason);
        }
        println!();
    }
    Ok(())
}

pub fn cmd_cancel(project_dir: &Path, id: &Uuid, reason: &str) -> Result<()> {
    let config = Config::new(project_dir.to_path_buf())?;
    let store = WorkflowStore::new(config.store_dir.clone());

    let cancelled = reconciler::cancel(&store, id, reason)
        .with_context(|| format!("Failed to cancel workflow {}", id))?;
    if cancelled {
        println!("Cancelled workflow {}: {}", id, reason);
    } else {
        println!("Workflow {} is already terminal; nothing to cancel", id);
    }
    Ok(())
}

pub fn cmd_reclaim(project_dir: &Path) -> Result<()> {
    let config = Config::new(project_dir.to_path_buf())?;
    let store = Arc::new(WorkflowStore::new(config.store_dir.clone()));
    let lifecycle = LifecycleManager::new(config.instances_dir.clone(), store);

    let reclaimed = lifecycle.sweep(Utc::now())?;
    if reclaimed.is_empty() {
        println!("Nothing to reclaim.");
    } else {
        for id in &reclaimed {
            println!("Reclaimed workflow {}", id);
        }
    }
    Ok(())
}
