//! Project scaffolding and definition inspection — `cadence init` and
//! `cadence list`.

use anyhow::Result;
use std::path::Path;

use cadence::config::{CadenceToml, Config};
use cadence::workflow::{PhaseSpec, WorkflowDefinition};

pub fn cmd_init(project_dir: &Path) -> Result<()> {
    let config = Config::new(project_dir.to_path_buf())?;
    let already = config.cadence_dir.join("cadence.toml").exists();
    config.ensure_directories()?;

    let toml_path = config.cadence_dir.join("cadence.toml");
    if !toml_path.exists() {
        let mut file = CadenceToml::default();
        file.project.name = Some(
            config
                .project_dir
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "workflow".to_string()),
        );
        file.workers
            .insert("planner".to_string(), "planner-worker --stdin".to_string());
        file.workers
            .insert("builder".to_string(), "builder-worker --stdin".to_string());
        file.workers.insert(
            "verifier".to_string(),
            "verifier-worker --stdin".to_string(),
        );
        file.save(&toml_path)?;
    }

    if !config.workflow_file.exists() {
        let definition = WorkflowDefinition::new(
            vec![
                PhaseSpec::new("PLAN", "planner"),
                PhaseSpec::new("IMPLEMENT", "builder"),
                PhaseSpec::new("VERIFY", "verifier"),
            ],
            8 * 3600,
            24 * 3600,
        );
        definition.save(&config.workflow_file)?;
    }

    if already {
        println!("Project already initialized at {}", config.cadence_dir.display());
    } else {
        println!("Initialized cadence project at {}", config.cadence_dir.display());
        println!("Edit .cadence/workflow.json and [workers] in .cadence/cadence.toml, then run 'cadence run'.");
    }
    Ok(())
}

pub fn cmd_list(project_dir: &Path) -> Result<()> {
    let config = Config::new(project_dir.to_path_buf())?;
    if !config.workflow_file.exists() {
        println!("Not initialized. Run 'cadence init' first.");
        return Ok(());
    }

    let definition = WorkflowDefinition::load(&config.workflow_file)?;
    println!("Workflow phases ({} total):", definition.phases.len());
    for (index, phase) in definition.phases.iter().enumerate() {
        println!("  {:>2}. {:<20} worker: {}", index, phase.name, phase.worker);
    }
    println!();
    println!("Phase timeout:    {}s", definition.phase_timeout_secs);
    println!("Retention window: {}s", definition.retention_secs);
    Ok(())
}
