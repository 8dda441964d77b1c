//! Configuration for the Cadence reconciler.
//!
//! Settings live in `.cadence/cadence.toml`; every field has a sensible
//! default so the file is optional. The runtime [`Config`] bridges the
//! parsed file with resolved paths.
//!
//! # Configuration File Format
//!
//! ```toml
//! [project]
//! name = "my-pipeline"
//! # Commit log repository; defaults to the project directory itself
//! repo_dir = "."
//!
//! [reconciler]
//! poll_interval_secs = 5
//! read_timeout_secs = 30
//!
//! [workers]
//! baron = "baron-worker --stdin"
//! marie = "marie-worker --stdin"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Journal location inside the log repository, relative to its root.
pub const JOURNAL_DIR: &str = ".cadence/journal";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub name: Option<String>,
    /// Commit log repository path, relative to the project directory
    #[serde(default)]
    pub repo_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            read_timeout_secs: default_read_timeout_secs(),
        }
    }
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_read_timeout_secs() -> u64 {
    30
}

/// The parsed `.cadence/cadence.toml` file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CadenceToml {
    #[serde(default)]
    pub project: ProjectConfig,
    #[serde(default)]
    pub reconciler: ReconcilerConfig,
    /// Worker capability name -> command line
    #[serde(default)]
    pub workers: HashMap<String, String>,
}

impl CadenceToml {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }
}

/// Runtime configuration: the parsed file plus resolved paths.
#[derive(Debug, Clone)]
pub struct Config {
    pub project_dir: PathBuf,
    pub cadence_dir: PathBuf,
    pub workflow_file: PathBuf,
    pub store_dir: PathBuf,
    pub instances_dir: PathBuf,
    pub analytics_file: PathBuf,
    /// The commit log repository the reconciler polls
    pub repo_dir: PathBuf,
    pub poll_interval: Duration,
    pub read_timeout: Duration,
    pub workers: HashMap<String, String>,
}

impl Config {
    /// Resolve configuration for a project directory, reading
    /// `.cadence/cadence.toml` if it exists.
    pub fn new(project_dir: PathBuf) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .context("Failed to resolve project directory")?;
        let cadence_dir = project_dir.join(".cadence");

        let toml_path = cadence_dir.join("cadence.toml");
        let file = if toml_path.exists() {
            CadenceToml::load(&toml_path)?
        } else {
            CadenceToml::default()
        };

        let repo_dir = match &file.project.repo_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => project_dir.join(dir),
            None => project_dir.clone(),
        };

        Ok(Self {
            workflow_file: cadence_dir.join("workflow.json"),
            store_dir: cadence_dir.join("store"),
            instances_dir: cadence_dir.join("instances"),
            analytics_file: cadence_dir.join("analytics.jsonl"),
            repo_dir,
            poll_interval: Duration::from_secs(file.reconciler.poll_interval_secs),
            read_timeout: Duration::from_secs(file.reconciler.read_timeout_secs),
            workers: file.workers,
            project_dir,
            cadence_dir,
        })
    }

    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.cadence_dir).context("Failed to create .cadence directory")?;
        std::fs::create_dir_all(&self.store_dir).context("Failed to create store directory")?;
        std::fs::create_dir_all(&self.instances_dir)
            .context("Failed to create instances directory")?;
        Ok(())
    }
}
