//! Integration tests for Cadence.
//!
//! These drive the CLI end-to-end against a real temporary git repository
//! acting as the commit log.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use git2::Repository;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

use cadence::workflow::{PhaseSpec, WorkflowDefinition};

/// Helper to create a cadence Command
fn cadence() -> Command {
    cargo_bin_cmd!("cadence")
}

fn create_temp_project() -> TempDir {
    TempDir::new().unwrap()
}

/// Initialize a project: git repository, `.cadence/` scaffold, a two-phase
/// SPECIFY/VERIFY definition, and workers that resolve to `true`.
fn setup_project(dir: &TempDir, phase_timeout_secs: u64, retention_secs: u64) {
    let repo = Repository::init(dir.path()).unwrap();
    let mut config = repo.config().unwrap();
    config.set_str("user.name", "test").unwrap();
    config.set_str("user.email", "test@test.com").unwrap();
    drop(config);

    cadence()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success();

    let definition = WorkflowDefinition::new(
        vec![
            PhaseSpec::new("SPECIFY", "baron"),
            PhaseSpec::new("VERIFY", "marie"),
        ],
        phase_timeout_secs,
        retention_secs,
    );
    definition
        .save(&dir.path().join(".cadence/workflow.json"))
        .unwrap();

    fs::write(
        dir.path().join(".cadence/cadence.toml"),
        r#"
[reconciler]
poll_interval_secs = 1
read_timeout_secs = 10

[workers]
baron = "true"
marie = "true"
"#,
    )
    .unwrap();
}

/// Commit a journal entry for `phase` into the project's git repository.
fn commit_journal(dir: &Path, phase: &str, content: &str) {
    let repo = Repository::open(dir).unwrap();
    let file_path = dir.join(".cadence/journal").join(format!("{}.json", phase));
    fs::create_dir_all(file_path.parent().unwrap()).unwrap();
    fs::write(&file_path, content).unwrap();

    let mut index = repo.index().unwrap();
    // Stage only the journal tree; the rest of .cadence is runtime state,
    // not log content.
    index
        .add_all(
            [".cadence/journal"].iter(),
            git2::IndexAddOption::DEFAULT,
            None,
        )
        .unwrap();
    index.write().unwrap();
    let tree_id = index.write_tree().unwrap();
    let tree = repo.find_tree(tree_id).unwrap();
    let sig = git2::Signature::now("worker", "worker@test.com").unwrap();
    let msg = format!("journal: {}", phase);
    if let Ok(head) = repo.head() {
        let parent = head.peel_to_commit().unwrap();
        repo.commit(Some("HEAD"), &sig, &sig, &msg, &tree, &[&parent])
            .unwrap();
    } else {
        repo.commit(Some("HEAD"), &sig, &sig, &msg, &tree, &[])
            .unwrap();
    }
}

fn success_entry(phase: &str, worker: &str) -> String {
    format!(
        r#"{{"phase":"{}","worker":"{}","result":"success","timestamp":"2026-01-05T12:00:00Z"}}"#,
        phase, worker
    )
}

// =============================================================================
// Basic CLI Tests
// =============================================================================

mod cli_basics {
    use super::*;

    #[test]
    fn test_cadence_help() {
        cadence().arg("--help").assert().success();
    }

    #[test]
    fn test_cadence_version() {
        cadence().arg("--version").assert().success();
    }

    #[test]
    fn test_init_creates_structure() {
        let dir = create_temp_project();

        cadence()
            .current_dir(dir.path())
            .arg("init")
            .assert()
            .success()
            .stdout(predicate::str::contains("Initialized cadence project"));

        assert!(dir.path().join(".cadence").exists());
        assert!(dir.path().join(".cadence/cadence.toml").exists());
        assert!(dir.path().join(".cadence/workflow.json").exists());
        assert!(dir.path().join(".cadence/store").exists());
        assert!(dir.path().join(".cadence/instances").exists());
    }

    #[test]
    fn test_init_idempotent() {
        let dir = create_temp_project();

        cadence()
            .current_dir(dir.path())
            .arg("init")
            .assert()
            .success();

        cadence()
            .current_dir(dir.path())
            .arg("init")
            .assert()
            .success()
            .stdout(predicate::str::contains("already initialized"));
    }

    #[test]
    fn test_list_shows_phases() {
        let dir = create_temp_project();
        setup_project(&dir, 3600, 600);

        cadence()
            .current_dir(dir.path())
            .arg("list")
            .assert()
            .success()
            .stdout(predicate::str::contains("SPECIFY"))
            .stdout(predicate::str::contains("baron"))
            .stdout(predicate::str::contains("VERIFY"))
            .stdout(predicate::str::contains("marie"));
    }

    #[test]
    fn test_status_with_no_instances() {
        let dir = create_temp_project();
        setup_project(&dir, 3600, 600);

        cadence()
            .current_dir(dir.path())
            .arg("status")
            .assert()
            .success()
            .stdout(predicate::str::contains("No workflow instances"));
    }

    #[test]
    fn test_run_without_init_fails() {
        let dir = create_temp_project();

        cadence()
            .current_dir(dir.path())
            .arg("run")
            .assert()
            .failure()
            .stderr(predicate::str::contains("cadence init"));
    }
}

// =============================================================================
// Reconcile Flows
// =============================================================================

mod reconcile_flows {
    use super::*;

    #[test]
    fn test_run_completes_success_chain() {
        let dir = create_temp_project();
        setup_project(&dir, 3600, 600);
        commit_journal(dir.path(), "SPECIFY", &success_entry("SPECIFY", "baron"));
        commit_journal(dir.path(), "VERIFY", &success_entry("VERIFY", "marie"));

        cadence()
            .current_dir(dir.path())
            .args(["run", "--poll-interval-secs", "1"])
            .timeout(std::time::Duration::from_secs(60))
            .assert()
            .success()
            .stdout(predicate::str::contains("completed"));

        cadence()
            .current_dir(dir.path())
            .arg("status")
            .assert()
            .success()
            .stdout(predicate::str::contains("completed"))
            .stdout(predicate::str::contains("(2/2)"));
    }

    #[test]
    fn test_run_fails_on_worker_reported_failure() {
        let dir = create_temp_project();
        setup_project(&dir, 3600, 600);
        commit_journal(dir.path(), "SPECIFY", &success_entry("SPECIFY", "baron"));
        commit_journal(
            dir.path(),
            "VERIFY",
            r#"{"phase":"VERIFY","worker":"marie","result":"failed","reason":"3 tests failed","timestamp":"2026-01-05T12:00:00Z"}"#,
        );

        cadence()
            .current_dir(dir.path())
            .args(["run", "--poll-interval-secs", "1"])
            .timeout(std::time::Duration::from_secs(60))
            .assert()
            .failure()
            .stderr(predicate::str::contains("3 tests failed"));

        cadence()
            .current_dir(dir.path())
            .arg("status")
            .assert()
            .success()
            .stdout(predicate::str::contains("failed"))
            .stdout(predicate::str::contains("3 tests failed"));
    }

    #[test]
    fn test_skipped_phase_advances_like_success() {
        let dir = create_temp_project();
        setup_project(&dir, 3600, 600);
        commit_journal(
            dir.path(),
            "SPECIFY",
            r#"{"phase":"SPECIFY","worker":"baron","result":"skipped","timestamp":"2026-01-05T12:00:00Z"}"#,
        );
        commit_journal(dir.path(), "VERIFY", &success_entry("VERIFY", "marie"));

        cadence()
            .current_dir(dir.path())
            .args(["run", "--poll-interval-secs", "1"])
            .timeout(std::time::Duration::from_secs(60))
            .assert()
            .success()
            .stdout(predicate::str::contains("completed"));
    }

    #[test]
    fn test_run_times_out_stuck_phase() {
        let dir = create_temp_project();
        // One-second timeout, and no journal entry ever arrives.
        setup_project(&dir, 1, 600);

        cadence()
            .current_dir(dir.path())
            .args(["run", "--poll-interval-secs", "1"])
            .timeout(std::time::Duration::from_secs(60))
            .assert()
            .failure()
            .stderr(predicate::str::contains("timed out"))
            .stderr(predicate::str::contains("SPECIFY"));
    }

    #[test]
    fn test_status_json_is_machine_readable() {
        let dir = create_temp_project();
        setup_project(&dir, 1, 600);

        // Produce one (timed-out) instance.
        cadence()
            .current_dir(dir.path())
            .args(["run", "--poll-interval-secs", "1"])
            .timeout(std::time::Duration::from_secs(60))
            .assert()
            .failure();

        let output = cadence()
            .current_dir(dir.path())
            .args(["status", "--json"])
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();

        let statuses: serde_json::Value = serde_json::from_slice(&output).unwrap();
        let list = statuses.as_array().unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0]["terminal_state"], "failed");
        assert_eq!(list[0]["total_phases"], 2);
    }

    #[test]
    fn test_reclaim_after_retention_window() {
        let dir = create_temp_project();
        // Zero retention: reclaimable as soon as the instance is terminal.
        setup_project(&dir, 1, 0);

        cadence()
            .current_dir(dir.path())
            .args(["run", "--poll-interval-secs", "1"])
            .timeout(std::time::Duration::from_secs(60))
            .assert()
            .failure();

        cadence()
            .current_dir(dir.path())
            .arg("reclaim")
            .assert()
            .success()
            .stdout(predicate::str::contains("Reclaimed workflow"));

        cadence()
            .current_dir(dir.path())
            .arg("status")
            .assert()
            .success()
            .stdout(predicate::str::contains("No workflow instances"));

        // A second sweep finds nothing.
        cadence()
            .current_dir(dir.path())
            .arg("reclaim")
            .assert()
            .success()
            .stdout(predicate::str::contains("Nothing to reclaim"));
    }

    #[test]
    fn test_reclaim_skips_retained_instances() {
        let dir = create_temp_project();
        setup_project(&dir, 1, 24 * 3600);

        cadence()
            .current_dir(dir.path())
            .args(["run", "--poll-interval-secs", "1"])
            .timeout(std::time::Duration::from_secs(60))
            .assert()
            .failure();

        cadence()
            .current_dir(dir.path())
            .arg("reclaim")
            .assert()
            .success()
            .stdout(predicate::str::contains("Nothing to reclaim"));

        // The record is still there.
        cadence()
            .current_dir(dir.path())
            .arg("status")
            .assert()
            .success()
            .stdout(predicate::str::contains("failed"));
    }

    #[test]
    fn test_malformed_entry_then_valid_entry() {
        let dir = create_temp_project();
        setup_project(&dir, 3600, 600);
        // A partial write lands first, then the real entries.
        commit_journal(dir.path(), "SPECIFY", "{ interrupted");
        commit_journal(dir.path(), "SPECIFY", &success_entry("SPECIFY", "baron"));
        commit_journal(dir.path(), "VERIFY", &success_entry("VERIFY", "marie"));

        cadence()
            .current_dir(dir.path())
            .args(["run", "--poll-interval-secs", "1"])
            .timeout(std::time::Duration::from_secs(60))
            .assert()
            .success()
            .stdout(predicate::str::contains("completed"));
    }

    #[test]
    fn test_cancel_unknown_workflow_fails() {
        let dir = create_temp_project();
        setup_project(&dir, 3600, 600);

        cadence()
            .current_dir(dir.path())
            .args(["cancel", "00000000-0000-0000-0000-000000000000"])
            .assert()
            .failure();
    }
}
