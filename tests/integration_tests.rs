//! Integration tests for quill
//!
//! These exercise the binary end to end for everything that does not need a
//! generation backend.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Helper to create a quill Command with no credentials in its environment
fn quill() -> Command {
    let mut cmd = cargo_bin_cmd!("quill");
    for key in [
        "GEMINI_API_KEY",
        "OPENAI_API_KEY",
        "TELEGRAM_BOT_TOKEN",
        "TELEGRAM_CHAT_ID",
        "RUST_LOG",
    ] {
        cmd.env_remove(key);
    }
    cmd
}

/// Helper to create a temporary project directory
fn create_temp_project() -> TempDir {
    TempDir::new().unwrap()
}

/// Helper to lay out a run directory the way a pipeline run leaves it
fn create_run(dir: &TempDir, name: &str, state: &str) -> std::path::PathBuf {
    let run_dir = dir.path().join(name);
    fs::create_dir_all(&run_dir).unwrap();
    fs::write(run_dir.join("state"), state).unwrap();
    run_dir
}

// =============================================================================
// Basic CLI Tests
// =============================================================================

mod cli_basics {
    use super::*;

    #[test]
    fn test_quill_help() {
        quill()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("run"))
            .stdout(predicate::str::contains("status"));
    }

    #[test]
    fn test_quill_version() {
        quill()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
    }

    #[test]
    fn test_unknown_command_fails() {
        quill().arg("publish").assert().failure();
    }
}

// =============================================================================
// Config Tests
// =============================================================================

mod config {
    use super::*;

    #[test]
    fn test_config_init_creates_files() {
        let dir = create_temp_project();

        quill()
            .current_dir(dir.path())
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Created quill.toml"));

        assert!(dir.path().join("quill.toml").exists());
        assert!(dir.path().join("prompts/rules.md").exists());
        assert!(dir.path().join("prompts/style.md").exists());
        assert!(dir.path().join("prompts/critique.md").exists());

        let content = fs::read_to_string(dir.path().join("quill.toml")).unwrap();
        assert!(content.contains("[pipeline]"));
        assert!(content.contains("critique_iterations = 3"));
    }

    #[test]
    fn test_config_init_keeps_existing_file() {
        let dir = create_temp_project();
        fs::write(dir.path().join("quill.toml"), "[pipeline]\nacts = 5\n").unwrap();

        quill()
            .current_dir(dir.path())
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("already exists"));

        let content = fs::read_to_string(dir.path().join("quill.toml")).unwrap();
        assert_eq!(content, "[pipeline]\nacts = 5\n");
    }

    #[test]
    fn test_config_show_reflects_file() {
        let dir = create_temp_project();
        fs::write(
            dir.path().join("quill.toml"),
            "[pipeline]\ncritique_iterations = 1\n",
        )
        .unwrap();

        quill()
            .current_dir(dir.path())
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("critique_iterations = 1"))
            .stdout(predicate::str::contains("<unset>"));
    }

    #[test]
    fn test_config_validate_reports_missing_credentials() {
        let dir = create_temp_project();

        quill()
            .current_dir(dir.path())
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("GEMINI_API_KEY"));
    }

    #[test]
    fn test_config_show_rejects_broken_file() {
        let dir = create_temp_project();
        fs::write(dir.path().join("quill.toml"), "[pipeline\n").unwrap();

        quill()
            .current_dir(dir.path())
            .args(["config", "show"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("quill.toml"));
    }
}

// =============================================================================
// Status Tests
// =============================================================================

mod status {
    use super::*;

    #[test]
    fn test_status_without_runs() {
        let dir = create_temp_project();

        quill()
            .current_dir(dir.path())
            .arg("status")
            .assert()
            .success()
            .stdout(predicate::str::contains("No runs found"));
    }

    #[test]
    fn test_status_picks_latest_run() {
        let dir = create_temp_project();
        create_run(
            &dir,
            "output_20250101_080000_old",
            "outline|started|2025-01-01T08:00:00+00:00\n",
        );
        create_run(
            &dir,
            "output_20250102_080000_new",
            "outline|started|2025-01-02T08:00:00+00:00\n\
             outline|completed|2025-01-02T08:10:00+00:00\n\
             acts|started|2025-01-02T08:10:01+00:00\n\
             acts|failed|2025-01-02T08:20:00+00:00\n",
        );

        quill()
            .current_dir(dir.path())
            .arg("status")
            .assert()
            .success()
            .stdout(predicate::str::contains("output_20250102_080000_new"))
            .stdout(predicate::str::contains("failed"))
            .stdout(predicate::str::contains("pending"))
            .stdout(predicate::str::contains("pipeline.log"));
    }

    #[test]
    fn test_status_of_finished_run() {
        let dir = create_temp_project();
        let run_dir = create_run(
            &dir,
            "output_20250103_080000_done",
            "finalize|completed|2025-01-03T12:00:00+00:00\n",
        );
        fs::write(
            run_dir.join("MANUSCRIPT.md"),
            "one two three\n\n---\n\nfour five\n\n---\n\nsix",
        )
        .unwrap();
        fs::write(
            run_dir.join("run_summary.json"),
            r#"{"title": "Salt and Stars", "chapter_count": 2}"#,
        )
        .unwrap();

        quill()
            .current_dir(dir.path())
            .args(["status", run_dir.to_str().unwrap()])
            .assert()
            .success()
            .stdout(predicate::str::contains("Manuscript: 6 words"))
            .stdout(predicate::str::contains("\"Salt and Stars\", 2 chapters"));
    }

    #[test]
    fn test_status_of_missing_run_fails() {
        let dir = create_temp_project();

        quill()
            .current_dir(dir.path())
            .args(["status", "does-not-exist"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Run directory not found"));
    }
}

// =============================================================================
// Run Tests
// =============================================================================

mod run {
    use super::*;

    #[test]
    fn test_run_requires_generation_key() {
        let dir = create_temp_project();

        quill()
            .current_dir(dir.path())
            .args(["run", "--yes", "A", "summer", "on", "Crete"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("GEMINI_API_KEY"));

        // nothing is created before credentials are checked
        let runs = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with("output_"))
            .count();
        assert_eq!(runs, 0);
    }
}
