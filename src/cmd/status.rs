//! Run inspection - `quill status`.

use anyhow::{Context, Result};
use std::path::Path;

use super::super::Cli;

pub fn cmd_status(cli: &Cli, project_dir: &Path, run_dir: Option<&Path>) -> Result<()> {
    use quill::config::Config;
    use quill::pipeline::chapter::split_manuscript;
    use quill::pipeline::stage::MANUSCRIPT_ARTIFACT;
    use quill::pipeline::{STATE_FILE, SUMMARY_FILE, Stage, list_runs};
    use quill::store::{ArtifactStore, StageStatus, StateLog};
    use quill::ui::icons::{CHECK, CROSS, FOLDER, PEN};
    use quill::util::word_count;

    let run_dir = match run_dir {
        Some(dir) => dir.to_path_buf(),
        None => {
            let config = Config::new(
                project_dir.to_path_buf(),
                cli.output_dir.clone(),
                cli.verbose,
                cli.yes,
            )?;
            match list_runs(&config.output_base).pop() {
                Some(dir) => dir,
                None => {
                    println!();
                    println!("No runs found in {}", config.output_base.display());
                    println!("Start one with 'quill run <theme>'.");
                    println!();
                    return Ok(());
                }
            }
        }
    };
    anyhow::ensure!(
        run_dir.is_dir(),
        "Run directory not found: {}",
        run_dir.display()
    );

    let state = StateLog::new(run_dir.join(STATE_FILE));
    let entries = state.entries()?;
    let store = ArtifactStore::new(&run_dir);

    println!();
    println!("{}{}", FOLDER, console::style(run_dir.display()).bold());
    println!();
    println!("{:<20} {:<10} Time", "Stage", "Status");
    println!("{:<20} {:<10} ----", "-----", "------");

    for stage in Stage::ALL {
        let last = entries.iter().rev().find(|e| e.stage == stage.name());
        let (status, time) = match last {
            Some(entry) => (
                match entry.status {
                    StageStatus::Completed => console::style("done").green(),
                    StageStatus::Started => console::style("running").yellow(),
                    StageStatus::Failed => console::style("failed").red(),
                },
                entry
                    .timestamp
                    .with_timezone(&chrono::Local)
                    .format("%Y-%m-%d %H:%M:%S")
                    .to_string(),
            ),
            None => (console::style("pending").dim(), String::new()),
        };
        println!("{:<20} {:<10} {}", stage.title(), status, time);
    }
    println!();
    if let Some(stage) = state.current_stage() {
        println!("Current stage: {}", stage);
    }
    println!("Artifacts: {}", store.artifact_count());

    if let Ok(manuscript) = store.read_current(MANUSCRIPT_ARTIFACT) {
        let words: usize = split_manuscript(&manuscript)
            .iter()
            .map(|chapter| word_count(chapter))
            .sum();
        println!("{}Manuscript: {} words", PEN, words);
    }

    let summary_path = run_dir.join(SUMMARY_FILE);
    if summary_path.exists() {
        let summary: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(&summary_path)
                .with_context(|| format!("Failed to read {}", summary_path.display()))?,
        )
        .context("Failed to parse run summary")?;
        println!(
            "{}Finished: \"{}\", {} chapters",
            CHECK,
            summary["title"].as_str().unwrap_or("Untitled"),
            summary["chapter_count"]
        );
    } else if state.has_failure() {
        println!("{}Run failed; see pipeline.log in the run directory", CROSS);
    }
    println!();

    Ok(())
}
