//! Stage orchestrator.
//!
//! A run moves strictly through [`Stage::ALL`]. The planning stages share one
//! checkpoint protocol (generate, self-critique, approve, remember); the
//! drafting stage walks the chapters in order because each chapter needs the
//! finished text of the one before it.

pub mod chapter;
mod drafting;
mod planning;
pub mod prompts;
mod protocol;
mod review;
mod runner;
pub mod stage;
#[cfg(test)]
mod testing;

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::approval::ApprovalGate;
use crate::errors::PipelineError;
use crate::generation::GenerationClient;
use crate::memory::MemoryStore;
use crate::quill_config::{PipelineSettings, QuillToml};
use crate::store::{ArtifactStore, StateLog};
use crate::ui::PipelineUI;
use crate::util::sanitize_for_path;
use crate::writer::WritingAgent;

pub use chapter::ChapterRecord;
pub use prompts::PromptTemplates;
pub use runner::RunSummary;
pub use stage::Stage;

pub const RUN_DIR_PREFIX: &str = "output_";
pub const STATE_FILE: &str = "state";
pub const LOG_FILE: &str = "pipeline.log";
pub const SUMMARY_FILE: &str = "run_summary.json";

const THEME_SLUG_CHARS: usize = 30;

/// One invocation of the pipeline for one theme.
#[derive(Debug, Clone)]
pub struct ProjectRun {
    pub id: String,
    pub theme: String,
    pub run_dir: PathBuf,
    pub started_at: DateTime<Utc>,
}

impl ProjectRun {
    /// Create a fresh `output_<timestamp>_<theme>` directory under `base`.
    /// A numeric suffix keeps two runs started in the same second apart.
    pub fn create(base: &Path, theme: &str) -> Result<Self, PipelineError> {
        let started_at = Utc::now();
        let stem = format!(
            "{}{}_{}",
            RUN_DIR_PREFIX,
            started_at.format("%Y%m%d_%H%M%S"),
            sanitize_for_path(theme, THEME_SLUG_CHARS)
        );

        let mut run_dir = base.join(&stem);
        let mut suffix = 2;
        while run_dir.exists() {
            run_dir = base.join(format!("{}_{}", stem, suffix));
            suffix += 1;
        }

        std::fs::create_dir_all(&run_dir).map_err(|source| PipelineError::ArtifactWrite {
            path: run_dir.clone(),
            source,
        })?;

        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            theme: theme.to_string(),
            run_dir,
            started_at,
        })
    }
}

/// Run directories under `base`, oldest first.
pub fn list_runs(base: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(base) else {
        return Vec::new();
    };
    let mut runs: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with(RUN_DIR_PREFIX))
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    // the timestamp in the name sorts chronologically
    runs.sort();
    runs
}

/// The external collaborators a run talks to.
pub struct Services {
    pub generator: GenerationClient,
    pub writer: Arc<dyn WritingAgent>,
    pub memory: MemoryStore,
    pub gate: ApprovalGate,
}

pub struct Pipeline {
    services: Services,
    settings: PipelineSettings,
    writer_timeout: Duration,
    approval_timeout: Duration,
    templates: PromptTemplates,
    store: ArtifactStore,
    state: StateLog,
    ui: Arc<PipelineUI>,
    run: ProjectRun,
}

impl Pipeline {
    pub fn new(
        run: ProjectRun,
        services: Services,
        config: &QuillToml,
        templates: PromptTemplates,
        ui: Arc<PipelineUI>,
    ) -> Self {
        let approval_timeout = services.gate.default_timeout();
        Self {
            store: ArtifactStore::new(&run.run_dir),
            state: StateLog::new(run.run_dir.join(STATE_FILE)),
            services,
            settings: config.pipeline.clone(),
            writer_timeout: Duration::from_secs(config.writer.timeout_secs),
            approval_timeout,
            templates,
            ui,
            run,
        }
    }
}

/// Degeneracy guard: a rewrite is kept only if it is non-empty and at least
/// half as long as what it replaces.
pub(crate) fn passes_length_guard(before: usize, after: usize) -> bool {
    after > 0 && after * 2 >= before
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_length_guard() {
        assert!(passes_length_guard(100, 50));
        assert!(passes_length_guard(100, 300));
        assert!(!passes_length_guard(100, 49));
        assert!(!passes_length_guard(0, 0));
        assert!(passes_length_guard(0, 1));
    }

    #[test]
    fn test_project_run_directory_naming() {
        let dir = tempdir().unwrap();
        let run = ProjectRun::create(dir.path(), "Enemies to lovers on Crete!").unwrap();

        let name = run.run_dir.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with(RUN_DIR_PREFIX));
        assert!(name.ends_with("_enemies_to_lovers_on_crete"));
        assert!(run.run_dir.is_dir());
        assert_eq!(run.theme, "Enemies to lovers on Crete!");
    }

    #[test]
    fn test_list_runs_ignores_other_entries() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("output_20250102_090000_b")).unwrap();
        std::fs::create_dir(dir.path().join("output_20250101_090000_a")).unwrap();
        std::fs::create_dir(dir.path().join("drafts")).unwrap();
        std::fs::write(dir.path().join("output_notes.txt"), "x").unwrap();

        let runs = list_runs(dir.path());
        assert_eq!(runs.len(), 2);
        assert!(runs[0].ends_with("output_20250101_090000_a"));
        assert!(runs[1].ends_with("output_20250102_090000_b"));
        assert!(list_runs(&dir.path().join("missing")).is_empty());
    }

    #[test]
    fn test_project_runs_never_share_a_directory() {
        let dir = tempdir().unwrap();
        let first = ProjectRun::create(dir.path(), "same").unwrap();
        let second = ProjectRun::create(dir.path(), "same").unwrap();
        assert_ne!(first.run_dir, second.run_dir);
        assert_ne!(first.id, second.id);
    }
}
