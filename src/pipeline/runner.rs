use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::path::PathBuf;
use tracing::{error, info};

use super::chapter::{ChapterRecord, extract_character_sections, extract_title, join_manuscript};
use super::stage::{MANUSCRIPT_ARTIFACT, Stage};
use super::{Pipeline, SUMMARY_FILE};
use crate::errors::PipelineError;
use crate::store::StageStatus;

/// Written to `run_summary.json` when a run finishes.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub theme: String,
    pub title: String,
    pub run_dir: PathBuf,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub chapter_count: usize,
    pub total_words: usize,
    pub chapters: Vec<ChapterRecord>,
}

impl Pipeline {
    /// Run every stage in order.
    ///
    /// Any error ends the run: the failing stage is marked in the state log,
    /// a failure notification goes out, and the error is returned.
    pub async fn run(&self) -> Result<RunSummary, PipelineError> {
        info!(
            run_id = %self.run.id,
            theme = %self.run.theme,
            dir = %self.run.run_dir.display(),
            "Starting run"
        );
        self.services
            .gate
            .notify(&format!(
                "🚀 *Pipeline started*\n\n📖 {}\n📁 {}",
                self.run.theme,
                self.run.run_dir.display()
            ))
            .await;

        match self.run_stages().await {
            Ok(summary) => Ok(summary),
            Err(e) => {
                error!(error = %e, "Run failed");
                self.services
                    .gate
                    .notify(&format!("❌ *Pipeline failed*\n\n{}", e))
                    .await;
                Err(e)
            }
        }
    }

    async fn run_stages(&self) -> Result<RunSummary, PipelineError> {
        let outline = self.in_stage(Stage::Outline, self.outline_stage()).await?;
        let title = extract_title(&outline);
        let characters = extract_character_sections(&outline);
        info!(title = %title, "Working title");

        let acts = self
            .in_stage(Stage::Acts, self.acts_stage(&outline))
            .await?;

        let mut chapters = self
            .in_stage(
                Stage::ChapterOutlines,
                self.chapter_outlines_stage(&outline, &characters, &acts),
            )
            .await?;

        self.in_stage(
            Stage::Drafting,
            self.drafting_stage(&mut chapters, &characters, &acts),
        )
        .await?;

        self.in_stage(Stage::FlowCheck, self.flow_check_stage(&mut chapters))
            .await?;

        self.in_stage(
            Stage::ManuscriptCheck,
            self.manuscript_check_stage(&chapters),
        )
        .await?;

        self.in_stage(Stage::Finalize, self.finalize(title, chapters))
            .await
    }

    /// Bracket a stage with state-log entries, UI updates and a start
    /// notification. The stage future is lazy, so nothing runs before the
    /// `started` entry is written.
    async fn in_stage<T, F>(&self, stage: Stage, work: F) -> Result<T, PipelineError>
    where
        F: Future<Output = Result<T, PipelineError>>,
    {
        self.state.record(stage.name(), StageStatus::Started)?;
        self.ui.start_stage(stage);
        info!(stage = %stage, "Stage started");
        self.services
            .gate
            .notify(&format!(
                "▶️ *Stage {}/{}:* {}",
                stage.ordinal(),
                Stage::ALL.len(),
                stage.title()
            ))
            .await;

        match work.await {
            Ok(value) => {
                self.state.record(stage.name(), StageStatus::Completed)?;
                self.ui.stage_complete(stage);
                info!(stage = %stage, "Stage completed");
                Ok(value)
            }
            Err(e) => {
                if let Err(log_err) = self.state.record(stage.name(), StageStatus::Failed) {
                    error!(error = %log_err, "Could not record stage failure");
                }
                self.ui.stage_failed(stage, &e.to_string());
                Err(e)
            }
        }
    }

    /// Assemble and persist the manuscript, write the run summary and send
    /// the completion notice.
    async fn finalize(
        &self,
        title: String,
        chapters: Vec<ChapterRecord>,
    ) -> Result<RunSummary, PipelineError> {
        let texts: Vec<&str> = chapters.iter().map(|c| c.text.as_str()).collect();
        let manuscript = join_manuscript(&texts);
        let record = self.store.save(MANUSCRIPT_ARTIFACT, None, &manuscript)?;
        let total_words: usize = chapters.iter().map(|c| c.words).sum();
        info!(
            path = %record.path.display(),
            chapters = chapters.len(),
            total_words,
            "Manuscript written"
        );

        let summary = RunSummary {
            run_id: self.run.id.clone(),
            theme: self.run.theme.clone(),
            title,
            run_dir: self.run.run_dir.clone(),
            started_at: self.run.started_at,
            finished_at: Utc::now(),
            chapter_count: chapters.len(),
            total_words,
            chapters,
        };

        let summary_path = self.run.run_dir.join(SUMMARY_FILE);
        let json = serde_json::to_string_pretty(&summary)
            .map_err(|e| PipelineError::Other(e.into()))?;
        std::fs::write(&summary_path, json).map_err(|source| PipelineError::ArtifactWrite {
            path: summary_path.clone(),
            source,
        })?;

        let elapsed = (summary.finished_at - summary.started_at).num_seconds().max(0);
        self.services
            .gate
            .notify(&format!(
                "✅ *Pipeline finished*\n\n📖 {}\n📊 {} words\n📚 {} chapters\n⏱ {}h {}m\n📁 {}",
                summary.title,
                summary.total_words,
                summary.chapter_count,
                elapsed / 3600,
                (elapsed % 3600) / 60,
                summary.run_dir.display()
            ))
            .await;
        self.ui.print_summary(
            &summary.title,
            summary.chapter_count,
            summary.total_words,
            &summary.run_dir,
        );

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::super::chapter::split_manuscript;
    use super::super::stage::{OUTLINE_ARTIFACT, REPORT_ARTIFACT, chapter_artifact};
    use super::super::testing::{HarnessBuilder, Routed, words};
    use super::*;
    use crate::memory::MemoryStore;
    use crate::memory::testing::{FakeEmbedder, InMemoryIndex};
    use crate::quill_config::{MemorySettings, PipelineSettings};
    use std::sync::Arc;

    const OUTLINE: &str = "Working title: Salt and Stars\n\n## Main Characters\nMara, an archaeologist.";
    const OUTLINE_REVISED: &str = "Working title: Salt and Stars\n\n## Main Characters\nMara, an archaeologist who lost her map.";
    const ACT: &str = "Chapter 1: Arrival\nChapter 2: Storm";

    fn small_novel() -> PipelineSettings {
        PipelineSettings {
            critique_iterations: 1,
            chapter_outline_critique_iterations: 0,
            acts: 1,
            default_target_words: 40,
            ..Default::default()
        }
    }

    fn generator() -> Arc<Routed> {
        Arc::new(Routed::new(&[
            ("The current outline:", OUTLINE_REVISED),
            ("The current act outline:", ACT),
            ("TASK: Write a DETAILED outline", OUTLINE),
            ("TASK: Detailed outline for ACT", ACT),
            ("DETAILED scene outline for CHAPTER", "Scenes for the chapter."),
            ("Check this novel text for", "Fewer adverbs."),
            ("Check the transition", "OK"),
            ("Review this novel for", "Solid manuscript."),
        ]))
    }

    fn writer() -> Arc<Routed> {
        let polished = words(34, "polished");
        let rich = words(35, "rich");
        let draft = words(10, "draft");
        Arc::new(Routed::new(&[
            ("COMPLETE CORRECTED CHAPTER", ""),
            ("Apply the feedback", polished.as_str()),
            ("Output the COMPLETE enriched text", rich.as_str()),
            ("BEGIN NOW", draft.as_str()),
        ]))
    }

    #[tokio::test]
    async fn test_full_run_produces_manuscript_and_summary() {
        let writer = writer();
        let index = Arc::new(InMemoryIndex::default());
        let memory = MemoryStore::new(
            Arc::new(FakeEmbedder::new()),
            index.clone(),
            &MemorySettings::default(),
        );
        let harness = HarnessBuilder::new(generator(), writer.clone())
            .settings(small_novel())
            .memory(memory)
            .build();
        let pipeline = &harness.pipeline;

        let summary = pipeline.run().await.unwrap();

        assert_eq!(summary.title, "Salt and Stars");
        assert_eq!(summary.chapter_count, 2);
        assert_eq!(summary.total_words, 68);
        assert_eq!(summary.chapters[0].title, "Arrival");
        assert_eq!(summary.chapters[1].title, "Storm");

        // draft, enrichment, polish
        assert_eq!(pipeline.store.revisions(&chapter_artifact(1)), vec![1, 2, 3]);
        assert_eq!(pipeline.store.revisions(OUTLINE_ARTIFACT), vec![1, 2]);
        assert_eq!(pipeline.store.revisions(REPORT_ARTIFACT), vec![1]);
        assert_eq!(writer.call_count(), 6);
        assert_eq!(writer.calls_matching("COMPLETE CORRECTED CHAPTER"), 0);

        let manuscript = pipeline.store.read_current(MANUSCRIPT_ARTIFACT).unwrap();
        let chapters = split_manuscript(&manuscript);
        assert_eq!(chapters.len(), 2);
        assert_eq!(chapters[0], summary.chapters[0].text);
        assert_eq!(chapters[1], words(34, "polished"));

        let entries = pipeline.state.entries().unwrap();
        assert_eq!(entries.len(), 14);
        assert!(!pipeline.state.has_failure());
        assert_eq!(pipeline.state.last_completed().as_deref(), Some("finalize"));

        let json = std::fs::read_to_string(pipeline.run.run_dir.join(SUMMARY_FILE)).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["total_words"], 68);
        assert!(parsed["chapters"][0].get("text").is_none());

        // outline, act, two chapter outlines, two chapter texts
        assert_eq!(index.points.lock().unwrap().len(), 6);
    }

    #[tokio::test]
    async fn test_failed_stage_is_recorded() {
        let harness =
            HarnessBuilder::new(Arc::new(Routed::new(&[])), Arc::new(Routed::new(&[]))).build();
        let pipeline = &harness.pipeline;

        let err = pipeline.run().await.unwrap_err();
        assert!(matches!(err, PipelineError::StageProducedNothing { .. }));

        let entries = pipeline.state.entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].stage, "outline");
        assert_eq!(entries[1].status, StageStatus::Failed);
        assert!(pipeline.state.has_failure());
        assert!(!pipeline.run.run_dir.join(SUMMARY_FILE).exists());
    }
}
