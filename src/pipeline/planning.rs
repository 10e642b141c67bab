//! Outline, act breakdown and chapter outline stages.

use tracing::{info, warn};

use super::Pipeline;
use super::chapter::{ChapterRecord, heading_list, plan_chapters};
use super::prompts::act_description;
use super::protocol::Checkpoint;
use super::stage::{
    CHAPTER_OVERVIEW_ARTIFACT, OUTLINE_ARTIFACT, act_artifact, chapter_outline_artifact,
};
use crate::approval::{ApprovalOutcome, ApprovalRequest};
use crate::errors::PipelineError;
use crate::memory::{MemoryKind, MemoryMetadata};
use crate::util::{char_count, truncate_chars};

const OUTLINE_TOKENS: u32 = 12_000;
const ACT_TOKENS: u32 = 8_000;
const CHAPTER_OUTLINE_TOKENS: u32 = 4_000;
const ACT_SUMMARY_HEADINGS: usize = 10;
const OVERVIEW_TITLE_CHARS: usize = 50;

impl Pipeline {
    pub(super) async fn outline_stage(&self) -> Result<String, PipelineError> {
        let theme = self.run.theme.as_str();
        self.checkpoint(
            Checkpoint {
                artifact: OUTLINE_ARTIFACT,
                label: "outline",
                critique_iterations: self.settings.critique_iterations,
                max_output_tokens: OUTLINE_TOKENS,
                memory: MemoryMetadata::new(&self.run.id, MemoryKind::Outline),
            },
            |feedback| self.templates.outline(theme, feedback),
            |outline| format!("📋 *OUTLINE*\n\n{}", outline),
        )
        .await
    }

    pub(super) async fn acts_stage(&self, outline: &str) -> Result<Vec<String>, PipelineError> {
        let total = self.settings.acts;
        let mut acts = Vec::with_capacity(total as usize);

        for act in 1..=total {
            let description = act_description(act, total);
            info!(act, total, description = %description, "Act breakdown");
            let artifact = act_artifact(act);

            let text = self
                .checkpoint(
                    Checkpoint {
                        artifact: &artifact,
                        label: "act outline",
                        critique_iterations: self.settings.critique_iterations,
                        max_output_tokens: ACT_TOKENS,
                        memory: MemoryMetadata::new(&self.run.id, MemoryKind::Act).act(act),
                    },
                    |feedback| self.templates.act(outline, act, &description, feedback),
                    |text| act_summary(act, total, &description, text),
                )
                .await?;
            acts.push(text);
        }

        Ok(acts)
    }

    /// Number the chapters, outline each one, then ask for approval of the
    /// overview. A rejection regenerates every outline with the feedback.
    pub(super) async fn chapter_outlines_stage(
        &self,
        outline: &str,
        characters: &str,
        acts: &[String],
    ) -> Result<Vec<ChapterRecord>, PipelineError> {
        let default_target = self.settings.default_target_words;
        let mut feedback: Vec<String> = Vec::new();
        let mut rejections = 0;

        loop {
            let mut chapters = plan_chapters(
                acts,
                self.settings.fallback_chapters_per_act,
                default_target,
            );
            info!(chapters = chapters.len(), "Chapter plan");

            for chapter in chapters.iter_mut() {
                let act_text = acts
                    .get(chapter.act as usize - 1)
                    .map(String::as_str)
                    .unwrap_or_default();
                let artifact = chapter_outline_artifact(chapter.number);
                let prompt = self.templates.chapter_outline(
                    outline,
                    characters,
                    act_text,
                    chapter,
                    default_target,
                    &feedback,
                );

                let mut text = self
                    .produce(
                        &artifact,
                        "chapter outline",
                        self.settings.chapter_outline_critique_iterations,
                        CHAPTER_OUTLINE_TOKENS,
                        &prompt,
                    )
                    .await?;
                if text.trim().is_empty() {
                    warn!(chapter = chapter.number, "No chapter outline, using placeholder");
                    text = placeholder_outline(chapter);
                    self.store.save_next(&artifact, &text)?;
                }

                chapter.set_outline(text, default_target);
                info!(
                    chapter = chapter.number,
                    target_words = chapter.target_words,
                    chars = char_count(&chapter.outline),
                    "Chapter outlined"
                );
                self.services
                    .memory
                    .store(
                        &chapter.outline,
                        &MemoryMetadata::new(&self.run.id, MemoryKind::ChapterOutline)
                            .act(chapter.act)
                            .chapter(chapter.number),
                    )
                    .await;
            }

            let overview = chapter_overview(&chapters);
            self.store.save(CHAPTER_OVERVIEW_ARTIFACT, None, &overview)?;

            self.ui.show_waiting("chapter structure", self.approval_timeout);
            let outcome = self
                .services
                .gate
                .request(ApprovalRequest {
                    message: format!(
                        "📚 *CHAPTER STRUCTURE*\n\n{}\n\n*{} chapters total*",
                        overview,
                        chapters.len()
                    ),
                    attachment: Some(self.store.current_path(CHAPTER_OVERVIEW_ARTIFACT)),
                    timeout: self.approval_timeout,
                })
                .await;

            match outcome {
                ApprovalOutcome::Rejected { feedback: reason } => {
                    rejections += 1;
                    if rejections > self.settings.max_rejections {
                        warn!(rejections, "Rejection limit reached, keeping chapter outlines");
                        return Ok(chapters);
                    }
                    info!(rejections, "Chapter structure rejected, regenerating outlines");
                    feedback.push(reason);
                }
                _ => return Ok(chapters),
            }
        }
    }
}

fn act_summary(act: u32, total: u32, description: &str, text: &str) -> String {
    let headings = heading_list(text, ACT_SUMMARY_HEADINGS);
    let headings = if headings.is_empty() {
        "  (no chapter headings found)".to_string()
    } else {
        headings
    };
    format!(
        "📋 *ACT {}/{}*\n\n{}\n\n*Chapters:*\n{}\n\n_({} characters)_",
        act,
        total,
        description,
        headings,
        char_count(text)
    )
}

fn chapter_overview(chapters: &[ChapterRecord]) -> String {
    chapters
        .iter()
        .map(|c| {
            format!(
                "Chapter {}: {}",
                c.number,
                truncate_chars(&c.title, OVERVIEW_TITLE_CHARS)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn placeholder_outline(chapter: &ChapterRecord) -> String {
    format!(
        "# Chapter {}: {}\n\nNo detailed outline is available. Follow the act outline for this chapter.",
        chapter.number, chapter.title
    )
}
