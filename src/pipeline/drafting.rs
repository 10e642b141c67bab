//! Per-chapter draft, enrich and polish loop.

use tracing::{error, info, warn};

use super::chapter::ChapterRecord;
use super::stage::chapter_artifact;
use super::{Pipeline, passes_length_guard};
use crate::errors::PipelineError;
use crate::memory::{MemoryKind, MemoryMetadata, filter_kinds, render_context};
use crate::util::{tail_words, word_count};

const POLISH_CRITIQUE_TOKENS: u32 = 2_000;
const DRAFT_CONTEXT_CHARS: usize = 800;

impl Pipeline {
    /// Draft every chapter in ascending order. A chapter the writing agent
    /// could not produce is left empty and the run moves on.
    pub(super) async fn drafting_stage(
        &self,
        chapters: &mut [ChapterRecord],
        characters: &str,
        acts: &[String],
    ) -> Result<(), PipelineError> {
        let total = chapters.len();
        self.ui.start_chapters(total as u64);
        let mut previous_text = String::new();

        for (idx, chapter) in chapters.iter_mut().enumerate() {
            let act_text = acts
                .get(chapter.act as usize - 1)
                .map(String::as_str)
                .unwrap_or_default();

            self.draft_chapter(chapter, characters, act_text, &previous_text)
                .await?;

            if chapter.text.is_empty() {
                error!(chapter = chapter.number, "Chapter could not be written, continuing");
                self.ui.chapter_failed(chapter.number, "no text produced");
            } else {
                previous_text = chapter.text.clone();
                self.ui
                    .chapter_done(chapter.number, chapter.words, chapter.target_words);
                self.services
                    .memory
                    .store(
                        &chapter.text,
                        &MemoryMetadata::new(&self.run.id, MemoryKind::ChapterText)
                            .act(chapter.act)
                            .chapter(chapter.number)
                            .words(chapter.words),
                    )
                    .await;
            }

            let done = idx + 1;
            let every = self.settings.progress_every as usize;
            if every > 0 && done % every == 0 {
                self.services
                    .gate
                    .notify(&format!("📝 Chapter {}/{} done", done, total))
                    .await;
            }
        }

        self.ui.finish_chapters();
        Ok(())
    }

    /// Draft, enrich at most once when short, then polish.
    async fn draft_chapter(
        &self,
        chapter: &mut ChapterRecord,
        characters: &str,
        act_text: &str,
        previous_text: &str,
    ) -> Result<(), PipelineError> {
        let artifact = chapter_artifact(chapter.number);
        let previous_tail = if chapter.number > 1 {
            tail_words(previous_text, self.settings.continuity_words)
        } else {
            String::new()
        };
        let memory_context = self.drafting_context(chapter).await;

        self.ui
            .chapter_step(chapter.number, &chapter.title, "drafting");
        let prompt = self.templates.draft(
            chapter,
            characters,
            act_text,
            &previous_tail,
            &memory_context,
        );
        let mut text = self
            .services
            .writer
            .write(&prompt, self.writer_timeout)
            .await;
        if text.trim().is_empty() {
            warn!(chapter = chapter.number, "Writing agent returned nothing");
            return Ok(());
        }
        self.store.save_next(&artifact, &text)?;

        let words = word_count(&text);
        info!(
            chapter = chapter.number,
            words,
            target = chapter.target_words,
            "Drafted"
        );

        let threshold = chapter.target_words as f64 * self.settings.enrich_threshold;
        if (words as f64) < threshold {
            self.ui
                .chapter_step(chapter.number, &chapter.title, "enriching");
            info!(chapter = chapter.number, words, target = chapter.target_words, "Too short, enriching");
            let enriched = self
                .services
                .writer
                .write(
                    &self
                        .templates
                        .enrich(characters, &text, words, chapter.target_words),
                    self.writer_timeout,
                )
                .await;
            if enriched.trim().is_empty() {
                warn!(chapter = chapter.number, "Enrichment returned nothing, keeping draft");
            } else {
                text = enriched;
                self.store.save_next(&artifact, &text)?;
                info!(chapter = chapter.number, words = word_count(&text), "Enriched");
            }
        }

        text = self.polish(chapter, &artifact, text).await?;

        chapter.set_text(&text);
        if chapter.text != text {
            self.store.save(&artifact, None, &chapter.text)?;
        }
        Ok(())
    }

    /// Critique with the generator, rewrite with the writing agent. The
    /// rewrite replaces the text only if it passes the length guard.
    async fn polish(
        &self,
        chapter: &ChapterRecord,
        artifact: &str,
        text: String,
    ) -> Result<String, PipelineError> {
        self.ui
            .chapter_step(chapter.number, &chapter.title, "polishing");

        let critique = self
            .services
            .generator
            .generate_capped(&self.templates.polish_critique(&text), POLISH_CRITIQUE_TOKENS)
            .await;
        if critique.trim().is_empty() {
            warn!(chapter = chapter.number, "No critique available, skipping polish");
            return Ok(text);
        }

        let polished = self
            .services
            .writer
            .write(
                &self.templates.polish_rewrite(&critique, &text),
                self.writer_timeout,
            )
            .await;

        let before = word_count(&text);
        let after = word_count(&polished);
        if passes_length_guard(before, after) {
            self.store.save_next(artifact, &polished)?;
            info!(chapter = chapter.number, words = after, "Polished");
            Ok(polished)
        } else {
            warn!(
                chapter = chapter.number,
                before, after, "Polish too short, keeping pre-polish version"
            );
            Ok(text)
        }
    }

    async fn drafting_context(&self, chapter: &ChapterRecord) -> String {
        let hits = self
            .services
            .memory
            .search(
                &format!("Chapter {} {}", chapter.number, chapter.title),
                self.services.memory.search_limit(),
            )
            .await;
        render_context(
            &filter_kinds(hits, &[MemoryKind::Outline, MemoryKind::Act]),
            DRAFT_CONTEXT_CHARS,
        )
    }
}
