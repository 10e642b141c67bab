//! Cross-chapter flow check and the advisory whole-manuscript check.

use tracing::{info, warn};

use super::chapter::{ChapterRecord, join_manuscript};
use super::stage::{REPORT_ARTIFACT, chapter_artifact};
use super::{Pipeline, passes_length_guard};
use crate::errors::PipelineError;
use crate::memory::{MemoryKind, filter_kinds, render_context};
use crate::util::{char_count, leading_third_words, trailing_third_words, truncate_chars, word_count};

const FLOW_CHECK_TOKENS: u32 = 1_000;
const REPORT_TOKENS: u32 = 4_000;
const FLOW_CONTEXT_CHARS: usize = 500;
const REPORT_PREVIEW_CHARS: usize = 500;

/// A transition is fine only when the verdict says OK and nothing else of
/// substance: a long answer that happens to contain "ok" is a critique.
pub(super) fn is_flow_ok(verdict: &str, max_chars: usize) -> bool {
    let verdict = verdict.trim();
    verdict.to_uppercase().contains("OK") && char_count(verdict) < max_chars
}

impl Pipeline {
    /// Check each adjacent pair in order; a flagged later chapter is
    /// rewritten against the (possibly already corrected) earlier one.
    pub(super) async fn flow_check_stage(
        &self,
        chapters: &mut [ChapterRecord],
    ) -> Result<(), PipelineError> {
        for i in 1..chapters.len() {
            let (head, tail) = chapters.split_at_mut(i);
            let earlier = &head[i - 1];
            let later = &mut tail[0];

            if earlier.text.is_empty() || later.text.is_empty() {
                warn!(
                    earlier = earlier.number,
                    later = later.number,
                    "Missing chapter text, skipping transition"
                );
                continue;
            }
            self.ui.log_step(&format!(
                "transition {} -> {}",
                earlier.number, later.number
            ));

            let earlier_end = trailing_third_words(&earlier.text);
            let later_start = leading_third_words(&later.text);
            let hits = self
                .services
                .memory
                .search(
                    &format!(
                        "Chapter {} Chapter {} transition characters",
                        earlier.number, later.number
                    ),
                    self.services.memory.search_limit(),
                )
                .await;
            let context = render_context(
                &filter_kinds(
                    hits,
                    &[
                        MemoryKind::Outline,
                        MemoryKind::Act,
                        MemoryKind::ChapterOutline,
                    ],
                ),
                FLOW_CONTEXT_CHARS,
            );

            let verdict = self
                .services
                .generator
                .generate_capped(
                    &self
                        .templates
                        .flow_check(earlier.number, &earlier_end, &later_start, &context),
                    FLOW_CHECK_TOKENS,
                )
                .await;
            if verdict.trim().is_empty() {
                warn!(later = later.number, "No flow verdict, keeping chapter");
                continue;
            }
            if is_flow_ok(&verdict, self.settings.flow_ok_max_chars) {
                info!(earlier = earlier.number, later = later.number, "Transition OK");
                continue;
            }

            info!(later = later.number, "Transition problems, rewriting chapter");
            let fixed = self
                .services
                .writer
                .write(
                    &self
                        .templates
                        .flow_fix(&verdict, earlier.number, &earlier_end, &later.text),
                    self.writer_timeout,
                )
                .await;

            let before = word_count(&later.text);
            let after = word_count(&fixed);
            if passes_length_guard(before, after) {
                later.set_text(&fixed);
                self.store
                    .save_next(&chapter_artifact(later.number), &later.text)?;
                info!(later = later.number, words = later.words, "Transition corrected");
            } else {
                warn!(
                    later = later.number,
                    before, after, "Flow fix too short, keeping chapter"
                );
                self.ui.show_warning(&format!(
                    "transition into chapter {} left unresolved",
                    later.number
                ));
            }
        }
        Ok(())
    }

    /// Advisory report over a prefix of the manuscript. Never touches the
    /// chapters.
    pub(super) async fn manuscript_check_stage(
        &self,
        chapters: &[ChapterRecord],
    ) -> Result<(), PipelineError> {
        let texts: Vec<&str> = chapters.iter().map(|c| c.text.as_str()).collect();
        let manuscript = join_manuscript(&texts);
        let excerpt = truncate_chars(&manuscript, self.settings.manuscript_check_chars);

        self.ui.log_step("reviewing manuscript");
        let report = self
            .services
            .generator
            .generate_capped(&self.templates.manuscript_check(excerpt), REPORT_TOKENS)
            .await;
        if report.trim().is_empty() {
            warn!("Manuscript check produced no report");
            self.ui.show_warning("manuscript check produced no report");
            return Ok(());
        }

        let record = self.store.save_next(REPORT_ARTIFACT, &report)?;
        info!(path = %record.path.display(), "Manuscript report saved");
        self.services
            .gate
            .notify(&format!(
                "📊 *Manuscript report ready*\n\n{}...",
                truncate_chars(&report, REPORT_PREVIEW_CHARS)
            ))
            .await;
        Ok(())
    }
}
