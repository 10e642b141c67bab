//! The checkpoint protocol shared by the planning stages.

use tracing::{info, warn};

use super::{Pipeline, passes_length_guard};
use crate::approval::{ApprovalOutcome, ApprovalRequest};
use crate::errors::PipelineError;
use crate::memory::MemoryMetadata;
use crate::util::char_count;

/// What a checkpoint produces and how it is remembered.
pub(super) struct Checkpoint<'a> {
    /// Artifact name in the store
    pub artifact: &'a str,
    /// Human-readable name used in critique prompts and logs
    pub label: &'a str,
    pub critique_iterations: u32,
    pub max_output_tokens: u32,
    /// Memory metadata; `approved` is added on acceptance
    pub memory: MemoryMetadata,
}

impl Pipeline {
    /// Generate an artifact and run bounded self-critique over it.
    ///
    /// The first result is saved as the next revision, then each critique
    /// pass that survives the length guard becomes a new revision. Returns
    /// empty when the first generation produced nothing.
    pub(super) async fn produce(
        &self,
        artifact: &str,
        label: &str,
        critique_iterations: u32,
        max_output_tokens: u32,
        prompt: &str,
    ) -> Result<String, PipelineError> {
        self.ui.log_step(&format!("generating {}", label));
        let mut current = self
            .services
            .generator
            .generate_capped(prompt, max_output_tokens)
            .await;
        if current.trim().is_empty() {
            warn!(artifact, "Generation produced nothing");
            return Ok(String::new());
        }
        let record = self.store.save_next(artifact, &current)?;
        info!(artifact, revision = ?record.revision, chars = record.chars, "First version");

        for pass in 1..=critique_iterations {
            self.ui.log_step(&format!(
                "self-critique {}/{} of {}",
                pass, critique_iterations, label
            ));
            let revised = self
                .services
                .generator
                .generate_capped(&self.templates.critique(label, &current), max_output_tokens)
                .await;

            if passes_length_guard(char_count(&current), char_count(&revised)) {
                current = revised;
                let record = self.store.save_next(artifact, &current)?;
                info!(artifact, pass, revision = ?record.revision, chars = record.chars, "Revised");
            } else {
                warn!(
                    artifact,
                    pass,
                    before = char_count(&current),
                    after = char_count(&revised),
                    "Revision too short, keeping previous version"
                );
            }
        }

        Ok(current)
    }

    /// Produce an artifact, then loop on human approval.
    ///
    /// Each rejection appends its feedback to the prompt and regenerates, at
    /// most `max_rejections` times; after that the latest version is used
    /// anyway. An accepted (or timed-out) artifact is stored in memory with
    /// the approved flag.
    pub(super) async fn checkpoint<P, S>(
        &self,
        checkpoint: Checkpoint<'_>,
        build_prompt: P,
        summarize: S,
    ) -> Result<String, PipelineError>
    where
        P: Fn(&[String]) -> String,
        S: Fn(&str) -> String,
    {
        let mut feedback: Vec<String> = Vec::new();
        let mut latest: Option<String> = None;
        let mut rejections = 0;

        loop {
            let produced = self
                .produce(
                    checkpoint.artifact,
                    checkpoint.label,
                    checkpoint.critique_iterations,
                    checkpoint.max_output_tokens,
                    &build_prompt(&feedback),
                )
                .await?;

            let current = if produced.trim().is_empty() {
                match latest.take() {
                    Some(previous) => {
                        warn!(artifact = checkpoint.artifact, "Regeneration failed, keeping previous version");
                        self.ui.show_warning(&format!(
                            "{} regeneration failed, keeping previous version",
                            checkpoint.label
                        ));
                        previous
                    }
                    None => {
                        return Err(PipelineError::StageProducedNothing {
                            stage: checkpoint.label.to_string(),
                        });
                    }
                }
            } else {
                produced
            };
            latest = Some(current.clone());

            self.ui.show_waiting(checkpoint.label, self.approval_timeout);
            let outcome = self
                .services
                .gate
                .request(ApprovalRequest {
                    message: summarize(&current),
                    attachment: Some(self.store.current_path(checkpoint.artifact)),
                    timeout: self.approval_timeout,
                })
                .await;

            match outcome {
                ApprovalOutcome::Accepted | ApprovalOutcome::TimedOut => {
                    if outcome == ApprovalOutcome::TimedOut {
                        self.ui.show_warning(&format!(
                            "no answer on {}, proceeding as approved",
                            checkpoint.label
                        ));
                    }
                    info!(artifact = checkpoint.artifact, ?outcome, "Checkpoint passed");
                    self.services
                        .memory
                        .store(&current, &checkpoint.memory.clone().approved())
                        .await;
                    return Ok(current);
                }
                ApprovalOutcome::Rejected { feedback: reason } => {
                    rejections += 1;
                    if rejections > self.settings.max_rejections {
                        warn!(
                            artifact = checkpoint.artifact,
                            rejections, "Rejection limit reached, proceeding with latest version"
                        );
                        self.ui.show_warning(&format!(
                            "{} rejected {} times, proceeding with latest version",
                            checkpoint.label, rejections
                        ));
                        self.services
                            .memory
                            .store(&current, &checkpoint.memory)
                            .await;
                        return Ok(current);
                    }
                    info!(
                        artifact = checkpoint.artifact,
                        rejections,
                        max = self.settings.max_rejections,
                        "Rejected, regenerating with feedback"
                    );
                    feedback.push(reason);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::stage::OUTLINE_ARTIFACT;
    use super::super::testing::{HarnessBuilder, Routed};
    use crate::approval::testing::ScriptedChannel;
    use crate::errors::PipelineError;
    use crate::generation::testing::ScriptedGenerator;
    use crate::memory::MemoryStore;
    use crate::memory::testing::{FakeEmbedder, InMemoryIndex};
    use crate::quill_config::{MemorySettings, PipelineSettings};
    use std::sync::Arc;

    const OUTLINE: &str = "Working title: Salt and Stars\n\n## Main Characters\nMara, an archaeologist on Crete.";

    fn settings(critique_iterations: u32, max_rejections: u32) -> PipelineSettings {
        PipelineSettings {
            critique_iterations,
            max_rejections,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_degenerate_critique_keeps_previous_revision() {
        let generator = Arc::new(Routed::new(&[
            ("The current outline:", "too short"),
            ("TASK: Write a DETAILED outline", OUTLINE),
        ]));
        let harness = HarnessBuilder::new(generator.clone(), Arc::new(Routed::new(&[])))
            .settings(settings(2, 3))
            .build();
        let pipeline = &harness.pipeline;

        let outline = pipeline.outline_stage().await.unwrap();

        assert_eq!(outline, OUTLINE);
        assert_eq!(generator.calls_matching("The current outline:"), 2);
        assert_eq!(pipeline.store.revisions(OUTLINE_ARTIFACT), vec![1]);
        assert_eq!(pipeline.store.read_current(OUTLINE_ARTIFACT).unwrap(), OUTLINE);
    }

    #[tokio::test]
    async fn test_accepted_critique_becomes_new_revision() {
        let revised = format!("{}\nThe threat escalates twice.", OUTLINE);
        let generator = Arc::new(Routed::new(&[
            ("The current outline:", revised.as_str()),
            ("TASK: Write a DETAILED outline", OUTLINE),
        ]));
        let harness = HarnessBuilder::new(generator, Arc::new(Routed::new(&[])))
            .settings(settings(1, 3))
            .build();
        let store = &harness.pipeline.store;

        let outline = harness.pipeline.outline_stage().await.unwrap();

        assert_eq!(outline, revised);
        assert_eq!(store.revisions(OUTLINE_ARTIFACT), vec![1, 2]);
        assert_eq!(store.read_revision(OUTLINE_ARTIFACT, 1).unwrap(), OUTLINE);
        assert_eq!(store.read_current(OUTLINE_ARTIFACT).unwrap(), revised);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejections_are_bounded_and_feedback_accumulates() {
        let generator = Arc::new(Routed::new(&[("TASK: Write a DETAILED outline", OUTLINE)]));
        let channel = Arc::new(ScriptedChannel::replying(&[
            "nein more drama",
            "NEIN darker antagonist",
            "no still not right",
            "ja",
        ]));
        let harness = HarnessBuilder::new(generator.clone(), Arc::new(Routed::new(&[])))
            .settings(settings(0, 2))
            .channel(channel.clone())
            .build();

        let outline = harness.pipeline.outline_stage().await.unwrap();
        assert_eq!(outline, OUTLINE);

        // two regenerations after the first attempt, then proceed anyway
        let prompts = generator.prompts.lock().unwrap().clone();
        assert_eq!(prompts.len(), 3);
        assert!(!prompts[0].contains("REVISION REQUESTS"));
        assert!(prompts[2].contains("- more drama\n- darker antagonist"));
        assert_eq!(
            harness.pipeline.store.revisions(OUTLINE_ARTIFACT),
            vec![1, 2, 3]
        );

        // the fourth reply was never consumed
        assert_eq!(channel.polled_with.lock().unwrap().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unanswered_checkpoint_proceeds_as_approved() {
        let generator = Arc::new(Routed::new(&[("TASK: Write a DETAILED outline", OUTLINE)]));
        let channel = Arc::new(ScriptedChannel::new(Some(1), vec![]));
        let index = Arc::new(InMemoryIndex::default());
        let memory = MemoryStore::new(
            Arc::new(FakeEmbedder::new()),
            index.clone(),
            &MemorySettings::default(),
        );
        let harness = HarnessBuilder::new(generator.clone(), Arc::new(Routed::new(&[])))
            .settings(settings(0, 3))
            .channel(channel.clone())
            .memory(memory)
            .build();

        let outline = harness.pipeline.outline_stage().await.unwrap();

        assert_eq!(outline, OUTLINE);
        assert_eq!(generator.call_count(), 1);
        assert_eq!(harness.pipeline.store.revisions(OUTLINE_ARTIFACT), vec![1]);
        assert!(!channel.polled_with.lock().unwrap().is_empty());

        let points = index.points.lock().unwrap();
        assert_eq!(points.len(), 1);
        let record = points.values().next().unwrap();
        assert_eq!(record["kind"], "outline");
        assert_eq!(record["approved"], true);
        assert_eq!(record["content"], OUTLINE);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_regeneration_falls_back_to_previous_version() {
        let generator = Arc::new(ScriptedGenerator::new(vec![
            Ok(OUTLINE.to_string()),
            Ok(String::new()),
        ]));
        let channel = Arc::new(ScriptedChannel::replying(&["nein again", "ja"]));
        let harness = HarnessBuilder::new(generator.clone(), Arc::new(Routed::new(&[])))
            .settings(settings(0, 3))
            .channel(channel)
            .build();

        let outline = harness.pipeline.outline_stage().await.unwrap();
        assert_eq!(outline, OUTLINE);
        assert_eq!(generator.call_count(), 2);
        assert_eq!(harness.pipeline.store.revisions(OUTLINE_ARTIFACT), vec![1]);
    }

    #[tokio::test]
    async fn test_nothing_generated_is_an_error() {
        let harness =
            HarnessBuilder::new(Arc::new(Routed::new(&[])), Arc::new(Routed::new(&[]))).build();

        let err = harness.pipeline.outline_stage().await.unwrap_err();
        assert!(matches!(err, PipelineError::StageProducedNothing { .. }));
    }
}
