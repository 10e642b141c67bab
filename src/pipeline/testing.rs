//! Doubles and a builder for exercising the orchestrator end to end.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use super::{Pipeline, ProjectRun, PromptTemplates, Services};
use crate::approval::testing::ScriptedChannel;
use crate::approval::{ApprovalGate, ConsoleMode};
use crate::errors::GenerationError;
use crate::generation::{GenerationClient, TextGenerator};
use crate::memory::MemoryStore;
use crate::quill_config::{ApprovalSettings, GenerationSettings, PipelineSettings, QuillToml};
use crate::ui::PipelineUI;
use crate::writer::WritingAgent;

/// Answers each prompt with the response of the first route whose key the
/// prompt contains, or empty. Serves as generator and writing agent.
pub struct Routed {
    routes: Vec<(String, String)>,
    pub prompts: Mutex<Vec<String>>,
}

impl Routed {
    pub fn new(routes: &[(&str, &str)]) -> Self {
        Self {
            routes: routes
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn calls_matching(&self, key: &str) -> usize {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.contains(key))
            .count()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    fn respond(&self, prompt: &str) -> String {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.routes
            .iter()
            .find(|(key, _)| prompt.contains(key.as_str()))
            .map(|(_, response)| response.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl TextGenerator for Routed {
    async fn generate_once(
        &self,
        prompt: &str,
        _max_output_tokens: u32,
    ) -> Result<String, GenerationError> {
        Ok(self.respond(prompt))
    }
}

#[async_trait]
impl WritingAgent for Routed {
    async fn write(&self, prompt: &str, _timeout: Duration) -> String {
        self.respond(prompt)
    }
}

/// `n` copies of `word` separated by spaces.
pub fn words(n: usize, word: &str) -> String {
    vec![word; n].join(" ")
}

pub struct Harness {
    pub dir: TempDir,
    pub pipeline: Pipeline,
}

pub struct HarnessBuilder {
    generator: Arc<dyn TextGenerator>,
    writer: Arc<dyn WritingAgent>,
    settings: PipelineSettings,
    channel: Option<Arc<ScriptedChannel>>,
    memory: MemoryStore,
}

impl HarnessBuilder {
    pub fn new(generator: Arc<dyn TextGenerator>, writer: Arc<dyn WritingAgent>) -> Self {
        Self {
            generator,
            writer,
            settings: PipelineSettings::default(),
            channel: None,
            memory: MemoryStore::disabled(),
        }
    }

    pub fn settings(mut self, settings: PipelineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn channel(mut self, channel: Arc<ScriptedChannel>) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn memory(mut self, memory: MemoryStore) -> Self {
        self.memory = memory;
        self
    }

    pub fn build(self) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let run = ProjectRun::create(dir.path(), "A summer on Crete").unwrap();

        let config = QuillToml {
            pipeline: self.settings,
            generation: GenerationSettings {
                retries: 1,
                ..Default::default()
            },
            ..Default::default()
        };

        let gate = match self.channel {
            Some(channel) => ApprovalGate::new(
                Some(channel),
                ApprovalSettings::default(),
                ConsoleMode::Interactive,
            ),
            None => ApprovalGate::new(None, ApprovalSettings::default(), ConsoleMode::AutoAccept),
        };

        let services = Services {
            generator: GenerationClient::new(self.generator, &config.generation),
            writer: self.writer,
            memory: self.memory,
            gate,
        };

        let pipeline = Pipeline::new(
            run,
            services,
            &config,
            PromptTemplates::default(),
            Arc::new(PipelineUI::hidden()),
        );
        Harness { dir, pipeline }
    }
}
