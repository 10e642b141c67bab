//! Generation client: bounded retry around a remote text-generation service.
//!
//! The [`TextGenerator`] trait is a single attempt against the service.
//! [`GenerationClient`] adds the retry policy: linear backoff
//! (`base_delay * attempt`) between failed attempts, and an empty string once
//! the retry budget is exhausted. Callers treat empty as "nothing usable".

pub mod gemini;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::errors::GenerationError;
use crate::quill_config::GenerationSettings;

pub use gemini::GeminiGenerator;

/// One request/response exchange with a text-generation service.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate_once(
        &self,
        prompt: &str,
        max_output_tokens: u32,
    ) -> Result<String, GenerationError>;
}

#[derive(Clone)]
pub struct GenerationClient {
    backend: Arc<dyn TextGenerator>,
    max_output_tokens: u32,
    retries: u32,
    base_delay: Duration,
}

impl GenerationClient {
    pub fn new(backend: Arc<dyn TextGenerator>, settings: &GenerationSettings) -> Self {
        Self {
            backend,
            max_output_tokens: settings.max_output_tokens,
            retries: settings.retries,
            base_delay: Duration::from_secs(settings.base_delay_secs),
        }
    }

    /// Generate with the configured output size and retry budget.
    pub async fn generate(&self, prompt: &str) -> String {
        self.generate_with(prompt, self.max_output_tokens, self.retries)
            .await
    }

    /// Generate with a smaller output cap than the configured one.
    pub async fn generate_capped(&self, prompt: &str, max_output_tokens: u32) -> String {
        self.generate_with(
            prompt,
            max_output_tokens.min(self.max_output_tokens),
            self.retries,
        )
        .await
    }

    /// Generate, retrying failed attempts up to `retry_budget` total attempts.
    ///
    /// Never fails: exhaustion yields an empty string.
    #[tracing::instrument(skip(self, prompt), fields(prompt_chars = prompt.len()))]
    pub async fn generate_with(
        &self,
        prompt: &str,
        max_output_tokens: u32,
        retry_budget: u32,
    ) -> String {
        for attempt in 1..=retry_budget {
            match self.backend.generate_once(prompt, max_output_tokens).await {
                Ok(text) => {
                    debug!(attempt, chars = text.len(), "Generation succeeded");
                    return text;
                }
                Err(e) => {
                    warn!(attempt, retry_budget, error = %e, "Generation attempt failed");
                    if attempt < retry_budget {
                        tokio::time::sleep(self.base_delay * attempt).await;
                    }
                }
            }
        }

        warn!(retry_budget, "Generation retries exhausted, returning empty result");
        String::new()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::time::Instant;

    /// Scripted generator: pops one response per call, then answers empty.
    /// Records the prompt and call instant of every attempt.
    pub struct ScriptedGenerator {
        responses: Mutex<VecDeque<Result<String, GenerationError>>>,
        pub prompts: Mutex<Vec<String>>,
        pub calls: Mutex<Vec<Instant>>,
    }

    impl ScriptedGenerator {
        pub fn new(responses: Vec<Result<String, GenerationError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                prompts: Mutex::new(Vec::new()),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl TextGenerator for ScriptedGenerator {
        async fn generate_once(
            &self,
            prompt: &str,
            _max_output_tokens: u32,
        ) -> Result<String, GenerationError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.calls.lock().unwrap().push(Instant::now());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(String::new()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::ScriptedGenerator;
    use super::*;

    fn client(generator: Arc<ScriptedGenerator>, retries: u32) -> GenerationClient {
        let settings = GenerationSettings {
            retries,
            base_delay_secs: 5,
            ..Default::default()
        };
        GenerationClient::new(generator, &settings)
    }

    fn transport_like() -> GenerationError {
        GenerationError::Status {
            status: 503,
            body: "unavailable".into(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_third_attempt_succeeds_after_increasing_backoff() {
        let generator = Arc::new(ScriptedGenerator::new(vec![
            Err(transport_like()),
            Err(GenerationError::Blocked {
                finish_reason: "MAX_TOKENS".into(),
            }),
            Ok("chapter text".into()),
        ]));
        let client = client(generator.clone(), 3);

        let text = client.generate("write").await;
        assert_eq!(text, "chapter text");

        let calls = generator.calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 3);
        let first_gap = calls[1] - calls[0];
        let second_gap = calls[2] - calls[1];
        assert_eq!(first_gap, Duration::from_secs(5));
        assert_eq!(second_gap, Duration::from_secs(10));
        assert!(second_gap > first_gap, "backoff must strictly increase");
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_returns_empty() {
        let generator = Arc::new(ScriptedGenerator::new(vec![
            Err(transport_like()),
            Err(transport_like()),
            Err(transport_like()),
            Ok("too late".into()),
        ]));
        let client = client(generator.clone(), 3);

        assert_eq!(client.generate("write").await, "");
        assert_eq!(generator.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_sleep_after_final_attempt() {
        let generator = Arc::new(ScriptedGenerator::new(vec![Err(transport_like())]));
        let client = client(generator.clone(), 1);

        let started = tokio::time::Instant::now();
        assert_eq!(client.generate("write").await, "");
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_first_success_makes_single_call() {
        let generator = Arc::new(ScriptedGenerator::new(vec![Ok("done".into())]));
        let client = client(generator.clone(), 3);

        assert_eq!(client.generate("prompt").await, "done");
        assert_eq!(generator.call_count(), 1);
        assert_eq!(generator.prompts.lock().unwrap()[0], "prompt");
    }

    #[tokio::test]
    async fn test_zero_budget_never_calls() {
        let generator = Arc::new(ScriptedGenerator::new(vec![Ok("unused".into())]));
        let client = client(generator.clone(), 0);

        assert_eq!(client.generate("prompt").await, "");
        assert_eq!(generator.call_count(), 0);
    }
}
