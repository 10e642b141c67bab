//! Gemini `generateContent` backend.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::TextGenerator;
use crate::errors::GenerationError;
use crate::quill_config::GenerationSettings;

const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com";

pub struct GeminiGenerator {
    client: Client,
    endpoint: String,
    temperature: f32,
}

impl GeminiGenerator {
    pub fn new(api_key: &str, settings: &GenerationSettings) -> Result<Self> {
        anyhow::ensure!(!api_key.trim().is_empty(), "missing Gemini API key");
        anyhow::ensure!(!settings.model.trim().is_empty(), "missing Gemini model name");

        let mut headers = HeaderMap::new();
        headers.insert(
            "x-goog-api-key",
            HeaderValue::from_str(api_key.trim()).context("invalid Gemini API key")?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .default_headers(headers)
            .build()
            .context("failed to build Gemini HTTP client")?;

        let base = settings.api_base.as_deref().unwrap_or(DEFAULT_API_BASE);
        let endpoint = format!(
            "{}/v1beta/models/{}:generateContent",
            base.trim_end_matches('/'),
            settings.model
        );

        Ok(Self {
            client,
            endpoint,
            temperature: settings.temperature,
        })
    }
}

#[async_trait]
impl TextGenerator for GeminiGenerator {
    async fn generate_once(
        &self,
        prompt: &str,
        max_output_tokens: u32,
    ) -> Result<String, GenerationError> {
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
                max_output_tokens,
            },
        };

        let resp = self.client.post(&self.endpoint).json(&request).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateResponse = resp
            .json()
            .await
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;
        extract_text(parsed)
    }
}

/// Pull the first candidate's text out of a response.
///
/// A candidate without text parts is reported as `Blocked` with its finish
/// reason (typically `MAX_TOKENS` or `SAFETY`), which the client retries.
fn extract_text(response: GenerateResponse) -> Result<String, GenerationError> {
    let Some(candidate) = response.candidates.into_iter().next() else {
        let reason = response
            .prompt_feedback
            .and_then(|f| f.block_reason)
            .unwrap_or_else(|| "no candidates".to_string());
        return Err(GenerationError::InvalidResponse(reason));
    };

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(GenerationError::Blocked {
            finish_reason: candidate
                .finish_reason
                .unwrap_or_else(|| "UNKNOWN".to_string()),
        });
    }
    Ok(text)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}
