//! Layered configuration for quill.
//!
//! Settings are read from `quill.toml` in the project directory, then
//! overridden by environment variables, then by CLI flags. Every field has a
//! default so an empty or missing file is a valid configuration.
//!
//! # Configuration File Format
//!
//! ```toml
//! [pipeline]
//! critique_iterations = 3
//! max_rejections = 3
//! enrich_threshold = 0.75
//!
//! [generation]
//! model = "gemini-2.5-pro"
//! max_output_tokens = 12000
//!
//! [writer]
//! command = "claude"
//! args = ["--print"]
//! timeout_secs = 600
//!
//! [memory]
//! url = "http://localhost:6333"
//! collection = "memory_novelpipeline"
//!
//! [approval]
//! timeout_minutes = 60
//! accept_keywords = ["ja", "yes", "ok"]
//!
//! [output]
//! base_dir = "runs"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "quill.toml";

/// Knobs for the stage orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Self-critique passes for the outline and act stages
    #[serde(default = "default_critique_iterations")]
    pub critique_iterations: u32,
    /// Self-critique passes for each chapter outline
    #[serde(default = "default_chapter_outline_critique_iterations")]
    pub chapter_outline_critique_iterations: u32,
    /// Upper bound on reject-and-regenerate cycles per approval checkpoint
    #[serde(default = "default_max_rejections")]
    pub max_rejections: u32,
    #[serde(default = "default_acts")]
    pub acts: u32,
    /// Placeholder chapters per act when no headings can be extracted
    #[serde(default = "default_fallback_chapters_per_act")]
    pub fallback_chapters_per_act: u32,
    #[serde(default = "default_target_words")]
    pub default_target_words: usize,
    /// Drafts below `enrich_threshold * target` get one enrichment call
    #[serde(default = "default_enrich_threshold")]
    pub enrich_threshold: f64,
    /// Trailing words of the previous chapter passed as continuity context
    #[serde(default = "default_continuity_words")]
    pub continuity_words: usize,
    #[serde(default = "default_flow_ok_max_chars")]
    pub flow_ok_max_chars: usize,
    /// Manuscript prefix submitted to the whole-manuscript check
    #[serde(default = "default_manuscript_check_chars")]
    pub manuscript_check_chars: usize,
    /// Send a progress notification every N drafted chapters
    #[serde(default = "default_progress_every")]
    pub progress_every: u32,
}

fn default_critique_iterations() -> u32 {
    3
}

fn default_chapter_outline_critique_iterations() -> u32 {
    1
}

fn default_max_rejections() -> u32 {
    3
}

fn default_acts() -> u32 {
    3
}

fn default_fallback_chapters_per_act() -> u32 {
    7
}

fn default_target_words() -> usize {
    3500
}

fn default_enrich_threshold() -> f64 {
    0.75
}

fn default_continuity_words() -> usize {
    2000
}

fn default_flow_ok_max_chars() -> usize {
    100
}

fn default_manuscript_check_chars() -> usize {
    50_000
}

fn default_progress_every() -> u32 {
    5
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            critique_iterations: default_critique_iterations(),
            chapter_outline_critique_iterations: default_chapter_outline_critique_iterations(),
            max_rejections: default_max_rejections(),
            acts: default_acts(),
            fallback_chapters_per_act: default_fallback_chapters_per_act(),
            default_target_words: default_target_words(),
            enrich_threshold: default_enrich_threshold(),
            continuity_words: default_continuity_words(),
            flow_ok_max_chars: default_flow_ok_max_chars(),
            manuscript_check_chars: default_manuscript_check_chars(),
            progress_every: default_progress_every(),
        }
    }
}

/// Text-generation service settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationSettings {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Attempts per generate call before degrading to an empty result
    #[serde(default = "default_retries")]
    pub retries: u32,
    /// Backoff unit; attempt N sleeps `base_delay_secs * N`
    #[serde(default = "default_base_delay_secs")]
    pub base_delay_secs: u64,
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
    /// API base URL (env: GEMINI_API_BASE)
    #[serde(default)]
    pub api_base: Option<String>,
}

fn default_model() -> String {
    "gemini-2.5-pro".to_string()
}

fn default_max_output_tokens() -> u32 {
    12_000
}

fn default_temperature() -> f32 {
    0.8
}

fn default_retries() -> u32 {
    3
}

fn default_base_delay_secs() -> u64 {
    5
}

fn default_generation_timeout_secs() -> u64 {
    300
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            model: default_model(),
            max_output_tokens: default_max_output_tokens(),
            temperature: default_temperature(),
            retries: default_retries(),
            base_delay_secs: default_base_delay_secs(),
            timeout_secs: default_generation_timeout_secs(),
            api_base: None,
        }
    }
}

/// External writing-agent invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriterSettings {
    #[serde(default = "default_writer_command")]
    pub command: String,
    #[serde(default = "default_writer_args")]
    pub args: Vec<String>,
    #[serde(default = "default_writer_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_writer_command() -> String {
    "claude".to_string()
}

fn default_writer_args() -> Vec<String> {
    vec!["--print".to_string()]
}

fn default_writer_timeout_secs() -> u64 {
    600
}

impl Default for WriterSettings {
    fn default() -> Self {
        Self {
            command: default_writer_command(),
            args: default_writer_args(),
            timeout_secs: default_writer_timeout_secs(),
        }
    }
}

/// Vector memory store and embedding provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemorySettings {
    /// Set to false to run without the semantic side-channel
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_memory_url")]
    pub url: String,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    /// Content prefix embedded on store
    #[serde(default = "default_embed_chars")]
    pub embed_chars: usize,
    /// Content prefix kept in the stored payload
    #[serde(default = "default_payload_chars")]
    pub payload_chars: usize,
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,
    #[serde(default = "default_memory_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_memory_url() -> String {
    "http://localhost:6333".to_string()
}

fn default_collection() -> String {
    "memory_novelpipeline".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_embed_chars() -> usize {
    4000
}

fn default_payload_chars() -> usize {
    15_000
}

fn default_search_limit() -> usize {
    3
}

fn default_memory_timeout_secs() -> u64 {
    30
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            url: default_memory_url(),
            collection: default_collection(),
            embedding_model: default_embedding_model(),
            embed_chars: default_embed_chars(),
            payload_chars: default_payload_chars(),
            search_limit: default_search_limit(),
            timeout_secs: default_memory_timeout_secs(),
        }
    }
}

/// Chat approval channel behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalSettings {
    /// Minutes to wait for a reply before treating the request as accepted
    #[serde(default = "default_timeout_minutes")]
    pub timeout_minutes: u64,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_max_message_chars")]
    pub max_message_chars: usize,
    /// Messages longer than this are sent as a document when a file exists
    #[serde(default = "default_document_threshold_chars")]
    pub document_threshold_chars: usize,
    #[serde(default = "default_accept_keywords")]
    pub accept_keywords: Vec<String>,
    #[serde(default = "default_reject_keywords")]
    pub reject_keywords: Vec<String>,
}

fn default_timeout_minutes() -> u64 {
    60
}

fn default_poll_interval_secs() -> u64 {
    3
}

fn default_max_message_chars() -> usize {
    3800
}

fn default_document_threshold_chars() -> usize {
    3800
}

fn default_accept_keywords() -> Vec<String> {
    ["ja", "yes", "j", "y", "ok", "👍"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_reject_keywords() -> Vec<String> {
    ["nein", "no", "n", "👎"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for ApprovalSettings {
    fn default() -> Self {
        Self {
            timeout_minutes: default_timeout_minutes(),
            poll_interval_secs: default_poll_interval_secs(),
            max_message_chars: default_max_message_chars(),
            document_threshold_chars: default_document_threshold_chars(),
            accept_keywords: default_accept_keywords(),
            reject_keywords: default_reject_keywords(),
        }
    }
}

/// Where run directories are created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSettings {
    /// Base directory for `output_<timestamp>_<theme>` run directories,
    /// relative to the project directory
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,
}

fn default_base_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
        }
    }
}

/// Root of `quill.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuillToml {
    #[serde(default)]
    pub pipeline: PipelineSettings,
    #[serde(default)]
    pub generation: GenerationSettings,
    #[serde(default)]
    pub writer: WriterSettings,
    #[serde(default)]
    pub memory: MemorySettings,
    #[serde(default)]
    pub approval: ApprovalSettings,
    #[serde(default)]
    pub output: OutputSettings,
}

impl QuillToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse quill.toml")
    }

    /// Load `quill.toml` from the project directory, or defaults if absent.
    pub fn load_or_default(project_dir: &Path) -> Result<Self> {
        let config_path = project_dir.join(CONFIG_FILE_NAME);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize quill.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Apply the non-secret environment overrides.
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("QDRANT_URL") {
            self.memory.url = url;
        }
        if let Ok(collection) = std::env::var("QDRANT_COLLECTION") {
            self.memory.collection = collection;
        }
        if let Ok(cmd) = std::env::var("QUILL_WRITER_CMD") {
            self.writer.command = cmd;
        }
        if let Ok(base) = std::env::var("GEMINI_API_BASE") {
            self.generation.api_base = Some(base);
        }
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        let threshold = self.pipeline.enrich_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            warnings.push(format!(
                "Invalid enrich_threshold {}: should be in (0, 1]",
                threshold
            ));
        }
        if self.generation.retries == 0 {
            warnings.push(
                "generation.retries is 0: every generate call will return empty".to_string(),
            );
        }
        if self.pipeline.acts == 0 {
            warnings.push("pipeline.acts is 0: no chapters will be drafted".to_string());
        }
        if self.approval.max_message_chars == 0 {
            warnings.push("approval.max_message_chars must be greater than 0".to_string());
        }
        if self.approval.accept_keywords.is_empty() {
            warnings.push(
                "approval.accept_keywords is empty: only timeouts can accept".to_string(),
            );
        }
        for keyword in &self.approval.accept_keywords {
            if self
                .approval
                .reject_keywords
                .iter()
                .any(|r| r.eq_ignore_ascii_case(keyword))
            {
                warnings.push(format!(
                    "Keyword '{}' is both an accept and a reject keyword",
                    keyword
                ));
            }
        }
        if self.writer.command.trim().is_empty() {
            warnings.push("writer.command is empty".to_string());
        }

        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = QuillToml::default();
        assert_eq!(config.pipeline.critique_iterations, 3);
        assert_eq!(config.pipeline.chapter_outline_critique_iterations, 1);
        assert_eq!(config.pipeline.max_rejections, 3);
        assert_eq!(config.pipeline.fallback_chapters_per_act, 7);
        assert_eq!(config.pipeline.default_target_words, 3500);
        assert!((config.pipeline.enrich_threshold - 0.75).abs() < f64::EPSILON);
        assert_eq!(config.generation.model, "gemini-2.5-pro");
        assert_eq!(config.generation.retries, 3);
        assert_eq!(config.generation.base_delay_secs, 5);
        assert_eq!(config.writer.command, "claude");
        assert_eq!(config.writer.args, vec!["--print".to_string()]);
        assert_eq!(config.writer.timeout_secs, 600);
        assert_eq!(config.memory.collection, "memory_novelpipeline");
        assert_eq!(config.approval.timeout_minutes, 60);
        assert_eq!(config.approval.max_message_chars, 3800);
        assert!(config.approval.accept_keywords.contains(&"ja".to_string()));
        assert!(config.approval.reject_keywords.contains(&"nein".to_string()));
    }

    #[test]
    fn test_parse_empty_uses_defaults() {
        let config = QuillToml::parse("").unwrap();
        assert_eq!(config, QuillToml::default());
    }

    #[test]
    fn test_parse_partial_section() {
        let config = QuillToml::parse(
            r#"
[pipeline]
critique_iterations = 1
enrich_threshold = 0.5

[approval]
accept_keywords = ["go"]
"#,
        )
        .unwrap();
        assert_eq!(config.pipeline.critique_iterations, 1);
        assert!((config.pipeline.enrich_threshold - 0.5).abs() < f64::EPSILON);
        // untouched fields keep defaults
        assert_eq!(config.pipeline.max_rejections, 3);
        assert_eq!(config.approval.accept_keywords, vec!["go".to_string()]);
        assert_eq!(config.approval.reject_keywords, default_reject_keywords());
    }

    #[test]
    fn test_parse_invalid_toml_errors() {
        let result = QuillToml::parse("[pipeline\ncritique_iterations = ");
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to parse quill.toml")
        );
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempdir().unwrap();
        let config = QuillToml::load_or_default(dir.path()).unwrap();
        assert_eq!(config, QuillToml::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);

        let mut config = QuillToml::default();
        config.pipeline.acts = 4;
        config.writer.args = vec!["--print".into(), "--model".into(), "opus".into()];
        config.save(&path).unwrap();

        let loaded = QuillToml::load_or_default(dir.path()).unwrap();
        assert_eq!(loaded.pipeline.acts, 4);
        assert_eq!(loaded.writer.args.len(), 3);
    }

    #[test]
    fn test_validate_default_is_clean() {
        assert!(QuillToml::default().validate().is_empty());
    }

    #[test]
    fn test_validate_flags_bad_values() {
        let mut config = QuillToml::default();
        config.pipeline.enrich_threshold = 1.5;
        config.generation.retries = 0;
        config.approval.reject_keywords.push("OK".into());

        let warnings = config.validate();
        assert!(warnings.iter().any(|w| w.contains("enrich_threshold")));
        assert!(warnings.iter().any(|w| w.contains("retries")));
        assert!(warnings.iter().any(|w| w.contains("'ok'")));
    }
}
