use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::quill_config::{CONFIG_FILE_NAME, QuillToml};

/// Credentials that only ever come from the environment (or `.env`).
#[derive(Clone, Default)]
pub struct Secrets {
    pub gemini_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
}

impl Secrets {
    pub fn from_env() -> Self {
        fn non_empty(key: &str) -> Option<String> {
            std::env::var(key).ok().filter(|v| !v.trim().is_empty())
        }
        Self {
            gemini_api_key: non_empty("GEMINI_API_KEY"),
            openai_api_key: non_empty("OPENAI_API_KEY"),
            telegram_bot_token: non_empty("TELEGRAM_BOT_TOKEN"),
            telegram_chat_id: non_empty("TELEGRAM_CHAT_ID"),
        }
    }

    /// Bot token and chat id, when both are present.
    pub fn telegram(&self) -> Option<(&str, &str)> {
        match (&self.telegram_bot_token, &self.telegram_chat_id) {
            (Some(token), Some(chat)) => Some((token.as_str(), chat.as_str())),
            _ => None,
        }
    }
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn mask(v: &Option<String>) -> &'static str {
            if v.is_some() { "<set>" } else { "<unset>" }
        }
        f.debug_struct("Secrets")
            .field("gemini_api_key", &mask(&self.gemini_api_key))
            .field("openai_api_key", &mask(&self.openai_api_key))
            .field("telegram_bot_token", &mask(&self.telegram_bot_token))
            .field("telegram_chat_id", &mask(&self.telegram_chat_id))
            .finish()
    }
}

/// Runtime configuration.
///
/// Bridges `quill.toml`, the environment and CLI flags into the values the
/// pipeline needs at runtime.
#[derive(Debug, Clone)]
pub struct Config {
    pub project_dir: PathBuf,
    /// Directory under which run directories are created
    pub output_base: PathBuf,
    pub verbose: bool,
    /// Auto-accept approvals when no chat channel is configured
    pub yes: bool,
    pub toml: QuillToml,
    pub secrets: Secrets,
}

impl Config {
    /// Build the effective configuration: file, then environment, then CLI.
    pub fn new(
        project_dir: PathBuf,
        output_dir: Option<PathBuf>,
        verbose: bool,
        yes: bool,
    ) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .context("Failed to resolve project directory")?;

        let mut toml = QuillToml::load_or_default(&project_dir)?;
        toml.apply_env();

        Ok(Self::from_parts(
            project_dir,
            toml,
            Secrets::from_env(),
            output_dir,
            verbose,
            yes,
        ))
    }

    /// Assemble a configuration from already-resolved parts.
    pub fn from_parts(
        project_dir: PathBuf,
        toml: QuillToml,
        secrets: Secrets,
        output_dir: Option<PathBuf>,
        verbose: bool,
        yes: bool,
    ) -> Self {
        let output_base = match output_dir {
            Some(dir) if dir.is_absolute() => dir,
            Some(dir) => project_dir.join(dir),
            None => project_dir.join(&toml.output.base_dir),
        };
        Self {
            project_dir,
            output_base,
            verbose,
            yes,
            toml,
            secrets,
        }
    }

    pub fn config_file(&self) -> PathBuf {
        self.project_dir.join(CONFIG_FILE_NAME)
    }

    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.output_base).with_context(|| {
            format!(
                "Failed to create output directory: {}",
                self.output_base.display()
            )
        })
    }

    /// Configuration warnings plus missing credentials.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = self.toml.validate();

        if self.secrets.gemini_api_key.is_none() {
            warnings.push("GEMINI_API_KEY is not set: generation calls will fail".to_string());
        }
        if self.toml.memory.enabled && self.secrets.openai_api_key.is_none() {
            warnings.push(
                "OPENAI_API_KEY is not set: memory store and search are disabled".to_string(),
            );
        }
        if self.secrets.telegram().is_none() {
            warnings.push(
                "TELEGRAM_BOT_TOKEN/TELEGRAM_CHAT_ID not set: approvals fall back to the console"
                    .to_string(),
            );
        }

        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn full_secrets() -> Secrets {
        Secrets {
            gemini_api_key: Some("g".into()),
            openai_api_key: Some("o".into()),
            telegram_bot_token: Some("t".into()),
            telegram_chat_id: Some("42".into()),
        }
    }

    #[test]
    fn test_output_base_defaults_to_project_dir() {
        let dir = tempdir().unwrap();
        let config = Config::from_parts(
            dir.path().to_path_buf(),
            QuillToml::default(),
            Secrets::default(),
            None,
            false,
            false,
        );
        assert_eq!(config.output_base, dir.path().join("."));
    }

    #[test]
    fn test_cli_output_dir_overrides_file() {
        let dir = tempdir().unwrap();
        let mut toml = QuillToml::default();
        toml.output.base_dir = PathBuf::from("from-file");

        let config = Config::from_parts(
            dir.path().to_path_buf(),
            toml,
            Secrets::default(),
            Some(PathBuf::from("from-cli")),
            false,
            false,
        );
        assert_eq!(config.output_base, dir.path().join("from-cli"));
    }

    #[test]
    fn test_new_reads_quill_toml() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "[pipeline]\nacts = 5\n",
        )
        .unwrap();

        let config = Config::new(dir.path().to_path_buf(), None, true, false).unwrap();
        assert_eq!(config.toml.pipeline.acts, 5);
        assert!(config.verbose);
    }

    #[test]
    fn test_validate_reports_missing_secrets() {
        let dir = tempdir().unwrap();
        let config = Config::from_parts(
            dir.path().to_path_buf(),
            QuillToml::default(),
            Secrets::default(),
            None,
            false,
            false,
        );
        let warnings = config.validate();
        assert!(warnings.iter().any(|w| w.contains("GEMINI_API_KEY")));
        assert!(warnings.iter().any(|w| w.contains("OPENAI_API_KEY")));
        assert!(warnings.iter().any(|w| w.contains("TELEGRAM_BOT_TOKEN")));
    }

    #[test]
    fn test_validate_clean_with_all_secrets() {
        let dir = tempdir().unwrap();
        let config = Config::from_parts(
            dir.path().to_path_buf(),
            QuillToml::default(),
            full_secrets(),
            None,
            false,
            false,
        );
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_secrets_debug_masks_values() {
        let rendered = format!("{:?}", full_secrets());
        assert!(rendered.contains("<set>"));
        assert!(!rendered.contains("\"g\""));
    }

    #[test]
    fn test_telegram_requires_both_values() {
        let mut secrets = full_secrets();
        assert_eq!(secrets.telegram(), Some(("t", "42")));
        secrets.telegram_chat_id = None;
        assert!(secrets.telegram().is_none());
    }
}
