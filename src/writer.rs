//! Writing-agent client: long-form prose from an external CLI tool.
//!
//! The agent (by default `claude --print`) receives the prompt on stdin and
//! answers on stdout. Every call is bounded by a hard timeout. Spawn errors,
//! non-zero exits and timeouts all yield an empty string; there is no retry
//! here because only the orchestrator knows what length is acceptable.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::quill_config::WriterSettings;

#[async_trait]
pub trait WritingAgent: Send + Sync {
    /// Run the agent on `prompt`, returning its text or empty on failure.
    async fn write(&self, prompt: &str, timeout: Duration) -> String;
}

pub struct CliWriter {
    command: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
}

impl CliWriter {
    pub fn new(settings: &WriterSettings) -> Self {
        Self {
            command: settings.command.clone(),
            args: settings.args.clone(),
            working_dir: None,
        }
    }

    pub fn with_working_dir(mut self, dir: PathBuf) -> Self {
        self.working_dir = Some(dir);
        self
    }

    async fn run(&self, prompt: &str, limit: Duration) -> Result<String> {
        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(ref dir) = self.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd
            .spawn()
            .with_context(|| format!("Failed to spawn writing agent '{}'", self.command))?;

        // Feed stdin while draining stdout, both under the deadline; a child
        // that never reads its input must not outlive the limit.
        let stdin = child.stdin.take();
        let feed = async move {
            if let Some(mut stdin) = stdin {
                stdin.write_all(prompt.as_bytes()).await?;
                stdin.shutdown().await?;
            }
            Ok::<(), std::io::Error>(())
        };
        let (fed, output) = timeout(limit, async { tokio::join!(feed, child.wait_with_output()) })
            .await
            .map_err(|_| anyhow::anyhow!("Writing agent timed out after {}s", limit.as_secs()))?;
        let output = output.context("Failed to wait for writing agent")?;
        if let Err(e) = fed {
            if e.kind() != std::io::ErrorKind::BrokenPipe {
                return Err(e).context("Failed to write prompt to writing agent");
            }
            debug!("Writing agent closed stdin before reading the whole prompt");
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "Writing agent exited with {}: {}",
                output.status,
                stderr.trim()
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl WritingAgent for CliWriter {
    #[tracing::instrument(skip(self, prompt), fields(command = %self.command, prompt_chars = prompt.len()))]
    async fn write(&self, prompt: &str, limit: Duration) -> String {
        match self.run(prompt, limit).await {
            Ok(text) => {
                debug!(chars = text.len(), "Writing agent finished");
                text
            }
            Err(e) => {
                warn!(error = %format!("{:#}", e), "Writing agent failed, returning empty result");
                String::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shell_writer(script: &str) -> CliWriter {
        CliWriter::new(&WriterSettings {
            command: "sh".into(),
            args: vec!["-c".into(), script.into()],
            timeout_secs: 5,
        })
    }

    #[tokio::test]
    async fn test_prompt_goes_through_stdin() {
        let writer = shell_writer("cat");
        let text = writer.write("Es war einmal", Duration::from_secs(5)).await;
        assert_eq!(text, "Es war einmal");
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_empty() {
        let writer = shell_writer("echo partial; exit 3");
        assert_eq!(writer.write("x", Duration::from_secs(5)).await, "");
    }

    #[tokio::test]
    async fn test_missing_binary_is_empty() {
        let writer = CliWriter::new(&WriterSettings {
            command: "quill-definitely-not-a-real-binary".into(),
            args: vec![],
            timeout_secs: 5,
        });
        assert_eq!(writer.write("x", Duration::from_secs(5)).await, "");
    }

    #[tokio::test]
    async fn test_timeout_is_empty() {
        let writer = shell_writer("sleep 10; echo late");
        let started = std::time::Instant::now();
        assert_eq!(writer.write("x", Duration::from_millis(200)).await, "");
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_timeout_holds_when_agent_ignores_large_prompt() {
        let writer = shell_writer("sleep 10; echo late");
        let prompt = "x".repeat(200_000);
        let started = std::time::Instant::now();
        assert_eq!(writer.write(&prompt, Duration::from_millis(300)).await, "");
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_large_prompt_echoed_back() {
        let writer = shell_writer("cat");
        let prompt = "word ".repeat(40_000);
        let text = writer.write(&prompt, Duration::from_secs(5)).await;
        assert_eq!(text, prompt.trim());
    }

    #[tokio::test]
    async fn test_output_is_trimmed() {
        let writer = shell_writer("printf '\\n  chapter body \\n\\n'");
        assert_eq!(writer.write("x", Duration::from_secs(5)).await, "chapter body");
    }
}
