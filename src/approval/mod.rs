//! Human-in-the-loop approval gate.
//!
//! A request is pushed to the chat channel, the channel's latest update id is
//! recorded as a high-water mark, and newer messages are polled until one
//! classifies as accept or reject. If nothing resolves the request before its
//! timeout it resolves `TimedOut`, which callers treat as accepted so an
//! unattended run never stalls.

pub mod chunk;
pub mod console;
pub mod telegram;

use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::errors::ChannelError;
use crate::quill_config::ApprovalSettings;
use crate::util::char_count;

pub use chunk::chunk_message;
pub use telegram::TelegramChannel;

const CHUNK_PAUSE: Duration = Duration::from_millis(500);
const CAPTION_PREVIEW_CHARS: usize = 900;

/// One update from the chat channel. `text` is `None` for updates that carry
/// no text from the configured chat.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatUpdate {
    pub update_id: i64,
    pub text: Option<String>,
}

#[async_trait]
pub trait ChatChannel: Send + Sync {
    async fn send_message(&self, text: &str) -> Result<(), ChannelError>;
    async fn send_document(&self, path: &Path, caption: &str) -> Result<(), ChannelError>;
    /// Id of the newest existing update, if any.
    async fn latest_update_id(&self) -> Result<Option<i64>, ChannelError>;
    /// Updates newer than `high_water`, oldest first.
    async fn updates_after(&self, high_water: Option<i64>)
    -> Result<Vec<ChatUpdate>, ChannelError>;
}

#[derive(Debug, Clone)]
pub struct ApprovalRequest {
    pub message: String,
    /// Artifact file sent as a document when the message is too long
    pub attachment: Option<PathBuf>,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalOutcome {
    Accepted,
    Rejected { feedback: String },
    TimedOut,
}

impl ApprovalOutcome {
    /// Timeouts count as acceptance.
    pub fn is_accepted(&self) -> bool {
        !matches!(self, ApprovalOutcome::Rejected { .. })
    }
}

/// Theme carried by a `/start` command, empty when none was given. `None`
/// for any other text. Telegram's `/start@botname` form is accepted.
pub fn parse_start_command(text: &str) -> Option<&str> {
    let text = text.trim();
    let (command, rest) = text.split_once(char::is_whitespace).unwrap_or((text, ""));
    let name = command.split_once('@').map_or(command, |(name, _)| name);
    (name == "/start").then(|| rest.trim())
}

/// Classification of a single reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Accept,
    Reject { feedback: String },
    Ignore,
}

/// Classify a reply by its first word against the keyword sets
/// (case-insensitive, trailing punctuation ignored). For rejections the rest
/// of the message is the feedback.
pub fn classify_reply(text: &str, accept: &[String], reject: &[String]) -> Reply {
    let trimmed = text.trim();
    let (first, rest) = match trimmed.find(char::is_whitespace) {
        Some(idx) => (&trimmed[..idx], trimmed[idx..].trim()),
        None => (trimmed, ""),
    };
    let word = first
        .trim_end_matches(|c: char| matches!(c, ',' | '.' | '!' | ':' | ';' | '-'))
        .to_lowercase();
    if word.is_empty() {
        return Reply::Ignore;
    }

    let matches = |keywords: &[String]| keywords.iter().any(|k| k.to_lowercase() == word);
    if matches(accept) {
        Reply::Accept
    } else if matches(reject) {
        Reply::Reject {
            feedback: rest.to_string(),
        }
    } else {
        Reply::Ignore
    }
}

/// What to do when no chat channel is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleMode {
    /// Accept every request (`--yes`)
    AutoAccept,
    /// Ask on the terminal
    Interactive,
}

pub struct ApprovalGate {
    channel: Option<Arc<dyn ChatChannel>>,
    settings: ApprovalSettings,
    console: ConsoleMode,
}

impl ApprovalGate {
    pub fn new(
        channel: Option<Arc<dyn ChatChannel>>,
        settings: ApprovalSettings,
        console: ConsoleMode,
    ) -> Self {
        Self {
            channel,
            settings,
            console,
        }
    }

    pub fn has_channel(&self) -> bool {
        self.channel.is_some()
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.settings.timeout_minutes * 60)
    }

    /// Line appended to every request naming the reply keywords.
    pub fn instruction_line(&self) -> String {
        format!(
            "Reply *{}* to approve or *{}* followed by feedback to request changes.",
            self.settings
                .accept_keywords
                .first()
                .map(String::as_str)
                .unwrap_or("yes")
                .to_uppercase(),
            self.settings
                .reject_keywords
                .first()
                .map(String::as_str)
                .unwrap_or("no")
                .to_uppercase(),
        )
    }

    /// Send a request and wait for it to resolve.
    pub async fn request(&self, request: ApprovalRequest) -> ApprovalOutcome {
        let Some(channel) = &self.channel else {
            return self.request_on_console(request).await;
        };

        self.deliver(channel.as_ref(), &request).await;

        let mut high_water = match channel.latest_update_id().await {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "Could not read latest update id");
                None
            }
        };

        info!(
            timeout_mins = request.timeout.as_secs() / 60,
            "Waiting for approval"
        );
        let deadline = Instant::now() + request.timeout;
        let poll_interval = Duration::from_secs(self.settings.poll_interval_secs.max(1));

        loop {
            match channel.updates_after(high_water).await {
                Ok(updates) => {
                    for update in updates {
                        high_water = Some(high_water.map_or(update.update_id, |hw| {
                            hw.max(update.update_id)
                        }));
                        let Some(text) = update.text else { continue };
                        match classify_reply(
                            &text,
                            &self.settings.accept_keywords,
                            &self.settings.reject_keywords,
                        ) {
                            Reply::Accept => {
                                info!("Approved");
                                return ApprovalOutcome::Accepted;
                            }
                            Reply::Reject { feedback } => {
                                info!(feedback = %feedback, "Rejected");
                                return ApprovalOutcome::Rejected { feedback };
                            }
                            Reply::Ignore => debug!(text = %text, "Ignoring unrelated message"),
                        }
                    }
                }
                Err(e) => warn!(error = %e, "Polling for replies failed"),
            }

            let now = Instant::now();
            if now >= deadline {
                warn!(
                    timeout_mins = request.timeout.as_secs() / 60,
                    "Approval timed out, proceeding as approved"
                );
                return ApprovalOutcome::TimedOut;
            }
            tokio::time::sleep(poll_interval.min(deadline - now)).await;
        }
    }

    /// Push the request: as a document when it is long and a file exists,
    /// otherwise as chunked messages. Followed by the instruction line.
    async fn deliver(&self, channel: &dyn ChatChannel, request: &ApprovalRequest) {
        let as_document = request
            .attachment
            .as_deref()
            .filter(|p| p.exists())
            .filter(|_| char_count(&request.message) > self.settings.document_threshold_chars);

        match as_document {
            Some(path) => {
                let caption = crate::util::truncate_chars(&request.message, CAPTION_PREVIEW_CHARS);
                if let Err(e) = channel.send_document(path, caption).await {
                    warn!(error = %e, "Sending document failed, falling back to messages");
                    self.send_chunked(channel, &request.message).await;
                }
            }
            None => self.send_chunked(channel, &request.message).await,
        }

        if let Err(e) = channel.send_message(&self.instruction_line()).await {
            warn!(error = %e, "Sending approval instructions failed");
        }
    }

    async fn send_chunked(&self, channel: &dyn ChatChannel, text: &str) {
        let chunks = chunk_message(text, self.settings.max_message_chars);
        let total = chunks.len();
        for (i, chunk) in chunks.iter().enumerate() {
            if let Err(e) = channel.send_message(chunk).await {
                warn!(error = %e, part = i + 1, total, "Sending message failed");
            }
            if i + 1 < total {
                tokio::time::sleep(CHUNK_PAUSE).await;
            }
        }
    }

    async fn request_on_console(&self, request: ApprovalRequest) -> ApprovalOutcome {
        if self.console == ConsoleMode::AutoAccept {
            info!("Auto-approved (--yes)");
            return ApprovalOutcome::Accepted;
        }

        let message = request.message.clone();
        let prompt = tokio::task::spawn_blocking(move || console::prompt_decision(&message));
        match tokio::time::timeout(request.timeout, prompt).await {
            Ok(Ok(Ok(outcome))) => outcome,
            Ok(Ok(Err(e))) => {
                warn!(error = %e, "Console prompt failed, proceeding as approved");
                ApprovalOutcome::Accepted
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Console prompt task failed, proceeding as approved");
                ApprovalOutcome::Accepted
            }
            Err(_) => {
                warn!("Console approval timed out, proceeding as approved");
                ApprovalOutcome::TimedOut
            }
        }
    }

    /// Best-effort notification. Failures are logged, never raised.
    pub async fn notify(&self, text: &str) {
        match &self.channel {
            Some(channel) => self.send_chunked(channel.as_ref(), text).await,
            None => debug!(text = %text, "Notification (no channel configured)"),
        }
    }

    /// Announce readiness and wait for `/start [theme]`.
    ///
    /// A bare `/start` uses `seed`; without a seed the sender gets a usage
    /// hint and waiting continues. Without a channel the theme is read from
    /// the terminal.
    pub async fn wait_for_start(&self, seed: Option<String>) -> Result<String> {
        let Some(channel) = &self.channel else {
            let theme = tokio::task::spawn_blocking(move || console::prompt_theme(seed.as_deref()))
                .await??;
            anyhow::ensure!(!theme.is_empty(), "No theme given");
            return Ok(theme);
        };

        let ready = match &seed {
            Some(theme) => format!(
                "*quill ready*\n\nSend `/start` to begin with the theme:\n{}\n\nor `/start <theme>` for a different one.",
                theme
            ),
            None => "*quill ready*\n\nSend `/start <theme>` to begin a new novel.".to_string(),
        };
        self.send_chunked(channel.as_ref(), &ready).await;

        let mut high_water = channel.latest_update_id().await.unwrap_or_else(|e| {
            warn!(error = %e, "Could not read latest update id");
            None
        });
        let poll_interval = Duration::from_secs(self.settings.poll_interval_secs.max(1));
        info!("Waiting for /start");

        loop {
            match channel.updates_after(high_water).await {
                Ok(updates) => {
                    for update in updates {
                        high_water = Some(high_water.map_or(update.update_id, |hw| {
                            hw.max(update.update_id)
                        }));
                        let Some(text) = update.text else { continue };
                        let Some(theme) = parse_start_command(&text) else {
                            continue;
                        };
                        if !theme.is_empty() {
                            info!(theme = %theme, "Start signal received");
                            return Ok(theme.to_string());
                        }
                        if let Some(seed) = &seed {
                            info!("Start signal received, using pre-seeded theme");
                            return Ok(seed.clone());
                        }
                        self.send_chunked(channel.as_ref(), "Usage: `/start <theme>`")
                            .await;
                    }
                }
                Err(e) => warn!(error = %e, "Polling for start signal failed"),
            }
            tokio::time::sleep(poll_interval).await;
        }
    }
}
