//! Telegram Bot API channel.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use super::{ChatChannel, ChatUpdate};
use crate::errors::ChannelError;
use crate::util::truncate_chars;

const API_BASE: &str = "https://api.telegram.org";
const CAPTION_LIMIT: usize = 1024;

pub struct TelegramChannel {
    client: Client,
    base: String,
    chat_id: String,
}

impl TelegramChannel {
    pub fn new(token: &str, chat_id: &str) -> Result<Self> {
        Self::with_api_base(API_BASE, token, chat_id)
    }

    pub fn with_api_base(api_base: &str, token: &str, chat_id: &str) -> Result<Self> {
        anyhow::ensure!(!token.trim().is_empty(), "missing Telegram bot token");
        anyhow::ensure!(!chat_id.trim().is_empty(), "missing Telegram chat id");
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("failed to build Telegram HTTP client")?;
        Ok(Self {
            client,
            base: format!("{}/bot{}", api_base.trim_end_matches('/'), token.trim()),
            chat_id: chat_id.trim().to_string(),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{}", self.base, method)
    }

    async fn post_message(&self, text: &str, markdown: bool) -> Result<(), ChannelError> {
        let mut body = json!({ "chat_id": self.chat_id, "text": text });
        if markdown {
            body["parse_mode"] = json!("Markdown");
        }
        let resp: ApiResponse<serde_json::Value> = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&body)
            .send()
            .await?
            .json()
            .await?;
        resp.into_result().map(|_| ())
    }

    async fn get_updates(&self, offset: i64) -> Result<Vec<ChatUpdate>, ChannelError> {
        let resp: ApiResponse<Vec<RawUpdate>> = self
            .client
            .get(self.method_url("getUpdates"))
            .query(&[("offset", offset.to_string()), ("timeout", "0".to_string())])
            .send()
            .await?
            .json()
            .await?;

        Ok(resp
            .into_result()?
            .into_iter()
            .map(|u| {
                let text = u
                    .message
                    .filter(|m| m.chat.id.to_string() == self.chat_id)
                    .and_then(|m| m.text);
                ChatUpdate {
                    update_id: u.update_id,
                    text,
                }
            })
            .collect())
    }
}

#[async_trait]
impl ChatChannel for TelegramChannel {
    async fn send_message(&self, text: &str) -> Result<(), ChannelError> {
        // Generated prose often contains unbalanced Markdown; resend plain.
        match self.post_message(text, true).await {
            Err(ChannelError::Api(desc)) => {
                debug!(error = %desc, "Markdown send rejected, retrying as plain text");
                self.post_message(text, false).await
            }
            other => other,
        }
    }

    async fn send_document(&self, path: &Path, caption: &str) -> Result<(), ChannelError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| ChannelError::Attachment {
                path: path.to_path_buf(),
                source,
            })?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "artifact.md".to_string());

        let form = Form::new()
            .text("chat_id", self.chat_id.clone())
            .text("caption", truncate_chars(caption, CAPTION_LIMIT).to_string())
            .part("document", Part::bytes(bytes).file_name(file_name));

        let resp: ApiResponse<serde_json::Value> = self
            .client
            .post(self.method_url("sendDocument"))
            .multipart(form)
            .send()
            .await?
            .json()
            .await?;
        resp.into_result().map(|_| ())
    }

    async fn latest_update_id(&self) -> Result<Option<i64>, ChannelError> {
        Ok(self.get_updates(-1).await?.last().map(|u| u.update_id))
    }

    async fn updates_after(&self, high_water: Option<i64>) -> Result<Vec<ChatUpdate>, ChannelError> {
        self.get_updates(high_water.map_or(0, |id| id + 1)).await
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    #[serde(default)]
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

impl<T> ApiResponse<T> {
    fn into_result(self) -> Result<T, ChannelError> {
        match (self.ok, self.result) {
            (true, Some(result)) => Ok(result),
            _ => Err(ChannelError::Api(
                self.description
                    .unwrap_or_else(|| "request failed without description".to_string()),
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawUpdate {
    update_id: i64,
    #[serde(default)]
    message: Option<RawMessage>,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    chat: RawChat,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawChat {
    id: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_url() {
        let channel = TelegramChannel::with_api_base("http://tg.local/", "123:abc", "42").unwrap();
        assert_eq!(
            channel.method_url("sendMessage"),
            "http://tg.local/bot123:abc/sendMessage"
        );
    }

    #[test]
    fn test_requires_token_and_chat() {
        assert!(TelegramChannel::new("", "42").is_err());
        assert!(TelegramChannel::new("token", " ").is_err());
    }

    #[test]
    fn test_api_error_carries_description() {
        let resp: ApiResponse<serde_json::Value> = serde_json::from_str(
            r#"{"ok":false,"error_code":400,"description":"Bad Request: can't parse entities"}"#,
        )
        .unwrap();
        match resp.into_result() {
            Err(ChannelError::Api(desc)) => assert!(desc.contains("can't parse entities")),
            other => panic!("Expected Api error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_update_parsing_tolerates_non_message_updates() {
        let resp: ApiResponse<Vec<RawUpdate>> = serde_json::from_str(
            r#"{"ok":true,"result":[
                {"update_id":10,"message":{"message_id":1,"chat":{"id":42},"text":"ja"}},
                {"update_id":11,"edited_message":{"message_id":1}},
                {"update_id":12,"message":{"message_id":2,"chat":{"id":42},"sticker":{}}}
            ]}"#,
        )
        .unwrap();
        let updates = resp.into_result().unwrap();
        assert_eq!(updates.len(), 3);
        assert_eq!(updates[0].message.as_ref().unwrap().text.as_deref(), Some("ja"));
        assert!(updates[1].message.is_none());
        assert!(updates[2].message.as_ref().unwrap().text.is_none());
    }
}
