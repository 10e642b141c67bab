//! Semantic memory side-channel.
//!
//! Approved artifacts are embedded and upserted into a vector store; later
//! stages query it for auxiliary context. The store is advisory: every
//! failure degrades to `false` or an empty result, and a pipeline with no
//! memory at all still produces a complete novel.
//!
//! Record identity is a hash of the metadata only: equal metadata means the
//! same record, so there is one record per (run, kind, act, chapter, flags).
//! The run id is part of the metadata and runs sharing a collection never
//! collide.

pub mod embedder;
pub mod qdrant;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::errors::MemoryError;
use crate::quill_config::MemorySettings;
use crate::util::truncate_chars;

pub use embedder::OpenAiEmbedder;
pub use qdrant::QdrantIndex;

/// A stored payload as returned by search.
pub type Payload = Map<String, Value>;

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, MemoryError>;
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Whether the collection exists.
    async fn probe(&self) -> Result<bool, MemoryError>;
    async fn upsert(&self, point: MemoryPoint) -> Result<(), MemoryError>;
    /// Payloads of the nearest neighbours, best match first.
    async fn search(&self, vector: Vec<f32>, limit: usize) -> Result<Vec<Payload>, MemoryError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    Outline,
    Act,
    ChapterOutline,
    ChapterText,
}

impl MemoryKind {
    /// Name as stored in the payload's `kind` field.
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryKind::Outline => "outline",
            MemoryKind::Act => "act",
            MemoryKind::ChapterOutline => "chapter_outline",
            MemoryKind::ChapterText => "chapter_text",
        }
    }
}

/// Flat metadata attached to a memory record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryMetadata {
    pub run_id: String,
    pub kind: MemoryKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub act: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub words: Option<usize>,
}

impl MemoryMetadata {
    pub fn new(run_id: impl Into<String>, kind: MemoryKind) -> Self {
        Self {
            run_id: run_id.into(),
            kind,
            act: None,
            chapter: None,
            approved: None,
            words: None,
        }
    }

    pub fn act(mut self, act: u32) -> Self {
        self.act = Some(act);
        self
    }

    pub fn chapter(mut self, chapter: u32) -> Self {
        self.chapter = Some(chapter);
        self
    }

    pub fn approved(mut self) -> Self {
        self.approved = Some(true);
        self
    }

    pub fn words(mut self, words: usize) -> Self {
        self.words = Some(words);
        self
    }

    /// Deterministic point id: the first 8 hex digits of the SHA-256 of the
    /// metadata's JSON form.
    pub fn point_id(&self) -> u64 {
        let canonical = serde_json::to_string(self).unwrap_or_default();
        let digest = format!("{:x}", Sha256::digest(canonical.as_bytes()));
        u64::from_str_radix(&digest[..8], 16).unwrap_or_default()
    }
}

/// Payload written to the vector store: metadata fields plus content.
#[derive(Debug, Clone, Serialize)]
pub struct MemoryPayload {
    #[serde(flatten)]
    pub metadata: MemoryMetadata,
    pub content: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MemoryPoint {
    pub id: u64,
    pub vector: Vec<f32>,
    pub payload: MemoryPayload,
}

/// Client for the memory side-channel. A store built with
/// [`MemoryStore::disabled`] accepts every call and remembers nothing.
#[derive(Clone)]
pub struct MemoryStore {
    backend: Option<(Arc<dyn Embedder>, Arc<dyn VectorIndex>)>,
    embed_chars: usize,
    payload_chars: usize,
    search_limit: usize,
}

impl MemoryStore {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        settings: &MemorySettings,
    ) -> Self {
        Self {
            backend: Some((embedder, index)),
            embed_chars: settings.embed_chars,
            payload_chars: settings.payload_chars,
            search_limit: settings.search_limit,
        }
    }

    pub fn disabled() -> Self {
        let defaults = MemorySettings::default();
        Self {
            backend: None,
            embed_chars: defaults.embed_chars,
            payload_chars: defaults.payload_chars,
            search_limit: defaults.search_limit,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    pub fn search_limit(&self) -> usize {
        self.search_limit
    }

    /// Check the collection exists. Logs and returns false when it does not.
    pub async fn probe(&self) -> bool {
        let Some((_, index)) = &self.backend else {
            info!("Memory store disabled");
            return false;
        };
        match index.probe().await {
            Ok(true) => {
                info!("Memory collection connected");
                true
            }
            Ok(false) => {
                warn!("Memory collection not found; searches will return nothing");
                false
            }
            Err(e) => {
                warn!(error = %e, "Memory store unreachable");
                false
            }
        }
    }

    /// Embed a prefix of `content` and upsert it under the metadata's id.
    ///
    /// If embedding fails nothing is written.
    pub async fn store(&self, content: &str, metadata: &MemoryMetadata) -> bool {
        let Some((embedder, index)) = &self.backend else {
            return false;
        };

        let vector = match embedder.embed(truncate_chars(content, self.embed_chars)).await {
            Ok(v) if !v.is_empty() => v,
            Ok(_) => {
                warn!(kind = ?metadata.kind, "Empty embedding, skipping memory store");
                return false;
            }
            Err(e) => {
                warn!(kind = ?metadata.kind, error = %e, "Embedding failed, skipping memory store");
                return false;
            }
        };

        let point = MemoryPoint {
            id: metadata.point_id(),
            vector,
            payload: MemoryPayload {
                metadata: metadata.clone(),
                content: truncate_chars(content, self.payload_chars).to_string(),
                timestamp: Utc::now().to_rfc3339(),
            },
        };
        let id = point.id;

        match index.upsert(point).await {
            Ok(()) => {
                debug!(id, kind = ?metadata.kind, "Stored memory record");
                true
            }
            Err(e) => {
                warn!(id, error = %e, "Memory upsert failed");
                false
            }
        }
    }

    /// Nearest stored payloads for `query`, best first. Empty on any failure.
    pub async fn search(&self, query: &str, limit: usize) -> Vec<Payload> {
        let Some((embedder, index)) = &self.backend else {
            return Vec::new();
        };

        let vector = match embedder.embed(truncate_chars(query, self.embed_chars)).await {
            Ok(v) if !v.is_empty() => v,
            Ok(_) => return Vec::new(),
            Err(e) => {
                warn!(error = %e, "Query embedding failed");
                return Vec::new();
            }
        };

        match index.search(vector, limit).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!(error = %e, "Memory search failed");
                Vec::new()
            }
        }
    }
}

/// Hits whose `kind` is one of `kinds`, in their original order.
pub fn filter_kinds(hits: Vec<Payload>, kinds: &[MemoryKind]) -> Vec<Payload> {
    hits.into_iter()
        .filter(|hit| {
            hit.get("kind")
                .and_then(Value::as_str)
                .is_some_and(|kind| kinds.iter().any(|k| k.as_str() == kind))
        })
        .collect()
}

/// Render search hits as a prompt section, each capped to `max_chars`.
pub fn render_context(hits: &[Payload], max_chars: usize) -> String {
    hits.iter()
        .filter_map(|hit| hit.get("content").and_then(Value::as_str))
        .map(|content| format!("- {}", truncate_chars(content, max_chars).trim_end()))
        .collect::<Vec<_>>()
        .join("\n")
}
