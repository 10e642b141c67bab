//! Typed error hierarchy for the quill pipeline.
//!
//! Four top-level enums cover the subsystems:
//! - `PipelineError`: stage orchestration and persistence failures
//! - `GenerationError`: a single attempt against the text-generation service
//! - `ChannelError`: chat approval channel transport failures
//! - `MemoryError`: embedding provider and vector store failures

use thiserror::Error;

/// Errors from the stage orchestrator.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Failed to write artifact at {path}: {source}")]
    ArtifactWrite {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to set up run log at {path}: {source}")]
    LogSetup {
        path: std::path::PathBuf,
        #[source]
        source: tracing_appender::rolling::InitError,
    },

    #[error("Stage {stage} produced no usable output")]
    StageProducedNothing { stage: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors from one request to the text-generation service.
///
/// Every variant is retryable; the generation client degrades to an empty
/// result once its retry budget is spent.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Generation service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Generation stopped without content (finish reason: {finish_reason})")]
    Blocked { finish_reason: String },
}

/// Errors from the chat approval channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Channel transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Channel API rejected the request: {0}")]
    Api(String),

    #[error("Failed to read attachment {path}: {source}")]
    Attachment {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from the embedding provider or vector store.
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Memory transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Embedding provider returned no vector")]
    EmptyEmbedding,

    #[error("Vector store returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Memory store is not configured: {0}")]
    NotConfigured(String),
}
