//! Qdrant REST index.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{MemoryPoint, Payload, VectorIndex};
use crate::errors::MemoryError;

pub struct QdrantIndex {
    client: Client,
    collection_url: String,
}

impl QdrantIndex {
    pub fn new(url: &str, collection: &str, timeout: Duration) -> Result<Self> {
        anyhow::ensure!(
            url.starts_with("http://") || url.starts_with("https://"),
            "Qdrant URL must be an http(s) URL"
        );
        anyhow::ensure!(!collection.trim().is_empty(), "missing Qdrant collection");

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .context("failed to build Qdrant HTTP client")?;

        Ok(Self {
            client,
            collection_url: format!("{}/collections/{}", url.trim_end_matches('/'), collection),
        })
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response, MemoryError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp
            .text()
            .await
            .unwrap_or_else(|_| "<body unavailable>".to_string());
        Err(MemoryError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn probe(&self) -> Result<bool, MemoryError> {
        let resp = self.client.get(&self.collection_url).send().await?;
        match resp.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Self::check(resp).await.map(|_| false),
        }
    }

    async fn upsert(&self, point: MemoryPoint) -> Result<(), MemoryError> {
        let body = UpsertRequest {
            points: vec![point],
        };
        let resp = self
            .client
            .put(format!("{}/points", self.collection_url))
            .json(&body)
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }

    async fn search(&self, vector: Vec<f32>, limit: usize) -> Result<Vec<Payload>, MemoryError> {
        let body = SearchRequest {
            vector,
            limit,
            with_payload: true,
        };
        let resp = self
            .client
            .post(format!("{}/points/search", self.collection_url))
            .json(&body)
            .send()
            .await?;
        let parsed: SearchResponse = Self::check(resp).await?.json().await?;
        Ok(parsed.result.into_iter().filter_map(|hit| hit.payload).collect())
    }
}

#[derive(Serialize)]
struct UpsertRequest {
    points: Vec<MemoryPoint>,
}

#[derive(Serialize)]
struct SearchRequest {
    vector: Vec<f32>,
    limit: usize,
    with_payload: bool,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    result: Vec<ScoredPoint>,
}

#[derive(Debug, Deserialize)]
struct ScoredPoint {
    #[serde(default)]
    payload: Option<Payload>,
}
