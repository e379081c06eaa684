//! Shared helpers for unit tests. No network, no model downloads.

use anyhow::Result;
use async_trait::async_trait;
use rag_core::{Chunk, EmbeddedChunk, PostProperties};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::analytics::Transport;
use crate::embedder::Embedder;
use crate::store::ContentStore;
use serde_json::Value;

/// Deterministic embedder: hashes character trigrams into a small fixed
/// vector. Identical text gives identical vectors, so exact matches rank
/// first under cosine similarity.
pub struct StubEmbedder {
    dimension: usize,
}

impl StubEmbedder {
    pub fn new() -> Self {
        Self { dimension: 16 }
    }
}

impl Default for StubEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Embedder for StubEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut v = vec![0.0f32; self.dimension];
        let bytes = text.as_bytes();
        for (i, window) in bytes.windows(3).enumerate() {
            let h = window
                .iter()
                .fold(i as u32, |acc, b| acc.wrapping_mul(31).wrapping_add(*b as u32));
            v[(h as usize) % self.dimension] += 1.0;
        }
        if bytes.len() < 3 {
            for (i, b) in bytes.iter().enumerate() {
                v[(*b as usize + i) % self.dimension] += 1.0;
            }
        }
        Ok(v)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

pub fn test_properties() -> PostProperties {
    PostProperties {
        url: "https://example.org/post".to_string(),
        title: "Post".to_string(),
        updated_at: "2024-02-01T10:00:00".to_string(),
        tags: vec!["rust".to_string()],
        categories: vec!["engineering".to_string()],
    }
}

pub fn test_chunk(document_id: &str, chunk_id: usize, text: &str) -> Chunk {
    Chunk {
        document_id: document_id.to_string(),
        chunk_id,
        total_chunks: chunk_id + 1,
        text: text.to_string(),
        properties: test_properties(),
    }
}

pub async fn embedded_chunk(
    document_id: &str,
    chunk_id: usize,
    text: &str,
    embedder: &dyn Embedder,
) -> EmbeddedChunk {
    let embedding = embedder.embed(text).await.unwrap();
    EmbeddedChunk::new(test_chunk(document_id, chunk_id, text), embedding)
}

/// Content store that records every `store` call for assertions.
#[derive(Default)]
pub struct RecordingStore {
    pub calls: Mutex<Vec<Vec<EmbeddedChunk>>>,
}

impl RecordingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn stored_chunks(&self) -> Vec<EmbeddedChunk> {
        self.calls.lock().await.iter().flatten().cloned().collect()
    }
}

#[async_trait]
impl ContentStore for RecordingStore {
    async fn store(&self, chunks: Vec<EmbeddedChunk>) -> Result<usize> {
        let stored = chunks.len();
        self.calls.lock().await.push(chunks);
        Ok(stored)
    }
}

/// Scripted analytics transport: answers GETs from a fixed table, returns
/// a canned response for every POST, and records the POSTs it saw.
pub struct FakeTransport {
    pub get_responses: Vec<(String, u16, Value)>,
    pub post_status: u16,
    pub post_response: Value,
    pub posts: Mutex<Vec<(String, Value)>>,
}

impl FakeTransport {
    pub fn new(get_responses: Vec<(String, u16, Value)>) -> Self {
        Self {
            get_responses,
            post_status: 200,
            post_response: Value::Null,
            posts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn get(&self, path: &str) -> Result<(u16, Value)> {
        for (p, status, body) in &self.get_responses {
            if p == path {
                return Ok((*status, body.clone()));
            }
        }
        Ok((404, Value::Null))
    }

    async fn post(&self, path: &str, body: Value) -> Result<(u16, Value)> {
        self.posts.lock().await.push((path.to_string(), body));
        Ok((self.post_status, self.post_response.clone()))
    }
}
