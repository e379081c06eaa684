use anyhow::Result;
use async_trait::async_trait;
use rag_core::{Chunk, EmbeddedChunk};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::embedder::Embedder;
use super::store::ContentStore;

/// In-process content store.
///
/// Holds embedded chunks in memory and ranks them by cosine similarity
/// against a query embedded with its own embedder. Intended for small
/// corpora and tests; nothing is persisted across runs.
pub struct InternalContentStore {
    embedder: Arc<dyn Embedder>,
    chunks: Mutex<Vec<EmbeddedChunk>>,
}

impl InternalContentStore {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            chunks: Mutex::new(Vec::new()),
        }
    }

    /// Number of chunks currently held.
    pub async fn len(&self) -> usize {
        self.chunks.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.chunks.lock().await.is_empty()
    }

    /// Embed `query` and return the `k` most similar chunks, best first.
    pub async fn find_relevant_chunks(&self, query: &str, k: usize) -> Result<Vec<Chunk>> {
        let query_embedding = self.embedder.embed(query).await?;

        let chunks = self.chunks.lock().await;
        let mut scored: Vec<(f32, &EmbeddedChunk)> = chunks
            .iter()
            .map(|c| (cosine_similarity(&query_embedding, &c.embedding), c))
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(_, c)| c.chunk.clone())
            .collect())
    }
}

#[async_trait]
impl ContentStore for InternalContentStore {
    async fn store(&self, chunks: Vec<EmbeddedChunk>) -> Result<usize> {
        let stored = chunks.len();
        self.chunks.lock().await.extend(chunks);
        Ok(stored)
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{embedded_chunk, StubEmbedder};

    #[test]
    fn test_cosine_similarity_basic() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }

    #[tokio::test]
    async fn test_store_and_find_ranks_by_similarity() {
        let embedder = Arc::new(StubEmbedder::new());
        let store = InternalContentStore::new(embedder.clone());

        // Identical text embeds identically under the stub, so the exact
        // match must rank first.
        store
            .store(vec![
                embedded_chunk("1", 0, "coffee assistant", &*embedder).await,
                embedded_chunk("2", 0, "observability tooling", &*embedder).await,
            ])
            .await
            .unwrap();

        let results = store.find_relevant_chunks("coffee assistant", 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].document_id, "1");
    }

    #[tokio::test]
    async fn test_find_respects_k() {
        let embedder = Arc::new(StubEmbedder::new());
        let store = InternalContentStore::new(embedder.clone());

        store
            .store(vec![
                embedded_chunk("1", 0, "alpha", &*embedder).await,
                embedded_chunk("1", 1, "beta", &*embedder).await,
                embedded_chunk("2", 0, "gamma", &*embedder).await,
            ])
            .await
            .unwrap();

        let results = store.find_relevant_chunks("alpha", 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(store.len().await, 3);
    }
}
