use anyhow::Result;
use async_trait::async_trait;
use rag_core::EmbeddedChunk;
use std::sync::Arc;

/// Write path of a chunk backend.
///
/// `store` receives all chunks of one document, each already carrying its
/// embedding, and returns how many the backend accepted. There is no
/// transactional scope across documents; a failed call does not roll back
/// chunks stored for earlier documents.
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn store(&self, chunks: Vec<EmbeddedChunk>) -> Result<usize>;
}

#[async_trait]
impl<T: ContentStore + ?Sized> ContentStore for Arc<T> {
    async fn store(&self, chunks: Vec<EmbeddedChunk>) -> Result<usize> {
        (**self).store(chunks).await
    }
}
