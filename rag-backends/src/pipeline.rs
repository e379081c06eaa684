use anyhow::Result;
use rag_core::EmbeddedChunk;
use std::sync::Arc;

use super::embedder::Embedder;
use super::reader::WordpressJsonlReader;
use super::splitter::MaxTokenSplitter;
use super::store::ContentStore;

/// Statistics from an ingestion run
#[derive(Debug, Default, Clone)]
pub struct IngestStats {
    pub documents: usize,
    pub chunks: usize,
    pub chunks_stored: usize,
}

/// One-shot ingestion pipeline that:
/// 1. Drains documents from the JSONL reader in file order
/// 2. Splits each into token-bounded chunks
/// 3. Embeds every chunk
/// 4. Hands each document's chunk batch to the content store
///
/// Strictly sequential; one backend request in flight at a time. There is
/// no checkpointing: a re-run after a partial failure re-embeds and
/// re-stores everything from the start.
pub struct IndexingService<S: ContentStore> {
    content_store: S,
    embedder: Arc<dyn Embedder>,
}

impl<S: ContentStore> IndexingService<S> {
    pub fn new(content_store: S, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            content_store,
            embedder,
        }
    }

    pub async fn index_documents(
        &self,
        reader: &WordpressJsonlReader,
        splitter: &MaxTokenSplitter,
    ) -> Result<IngestStats> {
        let mut stats = IngestStats::default();

        for document in reader.read()? {
            let document = document?;
            let chunks = splitter.split(&document)?;

            stats.documents += 1;
            stats.chunks += chunks.len();

            if chunks.is_empty() {
                tracing::warn!("Document {} produced no chunks", document.document_id);
                continue;
            }

            let mut embedded = Vec::with_capacity(chunks.len());
            for chunk in chunks {
                let embedding = self.embedder.embed(&chunk.text).await?;
                embedded.push(EmbeddedChunk::new(chunk, embedding));
            }

            let batch_size = embedded.len();
            let stored = self.content_store.store(embedded).await?;
            stats.chunks_stored += stored;

            tracing::info!(
                "Indexed document {}: {} chunks, {} stored",
                document.document_id,
                batch_size,
                stored
            );
        }

        tracing::info!(
            "Ingestion complete: {} documents, {} chunks, {} stored",
            stats.documents,
            stats.chunks,
            stats.chunks_stored
        );
        Ok(stats)
    }
}
