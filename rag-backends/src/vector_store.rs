use anyhow::Result;
use async_trait::async_trait;
use qdrant_client::qdrant::{
    CreateCollectionBuilder, Distance, PointStruct, ScoredPoint, SearchPointsBuilder,
    UpsertPointsBuilder, VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use rag_core::EmbeddedChunk;
use serde_json;

use super::store::ContentStore;

/// Qdrant-backed content store for WordPress chunks.
///
/// The collection schema mirrors the chunk model: base fields
/// (document_id, chunk_id, text, total_chunks), string metadata
/// (title, url, updated_at), and string arrays (tags, categories),
/// alongside the embedding vector.
pub struct VectorStore {
    client: Qdrant,
    collection_name: String,
}

impl VectorStore {
    pub async fn new(qdrant_url: &str, collection_name: String) -> Result<Self> {
        let client = Qdrant::from_url(qdrant_url).build()?;

        tracing::info!("Connecting to Qdrant at {}", qdrant_url);

        Ok(Self {
            client,
            collection_name,
        })
    }

    /// Idempotent create: a collection that already exists is left as is.
    pub async fn create_collection_if_missing(&self, dimension: u64) -> Result<()> {
        if self.client.collection_exists(&self.collection_name).await? {
            tracing::info!("Qdrant collection {} already exists", self.collection_name);
            return Ok(());
        }

        self.client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection_name)
                    .vectors_config(VectorParamsBuilder::new(dimension, Distance::Cosine)),
            )
            .await?;

        tracing::info!("Created Qdrant collection: {}", self.collection_name);
        Ok(())
    }

    /// Upload points to Qdrant
    pub async fn upsert_points(&self, points: Vec<PointStruct>) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }

        tracing::info!("Upserting {} points to Qdrant", points.len());

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection_name, points))
            .await?;

        Ok(())
    }

    /// Search for the `limit` nearest chunks to `query_vector`.
    pub async fn search(&self, query_vector: Vec<f32>, limit: u64) -> Result<Vec<ScoredPoint>> {
        let search_builder =
            SearchPointsBuilder::new(&self.collection_name, query_vector, limit).with_payload(true);

        let search_result = self.client.search_points(search_builder).await?;

        Ok(search_result.result)
    }
}

#[async_trait]
impl ContentStore for VectorStore {
    async fn store(&self, chunks: Vec<EmbeddedChunk>) -> Result<usize> {
        let points: Vec<PointStruct> = chunks.iter().map(chunk_to_point).collect();
        let stored = points.len();
        self.upsert_points(points).await?;
        Ok(stored)
    }
}

/// Map one embedded chunk onto a Qdrant point.
///
/// Point ids must be unique per chunk; the (document_id, chunk_id) pair is
/// folded into a stable 64-bit id so re-ingesting a document overwrites its
/// previous points instead of duplicating them.
pub fn chunk_to_point(chunk: &EmbeddedChunk) -> PointStruct {
    let payload_json = serde_json::json!({
        "document_id": chunk.chunk.document_id,
        "chunk_id": chunk.chunk.chunk_id,
        "text": chunk.chunk.text,
        "total_chunks": chunk.chunk.total_chunks,

        "title": chunk.chunk.properties.title,
        "url": chunk.chunk.properties.url,
        "updated_at": chunk.chunk.properties.updated_at,
        "tags": chunk.chunk.properties.tags,
        "categories": chunk.chunk.properties.categories,
    });

    // Convert to Map for Qdrant Payload compatibility
    let payload = payload_json
        .as_object()
        .cloned()
        .unwrap_or_default();

    PointStruct::new(
        point_id(&chunk.chunk.document_id, chunk.chunk.chunk_id),
        chunk.embedding.clone(),
        payload,
    )
}

fn point_id(document_id: &str, chunk_id: usize) -> u64 {
    let mut h: u64 = 0xcbf29ce484222325;
    for b in document_id.as_bytes() {
        h ^= *b as u64;
        h = h.wrapping_mul(0x100000001b3);
    }
    h ^= chunk_id as u64;
    h.wrapping_mul(0x100000001b3)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_chunk;

    #[test]
    fn test_chunk_to_point() {
        let chunk = EmbeddedChunk::new(test_chunk("42", 1, "some text"), vec![0.1; 384]);
        let point = chunk_to_point(&chunk);

        // Verify point is created with correct structure
        assert!(point.id.is_some());
        assert!(point.vectors.is_some());
        assert!(!point.payload.is_empty());

        // Verify payload contains the full schema
        for key in [
            "document_id",
            "chunk_id",
            "text",
            "total_chunks",
            "title",
            "url",
            "updated_at",
            "tags",
            "categories",
        ] {
            assert!(point.payload.contains_key(key), "missing {}", key);
        }
    }

    #[test]
    fn test_point_id_stable_and_distinct() {
        assert_eq!(point_id("42", 0), point_id("42", 0));
        assert_ne!(point_id("42", 0), point_id("42", 1));
        assert_ne!(point_id("42", 0), point_id("43", 0));
    }
}
