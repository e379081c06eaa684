use anyhow::Result;
use async_trait::async_trait;
use qdrant_client::qdrant::Value as QdrantValue;
use rag_core::{Passage, RagError};
use std::collections::HashMap;
use std::sync::Arc;

use super::analytics::AnalyticsClient;
use super::embedder::Embedder;
use super::local_store::InternalContentStore;
use super::vector_store::VectorStore;

/// Uniform "top-k passages for one or more queries" capability over the
/// three backends.
///
/// The batch contract lives in the provided `retrieve` method: empty query
/// strings are filtered out before execution, each surviving query
/// contributes one contiguous run of passages in input order, and a `k`
/// not supplied per call falls back to the adapter's configured default.
/// Backend failures propagate to the caller; no adapter retries.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Result count used when a call does not override `k`.
    fn default_k(&self) -> usize;

    /// Top-`k` passages for a single non-empty query, best first.
    async fn retrieve_query(&self, query: &str, k: usize) -> Result<Vec<Passage>>;

    async fn retrieve(&self, queries: &[String], k: Option<usize>) -> Result<Vec<Passage>> {
        let k = k.unwrap_or_else(|| self.default_k());

        let mut passages = Vec::new();
        for query in queries.iter().filter(|q| !q.is_empty()) {
            passages.extend(self.retrieve_query(query, k).await?);
        }
        Ok(passages)
    }

    async fn retrieve_one(&self, query: &str, k: Option<usize>) -> Result<Vec<Passage>> {
        let queries = [query.to_string()];
        self.retrieve(&queries, k).await
    }
}

/// Adapter over the in-process content store. The store embeds the query
/// itself; no network round-trip happens here.
pub struct LocalRetriever {
    content_store: Arc<InternalContentStore>,
    k: usize,
}

impl LocalRetriever {
    pub fn new(content_store: Arc<InternalContentStore>, k: usize) -> Self {
        Self { content_store, k }
    }
}

#[async_trait]
impl Retriever for LocalRetriever {
    fn default_k(&self) -> usize {
        self.k
    }

    async fn retrieve_query(&self, query: &str, k: usize) -> Result<Vec<Passage>> {
        let chunks = self.content_store.find_relevant_chunks(query, k).await?;

        Ok(chunks
            .into_iter()
            .enumerate()
            .map(|(index, chunk)| Passage {
                long_text: chunk.text,
                index,
                score: None,
            })
            .collect())
    }
}

/// Adapter over a caller-supplied managed-vector-DB store.
///
/// Embeds the query client-side, searches, and reads the configured text
/// payload key off each scored point.
pub struct VectorDbRetriever {
    vector_store: Arc<VectorStore>,
    embedder: Arc<dyn Embedder>,
    text_key: String,
    k: usize,
}

impl VectorDbRetriever {
    pub fn new(
        vector_store: Arc<VectorStore>,
        embedder: Arc<dyn Embedder>,
        text_key: String,
        k: usize,
    ) -> Self {
        Self {
            vector_store,
            embedder,
            text_key,
            k,
        }
    }
}

#[async_trait]
impl Retriever for VectorDbRetriever {
    fn default_k(&self) -> usize {
        self.k
    }

    async fn retrieve_query(&self, query: &str, k: usize) -> Result<Vec<Passage>> {
        let query_embedding = self.embedder.embed(query).await?;
        let scored_points = self.vector_store.search(query_embedding, k as u64).await?;

        let mut passages = Vec::new();
        for (index, point) in scored_points.into_iter().enumerate() {
            let long_text = payload_text(&point.payload, &self.text_key)?;
            passages.push(Passage {
                long_text,
                index,
                score: Some(point.score),
            });
        }
        Ok(passages)
    }
}

/// Adapter over the analytics DB's pre-registered search query.
///
/// Embeds the query, serializes the vector into the backend's textual
/// form, and executes the query lambda by name. Assumes the lambda was
/// provisioned out of band.
pub struct AnalyticsRetriever {
    client: Arc<AnalyticsClient>,
    embedder: Arc<dyn Embedder>,
    workspace: String,
    query_lambda_name: String,
    text_key: String,
    k: usize,
}

impl AnalyticsRetriever {
    pub fn new(
        client: Arc<AnalyticsClient>,
        embedder: Arc<dyn Embedder>,
        workspace: String,
        query_lambda_name: String,
        text_key: String,
        k: usize,
    ) -> Self {
        Self {
            client,
            embedder,
            workspace,
            query_lambda_name,
            text_key,
            k,
        }
    }
}

#[async_trait]
impl Retriever for AnalyticsRetriever {
    fn default_k(&self) -> usize {
        self.k
    }

    async fn retrieve_query(&self, query: &str, k: usize) -> Result<Vec<Passage>> {
        let embedding = self.embedder.embed(query).await?;
        let rows = self
            .client
            .execute_query_lambda(&self.workspace, &self.query_lambda_name, &embedding, k)
            .await?;

        let mut passages = Vec::new();
        for (index, row) in rows.into_iter().enumerate() {
            let long_text = row[self.text_key.as_str()]
                .as_str()
                .ok_or_else(|| RagError::MissingField(self.text_key.clone()))?
                .to_string();
            let score = row["similarity"].as_f64().map(|s| s as f32);
            passages.push(Passage {
                long_text,
                index,
                score,
            });
        }
        Ok(passages)
    }
}

fn payload_text(payload: &HashMap<String, QdrantValue>, key: &str) -> Result<String> {
    payload
        .get(key)
        .and_then(|v| v.kind.as_ref())
        .and_then(|kind| match kind {
            qdrant_client::qdrant::value::Kind::StringValue(s) => Some(s.clone()),
            _ => None,
        })
        .ok_or_else(|| RagError::MissingField(key.to_string()).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ContentStore;
    use crate::test_support::{embedded_chunk, FakeTransport, StubEmbedder};
    use serde_json::json;

    /// Retriever returning `k` canned passages labeled with the query, so
    /// the batch contract of the default `retrieve` is observable.
    struct ScriptedRetriever {
        k: usize,
    }

    #[async_trait]
    impl Retriever for ScriptedRetriever {
        fn default_k(&self) -> usize {
            self.k
        }

        async fn retrieve_query(&self, query: &str, k: usize) -> Result<Vec<Passage>> {
            Ok((0..k)
                .map(|index| Passage {
                    long_text: format!("{}-{}", query, index),
                    index,
                    score: None,
                })
                .collect())
        }
    }

    #[tokio::test]
    async fn test_batch_preserves_query_order_and_grouping() {
        let retriever = ScriptedRetriever { k: 2 };
        let queries = vec!["alpha".to_string(), "beta".to_string()];

        let passages = retriever.retrieve(&queries, None).await.unwrap();

        assert_eq!(passages.len(), 4);
        assert_eq!(passages[0].long_text, "alpha-0");
        assert_eq!(passages[1].long_text, "alpha-1");
        assert_eq!(passages[2].long_text, "beta-0");
        assert_eq!(passages[3].long_text, "beta-1");
    }

    #[tokio::test]
    async fn test_empty_queries_are_filtered() {
        let retriever = ScriptedRetriever { k: 1 };
        let queries = vec![
            "".to_string(),
            "alpha".to_string(),
            "".to_string(),
            "beta".to_string(),
        ];

        let passages = retriever.retrieve(&queries, None).await.unwrap();

        assert_eq!(passages.len(), 2);
        assert_eq!(passages[0].long_text, "alpha-0");
        assert_eq!(passages[1].long_text, "beta-0");
    }

    #[tokio::test]
    async fn test_k_override_beats_default() {
        let retriever = ScriptedRetriever { k: 3 };

        let with_default = retriever.retrieve_one("q", None).await.unwrap();
        let with_override = retriever.retrieve_one("q", Some(1)).await.unwrap();

        assert_eq!(with_default.len(), 3);
        assert_eq!(with_override.len(), 1);
    }

    #[tokio::test]
    async fn test_local_retriever_two_document_corpus() {
        let embedder = Arc::new(StubEmbedder::new());
        let store = Arc::new(InternalContentStore::new(embedder.clone()));
        store
            .store(vec![
                embedded_chunk("1", 0, "the coffee assistant is built with rust", &*embedder).await,
                embedded_chunk("2", 0, "observability runs on docker", &*embedder).await,
            ])
            .await
            .unwrap();

        let retriever = LocalRetriever::new(store, 3);
        let passages = retriever.retrieve_one("coffee assistant", Some(2)).await.unwrap();

        assert!(passages.len() <= 2);
        assert!(!passages.is_empty());
        for passage in &passages {
            assert!(!passage.long_text.is_empty());
        }
    }

    #[tokio::test]
    async fn test_analytics_retriever_maps_rows_to_passages() {
        let mut transport = FakeTransport::new(vec![]);
        transport.post_response = json!({
            "results": [
                {"text": "first passage", "similarity": 0.9, "title": "Post"},
                {"text": "second passage", "similarity": 0.7, "title": "Post"},
            ]
        });
        let client = Arc::new(AnalyticsClient::with_transport(Box::new(transport)));

        let retriever = AnalyticsRetriever::new(
            client,
            Arc::new(StubEmbedder::new()),
            "text_search".to_string(),
            "wordpress_search".to_string(),
            "text".to_string(),
            2,
        );

        let passages = retriever.retrieve_one("coffee", None).await.unwrap();
        assert_eq!(passages.len(), 2);
        assert_eq!(passages[0].long_text, "first passage");
        assert_eq!(passages[0].score, Some(0.9));
        assert_eq!(passages[1].index, 1);
    }

    #[tokio::test]
    async fn test_analytics_retriever_missing_text_key_is_error() {
        let mut transport = FakeTransport::new(vec![]);
        transport.post_response = json!({
            "results": [{"similarity": 0.9}]
        });
        let client = Arc::new(AnalyticsClient::with_transport(Box::new(transport)));

        let retriever = AnalyticsRetriever::new(
            client,
            Arc::new(StubEmbedder::new()),
            "text_search".to_string(),
            "wordpress_search".to_string(),
            "text".to_string(),
            2,
        );

        let result = retriever.retrieve_one("coffee", None).await;
        assert!(result.is_err());
    }
}
