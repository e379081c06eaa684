use anyhow::{anyhow, Context, Result};
use async_openai::{config::OpenAIConfig, types::CreateEmbeddingRequestArgs, Client as OpenAiClient};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use rag_core::{RagError, LOCAL_EMBEDDING_DIMENSION, OPENAI_EMBEDDING_DIMENSION};

/// Maps text to a fixed-length vector for similarity search.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Dimensionality of the vectors this embedder produces.
    fn dimension(&self) -> usize;
}

/// Remote embedder backed by the OpenAI embeddings endpoint.
pub struct OpenAiEmbedder {
    client: OpenAiClient<OpenAIConfig>,
    model: String,
}

impl OpenAiEmbedder {
    pub const DEFAULT_MODEL: &'static str = "text-embedding-ada-002";

    pub fn new(api_key: String) -> Self {
        Self::with_model(api_key, Self::DEFAULT_MODEL.to_string())
    }

    pub fn with_model(api_key: String, model: String) -> Self {
        let client = OpenAiClient::with_config(OpenAIConfig::new().with_api_key(api_key));
        Self { client, model }
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .input(text)
            .build()
            .context("Failed to build embedding request")?;

        let response = self
            .client
            .embeddings()
            .create(request)
            .await
            .map_err(|e| anyhow!("OpenAI embeddings request failed: {}", e))?;

        let embedding = response
            .data
            .into_iter()
            .next()
            .ok_or_else(|| RagError::EmbeddingError("Empty embedding response".to_string()))?
            .embedding;

        if embedding.len() != self.dimension() {
            return Err(RagError::DimensionMismatch {
                expected: self.dimension(),
                actual: embedding.len(),
            }
            .into());
        }

        Ok(embedding)
    }

    fn dimension(&self) -> usize {
        OPENAI_EMBEDDING_DIMENSION
    }
}

/// In-process embedder used by the local content store.
///
/// Downloads the BGE model on first run, then embeds without any network
/// round-trip.
pub struct LocalEmbedder {
    model: TextEmbedding,
}

impl LocalEmbedder {
    pub fn new() -> Result<Self> {
        tracing::info!("Loading embedding model (BGE-small-en-v1.5)...");
        let model = TextEmbedding::try_new(
            InitOptions::new(EmbeddingModel::BGESmallENV15).with_show_download_progress(true),
        )?;

        Ok(Self { model })
    }
}

#[async_trait]
impl Embedder for LocalEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut embeddings = self.model.embed(vec![text], None)?;
        embeddings
            .pop()
            .ok_or_else(|| RagError::EmbeddingError("Empty embedding batch".to_string()).into())
    }

    fn dimension(&self) -> usize {
        LOCAL_EMBEDDING_DIMENSION
    }
}
