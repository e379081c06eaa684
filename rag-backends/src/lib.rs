pub mod analytics;
pub mod embedder;
pub mod local_store;
pub mod pipeline;
pub mod reader;
pub mod retriever;
pub mod splitter;
pub mod store;
pub mod vector_store;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used items
pub use analytics::{AnalyticsClient, AnalyticsContentStore};
pub use embedder::{Embedder, LocalEmbedder, OpenAiEmbedder};
pub use local_store::InternalContentStore;
pub use pipeline::{IndexingService, IngestStats};
pub use reader::WordpressJsonlReader;
pub use retriever::{AnalyticsRetriever, LocalRetriever, Retriever, VectorDbRetriever};
pub use splitter::MaxTokenSplitter;
pub use store::ContentStore;
pub use vector_store::VectorStore;
