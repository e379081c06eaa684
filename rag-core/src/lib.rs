pub mod error;
pub mod types;

// Re-export common types
pub use error::RagError;
pub use types::{
    Chunk, Document, EmbeddedChunk, Passage, PollOutcome, PostProperties, ProvisionOutcome,
};

/// Dimensionality of the remote embedding model (text-embedding-ada-002).
pub const OPENAI_EMBEDDING_DIMENSION: usize = 1536;

/// Dimensionality of the in-process embedding model (BGE-small-en-v1.5).
pub const LOCAL_EMBEDDING_DIMENSION: usize = 384;
