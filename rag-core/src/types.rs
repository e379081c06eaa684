use serde::{Deserialize, Serialize};

/// Metadata carried by every WordPress post and copied onto each of its chunks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostProperties {
    pub url: String,
    pub title: String,
    pub updated_at: String,
    pub tags: Vec<String>,
    pub categories: Vec<String>,
}

/// One WordPress post as produced by the JSONL reader.
///
/// Immutable once created; the splitter consumes it and fans it out into
/// an ordered sequence of [`Chunk`]s.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub document_id: String,
    pub text: String,
    pub properties: PostProperties,
}

impl Document {
    pub fn new(document_id: String, text: String, properties: PostProperties) -> Self {
        Self {
            document_id,
            text,
            properties,
        }
    }
}

/// A bounded-size slice of a document's text, the unit of embedding and storage.
///
/// `chunk_id` is sequential and unique within the parent document, and
/// `total_chunks` equals the number of chunks the splitter produced for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub document_id: String,
    pub chunk_id: usize,
    pub total_chunks: usize,
    pub text: String,
    pub properties: PostProperties,
}

/// A chunk with its embedding attached, ready for persistence.
///
/// The embedding is attached once by the pipeline and never mutated.
#[derive(Debug, Clone)]
pub struct EmbeddedChunk {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

impl EmbeddedChunk {
    pub fn new(chunk: Chunk, embedding: Vec<f32>) -> Self {
        Self { chunk, embedding }
    }
}

/// A single retrieval result handed to the question-answering step.
///
/// Created fresh per query; `index` is the rank within that query's
/// results. `score` is present only where the backend surfaces one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Passage {
    pub long_text: String,
    pub index: usize,
    pub score: Option<f32>,
}

/// Outcome of an idempotent provisioning step against the analytics DB.
///
/// Replaces swallow-and-log: the caller can tell "created", "was already
/// there", and "failed" apart and decide whether to halt.
#[derive(Debug, Clone, PartialEq)]
pub enum ProvisionOutcome {
    Created,
    AlreadyExists,
    Failed(String),
}

impl ProvisionOutcome {
    /// True for outcomes that leave the resource usable.
    pub fn is_ok(&self) -> bool {
        !matches!(self, ProvisionOutcome::Failed(_))
    }
}

/// Result of a bounded readiness poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Ready,
    TimedOut,
}
