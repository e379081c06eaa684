use thiserror::Error;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Malformed record at line {line}: {detail}")]
    MalformedRecord { line: usize, detail: String },

    #[error("Missing or invalid field in backend response: {0}")]
    MissingField(String),

    #[error("Embedding error: {0}")]
    EmbeddingError(String),

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Backend error: {0}")]
    BackendError(String),
}

// Convert anyhow errors from backend clients into the typed taxonomy
impl From<anyhow::Error> for RagError {
    fn from(err: anyhow::Error) -> Self {
        RagError::BackendError(err.to_string())
    }
}
