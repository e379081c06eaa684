use anyhow::{Context, Result};
use rag_core::{Chunk, Document};
use tiktoken_rs::{get_bpe_from_model, CoreBPE};

/// Splits a document's body into chunks of at most `max_tokens` tokens
/// under the tokenizer of the configured embedding model.
///
/// Splitting is deterministic for a given (text, max_tokens, model) triple
/// and chunks concatenate back to the original text in order.
pub struct MaxTokenSplitter {
    bpe: CoreBPE,
    max_tokens: usize,
}

impl MaxTokenSplitter {
    /// `model` is an embedding model name known to the tokenizer registry,
    /// e.g. "text-embedding-ada-002".
    pub fn new(max_tokens: usize, model: &str) -> Result<Self> {
        anyhow::ensure!(max_tokens > 0, "max_tokens must be > 0");
        let bpe = get_bpe_from_model(model)
            .with_context(|| format!("No tokenizer registered for model {}", model))?;

        Ok(Self { bpe, max_tokens })
    }

    /// Number of tokens in `text` under the configured tokenizer.
    pub fn count_tokens(&self, text: &str) -> usize {
        self.bpe.encode_ordinary(text).len()
    }

    /// Split one document into its ordered chunk sequence.
    ///
    /// Every chunk carries the parent's properties, a sequential
    /// `chunk_id`, and `total_chunks` equal to the emitted count.
    pub fn split(&self, document: &Document) -> Result<Vec<Chunk>> {
        let text = document.text.as_str();
        let tokens = self.bpe.encode_ordinary(text);
        let piece_lengths: Vec<usize> = self
            .bpe
            ._decode_native_and_split(tokens)
            .map(|piece| piece.len())
            .collect();

        // Chunks are byte slices of the original text, delimited at token
        // window boundaries. A window boundary can land inside a
        // multi-byte character (a single codepoint may span tokens), so
        // the boundary is pulled back to the previous character boundary
        // and the partial bytes stay with the chunk that completes the
        // character.
        let mut texts = Vec::new();
        let mut start = 0;
        let mut end = 0;
        for window in piece_lengths.chunks(self.max_tokens) {
            end += window.iter().sum::<usize>();
            anyhow::ensure!(
                end <= text.len(),
                "Token pieces of document {} overrun its text",
                document.document_id
            );

            let mut boundary = end;
            while !text.is_char_boundary(boundary) {
                boundary -= 1;
            }
            if boundary > start {
                texts.push(text[start..boundary].to_string());
                start = boundary;
            }
        }
        anyhow::ensure!(
            start == text.len(),
            "Token pieces of document {} do not cover its text",
            document.document_id
        );

        let total_chunks = texts.len();
        let chunks = texts
            .into_iter()
            .enumerate()
            .map(|(chunk_id, text)| Chunk {
                document_id: document.document_id.clone(),
                chunk_id,
                total_chunks,
                text,
                properties: document.properties.clone(),
            })
            .collect();

        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rag_core::PostProperties;

    const MODEL: &str = "text-embedding-ada-002";

    fn doc(text: &str) -> Document {
        Document::new(
            "7".to_string(),
            text.to_string(),
            PostProperties {
                url: "https://example.org/p".to_string(),
                title: "Post".to_string(),
                updated_at: "2024-02-01T10:00:00".to_string(),
                tags: vec![],
                categories: vec![],
            },
        )
    }

    fn long_text() -> String {
        "The coffee assistant answers questions about observability tooling. "
            .repeat(20)
    }

    #[test]
    fn test_chunks_respect_token_bound() {
        let splitter = MaxTokenSplitter::new(16, MODEL).unwrap();
        let chunks = splitter.split(&doc(&long_text())).unwrap();

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(splitter.count_tokens(&chunk.text) <= 16);
        }
    }

    #[test]
    fn test_concatenation_reconstructs_text() {
        let text = long_text();
        let splitter = MaxTokenSplitter::new(16, MODEL).unwrap();
        let chunks = splitter.split(&doc(&text)).unwrap();

        let joined: String = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(joined, text);
    }

    #[test]
    fn test_chunk_numbering_invariants() {
        let splitter = MaxTokenSplitter::new(16, MODEL).unwrap();
        let chunks = splitter.split(&doc(&long_text())).unwrap();

        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_id, i);
            assert_eq!(chunk.total_chunks, chunks.len());
            assert_eq!(chunk.document_id, "7");
        }
    }

    #[test]
    fn test_split_is_deterministic() {
        let splitter = MaxTokenSplitter::new(10, MODEL).unwrap();
        let a = splitter.split(&doc(&long_text())).unwrap();
        let b = splitter.split(&doc(&long_text())).unwrap();

        let texts_a: Vec<_> = a.iter().map(|c| &c.text).collect();
        let texts_b: Vec<_> = b.iter().map(|c| &c.text).collect();
        assert_eq!(texts_a, texts_b);
    }

    #[test]
    fn test_multibyte_text_survives_tiny_windows() {
        // Emoji and accented characters tokenize into byte fragments, so
        // one-token windows force boundaries inside characters.
        let text = "🦀🦀🦀🦀🦀 Käse, Café, naïve. ".repeat(8);
        let splitter = MaxTokenSplitter::new(1, MODEL).unwrap();
        let chunks = splitter.split(&doc(&text)).unwrap();

        let joined: String = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(joined, text);
        for (i, chunk) in chunks.iter().enumerate() {
            assert!(!chunk.text.is_empty());
            assert_eq!(chunk.chunk_id, i);
            assert_eq!(chunk.total_chunks, chunks.len());
        }
    }

    #[test]
    fn test_multibyte_reconstruction_at_larger_windows() {
        let text = "🦀 Käse und Café für naïve Bären. ".repeat(20);
        let splitter = MaxTokenSplitter::new(16, MODEL).unwrap();
        let chunks = splitter.split(&doc(&text)).unwrap();

        assert!(chunks.len() > 1);
        let joined: String = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(joined, text);
    }

    #[test]
    fn test_empty_body_yields_no_chunks() {
        let splitter = MaxTokenSplitter::new(16, MODEL).unwrap();
        let chunks = splitter.split(&doc("")).unwrap();
        assert!(chunks.is_empty());
    }
}
