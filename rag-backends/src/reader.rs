use anyhow::{Context, Result};
use rag_core::{Document, PostProperties, RagError};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};

/// One line of a WordPress JSONL export.
///
/// Every key is required; a line missing any of them fails the read
/// (there is no skip-and-continue policy for bad records).
#[derive(Debug, Deserialize)]
struct WordpressRecord {
    post_id: PostId,
    body: String,
    url: String,
    title: String,
    updated_at: String,
    tags: Vec<String>,
    categories: Vec<String>,
}

/// Post identifiers appear as numbers in exports, but older dumps carry
/// them as strings. Either way they become the string `document_id`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PostId {
    Number(u64),
    Text(String),
}

impl PostId {
    fn into_string(self) -> String {
        match self {
            PostId::Number(n) => n.to_string(),
            PostId::Text(s) => s,
        }
    }
}

/// Reader for WordPress JSONL exports.
///
/// Each `read()` call opens the file fresh, so the reader is restartable
/// from the file even though a single pass is not restartable from its
/// cursor.
pub struct WordpressJsonlReader {
    file: PathBuf,
}

impl WordpressJsonlReader {
    pub fn new<P: AsRef<Path>>(file: P) -> Self {
        Self {
            file: file.as_ref().to_path_buf(),
        }
    }

    /// Start a fresh single pass over the export file.
    pub fn read(&self) -> Result<DocumentIter> {
        let file = File::open(&self.file)
            .with_context(|| format!("Failed to open export file: {}", self.file.display()))?;

        Ok(DocumentIter {
            lines: BufReader::new(file).lines(),
            line_no: 0,
        })
    }
}

/// Lazy, single-pass iterator over the documents of one export file.
pub struct DocumentIter {
    lines: Lines<BufReader<File>>,
    line_no: usize,
}

impl Iterator for DocumentIter {
    type Item = Result<Document>;

    fn next(&mut self) -> Option<Self::Item> {
        let line = match self.lines.next()? {
            Ok(line) => line,
            Err(e) => return Some(Err(e.into())),
        };
        self.line_no += 1;

        let record: WordpressRecord = match serde_json::from_str(&line) {
            Ok(record) => record,
            Err(e) => {
                return Some(Err(RagError::MalformedRecord {
                    line: self.line_no,
                    detail: e.to_string(),
                }
                .into()))
            }
        };

        let properties = PostProperties {
            url: record.url,
            title: record.title,
            updated_at: record.updated_at,
            tags: record.tags,
            categories: record.categories,
        };

        Some(Ok(Document::new(
            record.post_id.into_string(),
            record.body,
            properties,
        )))
    }
}
