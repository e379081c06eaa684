mod llm;
mod prompt;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use llm::{LlmClient, LlmConfig};
use prompt::build_short_answer_prompt;
use rag_backends::{
    analytics::AnalyticsClient, AnalyticsRetriever, Embedder, IndexingService,
    InternalContentStore, LocalEmbedder, LocalRetriever, MaxTokenSplitter, OpenAiEmbedder,
    Retriever, VectorDbRetriever, VectorStore, WordpressJsonlReader,
};
use rag_core::Passage;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber;

/// WordPress RAG Question Answering CLI
///
/// Retrieves the top-k passages for a question from the selected backend,
/// assembles a short-answer prompt from them, and asks a chat model.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Question to answer
    #[arg(short = 'Q', long)]
    question: String,

    /// Retrieval backend
    #[arg(short = 'b', long, value_enum, default_value_t = Backend::Vector)]
    backend: Backend,

    /// Number of passages to retrieve
    #[arg(short = 'k', long, default_value = "2")]
    k: usize,

    /// WordPress JSONL export, ingested in-process (local backend only)
    #[arg(short = 'f', long)]
    file: Option<String>,

    /// Qdrant URL (vector backend)
    #[arg(short = 'q', long, default_value = "http://localhost:6333")]
    qdrant_url: String,

    /// Collection name (vector backend)
    #[arg(short = 'c', long, default_value = "wordpress_chunks")]
    collection: String,

    /// Analytics DB workspace
    #[arg(short = 'w', long, default_value = "text_search")]
    workspace: String,

    /// Analytics DB query lambda name
    #[arg(long, default_value = "wordpress_search")]
    query_lambda: String,

    /// Payload/row key holding the passage text
    #[arg(long, default_value = "text")]
    text_key: String,

    /// Chat model used to generate the answer
    #[arg(long, default_value = "gpt-3.5-turbo")]
    model: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
enum Backend {
    /// In-process store built from --file at startup
    Local,
    /// Managed vector database (qdrant)
    Vector,
    /// Cloud analytics database with vector-search extensions
    Analytics,
}

impl Args {
    fn parse_log_level(&self) -> Level {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    }
}

fn env_var(name: &str) -> Result<String> {
    std::env::var(name).with_context(|| format!("{} must be set in the environment", name))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(args.parse_log_level())
        .with_target(false)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    info!("Question: {}", args.question);
    info!("Backend: {:?}, k={}", args.backend, args.k);

    let retriever = build_retriever(&args).await?;
    let passages = retriever.retrieve_one(&args.question, Some(args.k)).await?;
    info!("Retrieved {} passages", passages.len());

    let prompt = build_short_answer_prompt(&args.question, &passages);
    let llm_config = LlmConfig {
        model: args.model.clone(),
        ..Default::default()
    };
    let llm_client = LlmClient::new(llm_config, env_var("OPENAI_API_KEY")?)?;

    let response = llm_client.complete(prompt).await?;

    println!("Answer: {}", response.raw_response);
    println!();
    println!("Context:");
    for passage in &passages {
        print_passage(passage);
    }

    Ok(())
}

async fn build_retriever(args: &Args) -> Result<Box<dyn Retriever>> {
    match args.backend {
        Backend::Local => {
            let file = args
                .file
                .as_ref()
                .context("--file is required for the local backend")?;

            // Build the corpus in-process; nothing outlives this run.
            let embedder: Arc<dyn Embedder> = Arc::new(LocalEmbedder::new()?);
            let store = Arc::new(InternalContentStore::new(embedder.clone()));

            let reader = WordpressJsonlReader::new(file);
            let splitter = MaxTokenSplitter::new(200, "text-embedding-ada-002")?;
            let service = IndexingService::new(store.clone(), embedder);
            let stats = service.index_documents(&reader, &splitter).await?;
            info!(
                "Local store ready: {} documents, {} chunks",
                stats.documents, stats.chunks
            );

            Ok(Box::new(LocalRetriever::new(store, args.k)))
        }
        Backend::Vector => {
            let store = Arc::new(VectorStore::new(&args.qdrant_url, args.collection.clone()).await?);
            let embedder = Arc::new(OpenAiEmbedder::new(env_var("OPENAI_API_KEY")?));

            Ok(Box::new(VectorDbRetriever::new(
                store,
                embedder,
                args.text_key.clone(),
                args.k,
            )))
        }
        Backend::Analytics => {
            let client = Arc::new(AnalyticsClient::new(
                &env_var("ANALYTICS_API_SERVER")?,
                &env_var("ANALYTICS_API_KEY")?,
            )?);
            let embedder = Arc::new(OpenAiEmbedder::new(env_var("OPENAI_API_KEY")?));

            Ok(Box::new(AnalyticsRetriever::new(
                client,
                embedder,
                args.workspace.clone(),
                args.query_lambda.clone(),
                args.text_key.clone(),
                args.k,
            )))
        }
    }
}

fn print_passage(passage: &Passage) {
    match passage.score {
        Some(score) => println!("  [{}] ({:.3}) {}", passage.index + 1, score, passage.long_text),
        None => println!("  [{}] {}", passage.index + 1, passage.long_text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_level_defaults_to_info() {
        let args = Args {
            question: "q".to_string(),
            backend: Backend::Local,
            k: 2,
            file: None,
            qdrant_url: "".to_string(),
            collection: "".to_string(),
            workspace: "".to_string(),
            query_lambda: "".to_string(),
            text_key: "text".to_string(),
            model: "gpt-3.5-turbo".to_string(),
            log_level: "nonsense".to_string(),
        };
        assert_eq!(args.parse_log_level(), Level::INFO);
    }
}
