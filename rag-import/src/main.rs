use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use rag_backends::{
    analytics::{ingest_transformation_query, AnalyticsClient, AnalyticsContentStore},
    Embedder, IndexingService, InternalContentStore, LocalEmbedder, MaxTokenSplitter,
    OpenAiEmbedder, VectorStore, WordpressJsonlReader,
};
use rag_core::{ProvisionOutcome, OPENAI_EMBEDDING_DIMENSION};
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber;

/// WordPress Export Ingestion CLI
///
/// Reads a WordPress JSONL export, splits posts into token-bounded chunks,
/// embeds each chunk, and indexes them into the selected backend. For the
/// analytics backend the workspace, collection, similarity index, and
/// search query lambda are provisioned first (idempotently).
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the WordPress JSONL export
    #[arg(short = 'f', long)]
    file: String,

    /// Backend to index into
    #[arg(short = 'b', long, value_enum, default_value_t = Backend::Vector)]
    backend: Backend,

    /// Maximum tokens per chunk
    #[arg(short = 'm', long, default_value = "200")]
    max_tokens: usize,

    /// Embedding model (fixes the tokenizer and the vector dimension)
    #[arg(long, default_value = "text-embedding-ada-002")]
    embedding_model: String,

    /// Qdrant URL (vector backend)
    #[arg(short = 'q', long, default_value = "http://localhost:6333")]
    qdrant_url: String,

    /// Collection name
    #[arg(short = 'c', long, default_value = "wordpress_chunks")]
    collection: String,

    /// Analytics DB workspace
    #[arg(short = 'w', long, default_value = "text_search")]
    workspace: String,

    /// Analytics DB similarity index name
    #[arg(long, default_value = "wordpress_embeddings_similarity_index")]
    index_name: String,

    /// Analytics DB query lambda name
    #[arg(long, default_value = "wordpress_search")]
    query_lambda: String,

    /// Centroid count for the approximate-nearest-neighbor index
    #[arg(long, default_value = "10")]
    centroids: u32,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
enum Backend {
    /// In-process store; runs the full pipeline but persists nothing
    Local,
    /// Managed vector database (qdrant)
    Vector,
    /// Cloud analytics database with vector-search extensions
    Analytics,
}

impl Args {
    /// Parse log level from string
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

fn openai_embedder(args: &Args) -> Result<Arc<dyn Embedder>> {
    Ok(Arc::new(OpenAiEmbedder::with_model(
        env_var("OPENAI_API_KEY")?,
        args.embedding_model.clone(),
    )))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(args.parse_log_level())
        .with_target(false)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    info!("WordPress Export Ingestion Tool");
    info!("===============================");
    info!("Configuration:");
    info!("  File: {}", args.file);
    info!("  Backend: {:?}", args.backend);
    info!("  Max tokens per chunk: {}", args.max_tokens);
    info!("  Embedding model: {}", args.embedding_model);
    info!("");

    let reader = WordpressJsonlReader::new(&args.file);
    let splitter = MaxTokenSplitter::new(args.max_tokens, &args.embedding_model)?;

    let stats = match args.backend {
        Backend::Local => {
            // Exercises the read/split/embed path end to end without any
            // external service; the store dies with the process.
            let embedder: Arc<dyn Embedder> = Arc::new(LocalEmbedder::new()?);
            let store = Arc::new(InternalContentStore::new(embedder.clone()));

            let service = IndexingService::new(store, embedder);
            service.index_documents(&reader, &splitter).await?
        }
        Backend::Vector => {
            let embedder = openai_embedder(&args)?;
            let store = VectorStore::new(&args.qdrant_url, args.collection.clone()).await?;
            store
                .create_collection_if_missing(OPENAI_EMBEDDING_DIMENSION as u64)
                .await?;

            let service = IndexingService::new(store, embedder);
            service.index_documents(&reader, &splitter).await?
        }
        Backend::Analytics => {
            let embedder = openai_embedder(&args)?;
            let client = Arc::new(AnalyticsClient::new(
                &env_var("ANALYTICS_API_SERVER")?,
                &env_var("ANALYTICS_API_KEY")?,
            )?);

            provision_analytics(&client, &args).await?;

            let store = AnalyticsContentStore::new(
                client,
                args.workspace.clone(),
                args.collection.clone(),
            );
            let service = IndexingService::new(store, embedder);
            service.index_documents(&reader, &splitter).await?
        }
    };

    info!("");
    info!("Ingestion Complete!");
    info!("===================");
    info!(
        "  {} documents, {} chunks, {} stored",
        stats.documents, stats.chunks, stats.chunks_stored
    );

    if stats.chunks_stored < stats.chunks {
        warn!(
            "  {} chunks were rejected by the backend; see log output above",
            stats.chunks - stats.chunks_stored
        );
    }

    Ok(())
}

/// Run the provisioning sequence, halting on the first hard failure.
/// "Already exists" outcomes are fine; this sequence is safe to re-run.
async fn provision_analytics(client: &AnalyticsClient, args: &Args) -> Result<()> {
    check_step("workspace", client.create_workspace(&args.workspace).await)?;

    check_step(
        "collection",
        client
            .create_collection(
                &args.workspace,
                &args.collection,
                &ingest_transformation_query(),
            )
            .await,
    )?;

    check_step(
        "similarity index",
        client
            .create_similarity_index(
                &args.workspace,
                &args.collection,
                &args.index_name,
                args.centroids,
            )
            .await,
    )?;

    check_step(
        "query lambda",
        client
            .create_query_lambda(&args.workspace, &args.collection, &args.query_lambda)
            .await,
    )?;

    Ok(())
}

fn check_step(step: &str, outcome: ProvisionOutcome) -> Result<()> {
    match outcome {
        ProvisionOutcome::Created => info!("Provisioned {}", step),
        ProvisionOutcome::AlreadyExists => info!("{} already provisioned", step),
        ProvisionOutcome::Failed(detail) => bail!("Provisioning {} failed: {}", step, detail),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args_with_log_level(level: &str) -> Args {
        Args {
            file: "export.jsonl".to_string(),
            backend: Backend::Vector,
            max_tokens: 200,
            embedding_model: "text-embedding-ada-002".to_string(),
            qdrant_url: "".to_string(),
            collection: "".to_string(),
            workspace: "".to_string(),
            index_name: "".to_string(),
            query_lambda: "".to_string(),
            centroids: 10,
            log_level: level.to_string(),
        }
    }

    #[test]
    fn test_backend_parses_all_variants() {
        for (flag, expected) in [
            ("local", Backend::Local),
            ("vector", Backend::Vector),
            ("analytics", Backend::Analytics),
        ] {
            let args =
                Args::parse_from(["rag-import", "--file", "export.jsonl", "--backend", flag]);
            assert_eq!(args.backend, expected);
        }
    }

    #[test]
    fn test_parse_log_level() {
        assert_eq!(args_with_log_level("debug").parse_log_level(), Level::DEBUG);
        assert_eq!(args_with_log_level("WARN").parse_log_level(), Level::WARN);
        assert_eq!(args_with_log_level("bogus").parse_log_level(), Level::INFO);
    }
}
