use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use rag_core::{EmbeddedChunk, PollOutcome, ProvisionOutcome};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::{json, Value};
use std::future::Future;
use std::time::Duration;

use super::store::ContentStore;

/// Field the ingest transformation writes the enforced vector into.
pub const EMBEDDING_FIELD: &str = "chunk_embedding";

/// Vector dimensionality enforced at ingest and indexed for search.
pub const EMBEDDING_DIMENSION: usize = 1536;

const COLLECTION_POLL_ATTEMPTS: usize = 20;
const COLLECTION_POLL_INTERVAL: Duration = Duration::from_secs(30);
const INDEX_POLL_ATTEMPTS: usize = 10;
const INDEX_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Ingest-time transformation: cast the embedding to a fixed-dimension
/// float vector, pass the chunk fields through, drop rows without a title.
pub fn ingest_transformation_query() -> String {
    format!(
        "\
SELECT
    VECTOR_ENFORCE(embedding, {EMBEDDING_DIMENSION}, 'float') as {EMBEDDING_FIELD},
    document_id,
    chunk_id,
    text,
    total_chunks,
    title,
    url,
    updated_at,
    tags,
    categories
FROM
    _input
WHERE
    title IS NOT NULL"
    )
}

/// Pre-registered top-k search query executed by name at read time.
///
/// Takes the serialized query vector and the result limit as named
/// parameters; rows come back ranked by descending dot-product similarity.
pub fn search_query(workspace: &str, collection: &str) -> String {
    format!(
        "\
SELECT
    title,
    APPROX_DOT_PRODUCT(
        JSON_PARSE(:search_query_embedding),
        {EMBEDDING_FIELD}
    ) as similarity,
    document_id,
    chunk_id,
    text
FROM
    {workspace}.{collection} HINT(access_path=index_similarity_search)
ORDER BY
    similarity DESC
LIMIT
    :results_limit"
    )
}

/// Serialize a vector into the textual form the backend's query language
/// parses with JSON_PARSE.
pub fn serialize_embedding(embedding: &[f32]) -> String {
    let nums: Vec<String> = embedding.iter().map(|n| n.to_string()).collect();
    format!("[{}]", nums.join(","))
}

/// Fixed-interval bounded readiness poll.
///
/// Runs `probe` up to `max_attempts` times, sleeping `interval` between
/// attempts. Exhausting the attempts is not an error: it logs a warning
/// and returns `TimedOut`, leaving the caller to decide. Probe failures
/// propagate.
pub async fn wait_for_ready<F, Fut>(
    target: &str,
    max_attempts: usize,
    interval: Duration,
    mut probe: F,
) -> Result<PollOutcome>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    for attempt in 1..=max_attempts {
        if probe().await? {
            tracing::info!("`{}` is ready (attempt {}/{})", target, attempt, max_attempts);
            return Ok(PollOutcome::Ready);
        }
        if attempt < max_attempts {
            tokio::time::sleep(interval).await;
        }
    }

    tracing::warn!(
        "`{}` still not ready after {} attempts; check status in the console",
        target,
        max_attempts
    );
    Ok(PollOutcome::TimedOut)
}

/// Minimal HTTP surface of the analytics API, split out so the client
/// logic can be exercised without a live backend.
#[async_trait]
pub(crate) trait Transport: Send + Sync {
    async fn get(&self, path: &str) -> Result<(u16, Value)>;
    async fn post(&self, path: &str, body: Value) -> Result<(u16, Value)>;
}

struct HttpTransport {
    http: reqwest::Client,
    base_url: String,
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, path: &str) -> Result<(u16, Value)> {
        let response = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await
            .with_context(|| format!("GET {} failed", path))?;
        let status = response.status().as_u16();
        let body = response.json().await.unwrap_or(Value::Null);
        Ok((status, body))
    }

    async fn post(&self, path: &str, body: Value) -> Result<(u16, Value)> {
        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .json(&body)
            .send()
            .await
            .with_context(|| format!("POST {} failed", path))?;
        let status = response.status().as_u16();
        let body = response.json().await.unwrap_or(Value::Null);
        Ok((status, body))
    }
}

/// Client for the cloud analytics database with vector-search extensions.
///
/// Provisioning methods are idempotent: a get-by-name hit short-circuits
/// to `AlreadyExists`. The check-then-create pair is not safe against a
/// second process provisioning concurrently; this client is meant for
/// one-shot setup from a single process.
pub struct AnalyticsClient {
    transport: Box<dyn Transport>,
}

impl AnalyticsClient {
    /// `api_server` is the regional endpoint, e.g. "https://api.euc1a1.example.com".
    pub fn new(api_server: &str, api_key: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let auth = format!("ApiKey {}", api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth).context("Invalid analytics API key")?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .context("Failed to build analytics HTTP client")?;

        tracing::info!("Analytics client created for {}", api_server);

        Ok(Self {
            transport: Box::new(HttpTransport {
                http,
                base_url: api_server.trim_end_matches('/').to_string(),
            }),
        })
    }

    #[cfg(test)]
    pub(crate) fn with_transport(transport: Box<dyn Transport>) -> Self {
        Self { transport }
    }

    pub async fn create_workspace(&self, name: &str) -> ProvisionOutcome {
        match self.transport.get(&format!("/v1/orgs/self/ws/{}", name)).await {
            Ok((200, _)) => {
                tracing::info!("Workspace {} already exists", name);
                return ProvisionOutcome::AlreadyExists;
            }
            Ok((404, _)) => {
                tracing::info!("Workspace {} does not exist", name);
            }
            Ok((status, body)) => {
                return self.provisioning_failed("workspace", name, status, &body);
            }
            Err(e) => return ProvisionOutcome::Failed(e.to_string()),
        }

        tracing::info!("Creating workspace {} ...", name);
        match self
            .transport
            .post("/v1/orgs/self/ws", json!({ "name": name }))
            .await
        {
            Ok((status, _)) if (200..300).contains(&status) => {
                tracing::info!("Workspace {} created", name);
                ProvisionOutcome::Created
            }
            Ok((status, body)) => self.provisioning_failed("workspace", name, status, &body),
            Err(e) => ProvisionOutcome::Failed(e.to_string()),
        }
    }

    pub async fn create_collection(
        &self,
        workspace: &str,
        name: &str,
        transformation_query: &str,
    ) -> ProvisionOutcome {
        let get_path = format!("/v1/orgs/self/ws/{}/collections/{}", workspace, name);
        match self.transport.get(&get_path).await {
            Ok((200, _)) => {
                tracing::info!("Collection {} already exists in workspace {}", name, workspace);
                return ProvisionOutcome::AlreadyExists;
            }
            Ok((404, _)) => {
                tracing::info!("Collection {} does not exist in workspace {}", name, workspace);
            }
            Ok((status, body)) => {
                return self.provisioning_failed("collection", name, status, &body);
            }
            Err(e) => return ProvisionOutcome::Failed(e.to_string()),
        }

        tracing::info!("Creating collection {} in workspace {} ...", name, workspace);
        let body = json!({
            "name": name,
            "field_mapping_query": { "sql": transformation_query },
        });
        match self
            .transport
            .post(&format!("/v1/orgs/self/ws/{}/collections", workspace), body)
            .await
        {
            Ok((status, _)) if (200..300).contains(&status) => {
                tracing::info!("Collection {} created", name);
            }
            Ok((status, body)) => {
                return self.provisioning_failed("collection", name, status, &body);
            }
            Err(e) => return ProvisionOutcome::Failed(e.to_string()),
        }

        tracing::info!("Waiting for the `{}` collection to be `READY` (~5 minutes)...", name);
        let status_path = get_path.as_str();
        let poll = wait_for_ready(
            name,
            COLLECTION_POLL_ATTEMPTS,
            COLLECTION_POLL_INTERVAL,
            move || async move {
                let (status, body) = self.transport.get(status_path).await?;
                if status != 200 {
                    return Ok(false);
                }
                Ok(body["data"]["status"].as_str() == Some("READY"))
            },
        )
        .await;

        match poll {
            Ok(_) => ProvisionOutcome::Created,
            Err(e) => ProvisionOutcome::Failed(e.to_string()),
        }
    }

    /// Build the approximate-nearest-neighbor index over the embedding
    /// field (IVF with `centroids` partitions, dimension 1536).
    pub async fn create_similarity_index(
        &self,
        workspace: &str,
        collection: &str,
        index_name: &str,
        centroids: u32,
    ) -> ProvisionOutcome {
        tracing::info!(
            "Creating `{}` index for the `{}` collection...",
            index_name,
            collection
        );

        let ddl = format!(
            "\
CREATE
    SIMILARITY INDEX {workspace}.{index_name}
ON
    FIELD {workspace}.{collection}:{EMBEDDING_FIELD} DIMENSION {EMBEDDING_DIMENSION} AS 'faiss::IVF{centroids},Flat';"
        );

        match self.run_sql(&ddl).await {
            Ok(_) => {
                tracing::info!("Index `{}` created", index_name);
            }
            Err(e) => {
                let detail = e.to_string();
                if detail.contains("already exists") {
                    tracing::info!("Index `{}` already exists", index_name);
                    return ProvisionOutcome::AlreadyExists;
                }
                tracing::error!("Exception when creating similarity index: {}", detail);
                return ProvisionOutcome::Failed(detail);
            }
        }

        tracing::info!("Waiting for the `{}` index to be `READY` (~1 minute)...", index_name);
        let status_query = format!(
            "\
SELECT
    index_status
FROM
    _system.similarity_index
WHERE
    workspace = '{workspace}'
    and name = '{index_name}'"
        );

        let status_sql = status_query.as_str();
        let poll = wait_for_ready(
            index_name,
            INDEX_POLL_ATTEMPTS,
            INDEX_POLL_INTERVAL,
            move || async move {
                let results = self.run_sql(status_sql).await?;
                let status = results
                    .first()
                    .and_then(|row| row["index_status"].as_str())
                    .unwrap_or("UNKNOWN");
                if status != "READY" {
                    tracing::info!("Index status: {}", status);
                }
                Ok(status == "READY")
            },
        )
        .await;

        match poll {
            Ok(_) => ProvisionOutcome::Created,
            Err(e) => ProvisionOutcome::Failed(e.to_string()),
        }
    }

    /// Register the named parameterized search query used at read time.
    pub async fn create_query_lambda(
        &self,
        workspace: &str,
        collection: &str,
        query_lambda_name: &str,
    ) -> ProvisionOutcome {
        let get_path = format!("/v1/orgs/self/ws/{}/lambdas/{}", workspace, query_lambda_name);
        match self.transport.get(&get_path).await {
            Ok((200, _)) => {
                tracing::info!("Query lambda `{}` already exists", query_lambda_name);
                return ProvisionOutcome::AlreadyExists;
            }
            Ok((404, _)) => {}
            Ok((status, body)) => {
                return self.provisioning_failed("query lambda", query_lambda_name, status, &body);
            }
            Err(e) => return ProvisionOutcome::Failed(e.to_string()),
        }

        tracing::info!("Creating query lambda `{}`...", query_lambda_name);
        let body = json!({
            "name": query_lambda_name,
            "sql": { "query": search_query(workspace, collection) },
        });
        match self
            .transport
            .post(&format!("/v1/orgs/self/ws/{}/lambdas", workspace), body)
            .await
        {
            Ok((status, _)) if (200..300).contains(&status) => {
                tracing::info!("Query lambda `{}` created", query_lambda_name);
                ProvisionOutcome::Created
            }
            Ok((status, body)) => {
                self.provisioning_failed("query lambda", query_lambda_name, status, &body)
            }
            Err(e) => ProvisionOutcome::Failed(e.to_string()),
        }
    }

    /// Submit one document. Rejections are logged with the backend detail
    /// and reported as `false`, never raised.
    pub async fn add_document(&self, workspace: &str, collection: &str, document: Value) -> bool {
        let path = format!("/v1/orgs/self/ws/{}/collections/{}/docs", workspace, collection);
        let response = match self.transport.post(&path, json!({ "data": [document] })).await {
            Ok((status, body)) if (200..300).contains(&status) => body,
            Ok((status, body)) => {
                tracing::error!("Exception when adding document ({}): {}", status, body);
                return false;
            }
            Err(e) => {
                tracing::error!("Exception when adding document: {}", e);
                return false;
            }
        };

        let result = &response["data"][0];
        if !result.is_object() {
            tracing::error!("Unexpected add-document response: {}", response);
            return false;
        }
        match result.get("error").filter(|e| !e.is_null()) {
            Some(error) => {
                tracing::error!("Error when adding document: {}", error);
                false
            }
            None => {
                tracing::info!("Document status: {}", result["status"]);
                true
            }
        }
    }

    /// Execute the pre-registered search query by name, passing the
    /// serialized query vector and the result limit as named parameters.
    pub async fn execute_query_lambda(
        &self,
        workspace: &str,
        query_lambda_name: &str,
        embedding: &[f32],
        results_limit: usize,
    ) -> Result<Vec<Value>> {
        tracing::info!("Executing semantic search query from search query embedding...");

        let path = format!(
            "/v1/orgs/self/ws/{}/lambdas/{}/tags/latest",
            workspace, query_lambda_name
        );
        let body = json!({
            "parameters": [
                {
                    "name": "search_query_embedding",
                    "type": "string",
                    "value": serialize_embedding(embedding),
                },
                {
                    "name": "results_limit",
                    "type": "int",
                    "value": results_limit.to_string(),
                },
            ]
        });

        let (status, response) = self.transport.post(&path, body).await?;
        if !(200..300).contains(&status) {
            return Err(anyhow!(
                "Query lambda {} failed ({}): {}",
                query_lambda_name,
                status,
                response
            ));
        }

        let results = response["results"]
            .as_array()
            .cloned()
            .ok_or_else(|| anyhow!("Query lambda response missing `results` array"))?;
        Ok(results)
    }

    async fn run_sql(&self, query: &str) -> Result<Vec<Value>> {
        let body = json!({ "sql": { "query": query } });
        let (status, response) = self.transport.post("/v1/orgs/self/queries", body).await?;
        if !(200..300).contains(&status) {
            return Err(anyhow!("SQL query failed ({}): {}", status, response));
        }
        Ok(response["results"].as_array().cloned().unwrap_or_default())
    }

    fn provisioning_failed(
        &self,
        kind: &str,
        name: &str,
        status: u16,
        body: &Value,
    ) -> ProvisionOutcome {
        let detail = format!("{} {}: unexpected status {}: {}", kind, name, status, body);
        tracing::error!("{}", detail);
        ProvisionOutcome::Failed(detail)
    }
}

/// Write path against the analytics DB: one REST call per chunk, success
/// counted from the per-document status, never raised.
pub struct AnalyticsContentStore {
    client: std::sync::Arc<AnalyticsClient>,
    workspace: String,
    collection: String,
}

impl AnalyticsContentStore {
    pub fn new(
        client: std::sync::Arc<AnalyticsClient>,
        workspace: String,
        collection: String,
    ) -> Self {
        Self {
            client,
            workspace,
            collection,
        }
    }

    fn chunk_document(chunk: &EmbeddedChunk) -> Value {
        json!({
            "document_id": chunk.chunk.document_id,
            "chunk_id": chunk.chunk.chunk_id,
            "text": chunk.chunk.text,
            "total_chunks": chunk.chunk.total_chunks,
            "title": chunk.chunk.properties.title,
            "url": chunk.chunk.properties.url,
            "updated_at": chunk.chunk.properties.updated_at,
            "tags": chunk.chunk.properties.tags,
            "categories": chunk.chunk.properties.categories,
            "embedding": chunk.embedding,
        })
    }
}

#[async_trait]
impl ContentStore for AnalyticsContentStore {
    async fn store(&self, chunks: Vec<EmbeddedChunk>) -> Result<usize> {
        let total = chunks.len();
        let mut successes = 0;
        for chunk in &chunks {
            let document = Self::chunk_document(chunk);
            if self
                .client
                .add_document(&self.workspace, &self.collection, document)
                .await
            {
                successes += 1;
            }
        }

        tracing::info!(
            "Stored {} chunks in the analytics DB with {} successful responses",
            total,
            successes
        );
        Ok(successes)
    }
}
