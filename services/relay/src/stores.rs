use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::config::{MilvusConfig, Neo4jConfig};
use crate::provider::LLMProvider;

const CONNECT_ATTEMPTS: u32 = 5;
const CONNECT_RETRY_EVERY: Duration = Duration::from_secs(5);

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snippet {
    pub file_path: String,
    pub content: String,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn search(&self, text: &str, limit: usize) -> Result<Vec<Snippet>>;
    async fn insert(&self, snippets: &[Snippet]) -> Result<usize>;
    async fn ping(&self) -> Result<()>;
}

#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn sample_nodes(&self, limit: usize) -> Result<Vec<Value>>;
    async fn ping(&self) -> Result<()>;
}

/// Milvus REST v2. Text is embedded through the LLM provider first.
pub struct MilvusStore {
    cfg: MilvusConfig,
    embedder: Arc<dyn LLMProvider>,
    client: reqwest::Client,
}

impl MilvusStore {
    pub fn new(cfg: MilvusConfig, embedder: Arc<dyn LLMProvider>) -> Self {
        Self {
            cfg,
            embedder,
            client: reqwest::Client::new(),
        }
    }

    async fn call(&self, path: &str, body: Value) -> Result<Value> {
        let url = format!("{}{}", self.cfg.url.trim_end_matches('/'), path);
        let resp = self.client.post(url).json(&body).send().await?.error_for_status()?;
        let json: Value = resp.json().await?;
        match json.get("code").and_then(|c| c.as_i64()) {
            Some(0) | None => Ok(json),
            Some(code) => bail!(
                "milvus error {code}: {}",
                json.get("message").and_then(|m| m.as_str()).unwrap_or("unknown")
            ),
        }
    }

    async fn has_collection(&self) -> Result<bool> {
        let json = self
            .call("/v2/vectordb/collections/has", json!({ "collectionName": self.cfg.collection }))
            .await?;
        Ok(json["data"]["has"].as_bool().unwrap_or(false))
    }

    /// Creates the collection when missing. Retries the first contact a few
    /// times since Milvus is often still booting next to us.
    pub async fn connect(&self) -> Result<()> {
        let mut attempt = 1;
        let exists = loop {
            match self.has_collection().await {
                Ok(exists) => break exists,
                Err(e) if attempt < CONNECT_ATTEMPTS => {
                    warn!(attempt, max = CONNECT_ATTEMPTS, error = %e, "milvus: connect failed, retrying");
                    tokio::time::sleep(CONNECT_RETRY_EVERY).await;
                    attempt += 1;
                }
                Err(e) => return Err(e).context("Unable to connect to Milvus"),
            }
        };

        if exists {
            info!(collection = %self.cfg.collection, "milvus: collection exists");
            return Ok(());
        }

        self.call(
            "/v2/vectordb/collections/create",
            json!({
                "collectionName": self.cfg.collection,
                "dimension": self.cfg.dimension,
                "metricType": "L2",
                "primaryFieldName": "id",
                "vectorFieldName": "vector",
                "autoId": true,
            }),
        )
        .await
        .context("Failed to create Milvus collection")?;
        info!(collection = %self.cfg.collection, dim = self.cfg.dimension, "milvus: collection created");
        Ok(())
    }
}

#[async_trait]
impl VectorStore for MilvusStore {
    async fn search(&self, text: &str, limit: usize) -> Result<Vec<Snippet>> {
        let vector = self.embedder.embed(text).await.context("embedding failed")?;
        let json = self
            .call(
                "/v2/vectordb/entities/search",
                json!({
                    "collectionName": self.cfg.collection,
                    "data": [vector],
                    "annsField": "vector",
                    "limit": limit,
                    "outputFields": ["file_path", "content"],
                }),
            )
            .await?;

        let hits = json["data"].as_array().cloned().unwrap_or_default();
        Ok(hits
            .into_iter()
            .filter_map(|h| serde_json::from_value::<Snippet>(h).ok())
            .collect())
    }

    async fn insert(&self, snippets: &[Snippet]) -> Result<usize> {
        if snippets.is_empty() {
            return Ok(0);
        }
        let mut rows = Vec::with_capacity(snippets.len());
        for s in snippets {
            let vector = self
                .embedder
                .embed(&s.content)
                .await
                .with_context(|| format!("embedding failed for {}", s.file_path))?;
            rows.push(json!({ "file_path": s.file_path, "content": s.content, "vector": vector }));
        }

        let json = self
            .call(
                "/v2/vectordb/entities/insert",
                json!({ "collectionName": self.cfg.collection, "data": rows }),
            )
            .await?;
        Ok(json["data"]["insertCount"].as_u64().unwrap_or(snippets.len() as u64) as usize)
    }

    async fn ping(&self) -> Result<()> {
        self.has_collection().await.map(|_| ())
    }
}

/// Neo4j over the HTTP transactional endpoint.
pub struct Neo4jStore {
    cfg: Neo4jConfig,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct TxResponse {
    #[serde(default)]
    results: Vec<TxResult>,
    #[serde(default)]
    errors: Vec<TxError>,
}

#[derive(Deserialize)]
struct TxResult {
    #[serde(default)]
    data: Vec<TxRow>,
}

#[derive(Deserialize)]
struct TxRow {
    row: Vec<Value>,
}

#[derive(Deserialize)]
struct TxError {
    code: String,
    message: String,
}

impl Neo4jStore {
    pub fn new(cfg: Neo4jConfig) -> Self {
        Self {
            cfg,
            client: reqwest::Client::new(),
        }
    }

    async fn run(&self, statement: &str, parameters: Value) -> Result<Vec<Vec<Value>>> {
        let url = format!("{}/db/{}/tx/commit", self.cfg.url.trim_end_matches('/'), self.cfg.database);
        let body = json!({ "statements": [{ "statement": statement, "parameters": parameters }] });
        let resp = self
            .client
            .post(url)
            .basic_auth(&self.cfg.user, Some(&self.cfg.password))
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        let tx: TxResponse = resp.json().await?;
        if let Some(e) = tx.errors.first() {
            bail!("neo4j {}: {}", e.code, e.message);
        }
        Ok(tx
            .results
            .into_iter()
            .flat_map(|r| r.data.into_iter().map(|d| d.row))
            .collect())
    }
}

#[async_trait]
impl GraphStore for Neo4jStore {
    async fn sample_nodes(&self, limit: usize) -> Result<Vec<Value>> {
        let rows = self
            .run("MATCH (n) RETURN n LIMIT $limit", json!({ "limit": limit }))
            .await?;
        Ok(rows.into_iter().filter_map(|mut r| (!r.is_empty()).then(|| r.swap_remove(0))).collect())
    }

    async fn ping(&self) -> Result<()> {
        self.run("RETURN 1", json!({})).await.map(|_| ())
    }
}
