use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::schema::*;

/// One call per backend lifecycle operation. Each call is exactly one request;
/// errors come back as-is, without retry.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn list_models(&self) -> Result<Vec<Model>>;
    async fn download_model(&self, model_name: &str) -> Result<Ack>;
    async fn load_model(&self, model_name: &str, gpu_id: Option<u32>) -> Result<Ack>;
    async fn unload_model(&self, model_name: &str) -> Result<Ack>;
    async fn list_servers(&self) -> Result<Vec<Server>>;
    async fn start_server(&self, config: &ServerConfig) -> Result<Ack>;
    async fn stop_server(&self, server_id: &str) -> Result<Ack>;
    async fn check_health(&self, server_id: &str) -> Result<Ack>;
}

#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    client: reqwest::Client,
}

impl ApiClient {
    pub fn new(cfg: &ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(cfg.request_timeout)
            .build()
            .map_err(|e| ClientError::Config(e.to_string()))?;
        Ok(Self {
            base_url: cfg.base_url.clone(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path);
        debug!(%url, "GET");
        let resp = self.client.get(url).send().await?;
        decode(resp).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, body: Option<&B>) -> Result<T> {
        let url = self.url(path);
        debug!(%url, "POST");
        let mut req = self.client.post(url);
        if let Some(body) = body {
            req = req.json(body);
        }
        decode(req.send().await?).await
    }

    pub async fn chat(&self, message: &str) -> Result<ChatResponse> {
        let body = ChatRequest { message: message.to_string() };
        self.post("/chat/", Some(&body)).await
    }

    pub async fn query(&self, query: &str) -> Result<QueryResponse> {
        let body = QueryRequest { query: query.to_string() };
        self.post("/query", Some(&body)).await
    }

    pub async fn upload_repo(&self, repo_url: &str) -> Result<UploadRepoResponse> {
        let body = UploadRepoRequest { repo_url: repo_url.to_string() };
        self.post("/upload_repo", Some(&body)).await
    }
}

#[async_trait]
impl Backend for ApiClient {
    async fn list_models(&self) -> Result<Vec<Model>> {
        self.get("/models/list").await
    }

    async fn download_model(&self, model_name: &str) -> Result<Ack> {
        let v = self.post("/models/download", Some(&DownloadRequest { model_name })).await?;
        ack(v)
    }

    async fn load_model(&self, model_name: &str, gpu_id: Option<u32>) -> Result<Ack> {
        let v = self.post("/models/load", Some(&LoadRequest { model_name, gpu_id })).await?;
        ack(v)
    }

    async fn unload_model(&self, model_name: &str) -> Result<Ack> {
        let v = self.post("/models/unload", Some(&DownloadRequest { model_name })).await?;
        ack(v)
    }

    async fn list_servers(&self) -> Result<Vec<Server>> {
        let list: ServerList = self.get("/servers/list").await?;
        Ok(list.servers)
    }

    async fn start_server(&self, config: &ServerConfig) -> Result<Ack> {
        let v = self.post("/servers/start", Some(config)).await?;
        ack(v)
    }

    async fn stop_server(&self, server_id: &str) -> Result<Ack> {
        let path = format!("/servers/stop/{}", urlencoding::encode(server_id));
        let v = self.post::<(), _>(&path, None).await?;
        ack(v)
    }

    async fn check_health(&self, server_id: &str) -> Result<Ack> {
        let path = format!("/servers/health/{}", urlencoding::encode(server_id));
        let v = self.get(&path).await?;
        ack(v)
    }
}

pub(crate) async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
    let status = resp.status();
    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        return Err(ClientError::Http {
            status: status.as_u16(),
            message: error_message(&text).unwrap_or(text),
        });
    }
    resp.json::<T>()
        .await
        .map_err(|e| ClientError::Transport(format!("invalid response body: {e}")))
}

/// Pulls `detail` or `error` out of a JSON error body.
fn error_message(body: &str) -> Option<String> {
    let v: serde_json::Value = serde_json::from_str(body).ok()?;
    ["detail", "error"]
        .iter()
        .find_map(|k| v.get(*k).and_then(|m| m.as_str()).map(str::to_string))
}

fn ack(v: serde_json::Value) -> Result<Ack> {
    if let Some(msg) = v.get("error").and_then(|e| e.as_str()) {
        return Err(ClientError::Application(msg.to_string()));
    }
    Ok(v)
}
