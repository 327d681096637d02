use serde::{Deserialize, Serialize};

/// Raw body of a mutation response. The backend gives no contract beyond success.
pub type Ack = serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelStatus {
    Downloading,
    Loading,
    Ready,
    Unloading,
    Error,
}

impl ModelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelStatus::Downloading => "downloading",
            ModelStatus::Loading => "loading",
            ModelStatus::Ready => "ready",
            ModelStatus::Unloading => "unloading",
            ModelStatus::Error => "error",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    Starting,
    Running,
    Stopped,
    Error,
}

impl ServerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerStatus::Starting => "starting",
            ServerStatus::Running => "running",
            ServerStatus::Stopped => "stopped",
            ServerStatus::Error => "error",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Model {
    #[serde(rename = "model_name")]
    pub name: String,
    #[serde(default)]
    pub status: Option<ModelStatus>, // absent until the backend classifies it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
    pub model_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_gpu_memory: Option<String>,
}

impl ServerConfig {
    pub fn new(model_name: impl Into<String>, port: u16) -> Self {
        Self {
            host: default_host(),
            port,
            model_name: model_name.into(),
            gpu_id: None,
            max_gpu_memory: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Server {
    /// Generated by the backend.
    #[serde(rename = "server_id")]
    pub id: String,
    pub status: ServerStatus,
    pub config: ServerConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerList {
    pub servers: Vec<Server>,
}

#[derive(Clone, Debug, Serialize)]
pub struct DownloadRequest<'a> {
    pub model_name: &'a str,
}

#[derive(Clone, Debug, Serialize)]
pub struct LoadRequest<'a> {
    pub model_name: &'a str,
    pub gpu_id: Option<u32>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueryResponse {
    pub result: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadRepoRequest {
    pub repo_url: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadRepoResponse {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_wire_shape() {
        let m: Model = serde_json::from_value(serde_json::json!({
            "model_name": "m1",
            "status": "ready",
            "error": null
        }))
        .unwrap();
        assert_eq!(m.name, "m1");
        assert_eq!(m.status, Some(ModelStatus::Ready));
        assert_eq!(m.error, None);
    }

    #[test]
    fn test_model_without_status() {
        let m: Model = serde_json::from_str(r#"{"model_name":"m2"}"#).unwrap();
        assert_eq!(m.status, None);
    }

    #[test]
    fn test_server_list_shape() {
        let list: ServerList = serde_json::from_value(serde_json::json!({
            "servers": [{
                "server_id": "abcdef0123456789",
                "status": "running",
                "config": { "port": 8001, "model_name": "m1" }
            }]
        }))
        .unwrap();
        let s = &list.servers[0];
        assert_eq!(s.id, "abcdef0123456789");
        assert_eq!(s.status, ServerStatus::Running);
        assert_eq!(s.config.host, "0.0.0.0");
        assert_eq!(s.config.gpu_id, None);
    }

    #[test]
    fn test_load_request_keeps_null_gpu() {
        let body = serde_json::to_value(LoadRequest { model_name: "m1", gpu_id: None }).unwrap();
        assert_eq!(body, serde_json::json!({ "model_name": "m1", "gpu_id": null }));
    }
}
