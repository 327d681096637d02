use anyhow::Context;
use async_trait::async_trait;

use crate::config::LlmConfig;
use crate::provider::{ChatMessage, LLMProvider, ProviderInfo};

/// OpenAI-compatible endpoint as served by LM Studio.
pub struct LmStudioProvider {
    base_url: String,
    model: String,
    embedding_model: String,
    max_tokens: u32,
    temperature: f32,
    client: reqwest::Client,
}

impl LmStudioProvider {
    pub fn new(cfg: &LlmConfig) -> Self {
        Self {
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            model: cfg.model.clone().unwrap_or_else(|| "default".to_string()),
            embedding_model: cfg.embedding_model.clone(),
            max_tokens: cfg.max_tokens,
            temperature: cfg.temperature,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl LLMProvider for LmStudioProvider {
    async fn complete(&self, messages: &[ChatMessage]) -> anyhow::Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
        });

        let url = format!("{}/v1/chat/completions", self.base_url);
        let resp = self.client.post(url).json(&body).send().await?.error_for_status()?;
        let json: serde_json::Value = resp.json().await?;

        json["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .context("completion response has no message content")
    }

    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let body = serde_json::json!({
            "model": self.embedding_model,
            "input": text,
        });

        let url = format!("{}/v1/embeddings", self.base_url);
        let resp = self.client.post(url).json(&body).send().await?.error_for_status()?;
        let json: serde_json::Value = resp.json().await?;

        let values = json["data"][0]["embedding"]
            .as_array()
            .context("embedding response has no vector")?;
        Ok(values.iter().filter_map(|v| v.as_f64()).map(|v| v as f32).collect())
    }

    async fn ping(&self) -> anyhow::Result<()> {
        let url = format!("{}/v1/models", self.base_url);
        self.client.get(url).send().await?.error_for_status()?;
        Ok(())
    }

    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: "lmstudio".to_string(),
            base_url: self.base_url.clone(),
        }
    }
}
