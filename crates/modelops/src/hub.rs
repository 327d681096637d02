//! Model discovery on the Hugging Face Hub: keyword searches narrowed by
//! parameter count and required keywords, and `config.json` inspection for
//! a chosen model before it is downloaded.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::client::decode;
use crate::config::normalize_base_url;
use crate::error::{ClientError, Result};

pub const DEFAULT_HUB_URL: &str = "https://huggingface.co";
const HUB_TIMEOUT: Duration = Duration::from_secs(30);

/// Keys that may carry the context window, in lookup order.
const CONTEXT_KEYS: &[&str] = &[
    "max_position_embeddings",
    "max_sequence_length",
    "context_window",
    "max_length",
    "n_positions",
    "window_size",
];

/// Tag fragments worth showing next to a candidate.
const RELEVANT_TAGS: &[&str] = &["code", "instruct", "coder"];

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HubModel {
    pub id: String,
    #[serde(default)]
    pub downloads: Option<u64>,
    #[serde(default, rename = "lastModified")]
    pub last_modified: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub pipeline_tag: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct SizeRange {
    #[serde(default)]
    pub min: f64,
    #[serde(default = "unbounded")]
    pub max: f64,
}

fn unbounded() -> f64 {
    f64::INFINITY
}

impl Default for SizeRange {
    fn default() -> Self {
        Self { min: 0.0, max: unbounded() }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct KeywordFilters {
    #[serde(default)]
    pub require_all: Vec<String>,
}

fn default_searches() -> Vec<String> {
    vec!["instruct".to_string(), "code".to_string()]
}

fn default_limit() -> usize {
    50
}

/// Search settings, usually read from `model_search_config.yaml`.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct SearchConfig {
    /// Parameter count bounds, in billions.
    #[serde(default)]
    pub size: SizeRange,
    /// Models whose id contains any of these are skipped.
    #[serde(default)]
    pub keywordfilter: Vec<String>,
    #[serde(default)]
    pub filters: KeywordFilters,
    #[serde(default = "default_searches")]
    pub searches: Vec<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub target_model: Option<String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            size: SizeRange::default(),
            keywordfilter: Vec::new(),
            filters: KeywordFilters::default(),
            searches: default_searches(),
            limit: default_limit(),
            target_model: None,
        }
    }
}

impl SearchConfig {
    pub fn from_yaml(raw: &str) -> Result<Self> {
        let cfg: Self =
            serde_yaml::from_str(raw).map_err(|e| ClientError::Config(format!("invalid search config: {e}")))?;
        if cfg.size.min > cfg.size.max {
            return Err(ClientError::Config(format!(
                "size.min ({}) is greater than size.max ({})",
                cfg.size.min, cfg.size.max
            )));
        }
        Ok(cfg)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ClientError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_yaml(&raw)
    }
}

/// A search hit that passed every filter.
#[derive(Clone, Debug, PartialEq)]
pub struct Candidate {
    pub model: HubModel,
    pub size_b: f64,
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let relevant: Vec<&str> = self
            .model
            .tags
            .iter()
            .filter(|t| {
                let t = t.to_lowercase();
                RELEVANT_TAGS.iter().any(|k| t.contains(k))
            })
            .map(String::as_str)
            .collect();

        writeln!(f, "Model: {}", self.model.id)?;
        writeln!(f, "Size: {}B", self.size_b)?;
        match self.model.downloads {
            Some(d) => writeln!(f, "Downloads: {d}")?,
            None => writeln!(f, "Downloads: N/A")?,
        }
        writeln!(f, "Last Modified: {}", self.model.last_modified.as_deref().unwrap_or("N/A"))?;
        if relevant.is_empty() {
            writeln!(f, "Relevant tags: None")?;
        } else {
            writeln!(f, "Relevant tags: {}", relevant.join(", "))?;
        }
        write!(f, "Pipeline: {}", self.model.pipeline_tag.as_deref().unwrap_or("N/A"))
    }
}

fn size_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(?:^|[^a-z0-9.])(\d+(?:\.\d+)?)b(?:$|[^a-z0-9])").expect("size pattern is valid")
    })
}

/// Parameter count in billions as written in the model id (`...-14B-...`).
pub fn model_size_b(model_id: &str) -> Option<f64> {
    size_pattern()
        .captures(model_id)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Every required keyword must occur in the id, a tag or the pipeline tag.
pub fn has_required_keywords(model: &HubModel, required: &[String]) -> bool {
    let id = model.id.to_lowercase();
    let tags: Vec<String> = model.tags.iter().chain(model.pipeline_tag.iter()).map(|t| t.to_lowercase()).collect();

    required.iter().all(|kw| {
        let kw = kw.to_lowercase();
        id.contains(&kw) || tags.iter().any(|t| t.contains(&kw))
    })
}

/// Applies the negative keywords, the size range and the required keywords,
/// then orders by size (largest first) and downloads.
pub fn filter_candidates(models: Vec<HubModel>, cfg: &SearchConfig) -> Vec<Candidate> {
    let negative: Vec<String> = cfg.keywordfilter.iter().map(|k| k.to_lowercase()).collect();

    let mut out: Vec<Candidate> = models
        .into_iter()
        .filter(|m| {
            let id = m.id.to_lowercase();
            !negative.iter().any(|k| id.contains(k))
        })
        .filter_map(|m| {
            let size_b = model_size_b(&m.id)?;
            (cfg.size.min <= size_b && size_b <= cfg.size.max).then_some(Candidate { model: m, size_b })
        })
        .filter(|c| has_required_keywords(&c.model, &cfg.filters.require_all))
        .collect();

    out.sort_by(|a, b| {
        b.size_b
            .total_cmp(&a.size_b)
            .then_with(|| b.model.downloads.unwrap_or(0).cmp(&a.model.downloads.unwrap_or(0)))
    });
    out
}

/// The parts of a model's `config.json` that matter for serving it.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ModelConfigSummary {
    pub base_model: Option<String>,
    pub architectures: Vec<String>,
    pub context_length: Option<(String, u64)>,
    pub hidden_size: Option<u64>,
    pub num_attention_heads: Option<u64>,
    pub num_hidden_layers: Option<u64>,
    pub vocab_size: Option<u64>,
}

impl ModelConfigSummary {
    pub fn from_config(cfg: &Value) -> Self {
        let num = |key: &str| cfg.get(key).and_then(Value::as_u64);
        Self {
            base_model: cfg.get("_name_or_path").and_then(Value::as_str).map(str::to_string),
            architectures: cfg
                .get("architectures")
                .and_then(Value::as_array)
                .map(|a| a.iter().filter_map(Value::as_str).map(str::to_string).collect())
                .unwrap_or_default(),
            context_length: CONTEXT_KEYS.iter().find_map(|k| num(k).map(|v| (k.to_string(), v))),
            hidden_size: num("hidden_size"),
            num_attention_heads: num("num_attention_heads"),
            num_hidden_layers: num("num_hidden_layers"),
            vocab_size: num("vocab_size"),
        }
    }
}

impl fmt::Display for ModelConfigSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn or_na<T: fmt::Display>(v: &Option<T>) -> String {
            v.as_ref().map(|v| v.to_string()).unwrap_or_else(|| "N/A".to_string())
        }

        writeln!(f, "Base Model: {}", or_na(&self.base_model))?;
        if self.architectures.is_empty() {
            writeln!(f, "Architecture: N/A")?;
        } else {
            writeln!(f, "Architecture: {}", self.architectures.join(", "))?;
        }
        match &self.context_length {
            Some((key, v)) => writeln!(f, "Context Length ({key}): {v}")?,
            None => writeln!(f, "Context length not found in config")?,
        }
        writeln!(f, "Hidden Size: {}", or_na(&self.hidden_size))?;
        writeln!(f, "Num Attention Heads: {}", or_na(&self.num_attention_heads))?;
        writeln!(f, "Num Hidden Layers: {}", or_na(&self.num_hidden_layers))?;
        write!(f, "Vocabulary Size: {}", or_na(&self.vocab_size))
    }
}

#[derive(Clone)]
pub struct HubClient {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl HubClient {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(HUB_TIMEOUT)
            .build()
            .map_err(|e| ClientError::Config(e.to_string()))?;
        Ok(Self {
            base_url: normalize_base_url(base_url)?,
            token: token.filter(|t| !t.is_empty()),
            client,
        })
    }

    /// Reads `HF_ENDPOINT` and `HF_TOKEN`. Without a token only public
    /// models are visible.
    pub fn from_env() -> Result<Self> {
        let base = std::env::var("HF_ENDPOINT").unwrap_or_else(|_| DEFAULT_HUB_URL.to_string());
        let token = std::env::var("HF_TOKEN").ok();
        if token.is_none() {
            info!("HF_TOKEN not set, hub access is anonymous");
        }
        Self::new(&base, token)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn get(&self, url: String) -> reqwest::RequestBuilder {
        debug!(%url, "GET");
        let req = self.client.get(url);
        match &self.token {
            Some(t) => req.bearer_auth(t),
            None => req,
        }
    }

    /// Most-downloaded models matching `term`.
    pub async fn search(&self, term: &str, limit: usize) -> Result<Vec<HubModel>> {
        let url = format!(
            "{}/api/models?search={}&sort=downloads&direction=-1&limit={limit}",
            self.base_url,
            urlencoding::encode(term)
        );
        decode(self.get(url).send().await?).await
    }

    /// Runs every configured search and merges the hits, first occurrence wins.
    pub async fn search_all(&self, cfg: &SearchConfig) -> Result<Vec<HubModel>> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for term in &cfg.searches {
            for m in self.search(term, cfg.limit).await? {
                if seen.insert(m.id.clone()) {
                    out.push(m);
                }
            }
        }
        info!(found = out.len(), searches = cfg.searches.len(), "hub: search finished");
        Ok(out)
    }

    /// Searches and filters in one go.
    pub async fn find(&self, cfg: &SearchConfig) -> Result<Vec<Candidate>> {
        Ok(filter_candidates(self.search_all(cfg).await?, cfg))
    }

    /// The raw `config.json` from the model's main branch.
    pub async fn fetch_config(&self, model_id: &str) -> Result<Value> {
        let id = model_id.trim();
        if id.is_empty() || id.split('/').any(str::is_empty) {
            return Err(ClientError::Config(format!("invalid model id {model_id:?}")));
        }
        let path: Vec<_> = id.split('/').map(urlencoding::encode).collect();
        let url = format!("{}/{}/resolve/main/config.json", self.base_url, path.join("/"));
        decode(self.get(url).send().await?).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn hub_model(id: &str, downloads: u64, tags: &[&str]) -> HubModel {
        HubModel {
            id: id.into(),
            downloads: Some(downloads),
            last_modified: None,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            pipeline_tag: Some("text-generation".into()),
        }
    }

    #[test]
    fn test_model_size_from_id() {
        assert_eq!(model_size_b("Qwen/Qwen2.5-Coder-14B-Instruct"), Some(14.0));
        assert_eq!(model_size_b("meta-llama/Llama-2-13b-chat-hf"), Some(13.0));
        assert_eq!(model_size_b("Qwen/Qwen2.5-1.5B-Instruct"), Some(1.5));
        assert_eq!(model_size_b("mistralai/Mistral-7B-v0.1"), Some(7.0));
        assert_eq!(model_size_b("microsoft/phi-2"), None);
        assert_eq!(model_size_b("bigcode/starcoderbase"), None);
    }

    #[test]
    fn test_required_keywords_match_id_or_tags() {
        let m = hub_model("org/Coder-7B", 1, &["instruct"]);
        assert!(has_required_keywords(&m, &["code".into(), "instruct".into()]));
        assert!(has_required_keywords(&m, &["TEXT-GEN".into()]));
        assert!(!has_required_keywords(&m, &["chat".into()]));
        assert!(has_required_keywords(&m, &[]));
    }

    #[test]
    fn test_filter_candidates_orders_by_size_then_downloads() {
        let cfg = SearchConfig::from_yaml(
            "size: {min: 7, max: 14}\nkeywordfilter: [GGUF]\nfilters:\n  require_all: [instruct]\n",
        )
        .unwrap();
        let models = vec![
            hub_model("a/Small-7B-Instruct", 900, &[]),
            hub_model("b/Big-14B-Instruct", 10, &[]),
            hub_model("c/Other-7B-Instruct", 5000, &[]),
            hub_model("d/Huge-70B-Instruct", 1, &[]),
            hub_model("e/Base-8B", 1, &[]),
            hub_model("f/Quant-8B-Instruct-GGUF", 1, &[]),
            hub_model("g/phi-instruct", 1, &[]),
        ];

        let ids: Vec<String> = filter_candidates(models, &cfg).into_iter().map(|c| c.model.id).collect();
        assert_eq!(ids, vec!["b/Big-14B-Instruct", "c/Other-7B-Instruct", "a/Small-7B-Instruct"]);
    }

    #[test]
    fn test_search_config_defaults_and_validation() {
        let cfg = SearchConfig::from_yaml("target_model: Qwen/Qwen2.5-Coder-14B-Instruct\n").unwrap();
        assert_eq!(cfg.searches, vec!["instruct", "code"]);
        assert_eq!(cfg.limit, 50);
        assert!(cfg.size.max.is_infinite());
        assert_eq!(cfg.target_model.as_deref(), Some("Qwen/Qwen2.5-Coder-14B-Instruct"));

        let err = SearchConfig::from_yaml("size: {min: 20, max: 7}\n").unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));
    }

    #[test]
    fn test_config_summary_picks_first_context_key() {
        let summary = ModelConfigSummary::from_config(&json!({
            "_name_or_path": "Qwen/Qwen2.5-Coder-14B",
            "architectures": ["Qwen2ForCausalLM"],
            "max_length": 20,
            "max_position_embeddings": 32768,
            "hidden_size": 5120,
            "vocab_size": 152064
        }));
        assert_eq!(summary.context_length, Some(("max_position_embeddings".to_string(), 32768)));
        assert_eq!(summary.num_hidden_layers, None);

        let text = summary.to_string();
        assert!(text.contains("Architecture: Qwen2ForCausalLM"));
        assert!(text.contains("Context Length (max_position_embeddings): 32768"));
        assert!(text.contains("Num Hidden Layers: N/A"));

        let empty = ModelConfigSummary::from_config(&json!({}));
        assert!(empty.to_string().contains("Context length not found in config"));
    }

    #[test]
    fn test_candidate_display_lists_relevant_tags() {
        let c = Candidate {
            model: hub_model("org/Coder-7B-Instruct", 1234, &["code", "license:mit", "Instruct"]),
            size_b: 7.0,
        };
        let text = c.to_string();
        assert!(text.starts_with("Model: org/Coder-7B-Instruct\nSize: 7B\nDownloads: 1234\n"));
        assert!(text.contains("Relevant tags: code, Instruct"));
    }
}
