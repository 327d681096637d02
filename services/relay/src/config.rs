use anyhow::{bail, Context, Result};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub bind_addr: String,
    pub milvus: MilvusConfig,
    pub neo4j: Neo4jConfig,
    pub llm: LlmConfig,
}

#[derive(Clone, Debug)]
pub struct MilvusConfig {
    pub url: String,
    pub collection: String,
    pub dimension: usize,
}

#[derive(Clone, Debug)]
pub struct Neo4jConfig {
    pub url: String,
    pub user: String,
    pub password: String,
    pub database: String,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: Option<String>,
    pub embedding_model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let bind_addr = match std::env::var("RELAY_BIND_ADDR") {
            Ok(addr) => addr,
            Err(_) => format!("0.0.0.0:{}", or("PORT", "3000")),
        };

        let milvus = MilvusConfig {
            url: or("MILVUS_URL", "http://milvus:19530"),
            collection: or("MILVUS_COLLECTION", "code_snippets"),
            dimension: parse("EMBEDDING_DIM", 384)?,
        };

        let neo4j = Neo4jConfig {
            url: or("NEO4J_URL", "http://neo4j:7474"),
            user: or("NEO4J_USER", "neo4j"),
            password: or("NEO4J_PASSWORD", "password"),
            database: or("NEO4J_DATABASE", "neo4j"),
        };

        let llm = LlmConfig {
            base_url: or("LLM_BASE_URL", "http://127.0.0.1:1234"),
            model: std::env::var("LLM_MODEL").ok(),
            embedding_model: or("LLM_EMBEDDING_MODEL", "all-MiniLM-L6-v2"),
            max_tokens: parse("LLM_MAX_TOKENS", 512)?,
            temperature: parse("LLM_TEMPERATURE", 0.2)?,
        };

        // Tiny sanity checks (fail fast, fail loud)
        for (key, url) in [("MILVUS_URL", &milvus.url), ("NEO4J_URL", &neo4j.url), ("LLM_BASE_URL", &llm.base_url)] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                bail!("{key} must start with http:// or https://");
            }
        }
        if milvus.dimension == 0 {
            bail!("EMBEDDING_DIM must be greater than zero");
        }

        Ok(Self { bind_addr, milvus, neo4j, llm })
    }
}

fn or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(v) => v.trim().parse().with_context(|| format!("Invalid value for env var {key}: {v:?}")),
        Err(_) => Ok(default),
    }
}
