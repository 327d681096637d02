mod config;
mod error;
mod state;
mod provider;
mod provider_lmstudio;
mod stores;
mod react;
mod routes_query;
mod routes_repo;
mod routes_chat;
mod routes_health;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{routing::{get, post}, Router};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::config::AppConfig;
use crate::provider::LLMProvider;
use crate::state::{AppState, SharedState};
use crate::stores::{MilvusStore, Neo4jStore};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cfg = AppConfig::from_env()?;

    let llm: Arc<dyn LLMProvider> = Arc::new(crate::provider_lmstudio::LmStudioProvider::new(&cfg.llm));
    info!(provider = ?llm.info(), "llm provider configured");

    // --- Startup checks (fail fast) ---
    let milvus = MilvusStore::new(cfg.milvus.clone(), llm.clone());
    milvus.connect().await?;
    info!(url = %cfg.milvus.url, "milvus: ok");

    let neo4j = Neo4jStore::new(cfg.neo4j.clone());
    let app_state = Arc::new(AppState::new(Arc::new(milvus), Arc::new(neo4j), llm));

    let shutdown = CancellationToken::new();
    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("relay: shutdown requested");
            on_signal.cancel();
        }
    });

    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", cfg.bind_addr))?;
    info!("relay listening on http://{}", cfg.bind_addr);

    axum::serve(listener, build_router(app_state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("relay server failed")?;

    Ok(())
}

pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/query", post(crate::routes_query::query))
        .route("/upload_repo", post(crate::routes_repo::upload_repo))
        .route("/chat/", post(crate::routes_chat::chat))
        .route("/health", get(crate::routes_health::health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
