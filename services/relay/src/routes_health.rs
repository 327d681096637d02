use axum::{extract::State, Json};
use serde::Serialize;
use tracing::warn;

use crate::state::SharedState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub milvus: &'static str,
    pub neo4j: &'static str,
    pub llm: &'static str,
}

fn label(name: &str, res: anyhow::Result<()>) -> &'static str {
    match res {
        Ok(()) => "healthy",
        Err(e) => {
            warn!(dependency = name, error = %e, "health check failed");
            "unhealthy"
        }
    }
}

pub async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let (milvus, neo4j, llm) = tokio::join!(state.vector.ping(), state.graph.ping(), state.llm.ping());
    Json(HealthResponse {
        milvus: label("milvus", milvus),
        neo4j: label("neo4j", neo4j),
        llm: label("llm", llm),
    })
}
