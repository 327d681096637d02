use axum::{extract::State, Json};
use modelops::{QueryRequest, QueryResponse};
use tracing::info;
use uuid::Uuid;

use crate::state::SharedState;

pub async fn query(State(state): State<SharedState>, Json(req): Json<QueryRequest>) -> Json<QueryResponse> {
    let request_id = Uuid::new_v4();
    info!(%request_id, query = %req.query, "query: received");

    let result = crate::react::run(&req.query, state.vector.as_ref(), state.graph.as_ref()).await;

    info!(%request_id, bytes = result.len(), "query: answered");
    Json(QueryResponse { result })
}
