use std::sync::OnceLock;

use axum::{extract::State, http::StatusCode, Json};
use modelops::{ChatRequest, ChatResponse};
use regex::Regex;
use tracing::{debug, warn};

use crate::error::{api_error, ApiFailure};
use crate::provider::ChatMessage;
use crate::state::SharedState;

const SYSTEM_PROMPT: &str =
    "You are a helpful assistant. Only respond to the user's query and do not generate any additional content.";
const CONTEXT_SNIPPETS: usize = 5;

pub async fn chat(
    State(state): State<SharedState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiFailure> {
    if req.message.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "message is empty"));
    }

    let mut messages = vec![ChatMessage::system(SYSTEM_PROMPT)];
    if wants_retrieval(&req.message) {
        match state.vector.search(&req.message, CONTEXT_SNIPPETS).await {
            Ok(hits) if !hits.is_empty() => {
                let context = hits
                    .iter()
                    .map(|h| format!("File: {}\nContent: {}\n", h.file_path, h.content))
                    .collect::<Vec<_>>()
                    .join("\n");
                messages.push(ChatMessage::system(format!("Here's some relevant information: {context}")));
            }
            Ok(_) => debug!("chat: retrieval returned nothing"),
            Err(e) => warn!(error = %e, "chat: retrieval failed, answering without context"),
        }
    }
    messages.push(ChatMessage::user(req.message));

    let raw = state
        .llm
        .complete(&messages)
        .await
        .map_err(|e| api_error(StatusCode::BAD_GATEWAY, e.to_string()))?;

    Ok(Json(ChatResponse { response: clean_output(&raw) }))
}

/// Messages about code or a repository get vector-store context.
pub fn wants_retrieval(message: &str) -> bool {
    let m = message.to_lowercase();
    m.contains("code") || m.contains("repository")
}

/// Drops timestamp lines and `##` headings some local models emit.
pub fn clean_output(raw: &str) -> String {
    static TIMESTAMP: OnceLock<Regex> = OnceLock::new();
    static HEADING: OnceLock<Regex> = OnceLock::new();
    let ts = TIMESTAMP.get_or_init(|| Regex::new(r"(?m)^\s*\d{4}-\d{2}-\d{2}\s+\d{2}:\d{2}.*$").expect("valid regex"));
    let h = HEADING.get_or_init(|| Regex::new(r"(?m)^\s*##.*$").expect("valid regex"));

    let out = ts.replace_all(raw, "");
    let out = h.replace_all(&out, "");
    out.trim().to_string()
}
