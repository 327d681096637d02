use std::sync::Arc;

use crate::provider::LLMProvider;
use crate::stores::{GraphStore, VectorStore};

pub type SharedState = Arc<AppState>;

#[derive(Clone)]
pub struct AppState {
    pub vector: Arc<dyn VectorStore>,
    pub graph: Arc<dyn GraphStore>,
    pub llm: Arc<dyn LLMProvider>,
}

impl AppState {
    pub fn new(vector: Arc<dyn VectorStore>, graph: Arc<dyn GraphStore>, llm: Arc<dyn LLMProvider>) -> Self {
        Self { vector, graph, llm }
    }
}
