//! Fixed thought/action/observation transcript for `/query`.
//!
//! There is no planner here: the relay always searches the vector store and
//! then queries the graph store, in that order, for every input.

use std::fmt::Write;

use tracing::warn;

use crate::stores::{GraphStore, VectorStore};

pub const THOUGHTS: [&str; 3] = [
    "I need to determine what kind of query this is.",
    "Based on the keywords, I can decide which database to query.",
    "After getting the results, I should format them for the user.",
];

pub const ANSWER: &str = "Based on the observations, here's a summary...";

const SEARCH_LIMIT: usize = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    SearchVectorStore,
    QueryGraphStore,
}

impl Step {
    pub const PIPELINE: [Step; 2] = [Step::SearchVectorStore, Step::QueryGraphStore];

    pub fn name(&self) -> &'static str {
        match self {
            Step::SearchVectorStore => "search_vector_store",
            Step::QueryGraphStore => "query_graph_store",
        }
    }

    pub fn failure_text(&self) -> &'static str {
        match self {
            Step::SearchVectorStore => "Error searching vector store",
            Step::QueryGraphStore => "Error querying graph store",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Observation {
    pub step: Step,
    pub input: String,
    pub output: String,
}

/// Runs both steps. A failing store becomes the observation text; the
/// transcript is always produced.
pub async fn run(query: &str, vector: &dyn VectorStore, graph: &dyn GraphStore) -> String {
    let mut observations = Vec::with_capacity(Step::PIPELINE.len());
    for step in Step::PIPELINE {
        let output = match step {
            Step::SearchVectorStore => match vector.search(query, SEARCH_LIMIT).await {
                Ok(hits) => serde_json::to_string(&hits).unwrap_or_default(),
                Err(e) => {
                    warn!(error = %e, "vector store search failed");
                    step.failure_text().to_string()
                }
            },
            Step::QueryGraphStore => match graph.sample_nodes(SEARCH_LIMIT).await {
                Ok(nodes) => serde_json::to_string(&nodes).unwrap_or_default(),
                Err(e) => {
                    warn!(error = %e, "graph store query failed");
                    step.failure_text().to_string()
                }
            },
        };
        observations.push(Observation { step, input: query.to_string(), output });
    }
    render(&observations)
}

pub fn render(observations: &[Observation]) -> String {
    let mut out = String::new();
    for thought in THOUGHTS {
        let _ = writeln!(out, "Thought: {thought}");
    }
    for o in observations {
        let _ = writeln!(out, "Action: {}[{}]", o.step.name(), o.input);
        let _ = writeln!(out, "Observation: {}", o.output);
    }
    let _ = write!(out, "Answer: {ANSWER}");
    out
}
