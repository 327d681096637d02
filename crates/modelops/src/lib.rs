//! Client-side lifecycle management for models and inference servers:
//! the backend contract, an owned snapshot cache with polling, and the
//! mutation orchestrator that drives transitions through the backend, plus
//! Hugging Face Hub discovery for picking models to download.

pub mod schema;
pub mod error;
pub mod config;
pub mod client;
pub mod store;
pub mod notify;
pub mod orchestrator;
pub mod presentation;
pub mod hub;

#[cfg(test)]
pub(crate) mod testing;

pub use schema::*;
pub use error::{ClientError, Result};
pub use config::ClientConfig;
pub use client::{ApiClient, Backend};
pub use store::{Entity, EntityKind, LifecycleStore, Mounted, Query, QueryState, Snapshot};
pub use notify::{Level, Notification, Notifier};
pub use orchestrator::{DispatchError, Intent, ModelAction, Mutation, MutationOrchestrator, ServerAction};
pub use presentation::*;
pub use hub::{Candidate, HubClient, HubModel, ModelConfigSummary, SearchConfig};
