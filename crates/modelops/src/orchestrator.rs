use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::client::Backend;
use crate::error::{ClientError, Result};
use crate::notify::Notifier;
use crate::presentation::{model_actions, server_actions};
use crate::schema::{Ack, ServerConfig};
use crate::store::{EntityKind, LifecycleStore};

/// One lifecycle transition request. The entity status is never written
/// locally; the next snapshot reflects whatever the backend did.
#[derive(Clone, Debug, PartialEq)]
pub enum Mutation {
    Download { model_name: String },
    Load { model_name: String, gpu_id: Option<u32> },
    Unload { model_name: String },
    Start { config: ServerConfig },
    Stop { server_id: String },
    HealthCheck { server_id: String },
}

impl Mutation {
    pub fn kind(&self) -> EntityKind {
        match self {
            Mutation::Download { .. } | Mutation::Load { .. } | Mutation::Unload { .. } => EntityKind::Models,
            Mutation::Start { .. } | Mutation::Stop { .. } | Mutation::HealthCheck { .. } => EntityKind::Servers,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Mutation::Download { .. } => "download",
            Mutation::Load { .. } => "load",
            Mutation::Unload { .. } => "unload",
            Mutation::Start { .. } => "start",
            Mutation::Stop { .. } => "stop",
            Mutation::HealthCheck { .. } => "health",
        }
    }

    pub fn target(&self) -> &str {
        match self {
            Mutation::Download { model_name } | Mutation::Load { model_name, .. } | Mutation::Unload { model_name } => {
                model_name
            }
            Mutation::Start { config } => &config.model_name,
            Mutation::Stop { server_id } | Mutation::HealthCheck { server_id } => server_id,
        }
    }

    pub fn success_message(&self) -> &'static str {
        match self {
            Mutation::Download { .. } => "Model download started",
            Mutation::Load { .. } => "Model loaded successfully",
            Mutation::Unload { .. } => "Model unloaded successfully",
            Mutation::Start { .. } => "Server started successfully",
            Mutation::Stop { .. } => "Server stopped successfully",
            Mutation::HealthCheck { .. } => "Health check completed",
        }
    }

    pub fn failure_prefix(&self) -> &'static str {
        match self {
            Mutation::Download { .. } => "Failed to download model",
            Mutation::Load { .. } => "Failed to load model",
            Mutation::Unload { .. } => "Failed to unload model",
            Mutation::Start { .. } => "Failed to start server",
            Mutation::Stop { .. } => "Failed to stop server",
            Mutation::HealthCheck { .. } => "Health check failed",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelAction {
    Download,
    Load { gpu_id: Option<u32> },
    Unload,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServerAction {
    Start,
    Stop,
    HealthCheck,
}

/// An operator action aimed at an entity in the current snapshot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Intent {
    Model { name: String, action: ModelAction },
    Server { id: String, action: ServerAction },
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no {kind} entry named {key:?} in the current snapshot")]
    NotFound { kind: EntityKind, key: String },
    #[error("{action} is disabled for {key} while status is {status}")]
    Disabled {
        action: &'static str,
        key: String,
        status: String,
    },
    #[error(transparent)]
    Client(#[from] ClientError),
}

pub struct MutationOrchestrator {
    backend: Arc<dyn Backend>,
    store: Arc<LifecycleStore>,
    notifier: Notifier,
}

impl MutationOrchestrator {
    pub fn new(backend: Arc<dyn Backend>, store: Arc<LifecycleStore>, notifier: Notifier) -> Self {
        Self { backend, store, notifier }
    }

    pub fn store(&self) -> &Arc<LifecycleStore> {
        &self.store
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Sends exactly one request. Success invalidates the affected snapshot;
    /// failure is surfaced as-is with no retry. Concurrent calls for the same
    /// entity are all sent.
    pub async fn execute(&self, m: Mutation) -> Result<Ack> {
        info!(op = m.name(), target = m.target(), "mutation: sending");
        let res = match &m {
            Mutation::Download { model_name } => self.backend.download_model(model_name).await,
            Mutation::Load { model_name, gpu_id } => self.backend.load_model(model_name, *gpu_id).await,
            Mutation::Unload { model_name } => self.backend.unload_model(model_name).await,
            Mutation::Start { config } => self.backend.start_server(config).await,
            Mutation::Stop { server_id } => self.backend.stop_server(server_id).await,
            Mutation::HealthCheck { server_id } => self.backend.check_health(server_id).await,
        };

        match res {
            Ok(ack) => {
                info!(op = m.name(), target = m.target(), "mutation: acknowledged");
                self.notifier.success(m.success_message());
                self.store.invalidate(m.kind()).await;
                Ok(ack)
            }
            Err(e) => {
                warn!(op = m.name(), target = m.target(), error = %e, "mutation failed");
                self.notifier.error(format!("{}: {}", m.failure_prefix(), e));
                Err(e)
            }
        }
    }

    pub async fn download_model(&self, model_name: &str) -> Result<Ack> {
        self.execute(Mutation::Download { model_name: model_name.to_string() }).await
    }

    pub async fn load_model(&self, model_name: &str, gpu_id: Option<u32>) -> Result<Ack> {
        self.execute(Mutation::Load { model_name: model_name.to_string(), gpu_id }).await
    }

    pub async fn unload_model(&self, model_name: &str) -> Result<Ack> {
        self.execute(Mutation::Unload { model_name: model_name.to_string() }).await
    }

    pub async fn start_server(&self, config: ServerConfig) -> Result<Ack> {
        self.execute(Mutation::Start { config }).await
    }

    pub async fn stop_server(&self, server_id: &str) -> Result<Ack> {
        self.execute(Mutation::Stop { server_id: server_id.to_string() }).await
    }

    pub async fn check_health(&self, server_id: &str) -> Result<Ack> {
        self.execute(Mutation::HealthCheck { server_id: server_id.to_string() }).await
    }

    /// Checks the intent against the current snapshot and only sends the
    /// request when the matching action is enabled.
    pub async fn dispatch(&self, intent: Intent) -> std::result::Result<Ack, DispatchError> {
        let m = self.resolve(&intent)?;
        Ok(self.execute(m).await?)
    }

    pub fn resolve(&self, intent: &Intent) -> std::result::Result<Mutation, DispatchError> {
        match intent {
            Intent::Model { name, action } => {
                let state = self.store.models().state();
                let Some(model) = state.find(name) else {
                    // Unknown to the backend means no status, which only allows download.
                    if *action == ModelAction::Download {
                        return Ok(Mutation::Download { model_name: name.clone() });
                    }
                    return Err(DispatchError::NotFound { kind: EntityKind::Models, key: name.clone() });
                };
                let enabled = model_actions(model);
                let status = model.status.map(|s| s.as_str()).unwrap_or("unknown");
                let (allowed, label, m) = match *action {
                    ModelAction::Download => (enabled.download, "download", Mutation::Download { model_name: name.clone() }),
                    ModelAction::Load { gpu_id } => (enabled.load, "load", Mutation::Load { model_name: name.clone(), gpu_id }),
                    ModelAction::Unload => (enabled.unload, "unload", Mutation::Unload { model_name: name.clone() }),
                };
                if !allowed {
                    return Err(DispatchError::Disabled { action: label, key: name.clone(), status: status.to_string() });
                }
                Ok(m)
            }
            Intent::Server { id, action } => {
                let state = self.store.servers().state();
                let server = state.find(id).ok_or_else(|| DispatchError::NotFound {
                    kind: EntityKind::Servers,
                    key: id.clone(),
                })?;
                let enabled = server_actions(server);
                let (allowed, label, m) = match action {
                    ServerAction::Start => (enabled.start, "start", Mutation::Start { config: server.config.clone() }),
                    ServerAction::Stop => (enabled.stop, "stop", Mutation::Stop { server_id: id.clone() }),
                    ServerAction::HealthCheck => (enabled.health, "health", Mutation::HealthCheck { server_id: id.clone() }),
                };
                if !allowed {
                    return Err(DispatchError::Disabled {
                        action: label,
                        key: id.clone(),
                        status: server.status.as_str().to_string(),
                    });
                }
                Ok(m)
            }
        }
    }
}
