use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::client::Backend;
use crate::error::{ClientError, Result};
use crate::schema::*;

/// In-memory backend recording every call it receives.
#[derive(Default)]
pub struct FakeBackend {
    models: Mutex<Vec<Model>>,
    servers: Mutex<Vec<Server>>,
    list_error: Mutex<Option<String>>,
    mutation_error: Mutex<Option<String>>,
    list_delay: Mutex<Duration>,
    model_lists: AtomicUsize,
    server_lists: AtomicUsize,
    calls: Mutex<Vec<String>>,
}

impl FakeBackend {
    pub fn set_models(&self, models: Vec<Model>) {
        *self.models.lock().unwrap() = models;
    }

    pub fn set_servers(&self, servers: Vec<Server>) {
        *self.servers.lock().unwrap() = servers;
    }

    pub fn fail_lists_with(&self, msg: Option<&str>) {
        *self.list_error.lock().unwrap() = msg.map(str::to_string);
    }

    pub fn fail_mutations_with(&self, msg: Option<&str>) {
        *self.mutation_error.lock().unwrap() = msg.map(str::to_string);
    }

    pub fn set_list_delay(&self, d: Duration) {
        *self.list_delay.lock().unwrap() = d;
    }

    pub fn model_lists(&self) -> usize {
        self.model_lists.load(Ordering::SeqCst)
    }

    pub fn server_lists(&self) -> usize {
        self.server_lists.load(Ordering::SeqCst)
    }

    /// Mutation calls in arrival order, e.g. `unload m1`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    async fn list<T: Clone>(&self, counter: &AtomicUsize, items: &Mutex<Vec<T>>) -> Result<Vec<T>> {
        counter.fetch_add(1, Ordering::SeqCst);
        // The response reflects backend state when the request arrived.
        let snapshot = items.lock().unwrap().clone();
        let delay = *self.list_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(msg) = self.list_error.lock().unwrap().clone() {
            return Err(ClientError::Transport(msg));
        }
        Ok(snapshot)
    }

    fn mutate(&self, call: String) -> Result<Ack> {
        self.calls.lock().unwrap().push(call);
        match self.mutation_error.lock().unwrap().clone() {
            Some(msg) => Err(ClientError::Http { status: 500, message: msg }),
            None => Ok(serde_json::json!({ "ok": true })),
        }
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn list_models(&self) -> Result<Vec<Model>> {
        self.list(&self.model_lists, &self.models).await
    }

    async fn download_model(&self, model_name: &str) -> Result<Ack> {
        self.mutate(format!("download {model_name}"))
    }

    async fn load_model(&self, model_name: &str, gpu_id: Option<u32>) -> Result<Ack> {
        match gpu_id {
            Some(gpu) => self.mutate(format!("load {model_name} gpu={gpu}")),
            None => self.mutate(format!("load {model_name}")),
        }
    }

    async fn unload_model(&self, model_name: &str) -> Result<Ack> {
        self.mutate(format!("unload {model_name}"))
    }

    async fn list_servers(&self) -> Result<Vec<Server>> {
        self.list(&self.server_lists, &self.servers).await
    }

    async fn start_server(&self, config: &ServerConfig) -> Result<Ack> {
        self.mutate(format!("start {}:{}", config.model_name, config.port))
    }

    async fn stop_server(&self, server_id: &str) -> Result<Ack> {
        self.mutate(format!("stop {server_id}"))
    }

    async fn check_health(&self, server_id: &str) -> Result<Ack> {
        self.mutate(format!("health {server_id}"))
    }
}
