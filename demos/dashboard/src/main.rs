//! Terminal dashboard for model and server lifecycle.
//!
//! Polls the backend through the lifecycle store, prints cards whenever a
//! snapshot changes, prints notifications, and sends operator commands read
//! from stdin through the mutation orchestrator. `find` and `config` browse
//! the Hugging Face Hub for models worth downloading.

mod commands;

use std::sync::Arc;

use anyhow::{Context, Result};
use modelops::{
    ApiClient, Backend, ClientConfig, HubClient, Level, LifecycleStore, Model, ModelCard, ModelConfigSummary,
    MutationOrchestrator, Notification, Notifier, QueryState, SearchConfig, Server, ServerCard,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::warn;

use crate::commands::{Command, HELP};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cfg = ClientConfig::from_env().context("invalid dashboard configuration")?;
    let relay_url = std::env::var("RELAY_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());
    let relay = ApiClient::new(&ClientConfig::new(relay_url)?)?;

    let hub = HubClient::from_env()?;
    let search = match std::env::var("MODEL_SEARCH_CONFIG") {
        Ok(path) => SearchConfig::load(std::path::Path::new(&path))?,
        Err(_) => SearchConfig::default(),
    };

    let api = Arc::new(ApiClient::new(&cfg)?);
    let backend: Arc<dyn Backend> = api.clone();
    let store = Arc::new(LifecycleStore::new(backend.clone(), cfg.poll_interval));
    let orchestrator = MutationOrchestrator::new(backend, store.clone(), Notifier::default());

    println!("╔════════════════════════════════════════════════╗");
    println!("║  Model & Server Lifecycle Dashboard            ║");
    println!("╚════════════════════════════════════════════════╝");
    println!("   backend: {}", api.base_url());
    println!("   relay:   {}", relay.base_url());
    println!("{HELP}\n");

    let mut models = store.mount_models();
    let mut servers = store.mount_servers();
    let notes = orchestrator.notifier().subscribe();

    tokio::spawn(async move {
        while let Some(state) = models.changed().await {
            if !state.is_fetching {
                print_models(&state);
            }
        }
    });
    tokio::spawn(async move {
        while let Some(state) = servers.changed().await {
            if !state.is_fetching {
                print_servers(&state);
            }
        }
    });
    tokio::spawn(print_notifications(notes, |line| println!("{line}")));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => match line? {
                Some(l) => l,
                None => break,
            },
        };

        let cmd = match commands::parse(&line) {
            Ok(c) => c,
            Err(e) => {
                println!("{e}");
                continue;
            }
        };

        match cmd {
            Command::Quit => break,
            Command::Help => println!("{HELP}"),
            Command::Show => {
                print_models(&store.models().state());
                print_servers(&store.servers().state());
            }
            Command::Intent(intent) => {
                // Failed requests are already reported through the notifier.
                if let Err(e @ (modelops::DispatchError::Disabled { .. } | modelops::DispatchError::NotFound { .. })) =
                    orchestrator.dispatch(intent).await
                {
                    println!("⚠ {e}");
                }
            }
            Command::StartNew(config) => {
                let _ = orchestrator.start_server(config).await;
            }
            Command::Query(q) => match relay.query(&q).await {
                Ok(r) => println!("{}", r.result),
                Err(e) => println!("✗ query failed: {e}"),
            },
            Command::Chat(m) => match relay.chat(&m).await {
                Ok(r) => println!("{}", r.response),
                Err(e) => println!("✗ chat failed: {e}"),
            },
            Command::Find(term) => {
                let mut search = search.clone();
                if let Some(term) = term {
                    search.searches = vec![term];
                }
                match hub.find(&search).await {
                    Ok(found) if found.is_empty() => println!("No models found matching all criteria."),
                    Ok(found) => {
                        for c in &found {
                            println!("{c}\n-------------------");
                        }
                        println!("use `download <model_id>` to fetch one");
                    }
                    Err(e) => println!("✗ hub search failed: {e}"),
                }
            }
            Command::HubConfig(id) => match hub.fetch_config(&id).await {
                Ok(raw) => println!("{}", ModelConfigSummary::from_config(&raw)),
                Err(e) => println!("✗ Error fetching config for {id}: {e}"),
            },
            Command::Upload(url) => match relay.upload_repo(&url).await {
                Ok(r) => println!("✓ {}", r.message),
                Err(e) => {
                    warn!(repo_url = %url, error = %e, "upload failed");
                    println!("✗ Error uploading repository: {e}");
                }
            },
        }
    }

    store.shutdown();
    println!("bye");
    Ok(())
}

fn print_models(state: &QueryState<Model>) {
    println!("── models ──────────────────────────────────────");
    if state.is_loading() {
        println!("   Loading models...");
        return;
    }
    if let Some(e) = &state.error {
        println!("   (refresh failed: {e}; showing last known data)");
    }
    for m in state.items() {
        let card = ModelCard::from(m);
        let a = card.actions;
        println!(
            "   {:<32} [{}]  download:{} load:{} unload:{}",
            card.title, card.status, flag(a.download), flag(a.load), flag(a.unload)
        );
        if let Some(err) = card.error {
            println!("      {err}");
        }
    }
}

fn print_servers(state: &QueryState<Server>) {
    println!("── servers ─────────────────────────────────────");
    if state.is_loading() {
        println!("   Loading servers...");
        return;
    }
    if let Some(e) = &state.error {
        println!("   (refresh failed: {e}; showing last known data)");
    }
    for s in state.items() {
        let card = ServerCard::from(s);
        let a = card.actions;
        println!(
            "   {:<16} {:<28} [{}]  start:{} stop:{} health:{}",
            card.title, card.subtitle, card.status, flag(a.start), flag(a.stop), flag(a.health)
        );
        if let Some(err) = card.error {
            println!("      {err}");
        }
    }
}

/// Forwards notifications until the notifier is gone. A lagging receiver
/// skips what it missed and keeps going.
async fn print_notifications(mut rx: broadcast::Receiver<Notification>, mut out: impl FnMut(String)) {
    loop {
        match rx.recv().await {
            Ok(n) => out(render_notification(&n)),
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "notifications dropped, console lagging"),
            Err(RecvError::Closed) => break,
        }
    }
}

fn render_notification(n: &Notification) -> String {
    match n.level {
        Level::Success => format!("✓ {}", n.message),
        Level::Error => format!("✗ {}", n.message),
    }
}

fn flag(enabled: bool) -> &'static str {
    if enabled { "on" } else { "off" }
}
