//! Hugging Face Hub model finder.
//!
//! `search` lists models matching the size and keyword filters in the search
//! config; `config` fetches a model's `config.json`, saves it and prints the
//! serving-relevant fields.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use modelops::{HubClient, ModelConfigSummary, SearchConfig};
use serde_json::Value;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Find candidate models on the Hugging Face Hub
#[derive(Parser, Debug)]
#[command(name = "model-finder")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Search config (YAML)
    #[arg(long, short, env = "MODEL_SEARCH_CONFIG", default_value = "model_search_config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Search the hub and print models that pass every filter
    Search,
    /// Fetch config.json for a model (defaults to `target_model` from the config)
    Config {
        model_id: Option<String>,
        /// Where fetched configs are written
        #[arg(long, default_value = "model_configs")]
        out_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let search = load_search_config(&cli.config)?;
    let hub = HubClient::from_env()?;

    match cli.command {
        Commands::Search => run_search(&hub, &search).await,
        Commands::Config { model_id, out_dir } => {
            let Some(model_id) = model_id.or(search.target_model) else {
                bail!("no model id given and no target_model in {}", cli.config.display());
            };
            run_config(&hub, &model_id, &out_dir).await
        }
    }
}

/// A missing config file means default filters; a broken one is an error.
fn load_search_config(path: &Path) -> Result<SearchConfig> {
    if !path.exists() {
        info!(path = %path.display(), "search config not found, using defaults");
        return Ok(SearchConfig::default());
    }
    Ok(SearchConfig::load(path)?)
}

async fn run_search(hub: &HubClient, cfg: &SearchConfig) -> Result<()> {
    println!("Searching {} for {:?}...", hub.base_url(), cfg.searches);
    println!("Size range: {}B-{}B", cfg.size.min, cfg.size.max);
    if !cfg.keywordfilter.is_empty() {
        println!("Negative keywords: {:?}", cfg.keywordfilter);
    }
    if !cfg.filters.require_all.is_empty() {
        println!("Required keywords: {:?}", cfg.filters.require_all);
    }

    let found = hub.find(cfg).await.context("hub search failed")?;
    if found.is_empty() {
        println!("\nNo models found matching all criteria.");
        return Ok(());
    }

    println!("\nFound {} matching models:\n", found.len());
    for c in &found {
        println!("{c}\n-------------------");
    }
    Ok(())
}

async fn run_config(hub: &HubClient, model_id: &str, out_dir: &Path) -> Result<()> {
    println!("Fetching config for model: {model_id}");
    let raw = hub
        .fetch_config(model_id)
        .await
        .with_context(|| format!("fetching config for {model_id}"))?;

    let path = save_config(out_dir, model_id, &raw)?;
    println!("Config saved to: {}\n", path.display());
    println!("{}", ModelConfigSummary::from_config(&raw));
    Ok(())
}

/// Writes `<out_dir>/<owner>--<name>/config.json` and returns its path.
fn save_config(out_dir: &Path, model_id: &str, raw: &Value) -> Result<PathBuf> {
    let dir = out_dir.join(model_id.replace('/', "--"));
    std::fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
    let path = dir.join("config.json");
    std::fs::write(&path, serde_json::to_vec_pretty(raw)?).with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}
