mod config;
mod core;
mod error;
mod interfaces;
mod logging;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::config::AppConfig;
use crate::core::llm::{LlmClient, OpenAiCompatClient};
use crate::core::modules::ModuleRegistry;
use crate::core::store::Store;
use crate::core::sync::{ProgressBus, SyncOrchestrator};
use crate::interfaces::web::ApiServer;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("mirra: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();

    let mut config_path: Option<PathBuf> = None;
    let mut api_host: Option<String> = None;
    let mut api_port: Option<u16> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--api-host" => {
                if i + 1 < args.len() {
                    api_host = Some(args[i + 1].clone());
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--api-port" => {
                if i + 1 < args.len() {
                    api_port = args[i + 1].parse().ok();
                    i += 2;
                } else {
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }

    let mut config = AppConfig::load(config_path.as_deref())?;
    if let Some(host) = api_host {
        config.api_host = host;
    }
    if let Some(port) = api_port {
        config.api_port = port;
    }

    let (log_tx, _) = tokio::sync::broadcast::channel::<String>(500);
    logging::init(log_tx.clone());
    info!("starting mirra...");

    let db_path = config.database_path();
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let store = Arc::new(Store::open(&db_path)?);

    let llm: Arc<dyn LlmClient> = Arc::new(OpenAiCompatClient::new(
        config.llm.base_url.clone(),
        config.llm.model.clone(),
        config.api_key(),
    ));
    let registry = Arc::new(ModuleRegistry::standard(store.clone(), llm));
    let bus = Arc::new(ProgressBus::new(256));
    let orchestrator = Arc::new(SyncOrchestrator::new(
        store.clone(),
        registry,
        bus,
        config.sync.clone(),
    ));

    let server = ApiServer::new(
        store,
        orchestrator,
        log_tx,
        config.api_host.clone(),
        config.api_port,
    );
    server.serve().await
}
