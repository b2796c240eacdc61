use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use grades_relay::cache::policy::CachePolicy;
use grades_relay::config::settings::{StoreConfig, StoreType};
use grades_relay::coordinator::Coordinator;
use grades_relay::server;
use grades_relay::store::{FileStore, MemoryStore, SessionStore};
use grades_relay::upstream::HttpUpstream;
use grades_relay::utils::config_loader;
use grades_relay::utils::logging;
use grades_relay::utils::logging::LogLevel;
use tracing::info;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, env = "CONFIG", default_value = "grades-relay.yaml")]
    config: String,
    #[arg(long, env = "LOG_LEVEL", value_enum)]
    log_level: Option<LogLevel>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // -------------------------------
    // 1. Read args, load YAML config
    // -------------------------------

    let args = Args::parse();
    let service_config = config_loader::run(&args.config).await?;
    logging::run(&service_config, args.log_level);

    // -------------------------------
    // 2. Resolve shared identity
    // -------------------------------

    let identity = service_config
        .upstream
        .identity
        .resolve()
        .context("resolving shared upstream identity")?;

    // -------------------------------
    // 3. Build store, upstream client, coordinator
    // -------------------------------

    let store = build_store(&service_config.settings.store);
    let upstream = HttpUpstream::new(&service_config.upstream)?;
    let policy = CachePolicy::new(Duration::from_secs(
        service_config.settings.cache.freshness_window_seconds,
    ));
    let coordinator = Arc::new(Coordinator::new(store, upstream, identity, policy));

    // -------------------------------
    // 4. Start http server
    // -------------------------------

    info!(
        freshness_window_seconds = service_config.settings.cache.freshness_window_seconds,
        "Service starting..."
    );
    server::server::start(&service_config.settings, coordinator).await
}

fn build_store(cfg: &StoreConfig) -> SessionStore {
    match (cfg.store_type, cfg.path.as_deref()) {
        (StoreType::File, Some(path)) => {
            let store = FileStore::new(path, &cfg.key);
            info!("session store: file {}", store.path().display());
            SessionStore::File(store)
        }
        // validation rejects file stores without a path
        _ => {
            info!("session store: memory");
            SessionStore::Memory(MemoryStore::new(cfg.key.clone()))
        }
    }
}
