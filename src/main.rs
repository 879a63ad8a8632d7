//! Crashline server binary

use clap::Parser;
use crashline::api::ApiServer;
use crashline::config::{ConfigLoader, CrashConfig, LedgerBackend};
use crashline::game::CrashGame;
use crashline::ledger::{seed_balances, InMemoryLedger, Ledger, RocksLedger};
use crashline::round_store::{RocksRoundStore, RoundStore};
use crashline::storage::OptimizedStorage;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "crashline")]
#[command(about = "Crash game round server", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(long)]
    config: Option<String>,

    /// Use short development timings and an in-memory ledger
    #[arg(long)]
    dev: bool,

    /// Server host (overrides config)
    #[arg(long)]
    host: Option<String>,

    /// Server port (overrides config)
    #[arg(long)]
    port: Option<u16>,

    /// Database directory (overrides config)
    #[arg(long)]
    db_path: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "crashline=info,tower_http=info".into()),
        )
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;

    info!("🚀 Starting Crashline");
    info!("   Wait time: {}ms", config.game.wait_time_ms);
    info!("   Max round duration: {}ms", config.game.max_round_duration_ms);
    info!("   Ledger backend: {:?}", config.ledger.backend);

    info!("📂 Opening database: {}", config.storage.data_directory);
    let storage = OptimizedStorage::new_with_config(&config.storage)?;

    let ledger: Arc<dyn Ledger> = match config.ledger.backend {
        LedgerBackend::Rocksdb => Arc::new(RocksLedger::new(storage.clone())),
        LedgerBackend::Memory => Arc::new(InMemoryLedger::new()),
    };
    let seeded = seed_balances(ledger.as_ref(), &config.ledger.seed_balances).await?;
    if seeded > 0 {
        info!("💵 Seeded {} balances", seeded);
    }

    let store: Arc<dyn RoundStore> = Arc::new(RocksRoundStore::new(storage));
    let game = CrashGame::new(&config.game, ledger, store);

    ApiServer::new(config.server, game).run().await
}

fn load_config(args: &Args) -> Result<CrashConfig, Box<dyn std::error::Error>> {
    let mut config = match (&args.config, args.dev) {
        (Some(path), _) => ConfigLoader::new().with_path(path).load()?,
        (None, true) => CrashConfig::development(),
        (None, false) => ConfigLoader::new().load()?,
    };

    if let Some(host) = &args.host {
        config.server.host = host.clone();
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(db_path) = &args.db_path {
        config.storage.data_directory = db_path.clone();
    }

    config.validate()?;
    Ok(config)
}
