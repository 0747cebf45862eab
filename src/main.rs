//! Grid Arena - Unified CLI
//!
//! Staked two-player grid game server.

#![warn(missing_docs)]

mod cli;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Command};
use grid_arena::{
    AppState, EscrowLedger, GameRepository, GameStore, Gateway, Hub, Ledger, MatchOrchestrator, RpcLedger,
    ServerConfig, router, spawn_escrow_sweep, spawn_room_sweep,
};
use tracing::{info, instrument, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            config,
            host,
            port,
            db_path,
        } => {
            let mut config = ServerConfig::load_or_default(&config)?;
            if let Some(host) = host {
                config = config.with_host(host);
            }
            if let Some(port) = port {
                config = config.with_port(port);
            }
            if let Some(db_path) = db_path {
                config = config.with_database_path(db_path);
            }
            run_server(config).await
        }
        Command::Migrate { db_path } => run_migrate(db_path),
    }
}

/// Apply migrations and exit
#[instrument]
fn run_migrate(db_path: String) -> Result<()> {
    let repo = GameRepository::new(db_path)?;
    let applied = repo.run_migrations()?;
    info!(applied, "Database up to date");
    Ok(())
}

/// Run the game server
#[instrument(skip(config))]
async fn run_server(config: ServerConfig) -> Result<()> {
    info!("Starting Grid Arena server");

    let repo = GameRepository::new(config.database_path().clone())?;
    repo.run_migrations()?;
    let store: Arc<dyn GameStore> = Arc::new(repo);

    let mut rpc = RpcLedger::new(config.ledger().rpc_url().clone());
    match config.ledger().treasury_keypair_path() {
        Some(path) => {
            let key = RpcLedger::load_keypair(path).context("Loading treasury keypair")?;
            rpc = rpc.with_signer(key);
            if rpc.signer_address().as_deref() != Some(config.ledger().treasury_pubkey().as_str()) {
                warn!("Treasury keypair does not match treasury_pubkey; refunds and payouts will fail");
            }
        }
        None => warn!("No treasury keypair configured; refunds and payouts will fail"),
    }
    let ledger: Arc<dyn Ledger> = Arc::new(rpc);

    let escrow = Arc::new(EscrowLedger::new(
        ledger,
        config.ledger().treasury_pubkey().clone(),
        *config.fees(),
        *config.escrow(),
    ));
    let orchestrator = Arc::new(MatchOrchestrator::new(store, *config.fees()));
    let gateway = Gateway::new(Arc::clone(&orchestrator), Arc::clone(&escrow), Arc::new(Hub::new()));

    let interval = Duration::from_secs(*config.escrow().cleanup_interval_secs());
    let escrow_sweep = spawn_escrow_sweep(Arc::clone(&escrow), interval);
    let room_sweep = spawn_room_sweep(
        orchestrator,
        interval,
        Duration::from_secs(*config.room_retention_secs()),
    );

    let app = router(AppState::new(gateway));
    let listener = tokio::net::TcpListener::bind(config.bind_address()).await?;
    info!(address = %config.bind_address(), "Server ready");

    axum::serve(listener, app).await?;
    escrow_sweep.abort();
    room_sweep.abort();
    Ok(())
}
