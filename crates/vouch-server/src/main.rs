//! vouch-server binary.
//!
//! Reads `config.toml` (or the path given with `--config`), opens the SQLite
//! metadata store, and serves the Vouch API over HTTP against an in-process
//! development ledger.

mod settings;

use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use vouch_core::{
  Address,
  fact::{FactPayload, Role, RoleAssignmentValue},
  memory::MemoryLedger,
  platform::Platform,
};
use vouch_store_sqlite::SqliteStore;

use crate::settings::{ServerConfig, expand_tilde};

#[derive(Parser)]
#[command(author, version, about = "Vouch ledger/metadata consistency server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: std::path::PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let server_cfg = ServerConfig::load(&cli.config)
    .with_context(|| format!("failed to load configuration from {:?}", cli.config))?;

  let store_path = expand_tilde(&server_cfg.store_path);
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  let ledger = MemoryLedger::new();
  ledger.set_polls_to_mine(server_cfg.dev_ledger.polls_to_mine);
  ledger.set_confirmations(server_cfg.dev_ledger.confirmations);
  if let Some(admin) = &server_cfg.seed_admin {
    let admin = Address::parse(admin).context("invalid seed_admin address")?;
    ledger.seed_confirmed(
      &admin,
      FactPayload::RoleAssignment(RoleAssignmentValue { role: Role::Admin }),
    );
    tracing::info!(%admin, "seeded admin role on development ledger");
  }

  let platform = Platform::new(
    Arc::new(ledger),
    Arc::new(store),
    server_cfg.coordinator.clone(),
  );
  let app = vouch_api::api_router(Arc::new(platform))
    .layer(TraceLayer::new_for_http());

  let address = format!("{}:{}", server_cfg.host, server_cfg.port);
  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}
