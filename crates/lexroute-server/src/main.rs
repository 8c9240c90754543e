//! lexroute server binary.
//!
//! Reads `lexroute.toml` (or the path given with `--config`), opens the
//! SQLite record store and semantic index, and serves the JSON API over HTTP.
//! `generate` and `repair` run a single operation against the same stores
//! and exit.

use std::{path::PathBuf, time::Duration};

use anyhow::Context as _;
use axum::Router;
use clap::{Parser, Subcommand};
use lexroute_api::{ApiState, api_router};
use lexroute_core::profile::CompanyProfile;
use lexroute_server::{ServerConfig, Services};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "lexroute compliance report server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "lexroute.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
  /// Serve the HTTP API (the default).
  Serve,
  /// Generate one report for the profile in a JSON file and print the outcome.
  Generate {
    #[arg(long)]
    profile: PathBuf,
  },
  /// Reconcile the semantic index with the record store, expire abandoned
  /// pending reports and exit.
  Repair,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let config = ServerConfig::load(&cli.config)?;
  let services = Services::build(&config).await?;

  match cli.command.unwrap_or(Command::Serve) {
    Command::Serve => serve(config, services).await,
    Command::Generate { profile } => generate(&services, profile).await,
    Command::Repair => {
      let summary = services.orchestrator.repair().await?;
      println!("{}", serde_json::to_string_pretty(&summary)?);
      Ok(())
    }
  }
}

async fn serve(config: ServerConfig, services: Services) -> anyhow::Result<()> {
  let maintenance = services.orchestrator.clone();
  match maintenance.repair().await {
    Ok(summary) => tracing::info!(?summary, "startup repair finished"),
    Err(e) => tracing::warn!(error = %e, "startup repair failed"),
  }

  if config.repair_interval_secs > 0 {
    let period = Duration::from_secs(config.repair_interval_secs);
    tokio::spawn(async move {
      let mut ticker = tokio::time::interval(period);
      // The first tick completes immediately; startup already repaired.
      ticker.tick().await;
      loop {
        ticker.tick().await;
        if let Err(e) = maintenance.repair().await {
          tracing::warn!(error = %e, "periodic repair failed");
        }
      }
    });
  }

  let state = ApiState::new(services.orchestrator, services.chat, config.profile_path());
  let app = Router::new()
    .nest("/api", api_router(state))
    .layer(TraceLayer::new_for_http());

  let address = config.address();
  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app)
    .with_graceful_shutdown(async {
      tokio::signal::ctrl_c().await.ok();
    })
    .await
    .context("server error")?;

  Ok(())
}

async fn generate(services: &Services, path: PathBuf) -> anyhow::Result<()> {
  let raw = tokio::fs::read(&path)
    .await
    .with_context(|| format!("failed to read profile {path:?}"))?;
  let profile: CompanyProfile =
    serde_json::from_slice(&raw).with_context(|| format!("invalid profile in {path:?}"))?;

  let outcome = services.orchestrator.generate_report(&profile).await?;
  println!("{}", serde_json::to_string_pretty(&outcome)?);
  Ok(())
}
