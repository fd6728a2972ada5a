//! hookd — the HookGrid daemon.
//!
//! Assembles the webhook service:
//! - Token codec (Ed25519 signing and verifying keys)
//! - Platform client factory (REST, basic auth)
//! - Driver registry (scaleService, scaleHost, serviceUpgrade)
//! - REST API
//!
//! # Usage
//!
//! ```text
//! hookd serve --port 8085 --platform-url http://cattle:8080/v2-beta \
//!     --signing-key-file signing.pem --verifying-key-file verifying.pem
//! ```

mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use hookgrid_api::{ApiState, build_router};
use hookgrid_drivers::DriverRegistry;
use hookgrid_platform::HttpPlatformFactory;
use hookgrid_token::{TokenCodec, load_signing_key, load_verifying_key};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::{ServeArgs, Settings};

#[derive(Parser)]
#[command(name = "hookd", about = "HookGrid webhook daemon", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the webhook API.
    Serve(ServeArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve(args) => {
            init_tracing(args.log_json);
            run_serve(Settings::load(args)?).await
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,hookd=debug,hookgrid=debug".parse().unwrap());
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn run_serve(settings: Settings) -> anyhow::Result<()> {
    info!("HookGrid daemon starting");

    // ── Initialize subsystems ──────────────────────────────────

    let signing = load_signing_key(&settings.signing_key)?;
    let verifying = load_verifying_key(&settings.verifying_key)?;
    let codec = TokenCodec::new(signing, verifying)?;
    info!("token codec initialized");

    let platforms = HttpPlatformFactory::new(&settings.platform_url, settings.credentials)?;
    info!(url = %settings.platform_url, "platform client configured");

    let registry = DriverRegistry::standard(settings.upgrade);
    info!(
        drivers = ?registry.ids().collect::<Vec<_>>(),
        poll_interval = ?settings.upgrade.poll_interval,
        max_polls = settings.upgrade.max_polls,
        "driver registry initialized"
    );

    // ── Start API server ───────────────────────────────────────

    let router = build_router(ApiState {
        registry: Arc::new(registry),
        codec: Arc::new(codec),
        platforms: Arc::new(platforms),
    });
    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));

    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown on Ctrl-C.
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c()
                .await
                .expect("failed to install CTRL+C handler");
            info!("shutdown signal received");
        })
        .await?;

    info!("HookGrid daemon stopped");
    Ok(())
}
