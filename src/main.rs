//! ragchat server entry point.

use std::net::{IpAddr, SocketAddr};

use clap::Parser;
use ragchat::adapter::create_adapter;
use ragchat::cli::Cli;
use ragchat::config::AppConfig;
use ragchat::limiter::RequestLimiter;
use ragchat::server::{self, AppState};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(e) = run(Cli::parse()).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load(cli.config.as_deref())?;
    cli.apply(&mut config);

    let adapter = create_adapter(&config)?;
    let model = adapter.info();
    info!(backend = %config.chat_model, model = %model.model, "starting chat model");
    adapter.load().await?;

    let limiter = RequestLimiter::new(config.concurrency_limit);
    info!(limit = config.concurrency_limit, "request limiter ready");

    let host: IpAddr = config
        .host
        .parse()
        .map_err(|e| format!("invalid host '{}': {e}", config.host))?;
    let state = AppState::new(adapter, limiter);
    server::serve(state, SocketAddr::new(host, config.port)).await?;
    Ok(())
}
