//! HTTP surface: the chat routes and the health checks.

pub mod chat;
pub mod error;
pub mod health;
pub mod state;

pub use state::AppState;

use std::net::SocketAddr;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::Result;

/// Create the API router with all routes.
pub fn create_router(state: AppState) -> Router {
    let chat = Router::new()
        .route("/info", get(chat::info))
        .route("/default_config", get(chat::default_config))
        .route("/availability", get(chat::availability))
        .route("/prompt", post(chat::prompt))
        .route("/prompt_streaming", post(chat::prompt_streaming));

    let health = Router::new()
        .route("/status", get(health::status))
        .route("/health", get(health::health))
        .route("/version", get(health::version));

    Router::new()
        .nest("/chat", chat)
        .nest("/health", health)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until Ctrl-C.
pub async fn serve(state: AppState, addr: SocketAddr) -> Result<()> {
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown requested");
    }
}
