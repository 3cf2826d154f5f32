//! Presence relay for beam peers.
//!
//! Each WebSocket connection enters presence with a [`PeerRecord`] and may
//! then publish envelopes; every envelope is fanned out to every member.
//! The relay never inspects signal payloads.
//!
//! [`PeerRecord`]: beam_core::PeerRecord

mod relay_service;
mod ws_handler;

pub use relay_service::*;
pub use ws_handler::*;

use axum::Router;
use axum::routing::get;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::info;

pub fn router(service: RelayService) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(service)
}

/// Bind `addr` and serve the relay until the process ends.
pub async fn serve(addr: SocketAddr) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    serve_listener(listener, RelayService::new()).await
}

pub async fn serve_listener(listener: TcpListener, service: RelayService) -> anyhow::Result<()> {
    info!("Relay listening on {}", listener.local_addr()?);
    axum::serve(listener, router(service)).await?;
    Ok(())
}
