//! tetherd — bridge daemon between a tool-calling agent and one peer session.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use tether_api::ApiState;
use tether_core::config::TetherConfig;
use tether_core::FrameKind;
use tether_services::{Bridge, HandlerRegistry, Router, Signaler};

mod info;
mod sweep;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load config
    if let Err(e) = TetherConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = TetherConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        TetherConfig::default()
    });
    tracing::info!(
        path = %TetherConfig::file_path().display(),
        chunk_size = config.limits.chunk_size,
        frame_ceiling = config.limits.frame_ceiling,
        query_timeout_ms = config.limits.query_timeout_ms,
        "tetherd starting"
    );

    // Shared state
    let bridge = Bridge::new(config.limits.clone());
    let signaler = config
        .peer_channel
        .enabled
        .then(|| Arc::new(Signaler::new(config.peer_channel.clone())));
    if signaler.is_none() {
        tracing::info!("peer channels disabled, socket transport only");
    }

    let router = {
        let mut handlers = HandlerRegistry::new();
        handlers.register(FrameKind::Query, Arc::new(info::BridgeInfo::new()));
        Router::new(bridge.clone(), handlers, signaler.clone())
    };
    let state = ApiState::new(router, signaler);

    // ── Shutdown channel ─────────────────────────────────────────────────────
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            let _ = shutdown.send(());
        });
    }

    // ── Listeners ────────────────────────────────────────────────────────────

    let net = &config.network;
    let socket_listener = TcpListener::bind((net.host.as_str(), net.socket_port))
        .await
        .with_context(|| format!("failed to bind socket listener on {}:{}", net.host, net.socket_port))?;
    let signaling_listener = TcpListener::bind((net.host.as_str(), net.signaling_port))
        .await
        .with_context(|| {
            format!("failed to bind signaling listener on {}:{}", net.host, net.signaling_port)
        })?;

    // ── Spawn tasks ──────────────────────────────────────────────────────────

    let socket_task = {
        let state = state.clone();
        let path = net.socket_path.clone();
        tokio::spawn(async move {
            if let Err(e) = tether_api::serve_socket(socket_listener, state, &path).await {
                tracing::error!(error = %e, "socket server failed");
            }
        })
    };

    let signaling_task = {
        let state = state.clone();
        tokio::spawn(async move {
            if let Err(e) = tether_api::serve_signaling(signaling_listener, state).await {
                tracing::error!(error = %e, "signaling server failed");
            }
        })
    };

    let _api_task = if net.api_port != 0 {
        let state = state.clone();
        let port = net.api_port;
        Some(tokio::spawn(async move {
            if let Err(e) = tether_api::serve(state, port).await {
                tracing::error!(error = %e, "API server failed");
            }
        }))
    } else {
        None
    };

    let sweep_task = tokio::spawn(sweep::sweep_loop(bridge.clone(), shutdown_tx.subscribe()));

    // ── Wait for exit ────────────────────────────────────────────────────────

    let mut shutdown_rx = shutdown_tx.subscribe();

    tokio::select! {
        biased;
        _ = shutdown_rx.recv() => tracing::info!("shutting down"),
        r = socket_task        => tracing::error!("socket server exited: {:?}", r),
        r = signaling_task     => tracing::error!("signaling server exited: {:?}", r),
        r = sweep_task         => tracing::error!("sweep loop exited: {:?}", r),
    }

    if let Some(conn) = bridge.slot.current().await {
        bridge.detach(conn.id).await;
    }
    Ok(())
}
