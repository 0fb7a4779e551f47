//! tether-api — the daemon's listeners.
//!
//! Three surfaces: the peer-facing WebSocket, the peer-facing signaling
//! endpoint (CORS-enabled, for offers posted from a browser context) and
//! the local control API used by the agent side and `tether-ctl`.

pub mod handlers;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

pub use handlers::ApiState;

fn permissive_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Control API routes, nested under `/api`.
pub fn api_app(state: ApiState) -> Router {
    let api_routes = Router::new()
        .route("/status", get(handlers::handle_status))
        .route("/query", post(handlers::handle_query))
        .route("/ping", post(handlers::handle_ping))
        .with_state(state);

    Router::new().nest("/api", api_routes).layer(permissive_cors())
}

/// WebSocket upgrade on `path`.
pub fn socket_app(state: ApiState, path: &str) -> Router {
    Router::new()
        .route(path, get(handlers::handle_socket))
        .with_state(state)
}

/// Out-of-band signaling: `POST /offer`, pre-flight answered by the CORS layer.
pub fn signaling_app(state: ApiState) -> Router {
    Router::new()
        .route("/offer", post(handlers::handle_offer))
        .with_state(state)
        .layer(permissive_cors())
}

/// Bind the control API to loopback and serve it.
pub async fn serve(state: ApiState, port: u16) -> anyhow::Result<()> {
    let listener = TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    tracing::info!(port, "API listening on 127.0.0.1");
    serve_api(listener, state).await
}

pub async fn serve_api(listener: TcpListener, state: ApiState) -> anyhow::Result<()> {
    axum::serve(listener, api_app(state)).await?;
    Ok(())
}

pub async fn serve_socket(listener: TcpListener, state: ApiState, path: &str) -> anyhow::Result<()> {
    tracing::info!(addr = %listener.local_addr()?, path, "socket transport listening");
    axum::serve(listener, socket_app(state, path)).await?;
    Ok(())
}

pub async fn serve_signaling(listener: TcpListener, state: ApiState) -> anyhow::Result<()> {
    tracing::info!(addr = %listener.local_addr()?, "signaling endpoint listening");
    axum::serve(listener, signaling_app(state)).await?;
    Ok(())
}
