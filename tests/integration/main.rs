//! Tether integration test harness.
//!
//! Each test starts its own listeners on ephemeral loopback ports and
//! drives them the way real clients do: a WebSocket peer on one side,
//! HTTP requests against the control API on the other.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use tether_api::ApiState;
use tether_core::config::PeerChannelConfig;
use tether_core::wire::{parse_frame, parse_inbound};
use tether_core::{ChunkCodec, Frame, Inbound, Limits};
use tether_services::{Accept, Bridge, HandlerRegistry, ReassemblyStore, Router, Signaler};

mod peer_channel;
mod signaling;
mod socket;

// ── Harness ───────────────────────────────────────────────────────────────────

pub type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct Harness {
    pub bridge: Arc<Bridge>,
    pub socket_url: String,
    pub signaling_url: String,
    pub api_url: String,
    tasks: Vec<JoinHandle<()>>,
}

impl Drop for Harness {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

async fn loopback() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

/// Start all three listeners. `peer_channels` controls whether a signaler
/// is configured.
pub async fn start(peer_channels: bool) -> Harness {
    let bridge = Bridge::new(Limits::default());
    let signaler = peer_channels.then(|| Arc::new(Signaler::new(PeerChannelConfig::default())));
    let router = Router::new(bridge.clone(), HandlerRegistry::new(), signaler.clone());
    let state = ApiState::new(router, signaler);

    let (socket, socket_port) = loopback().await;
    let (signaling, signaling_port) = loopback().await;
    let (api, api_port) = loopback().await;

    let tasks = vec![
        tokio::spawn({
            let state = state.clone();
            async move {
                let _ = tether_api::serve_socket(socket, state, "/").await;
            }
        }),
        tokio::spawn({
            let state = state.clone();
            async move {
                let _ = tether_api::serve_signaling(signaling, state).await;
            }
        }),
        tokio::spawn(async move {
            let _ = tether_api::serve_api(api, state).await;
        }),
    ];

    Harness {
        bridge,
        socket_url: format!("ws://127.0.0.1:{socket_port}/"),
        signaling_url: format!("http://127.0.0.1:{signaling_port}"),
        api_url: format!("http://127.0.0.1:{api_port}/api"),
        tasks,
    }
}

impl Harness {
    pub async fn connect(&self) -> Ws {
        let (ws, _) = connect_async(self.socket_url.as_str()).await.unwrap();
        ws
    }

    /// Connect and wait until the bridge reports the slot as held.
    pub async fn connect_established(&self) -> Ws {
        let ws = self.connect().await;
        self.wait_for_state("established").await.unwrap();
        ws
    }

    pub async fn status(&self) -> Result<Value> {
        let body = reqwest::get(format!("{}/status", self.api_url))
            .await
            .context("status request failed")?
            .json()
            .await?;
        Ok(body)
    }

    pub async fn wait_for_state(&self, state: &str) -> Result<()> {
        self.wait_until(state, |status| status["connection"]["state"] == state)
            .await
            .map(|_| ())
    }

    /// Poll `/api/status` until `ready` holds, returning that snapshot.
    pub async fn wait_until(&self, what: &str, ready: impl Fn(&Value) -> bool) -> Result<Value> {
        for _ in 0..500 {
            let status = self.status().await?;
            if ready(&status) {
                return Ok(status);
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        bail!("status never reached {what}")
    }

    /// POST /api/query, returning the HTTP status and body.
    pub async fn query(&self, method: &str, payload: Value, timeout_ms: Option<u64>) -> (u16, Value) {
        let mut body = serde_json::json!({ "method": method, "payload": payload });
        if let Some(ms) = timeout_ms {
            body["timeout_ms"] = ms.into();
        }
        let resp = reqwest::Client::new()
            .post(format!("{}/query", self.api_url))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap())
    }
}

// ── Peer side ─────────────────────────────────────────────────────────────────

/// Next text message, or `None` once the socket closes.
pub async fn recv_text(ws: &mut Ws) -> Option<String> {
    while let Some(msg) = ws.next().await {
        match msg.ok()? {
            Message::Text(text) => return Some(text.as_str().to_owned()),
            Message::Close(_) => return None,
            _ => continue,
        }
    }
    None
}

pub async fn send_text(ws: &mut Ws, text: impl Into<String>) {
    ws.send(Message::text(text.into())).await.unwrap();
}

/// Read until a whole frame arrives, reassembling chunks on the way.
pub async fn recv_frame(ws: &mut Ws, store: &ReassemblyStore) -> Option<Frame> {
    loop {
        let text = recv_text(ws).await?;
        match parse_inbound(&text).ok()? {
            Inbound::Frame(frame) => return Some(frame),
            Inbound::Chunk(chunk) => {
                if let Accept::Complete(full) = store.accept(chunk).ok()? {
                    return parse_frame(&full).ok();
                }
            }
            Inbound::Custom { .. } => continue,
        }
    }
}

/// Answer queries with `respond` until the socket closes. Pings are
/// answered automatically; `None` from `respond` leaves the query hanging.
pub fn serve_peer<F>(mut ws: Ws, respond: F) -> JoinHandle<()>
where
    F: Fn(&str, &Value) -> Option<Result<Value, String>> + Send + 'static,
{
    tokio::spawn(async move {
        let store = ReassemblyStore::new(Limits::default());
        let codec = ChunkCodec::default();
        while let Some(frame) = recv_frame(&mut ws, &store).await {
            let reply = match frame {
                Frame::Ping { id } => Frame::Pong { id },
                Frame::Query {
                    id,
                    method,
                    payload,
                } => match respond(&method, &payload) {
                    Some(Ok(data)) => Frame::success(id, data),
                    Some(Err(error)) => Frame::failure(id, error),
                    None => continue,
                },
                _ => continue,
            };
            for text in codec.encode(&reply).unwrap() {
                send_text(&mut ws, text).await;
            }
        }
    })
}
