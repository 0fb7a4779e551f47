//! WebSocket transport — one socket per peer, first connection wins.

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use tether_services::connection::INBOUND_QUEUE;
use tether_services::slot::OUTBOUND_QUEUE;
use tether_services::{run_connection, Claim, TransportEvent, TransportKind};

use super::ApiState;

pub async fn handle_socket(State(state): State<ApiState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| run_socket(state, socket))
}

async fn run_socket(state: ApiState, mut socket: WebSocket) {
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<String>(OUTBOUND_QUEUE);
    let handle = state
        .bridge
        .slot
        .new_handle(TransportKind::Socket, outbound_tx);

    // Claimed on upgrade, before any application message.
    if let Claim::Rejected { .. } = state.bridge.slot.claim(handle.clone()).await {
        let _ = socket
            .send(Message::Close(Some(CloseFrame {
                code: close_code::POLICY,
                reason: "another peer is already connected".into(),
            })))
            .await;
        return;
    }

    let (mut sink, mut stream) = socket.split();
    let (events_tx, events_rx) = mpsc::channel(INBOUND_QUEUE);
    let connection = handle.id;

    let writer = tokio::spawn(async move {
        while let Some(text) = outbound_rx.recv().await {
            if let Err(e) = sink.send(Message::Text(text.into())).await {
                tracing::debug!(connection, error = %e, "socket write failed");
                break;
            }
        }
        let _ = sink.close().await;
    });

    let reader = tokio::spawn(async move {
        while let Some(msg) = stream.next().await {
            let event = match msg {
                Ok(Message::Text(text)) => TransportEvent::Message(text.as_str().to_owned()),
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => TransportEvent::Message(text),
                    Err(_) => {
                        tracing::warn!(connection, len = bytes.len(), "non-UTF-8 binary message dropped");
                        continue;
                    }
                },
                Ok(Message::Close(_)) => TransportEvent::Closed,
                Ok(_) => continue,
                Err(e) => TransportEvent::Error(e.to_string()),
            };
            let last = !matches!(event, TransportEvent::Message(_));
            if events_tx.send(event).await.is_err() || last {
                return;
            }
        }
        let _ = events_tx.send(TransportEvent::Closed).await;
    });

    run_connection(state.router.clone(), handle, events_rx).await;
    reader.abort();
    writer.abort();
}
