//! Peer-channel transport — a WebRTC data channel driven like a socket.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, oneshot};
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::data_channel_state::RTCDataChannelState;
use webrtc::data_channel::RTCDataChannel;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::RTCPeerConnection;

use crate::connection::{run_connection, TransportEvent, INBOUND_QUEUE};
use crate::router::Router;
use crate::slot::{Claim, NegotiationGuard, TransportKind, OUTBOUND_QUEUE};

/// Resolve with the first data channel the remote side opens.
pub fn watch_data_channel(pc: &RTCPeerConnection) -> oneshot::Receiver<Arc<RTCDataChannel>> {
    let (tx, rx) = oneshot::channel();
    let tx = Arc::new(Mutex::new(Some(tx)));
    pc.on_data_channel(Box::new(move |dc: Arc<RTCDataChannel>| {
        let tx = tx.clone();
        Box::pin(async move {
            let first = tx.lock().ok().and_then(|mut guard| guard.take());
            match first {
                Some(tx) => {
                    tracing::debug!(label = dc.label(), "data channel announced");
                    let _ = tx.send(dc);
                }
                None => tracing::debug!(label = dc.label(), "extra data channel ignored"),
            }
        })
    }));
    rx
}

/// Wait for the negotiated channel to open, claim the slot and drive the
/// connection until it closes.
pub async fn establish(
    pc: Arc<RTCPeerConnection>,
    channel: oneshot::Receiver<Arc<RTCDataChannel>>,
    upgrade_from: Option<u64>,
    router: Arc<Router>,
    open_timeout: Duration,
    negotiation: NegotiationGuard,
) {
    let (events_tx, events_rx) = mpsc::channel(INBOUND_QUEUE);
    watch_peer_state(&pc, events_tx.clone());

    let dc = match tokio::time::timeout(open_timeout, open_channel(channel, events_tx)).await {
        Ok(Ok(dc)) => dc,
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "peer channel failed before opening");
            let _ = pc.close().await;
            return;
        }
        Err(_) => {
            tracing::warn!(timeout_ms = open_timeout.as_millis() as u64, "peer channel did not open in time");
            let _ = pc.close().await;
            return;
        }
    };

    let (outbound_tx, mut outbound_rx) = mpsc::channel::<String>(OUTBOUND_QUEUE);
    let slot = &router.bridge().slot;
    let handle = slot.new_handle(TransportKind::PeerChannel, outbound_tx);
    let claim = match upgrade_from {
        Some(from) => slot.claim_handover(handle.clone(), from).await,
        None => slot.claim(handle.clone()).await,
    };
    drop(negotiation);

    if let Claim::Rejected { holder } = claim {
        tracing::info!(holder, connection = handle.id, "closing surplus peer channel");
        let _ = dc.close().await;
        let _ = pc.close().await;
        return;
    }

    let writer_dc = dc.clone();
    let connection = handle.id;
    let writer = tokio::spawn(async move {
        while let Some(text) = outbound_rx.recv().await {
            if let Err(e) = writer_dc.send_text(text).await {
                tracing::warn!(connection, error = %e, "peer channel write failed");
                break;
            }
        }
    });

    run_connection(router, handle, events_rx).await;
    writer.abort();
    let _ = pc.close().await;
}

async fn open_channel(
    channel: oneshot::Receiver<Arc<RTCDataChannel>>,
    events: mpsc::Sender<TransportEvent>,
) -> Result<Arc<RTCDataChannel>> {
    let dc = channel
        .await
        .context("peer connection dropped before announcing a data channel")?;

    let (open_tx, mut open_rx) = mpsc::channel::<()>(1);
    dc.on_open(Box::new(move || {
        let tx = open_tx.clone();
        Box::pin(async move {
            let _ = tx.send(()).await;
        })
    }));
    // Handlers go on before the channel opens so no early message is lost.
    forward_events(&dc, events);

    if dc.ready_state() != RTCDataChannelState::Open {
        open_rx.recv().await.context("data channel dropped before opening")?;
    }
    tracing::debug!(label = dc.label(), "data channel open");
    Ok(dc)
}

fn forward_events(dc: &RTCDataChannel, events: mpsc::Sender<TransportEvent>) {
    let tx = events.clone();
    dc.on_message(Box::new(move |msg: DataChannelMessage| {
        let tx = tx.clone();
        Box::pin(async move {
            let event = match String::from_utf8(msg.data.to_vec()) {
                Ok(text) => TransportEvent::Message(text),
                Err(_) => {
                    tracing::warn!(len = msg.data.len(), "non-UTF-8 data channel message dropped");
                    return;
                }
            };
            let _ = tx.send(event).await;
        })
    }));

    let tx = events.clone();
    dc.on_close(Box::new(move || {
        let tx = tx.clone();
        Box::pin(async move {
            let _ = tx.send(TransportEvent::Closed).await;
        })
    }));

    dc.on_error(Box::new(move |err: webrtc::Error| {
        let tx = events.clone();
        Box::pin(async move {
            let _ = tx.send(TransportEvent::Error(err.to_string())).await;
        })
    }));
}

fn watch_peer_state(pc: &RTCPeerConnection, events: mpsc::Sender<TransportEvent>) {
    pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
        let tx = events.clone();
        Box::pin(async move {
            if is_terminal(state) {
                tracing::debug!(?state, "peer connection down");
                let _ = tx.send(TransportEvent::Closed).await;
            } else if state == RTCPeerConnectionState::Disconnected {
                tracing::debug!("peer connection interrupted, waiting for ICE to recover");
            }
        })
    }));
}

/// `Disconnected` can recover on its own; ICE moves to `Failed` if it does not.
fn is_terminal(state: RTCPeerConnectionState) -> bool {
    matches!(
        state,
        RTCPeerConnectionState::Failed | RTCPeerConnectionState::Closed
    )
}
