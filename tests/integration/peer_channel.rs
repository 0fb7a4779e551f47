use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::{json, Value};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::RTCDataChannel;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;

use tether_core::wire::parse_frame;
use tether_core::Frame;

use crate::*;

const NEGOTIATION: Duration = Duration::from_secs(15);

/// The offering side of a peer channel, standing in for the plugin.
struct Offerer {
    pc: Arc<RTCPeerConnection>,
    dc: Arc<RTCDataChannel>,
    opened: Arc<Notify>,
    closed: Arc<Notify>,
    inbound: Option<mpsc::Receiver<String>>,
}

impl Offerer {
    async fn new() -> Result<Self> {
        let mut media = MediaEngine::default();
        let registry = register_default_interceptors(Registry::new(), &mut media)?;
        let api = APIBuilder::new()
            .with_media_engine(media)
            .with_interceptor_registry(registry)
            .build();
        let pc = Arc::new(api.new_peer_connection(RTCConfiguration::default()).await?);
        let dc = pc.create_data_channel("tether", None).await?;

        let opened = Arc::new(Notify::new());
        let closed = Arc::new(Notify::new());
        let (tx, inbound) = mpsc::channel(64);

        let on_open = opened.clone();
        dc.on_open(Box::new(move || {
            Box::pin(async move {
                on_open.notify_one();
            })
        }));
        dc.on_message(Box::new(move |msg: DataChannelMessage| {
            let tx = tx.clone();
            Box::pin(async move {
                if let Ok(text) = String::from_utf8(msg.data.to_vec()) {
                    let _ = tx.send(text).await;
                }
            })
        }));
        let on_close = closed.clone();
        dc.on_close(Box::new(move || {
            let on_close = on_close.clone();
            Box::pin(async move {
                on_close.notify_one();
            })
        }));
        let on_down = closed.clone();
        pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            let on_down = on_down.clone();
            Box::pin(async move {
                if matches!(
                    state,
                    RTCPeerConnectionState::Disconnected
                        | RTCPeerConnectionState::Failed
                        | RTCPeerConnectionState::Closed
                ) {
                    on_down.notify_one();
                }
            })
        }));

        Ok(Self {
            pc,
            dc,
            opened,
            closed,
            inbound: Some(inbound),
        })
    }

    /// Create the offer and wait for ICE gathering so it carries candidates.
    async fn offer(&self) -> Result<Value> {
        let offer = self.pc.create_offer(None).await?;
        let mut gathered = self.pc.gathering_complete_promise().await;
        self.pc.set_local_description(offer).await?;
        let _ = gathered.recv().await;
        let local = self
            .pc
            .local_description()
            .await
            .context("no local description after gathering")?;
        Ok(serde_json::to_value(local)?)
    }

    async fn accept(&self, answer: Value) -> Result<()> {
        let desc: RTCSessionDescription = serde_json::from_value(answer)?;
        self.pc.set_remote_description(desc).await?;
        Ok(())
    }

    async fn wait_open(&self) {
        tokio::time::timeout(NEGOTIATION, self.opened.notified())
            .await
            .expect("data channel did not open");
    }

    async fn wait_closed(&self) {
        tokio::time::timeout(NEGOTIATION, self.closed.notified())
            .await
            .expect("surplus channel was not torn down");
    }

    /// Answer every query arriving on the channel.
    fn answer_queries(&mut self) -> JoinHandle<()> {
        let mut inbound = self.inbound.take().expect("already answering");
        let dc = self.dc.clone();
        tokio::spawn(async move {
            while let Some(text) = inbound.recv().await {
                let Ok(Frame::Query { id, method, payload }) = parse_frame(&text) else {
                    continue;
                };
                let reply = Frame::success(id, json!({ "method": method, "echo": payload }));
                let Ok(wire) = serde_json::to_string(&reply) else {
                    continue;
                };
                if dc.send_text(wire).await.is_err() {
                    break;
                }
            }
        })
    }
}

impl Drop for Offerer {
    fn drop(&mut self) {
        let pc = self.pc.clone();
        tokio::spawn(async move {
            let _ = pc.close().await;
        });
    }
}

async fn post_offer(h: &Harness, offer: Value) -> (u16, Value) {
    let resp = reqwest::Client::new()
        .post(format!("{}/offer", h.signaling_url))
        .json(&json!({ "type": "signal-offer", "offer": offer }))
        .send()
        .await
        .unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap())
}

/// Negotiate a channel over HTTP and wait for it to open on our side.
async fn connect_over_http(h: &Harness) -> Offerer {
    let peer = Offerer::new().await.unwrap();
    let (status, body) = post_offer(h, peer.offer().await.unwrap()).await;
    assert_eq!(status, 200, "signaling failed: {body}");
    assert_eq!(body["type"], "signal-answer");
    peer.accept(body["answer"].clone()).await.unwrap();
    peer.wait_open().await;
    peer
}

fn holds_peer_channel(status: &Value) -> bool {
    status["connection"]["state"] == "established" && status["connection"]["kind"] == "peer_channel"
}

#[tokio::test(flavor = "multi_thread")]
async fn offer_over_http_establishes_channel_and_carries_queries() {
    let h = start(true).await;
    let mut peer = connect_over_http(&h).await;
    h.wait_until("peer channel established", holds_peer_channel)
        .await
        .unwrap();

    let _answering = peer.answer_queries();
    let (status, body) = h.query("get_node", json!({ "id": "1:2" }), None).await;
    assert_eq!(status, 200, "query failed: {body}");
    assert_eq!(body["data"], json!({ "method": "get_node", "echo": { "id": "1:2" } }));
}

#[tokio::test(flavor = "multi_thread")]
async fn second_channel_is_torn_down() {
    let h = start(true).await;
    let _first = connect_over_http(&h).await;
    let holder = h
        .wait_until("peer channel established", holds_peer_channel)
        .await
        .unwrap()["connection"]["connection_id"]
        .clone();

    let second = connect_over_http(&h).await;
    second.wait_closed().await;

    let status = h.status().await.unwrap();
    assert!(holds_peer_channel(&status));
    assert_eq!(status["connection"]["connection_id"], holder);
}

#[tokio::test(flavor = "multi_thread")]
async fn in_band_offer_hands_the_slot_over() {
    let h = start(true).await;
    let mut ws = h.connect_established().await;
    let socket_id = h.status().await.unwrap()["connection"]["connection_id"].clone();

    let mut peer = Offerer::new().await.unwrap();
    let offer = json!({ "type": "signal-offer", "offer": peer.offer().await.unwrap() });
    send_text(&mut ws, offer.to_string()).await;

    let reply = tokio::time::timeout(NEGOTIATION, recv_text(&mut ws))
        .await
        .unwrap()
        .unwrap();
    let Frame::SignalAnswer { answer } = parse_frame(&reply).unwrap() else {
        panic!("expected signal-answer, got {reply}");
    };
    peer.accept(answer).await.unwrap();
    peer.wait_open().await;

    let status = h
        .wait_until("handover to peer channel", holds_peer_channel)
        .await
        .unwrap();
    assert_ne!(status["connection"]["connection_id"], socket_id);

    // The displaced socket leaving must not take the channel with it.
    drop(ws);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(holds_peer_channel(&h.status().await.unwrap()));

    let _answering = peer.answer_queries();
    let (status, _) = h.query("after_handover", Value::Null, None).await;
    assert_eq!(status, 200);
}
