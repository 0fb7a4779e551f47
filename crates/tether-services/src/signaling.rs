//! Peer-channel signaling — answers WebRTC offers.
//!
//! Signaling and establishment are separate phases. `handle_offer` returns
//! the answer as soon as ICE gathering finishes; a background task then
//! waits for the data channel and offers it to the connection slot.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;

use tether_core::config::PeerChannelConfig;
use tether_core::SignalingError;

use crate::peer_channel;
use crate::router::Router;

pub struct Signaler {
    config: PeerChannelConfig,
}

impl Signaler {
    pub fn new(config: PeerChannelConfig) -> Self {
        Self { config }
    }

    /// Answer `offer`. When `upgrade_from` names the socket the offer arrived
    /// on, the resulting channel may take the slot over from that socket.
    pub async fn handle_offer(
        &self,
        offer: Value,
        upgrade_from: Option<u64>,
        router: &Arc<Router>,
    ) -> Result<Value, SignalingError> {
        let offer = parse_offer(offer)?;
        let negotiation = router.bridge().slot.begin_negotiation();

        let pc = Arc::new(self.new_peer_connection().await?);
        let channel = peer_channel::watch_data_channel(&pc);

        match self.answer(&pc, offer).await {
            Ok(answer) => {
                tracing::info!(upgrade_from, "offer answered, waiting for data channel");
                tokio::spawn(peer_channel::establish(
                    pc,
                    channel,
                    upgrade_from,
                    router.clone(),
                    Duration::from_millis(self.config.open_timeout_ms),
                    negotiation,
                ));
                Ok(answer)
            }
            Err(e) => {
                let _ = pc.close().await;
                Err(e)
            }
        }
    }

    async fn new_peer_connection(&self) -> Result<RTCPeerConnection, SignalingError> {
        let mut media = MediaEngine::default();
        let registry = register_default_interceptors(Registry::new(), &mut media).map_err(setup)?;
        let api = APIBuilder::new()
            .with_media_engine(media)
            .with_interceptor_registry(registry)
            .build();

        let ice_servers = if self.config.ice_servers.is_empty() {
            Vec::new()
        } else {
            vec![RTCIceServer {
                urls: self.config.ice_servers.clone(),
                ..Default::default()
            }]
        };
        api.new_peer_connection(RTCConfiguration {
            ice_servers,
            ..Default::default()
        })
        .await
        .map_err(setup)
    }

    async fn answer(
        &self,
        pc: &RTCPeerConnection,
        offer: RTCSessionDescription,
    ) -> Result<Value, SignalingError> {
        pc.set_remote_description(offer)
            .await
            .map_err(|e| SignalingError::MalformedOffer(e.to_string()))?;
        let answer = pc.create_answer(None).await.map_err(setup)?;

        let mut gathered = pc.gathering_complete_promise().await;
        pc.set_local_description(answer).await.map_err(setup)?;
        tokio::time::timeout(
            Duration::from_millis(self.config.ice_gather_timeout_ms),
            gathered.recv(),
        )
        .await
        .map_err(|_| SignalingError::Timeout("ICE gathering"))?;

        let local = pc
            .local_description()
            .await
            .ok_or_else(|| SignalingError::Setup("no local description after ICE gathering".into()))?;
        serde_json::to_value(local).map_err(setup)
    }
}

fn setup(e: impl std::fmt::Display) -> SignalingError {
    SignalingError::Setup(e.to_string())
}

/// Validate the shape of an offer before any peer connection is built.
pub fn parse_offer(offer: Value) -> Result<RTCSessionDescription, SignalingError> {
    if !offer.is_object() {
        return Err(SignalingError::MalformedOffer(
            "offer must be a session description object".into(),
        ));
    }
    let desc: RTCSessionDescription = serde_json::from_value(offer)
        .map_err(|e| SignalingError::MalformedOffer(e.to_string()))?;
    if desc.sdp_type != RTCSdpType::Offer {
        return Err(SignalingError::MalformedOffer(format!(
            "expected an offer, got {}",
            desc.sdp_type
        )));
    }
    if desc.sdp.trim().is_empty() {
        return Err(SignalingError::MalformedOffer("offer has no SDP".into()));
    }
    Ok(desc)
}
