//! /status handler.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use tether_services::BridgeStatus;

use super::ApiState;

#[derive(Serialize)]
pub struct StatusResponse {
    pub version: &'static str,
    pub peer_channels: bool,
    #[serde(flatten)]
    pub bridge: BridgeStatus,
}

pub async fn handle_status(State(state): State<ApiState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION"),
        peer_channels: state.signaler.is_some(),
        bridge: state.bridge.status().await,
    })
}
