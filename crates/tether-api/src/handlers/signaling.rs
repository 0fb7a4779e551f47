//! /offer handler — out-of-band signaling.
//!
//! The body is a `signal-offer` frame; the reply is always a frame too,
//! `signal-answer` on success and `signal-error` otherwise.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use tether_core::wire::parse_frame;
use tether_core::Frame;

use super::ApiState;

fn signal_error(status: StatusCode, error: impl Into<String>) -> (StatusCode, Json<Frame>) {
    (
        status,
        Json(Frame::SignalError {
            error: error.into(),
        }),
    )
}

pub async fn handle_offer(State(state): State<ApiState>, body: String) -> (StatusCode, Json<Frame>) {
    let offer = match parse_frame(&body) {
        Ok(Frame::SignalOffer { offer }) => offer,
        Ok(other) => {
            return signal_error(
                StatusCode::BAD_REQUEST,
                format!("expected signal-offer, got {}", other.kind().as_str()),
            )
        }
        Err(e) => return signal_error(StatusCode::BAD_REQUEST, format!("malformed offer: {e}")),
    };

    let Some(signaler) = state.signaler.as_ref() else {
        return signal_error(StatusCode::SERVICE_UNAVAILABLE, "peer channels are disabled");
    };

    match signaler.handle_offer(offer, None, &state.router).await {
        Ok(answer) => (StatusCode::OK, Json(Frame::SignalAnswer { answer })),
        Err(e) => {
            tracing::warn!(error = %e, "signaling failed");
            let status = if e.is_client_error() {
                StatusCode::BAD_REQUEST
            } else {
                StatusCode::BAD_GATEWAY
            };
            signal_error(status, e.to_string())
        }
    }
}
