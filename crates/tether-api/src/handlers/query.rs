//! /query and /ping handlers — the agent side of the bridge.

use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use tether_core::QueryError;

use super::ApiState;

// ── /query (POST) ─────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct QueryRequest {
    pub method: String,
    #[serde(default)]
    pub payload: Value,
    pub timeout_ms: Option<u64>,
}

#[derive(Serialize)]
pub struct QueryResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<&'static str>,
}

pub async fn handle_query(
    State(state): State<ApiState>,
    Json(req): Json<QueryRequest>,
) -> (StatusCode, Json<QueryResponse>) {
    let timeout = req.timeout_ms.map(Duration::from_millis);
    match state.bridge.query(&req.method, req.payload, timeout).await {
        Ok(data) => (
            StatusCode::OK,
            Json(QueryResponse {
                success: true,
                data: Some(data),
                error: None,
                kind: None,
            }),
        ),
        Err(e) => failure(e),
    }
}

// ── /ping (POST) ──────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct PingResponse {
    pub rtt_ms: f64,
}

pub async fn handle_ping(
    State(state): State<ApiState>,
) -> Result<Json<PingResponse>, (StatusCode, Json<QueryResponse>)> {
    let rtt = state.bridge.ping(None).await.map_err(failure)?;
    Ok(Json(PingResponse {
        rtt_ms: rtt.as_secs_f64() * 1000.0,
    }))
}

// ── Error mapping ─────────────────────────────────────────────────────────────

pub fn status_for(err: &QueryError) -> StatusCode {
    match err {
        QueryError::NotConnected => StatusCode::SERVICE_UNAVAILABLE,
        QueryError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        QueryError::ConnectionClosed | QueryError::Remote(_) => StatusCode::BAD_GATEWAY,
        QueryError::InvalidMethod | QueryError::Encode(_) => StatusCode::BAD_REQUEST,
    }
}

fn failure(err: QueryError) -> (StatusCode, Json<QueryResponse>) {
    let status = status_for(&err);
    let kind = err.kind();
    let error = match err {
        QueryError::Remote(value) => value,
        other => Value::String(other.to_string()),
    };
    (
        status,
        Json(QueryResponse {
            success: false,
            data: None,
            error: Some(error),
            kind: Some(kind),
        }),
    )
}
