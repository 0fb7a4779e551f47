use reqwest::{Method, StatusCode};
use serde_json::{json, Value};

use crate::*;

async fn post_offer(h: &Harness, body: String) -> (StatusCode, Value) {
    let resp = reqwest::Client::new()
        .post(format!("{}/offer", h.signaling_url))
        .header("content-type", "application/json")
        .body(body)
        .send()
        .await
        .unwrap();
    let status = resp.status();
    (status, resp.json().await.unwrap())
}

#[tokio::test]
async fn non_offer_body_is_a_bad_request() {
    let h = start(true).await;
    let (status, body) = post_offer(&h, r#"{"type":"ping","id":"1"}"#.into()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["type"], "signal-error");

    let (status, body) = post_offer(&h, "{garbage".into()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["type"], "signal-error");
}

#[tokio::test]
async fn malformed_offer_is_rejected_before_negotiation() {
    let h = start(true).await;
    let frame = json!({ "type": "signal-offer", "offer": "v=0" });
    let (status, body) = post_offer(&h, frame.to_string()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["type"], "signal-error");
    assert_eq!(h.status().await.unwrap()["connection"]["state"], "disconnected");
}

#[tokio::test]
async fn offer_without_peer_channels_is_unavailable() {
    let h = start(false).await;
    let frame = json!({ "type": "signal-offer", "offer": { "type": "offer", "sdp": "v=0\r\n" } });
    let (status, body) = post_offer(&h, frame.to_string()).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["type"], "signal-error");
}

#[tokio::test]
async fn preflight_allows_any_origin() {
    let h = start(true).await;
    let resp = reqwest::Client::new()
        .request(Method::OPTIONS, format!("{}/offer", h.signaling_url))
        .header("origin", "https://www.figma.com")
        .header("access-control-request-method", "POST")
        .header("access-control-request-headers", "content-type")
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    assert_eq!(
        resp.headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );
}
