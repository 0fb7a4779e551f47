use std::time::Duration;

use futures::StreamExt;
use serde_json::{json, Value};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;

use tether_core::wire::parse_frame;
use tether_core::Frame;

use crate::*;

fn echo(method: &str, payload: &Value) -> Option<Result<Value, String>> {
    match method {
        "fail" => Some(Err("node is locked".into())),
        "hang" => None,
        _ => Some(Ok(json!({ "method": method, "echo": payload }))),
    }
}

#[tokio::test]
async fn query_without_peer_is_not_connected() {
    let h = start(false).await;
    let (status, body) = h.query("get_selection", json!({}), None).await;
    assert_eq!(status, 503);
    assert_eq!(body["success"], false);
    assert_eq!(body["kind"], "not_connected");
}

#[tokio::test]
async fn query_round_trips_through_peer() {
    let h = start(false).await;
    let _peer = serve_peer(h.connect_established().await, echo);

    let (status, body) = h.query("get_node", json!({ "id": "1:2" }), None).await;
    assert_eq!(status, 200);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"], json!({ "method": "get_node", "echo": { "id": "1:2" } }));

    let status = h.status().await.unwrap();
    assert_eq!(status["pending"]["count"], 0);
    assert_eq!(status["connection"]["kind"], "socket");
}

#[tokio::test]
async fn remote_failure_maps_to_bad_gateway() {
    let h = start(false).await;
    let _peer = serve_peer(h.connect_established().await, echo);

    let (status, body) = h.query("fail", Value::Null, None).await;
    assert_eq!(status, 502);
    assert_eq!(body["kind"], "remote");
    assert_eq!(body["error"], "node is locked");
}

#[tokio::test]
async fn unanswered_query_times_out() {
    let h = start(false).await;
    let _peer = serve_peer(h.connect_established().await, echo);

    let (status, body) = h.query("hang", Value::Null, Some(100)).await;
    assert_eq!(status, 504);
    assert_eq!(body["kind"], "timeout");
    assert_eq!(h.status().await.unwrap()["pending"]["count"], 0);
}

#[tokio::test]
async fn ping_reports_round_trip_time() {
    let h = start(false).await;
    let _peer = serve_peer(h.connect_established().await, echo);

    let body: Value = reqwest::Client::new()
        .post(format!("{}/ping", h.api_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(body["rtt_ms"].as_f64().is_some(), "no rtt in {body}");
}

#[tokio::test]
async fn second_connection_is_rejected() {
    let h = start(false).await;
    let _first = h.connect_established().await;
    let holder = h.status().await.unwrap()["connection"]["connection_id"].clone();

    let mut second = h.connect().await;
    match second.next().await {
        Some(Ok(Message::Close(Some(frame)))) => assert_eq!(frame.code, CloseCode::Policy),
        other => panic!("expected policy close, got {other:?}"),
    }

    // The holder is undisturbed.
    let status = h.status().await.unwrap();
    assert_eq!(status["connection"]["state"], "established");
    assert_eq!(status["connection"]["connection_id"], holder);
}

#[tokio::test]
async fn slot_is_released_when_peer_leaves() {
    let h = start(false).await;
    let mut first = h.connect_established().await;
    first.close(None).await.unwrap();
    h.wait_for_state("disconnected").await.unwrap();

    let _peer = serve_peer(h.connect_established().await, echo);
    let (status, _) = h.query("after_reconnect", Value::Null, None).await;
    assert_eq!(status, 200);
}

#[tokio::test]
async fn disconnect_rejects_pending_queries() {
    let h = start(false).await;
    let mut ws = h.connect_established().await;

    let api = tokio::spawn({
        let url = h.api_url.clone();
        async move {
            let resp = reqwest::Client::new()
                .post(format!("{url}/query"))
                .json(&json!({ "method": "export", "timeout_ms": 5000 }))
                .send()
                .await
                .unwrap();
            (resp.status().as_u16(), resp.json::<Value>().await.unwrap())
        }
    });

    // Wait for the query to reach the peer, then walk away.
    let text = recv_text(&mut ws).await.unwrap();
    assert!(matches!(parse_frame(&text).unwrap(), Frame::Query { .. }));
    drop(ws);

    let (status, body) = tokio::time::timeout(Duration::from_secs(3), api)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status, 502);
    assert_eq!(body["kind"], "connection_closed");
}

#[tokio::test]
async fn malformed_traffic_keeps_the_connection_up() {
    let h = start(false).await;
    let mut ws = h.connect_established().await;

    send_text(&mut ws, "{not json").await;
    send_text(&mut ws, r#"{"type":"teleport"}"#).await;
    send_text(&mut ws, r#"{"chunkOf":"m1","index":0,"total":5000,"data":""}"#).await;
    send_text(&mut ws, r#"{"type":"ping","id":"still-here"}"#).await;

    let reply = parse_frame(&recv_text(&mut ws).await.unwrap()).unwrap();
    assert_eq!(reply, Frame::Pong { id: "still-here".into() });
    assert_eq!(h.status().await.unwrap()["open_chunk_sets"], 0);
}
