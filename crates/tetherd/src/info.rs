//! Built-in answer to queries the peer sends to the bridge itself.

use std::time::Instant;

use anyhow::Result;
use serde_json::json;

use tether_core::Frame;
use tether_services::FrameHandler;

pub const INFO_METHOD: &str = "bridge.info";

/// Answers `bridge.info`; every other inbound query gets a failed response
/// so the peer is not left waiting for its own timeout.
pub struct BridgeInfo {
    started_at: Instant,
}

impl BridgeInfo {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
        }
    }
}

impl FrameHandler for BridgeInfo {
    fn name(&self) -> &str {
        "bridge-info"
    }

    fn handle_frame(&self, frame: &Frame) -> Result<Option<Frame>> {
        let Frame::Query { id, method, .. } = frame else {
            return Ok(None);
        };
        if method == INFO_METHOD {
            return Ok(Some(Frame::success(
                id.clone(),
                json!({
                    "name": "tetherd",
                    "version": env!("CARGO_PKG_VERSION"),
                    "uptime_secs": self.started_at.elapsed().as_secs(),
                }),
            )));
        }
        tracing::debug!(id = %id, method = %method, "unknown inbound method");
        Ok(Some(Frame::failure(id.clone(), format!("unknown method: {method}"))))
    }
}
