//! Daemon status command.

use anyhow::Result;
use serde::Deserialize;

use super::http::Daemon;

// ── Response types ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct StatusResponse {
    version: String,
    peer_channels: bool,
    connection: ConnectionInfo,
    pending: PendingInfo,
    open_chunk_sets: usize,
    uptime_secs: u64,
    limits: LimitsInfo,
}

#[derive(Deserialize)]
struct ConnectionInfo {
    state: String,
    kind: Option<String>,
    connection_id: Option<u64>,
    connected_for_ms: Option<u64>,
}

#[derive(Deserialize)]
struct PendingInfo {
    count: usize,
    oldest_age_ms: Option<u64>,
    methods: Vec<String>,
}

#[derive(Deserialize)]
struct LimitsInfo {
    chunk_size: usize,
    frame_ceiling: usize,
    max_chunks_per_message: u32,
    query_timeout_ms: u64,
}

// ── Handler ───────────────────────────────────────────────────────────────────

pub async fn cmd_status(port: u16) -> Result<()> {
    let resp: StatusResponse = Daemon::new(port).get("status").await?;

    println!("═══════════════════════════════════════");
    println!("  Tether Daemon Status (v{})", resp.version);
    println!("═══════════════════════════════════════");
    println!("  Uptime           : {}s", resp.uptime_secs);
    println!(
        "  Peer channels    : {}",
        if resp.peer_channels { "enabled" } else { "disabled" }
    );
    println!("  Connection       : {}", resp.connection.state);
    if let (Some(id), Some(kind)) = (resp.connection.connection_id, &resp.connection.kind) {
        println!("  ┌─ connection #{}", id);
        println!("  │  transport : {}", kind);
        println!(
            "  └─ for      : {:.1}s",
            resp.connection.connected_for_ms.unwrap_or(0) as f64 / 1000.0
        );
    }
    println!("  Pending queries  : {}", resp.pending.count);
    if let Some(age) = resp.pending.oldest_age_ms {
        println!("  Oldest pending   : {}ms", age);
    }
    if !resp.pending.methods.is_empty() {
        println!("  Pending methods  : {}", resp.pending.methods.join(", "));
    }
    println!("  Open chunk sets  : {}", resp.open_chunk_sets);
    println!(
        "  Limits           : chunk {} B, frame {} B, {} chunks/msg, timeout {}ms",
        resp.limits.chunk_size,
        resp.limits.frame_ceiling,
        resp.limits.max_chunks_per_message,
        resp.limits.query_timeout_ms
    );

    Ok(())
}
