//! Query and ping commands.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::http::Daemon;

#[derive(Serialize)]
struct QueryRequest {
    method: String,
    payload: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    timeout_ms: Option<u64>,
}

#[derive(Deserialize)]
struct QueryResponse {
    success: bool,
    data: Option<Value>,
    error: Option<Value>,
    kind: Option<String>,
}

#[derive(Deserialize)]
struct PingResponse {
    rtt_ms: Option<f64>,
    error: Option<Value>,
}

/// Parse the optional payload argument. Absent means `null`.
pub fn parse_payload(arg: Option<&str>) -> Result<Value> {
    match arg {
        None => Ok(Value::Null),
        Some(text) => serde_json::from_str(text).context("payload must be valid JSON"),
    }
}

pub async fn cmd_query(port: u16, method: &str, payload: Value, timeout_ms: Option<u64>) -> Result<()> {
    let req = QueryRequest {
        method: method.to_string(),
        payload,
        timeout_ms,
    };
    let resp: QueryResponse = Daemon::new(port).post("query", Some(&req)).await?;

    if resp.success {
        let data = resp.data.unwrap_or(Value::Null);
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }
    bail!(
        "query failed ({}): {}",
        resp.kind.as_deref().unwrap_or("unknown"),
        describe(resp.error)
    )
}

pub async fn cmd_ping(port: u16) -> Result<()> {
    let resp: PingResponse = Daemon::new(port).post("ping", None::<&()>).await?;
    match resp.rtt_ms {
        Some(rtt) => {
            println!("pong in {:.2}ms", rtt);
            Ok(())
        }
        None => bail!("ping failed: {}", describe(resp.error)),
    }
}

fn describe(error: Option<Value>) -> String {
    match error {
        Some(Value::String(s)) => s,
        Some(other) => other.to_string(),
        None => "no error detail".to_string(),
    }
}
