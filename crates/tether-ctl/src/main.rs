//! tether-ctl — command-line interface for the Tether daemon.

use anyhow::{Context, Result};

mod cmd;

const DEFAULT_PORT: u16 = 3057;

fn print_usage() {
    println!("Usage: tether-ctl [--port <port>] [--timeout <ms>] <command>");
    println!();
    println!("Commands:");
    println!("  status                   Show connection, pending queries and limits");
    println!("  ping                     Round-trip a ping through the connected peer");
    println!("  query <method> [json]    Send a query to the peer and print its result");
    println!();
    println!("Options:");
    println!("  --port <port>     Control API port (default: {})", DEFAULT_PORT);
    println!("  --timeout <ms>    Query timeout (default: daemon setting)");
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let mut port = DEFAULT_PORT;
    let mut timeout_ms = None;
    let mut remaining: Vec<&str> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--port" => {
                i += 1;
                port = args
                    .get(i)
                    .context("--port requires a value")?
                    .parse()
                    .context("--port must be a number")?;
            }
            "--timeout" => {
                i += 1;
                timeout_ms = Some(
                    args.get(i)
                        .context("--timeout requires a value")?
                        .parse()
                        .context("--timeout must be a number of milliseconds")?,
                );
            }
            other => remaining.push(other),
        }
        i += 1;
    }

    match remaining.as_slice() {
        ["status"] | [] => cmd::status::cmd_status(port).await,
        ["ping"] => cmd::query::cmd_ping(port).await,
        ["query", method] => {
            cmd::query::cmd_query(port, method, serde_json::Value::Null, timeout_ms).await
        }
        ["query", method, payload] => {
            let payload = cmd::query::parse_payload(Some(*payload))?;
            cmd::query::cmd_query(port, method, payload, timeout_ms).await
        }
        ["help"] | ["--help"] | ["-h"] => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}
