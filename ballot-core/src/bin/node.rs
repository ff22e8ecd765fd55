//! Ballot node binary
//!
//! Reads one JSON request per line from stdin, e.g.
//! `{"function":"vote","args":["v1","c1","election.1"],"caller":"v1"}`,
//! and writes one JSON response per line to stdout.

use anyhow::Context;
use ballot_core::{BallotService, Config, Request, Response};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing (stdout carries responses)
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting ballot node");

    // Load configuration
    let config = match std::env::var("BALLOT_CONFIG") {
        Ok(path) => Config::from_file(&path).with_context(|| format!("loading {}", path))?,
        Err(_) => Config::from_env().context("loading configuration from environment")?,
    };

    let service = BallotService::open(config)
        .await
        .context("opening ballot service")?;
    tracing::info!(data_dir = %service.config().data_dir.display(), "Ledger opened");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("reading stdin")?,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
        };

        let Some(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }

        let output = match serde_json::from_str::<Request>(&line) {
            Ok(request) => render(&service.submit(&request).await),
            Err(e) => json!({ "code": 1, "log": format!("Malformed request: {}", e), "payload": null }),
        };

        stdout.write_all(output.to_string().as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }

    service.shutdown().await?;
    tracing::info!("Ballot node stopped");
    Ok(())
}

/// JSON payloads are embedded as-is, anything else as a string
fn render(response: &Response) -> Value {
    let payload = if response.payload.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&response.payload)
            .unwrap_or_else(|_| Value::String(response.payload_str().into_owned()))
    };

    json!({
        "code": response.code,
        "log": response.log,
        "payload": payload,
    })
}
