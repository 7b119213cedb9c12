use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::coordinator::{Coordinator, SubmitOutcome};
use crate::domain::TransactionInput;
use crate::error::{Result, TxGuardError};
use crate::workers::WorkerCatalog;

#[derive(Parser)]
#[command(name = "txguard")]
#[command(version = "0.1.0")]
#[command(about = "Scatter-gather transaction risk analysis", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Directory holding default.toml and per-environment overrides
    #[arg(short, long, default_value = "config", env = "TXGUARD_CONFIG_DIR")]
    pub config_dir: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Analyze one transaction end to end and print the verdict
    Submit {
        #[arg(long)]
        chain_id: u64,
        /// Source address
        #[arg(long)]
        from: String,
        /// Destination address
        #[arg(long)]
        to: String,
        /// Hex-encoded call data
        #[arg(long, default_value = "0x")]
        data: String,
        /// Value in wei, decimal or 0x-prefixed hex
        #[arg(long, default_value = "0")]
        value: String,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Read newline-delimited JSON requests on stdin, one verdict per line on stdout
    Serve,
    /// List compiled-in and enabled workers
    Workers,
}

/// One line written back by `serve`
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ServeReply {
    Verdict {
        line: usize,
        #[serde(flatten)]
        outcome: SubmitOutcome,
    },
    Failure {
        line: usize,
        error: String,
        kind: &'static str,
    },
}

impl ServeReply {
    pub fn failure(line: usize, err: &TxGuardError) -> Self {
        ServeReply::Failure {
            line,
            error: err.to_string(),
            kind: err.kind(),
        }
    }
}

pub fn parse_request(raw: &str) -> Result<TransactionInput> {
    Ok(serde_json::from_str(raw)?)
}

/// Parse, submit and render one request line.
pub async fn handle_request_line(coordinator: &Coordinator, line: usize, raw: &str) -> ServeReply {
    let outcome = match parse_request(raw) {
        Ok(input) => coordinator.submit(input).await,
        Err(e) => Err(e),
    };
    match outcome {
        Ok(outcome) => ServeReply::Verdict { line, outcome },
        Err(e) => {
            warn!(line, error = %e, "request failed");
            ServeReply::failure(line, &e)
        }
    }
}

pub async fn submit_once(coordinator: &Coordinator, input: TransactionInput) -> Result<()> {
    let outcome = coordinator.submit(input).await?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

/// Serve requests from stdin until EOF, then drain in-flight work.
///
/// Lines are processed concurrently, so replies may come back out of
/// order; each reply carries the 1-based input line number.
pub async fn serve_stdin(coordinator: Arc<Coordinator>) -> Result<()> {
    let (reply_tx, mut reply_rx) = mpsc::channel::<String>(256);

    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(mut reply) = reply_rx.recv().await {
            reply.push('\n');
            if let Err(e) = stdout.write_all(reply.as_bytes()).await {
                warn!(error = %e, "stdout write failed");
                break;
            }
            let _ = stdout.flush().await;
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut inflight = JoinSet::new();
    let mut line_no = 0usize;

    info!("serving requests from stdin");
    while let Some(raw) = lines.next_line().await? {
        line_no += 1;
        if raw.trim().is_empty() {
            continue;
        }

        let coordinator = coordinator.clone();
        let reply_tx = reply_tx.clone();
        inflight.spawn(async move {
            let reply = handle_request_line(&coordinator, line_no, &raw).await;
            match serde_json::to_string(&reply) {
                Ok(encoded) => {
                    let _ = reply_tx.send(encoded).await;
                }
                Err(e) => warn!(line = line_no, error = %e, "reply not serializable"),
            }
        });
    }

    debug!(pending = inflight.len(), "stdin closed, draining requests");
    while inflight.join_next().await.is_some() {}
    drop(reply_tx);
    if let Err(e) = writer.await {
        warn!(error = %e, "reply writer ended abnormally");
    }
    Ok(())
}

/// JSON listing of the catalog and the enabled subset
pub fn worker_listing(catalog: &WorkerCatalog, config: &AppConfig) -> Value {
    let available: Vec<&str> = catalog.names().collect();
    let enabled: Vec<Value> = config
        .workers
        .enabled
        .iter()
        .map(|name| json!({ "name": name, "known": catalog.contains(name) }))
        .collect();
    json!({ "available": available, "enabled": enabled })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workers::{MALICIOUS_ADDRESS_SENTINEL, WALLET_DRAIN_SENTINEL};

    #[test]
    fn test_parse_request_wire_names() {
        let input = parse_request(
            r#"{"chainId":1,"from_address":"0xa","to_address":"0xb","data":"0x","value":"0x10","reason":"rent"}"#,
        )
        .unwrap();
        assert_eq!(input.chain_id, 1);
        assert_eq!(input.value, "0x10");
        assert_eq!(input.reason.as_deref(), Some("rent"));
    }

    #[test]
    fn test_parse_request_rejects_garbage() {
        let err = parse_request("not json").unwrap_err();
        assert_eq!(err.kind(), "serialization");
    }

    #[test]
    fn test_failure_reply_shape() {
        let reply = ServeReply::failure(3, &TxGuardError::NoWorkersRegistered);
        let value = serde_json::to_value(&reply).unwrap();
        assert_eq!(value["line"], 3);
        assert_eq!(value["kind"], "no_workers_registered");
    }

    #[test]
    fn test_worker_listing_flags_unknown() {
        let mut config = AppConfig::default();
        config.workers.enabled = vec![MALICIOUS_ADDRESS_SENTINEL.into(), "ghost".into()];
        let listing = worker_listing(&WorkerCatalog::builtin(), &config);

        assert!(listing["available"]
            .as_array()
            .unwrap()
            .contains(&json!(WALLET_DRAIN_SENTINEL)));
        assert_eq!(listing["enabled"][0]["known"], true);
        assert_eq!(listing["enabled"][1]["known"], false);
    }

    #[test]
    fn test_cli_parses_submit() {
        let cli = Cli::try_parse_from([
            "txguard", "submit", "--chain-id", "1", "--from", "0xa", "--to", "0xb",
        ])
        .unwrap();
        match cli.command {
            Commands::Submit { chain_id, data, value, .. } => {
                assert_eq!(chain_id, 1);
                assert_eq!(data, "0x");
                assert_eq!(value, "0");
            }
            _ => panic!("expected submit"),
        }
    }
}
