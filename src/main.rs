use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use txguard::cli::{self, Cli, Commands};
use txguard::config::AppConfig;
use txguard::domain::TransactionInput;
use txguard::engine::Engine;
use txguard::workers::WorkerCatalog;

mod main_runtime;

use main_runtime::{init_logging, init_logging_simple};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load_from(&cli.config_dir)?;

    match cli.command {
        Commands::Workers => {
            init_logging_simple();
            let listing = cli::worker_listing(&WorkerCatalog::builtin(), &config);
            println!("{}", serde_json::to_string_pretty(&listing)?);
        }
        Commands::Submit {
            chain_id,
            from,
            to,
            data,
            value,
            reason,
        } => {
            init_logging(&config.logging);
            let input = TransactionInput {
                chain_id,
                from_address: from,
                to_address: to,
                payload: data,
                value,
                reason,
            };

            let engine = Engine::start(config).await?;
            let result = cli::submit_once(engine.coordinator(), input).await;
            engine.shutdown().await;
            result?;
        }
        Commands::Serve => {
            init_logging(&config.logging);
            let engine = Engine::start(config).await?;
            let coordinator = Arc::new(engine.coordinator().clone());

            tokio::select! {
                result = cli::serve_stdin(coordinator) => {
                    if let Err(e) = result {
                        warn!(error = %e, "serve loop failed");
                    }
                }
                _ = signal::ctrl_c() => {
                    info!("Ctrl+C received, shutting down");
                }
            }

            engine.shutdown().await;
        }
    }

    Ok(())
}
