//! Archive Writer
//!
//! Durable copy of every completed transaction. The listener is driven by
//! the store's completion notices; archiving failures are logged and never
//! reach the coordinator.

pub mod jsonl;
pub mod postgres;

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::config::{ArchiveConfig, ArchiveKind};
use crate::domain::TransactionRecord;
use crate::error::{Result, TxGuardError};
use crate::store::{CompletionNotice, RecordStore};

pub use jsonl::JsonlArchiveWriter;
pub use postgres::PostgresArchiveWriter;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ArchiveWriter: Send + Sync {
    async fn persist(&self, record: &TransactionRecord) -> Result<()>;
}

/// Build the writer selected in configuration, if any.
pub async fn build_writer(config: &ArchiveConfig) -> Result<Option<Arc<dyn ArchiveWriter>>> {
    let writer: Arc<dyn ArchiveWriter> = match config.kind {
        ArchiveKind::None => return Ok(None),
        ArchiveKind::Jsonl => Arc::new(JsonlArchiveWriter::new(&config.path)),
        ArchiveKind::Postgres => {
            let url = config.database_url.as_deref().ok_or_else(|| {
                TxGuardError::Validation("archive.database_url is required for postgres".into())
            })?;
            Arc::new(PostgresArchiveWriter::connect(url, config.max_connections).await?)
        }
    };
    info!(kind = ?config.kind, "archive writer ready");
    Ok(Some(writer))
}

/// Forwards completed records from the store to an `ArchiveWriter`.
pub struct ArchiveListener {
    store: Arc<dyn RecordStore>,
    writer: Arc<dyn ArchiveWriter>,
}

impl ArchiveListener {
    pub fn new(store: Arc<dyn RecordStore>, writer: Arc<dyn ArchiveWriter>) -> Self {
        Self { store, writer }
    }

    /// Takes the receiver up front so no notice is missed between
    /// construction and the first poll of the returned future. Notices
    /// already queued when shutdown arrives are archived before returning.
    pub async fn run(
        self,
        mut completions: broadcast::Receiver<CompletionNotice>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        info!("archive listener started");

        loop {
            tokio::select! {
                biased;

                received = completions.recv() => match received {
                    Ok(notice) => self.archive(&notice.transaction_id).await,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(lagged = n, "archive listener lagged; records skipped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                _ = shutdown_rx.recv() => {
                    debug!("archive listener: shutdown signal received");
                    self.drain(&mut completions).await;
                    break;
                }
            }
        }

        info!("archive listener stopped");
    }

    async fn drain(&self, completions: &mut broadcast::Receiver<CompletionNotice>) {
        let mut drained = 0usize;
        loop {
            match completions.try_recv() {
                Ok(notice) => {
                    self.archive(&notice.transaction_id).await;
                    drained += 1;
                }
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!(lagged = n, "archive listener lagged; records skipped");
                }
                Err(_) => break,
            }
        }
        if drained > 0 {
            debug!(drained, "archived pending notices before stopping");
        }
    }

    pub async fn archive(&self, transaction_id: &str) {
        let record = match self.store.get(transaction_id).await {
            Ok(record) => record,
            Err(e) => {
                warn!(transaction_id = %transaction_id, error = %e, "archive read failed");
                return;
            }
        };

        match self.writer.persist(&record).await {
            Ok(()) => debug!(transaction_id = %transaction_id, "transaction archived"),
            Err(e) => warn!(transaction_id = %transaction_id, error = %e, "archive write failed"),
        }
    }
}
