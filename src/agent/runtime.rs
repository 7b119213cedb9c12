//! Agent Runtime: consumer of the agent topic
//!
//! Reads every worker's entry for a transaction and writes the verdict
//! under the reserved `agent` entry.

use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::decision::decide;
use crate::dispatch::DispatchMessage;
use crate::domain::{ValidationStatus, AGENT_ENTRY_NAME};
use crate::error::TxGuardError;
use crate::store::RecordStore;

#[derive(Clone)]
pub struct AgentRuntime {
    store: Arc<dyn RecordStore>,
}

impl AgentRuntime {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub async fn run(
        self,
        mut dispatch_rx: broadcast::Receiver<DispatchMessage>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        info!("agent listening");

        loop {
            tokio::select! {
                received = dispatch_rx.recv() => match received {
                    Ok(message) => {
                        let runtime = self.clone();
                        tokio::spawn(async move {
                            runtime.handle(&message.transaction_id).await;
                        });
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(lagged = n, "agent dispatch receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        warn!("agent dispatch channel closed");
                        break;
                    }
                },
                _ = shutdown_rx.recv() => {
                    debug!("agent: shutdown signal received");
                    break;
                }
            }
        }

        info!("agent stopped");
    }

    /// Decide one transaction. `None` when the record was already gone.
    pub async fn handle(&self, transaction_id: &str) -> Option<ValidationStatus> {
        if !self
            .write(transaction_id, ValidationStatus::Processing, None)
            .await
        {
            return None;
        }

        let record = match self.store.get(transaction_id).await {
            Ok(record) => record,
            Err(e) => {
                self.log_store_error(transaction_id, &e);
                return None;
            }
        };

        let decision = decide(record.worker_validations());
        let (status, result) = match serde_json::to_value(&decision) {
            Ok(value) => {
                info!(
                    transaction_id = %transaction_id,
                    approved = decision.approved,
                    risk_level = %decision.risk_level,
                    warnings = decision.warnings.len(),
                    review_required = decision.review_required,
                    "agent decision reached"
                );
                (ValidationStatus::Completed, value)
            }
            Err(e) => {
                warn!(transaction_id = %transaction_id, error = %e, "agent decision not serializable");
                (ValidationStatus::Error, json!({ "error": e.to_string() }))
            }
        };

        if self.write(transaction_id, status, Some(result)).await {
            Some(status)
        } else {
            None
        }
    }

    async fn write(
        &self,
        transaction_id: &str,
        status: ValidationStatus,
        result: Option<Value>,
    ) -> bool {
        match self
            .store
            .upsert_validation(transaction_id, AGENT_ENTRY_NAME, status, result)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                self.log_store_error(transaction_id, &e);
                false
            }
        }
    }

    fn log_store_error(&self, transaction_id: &str, err: &TxGuardError) {
        if err.is_not_found() {
            debug!(transaction_id = %transaction_id, "record no longer exists, decision discarded");
        } else {
            warn!(transaction_id = %transaction_id, error = %err, "agent store write failed");
        }
    }
}
