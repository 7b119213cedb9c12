//! Worker Runtime: generic loop around one analysis policy
//!
//! Subscribed to the workers topic; every dispatched transaction is handled
//! on its own task so a slow analysis never holds up the next message.

use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::Analyzer;
use crate::dispatch::DispatchMessage;
use crate::domain::ValidationStatus;
use crate::error::TxGuardError;
use crate::store::RecordStore;

#[derive(Clone)]
pub struct WorkerRuntime {
    name: String,
    analyzer: Arc<dyn Analyzer>,
    store: Arc<dyn RecordStore>,
}

impl WorkerRuntime {
    pub fn new(
        name: impl Into<String>,
        analyzer: Arc<dyn Analyzer>,
        store: Arc<dyn RecordStore>,
    ) -> Self {
        Self {
            name: name.into(),
            analyzer,
            store,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Main loop. Returns on shutdown or when the dispatch channel closes
    pub async fn run(
        self,
        mut dispatch_rx: broadcast::Receiver<DispatchMessage>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        info!(worker = %self.name, "worker listening");

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
                        warn!(worker = %self.name, lagged = n, "worker dispatch receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        warn!(worker = %self.name, "worker dispatch channel closed");
                        break;
                    }
                },
                _ = shutdown_rx.recv() => {
                    debug!(worker = %self.name, "worker: shutdown signal received");
                    break;
                }
            }
        }

        info!(worker = %self.name, "worker stopped");
    }

    /// Process one dispatched transaction.
    ///
    /// Returns the status written, or `None` when the record was already gone.
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

        debug!(worker = %self.name, transaction_id = %transaction_id, "analysis started");

        // Run on a separate task so a panicking policy becomes an error result.
        let analyzer = self.analyzer.clone();
        let input = record.input;
        let outcome = tokio::spawn(async move { analyzer.analyze(&input).await }).await;

        let (status, result) = match outcome {
            Ok(Ok(result)) => (ValidationStatus::Completed, result),
            Ok(Err(e)) => {
                warn!(
                    worker = %self.name,
                    transaction_id = %transaction_id,
                    error = %e,
                    "analysis failed"
                );
                let message = match e {
                    TxGuardError::WorkerAnalysis { message, .. } => message,
                    other => other.to_string(),
                };
                (ValidationStatus::Error, self.error_result(&message))
            }
            Err(join_err) => {
                warn!(
                    worker = %self.name,
                    transaction_id = %transaction_id,
                    error = %join_err,
                    "analysis task aborted"
                );
                (
                    ValidationStatus::Error,
                    self.error_result(&format!("analysis task aborted: {join_err}")),
                )
            }
        };

        if self.write(transaction_id, status, Some(result)).await {
            info!(
                worker = %self.name,
                transaction_id = %transaction_id,
                status = %status,
                "analysis reported"
            );
            Some(status)
        } else {
            None
        }
    }

    fn error_result(&self, message: &str) -> Value {
        json!({
            "status": "error",
            "error": message,
            "worker": self.name,
        })
    }

    async fn write(
        &self,
        transaction_id: &str,
        status: ValidationStatus,
        result: Option<Value>,
    ) -> bool {
        match self
            .store
            .upsert_validation(transaction_id, &self.name, status, result)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                self.log_store_error(transaction_id, &e);
                false
            }
        }
    }

    /// Late writes to expired records are expected once the coordinator
    /// has given up on a transaction.
    fn log_store_error(&self, transaction_id: &str, err: &TxGuardError) {
        if err.is_not_found() {
            debug!(
                worker = %self.name,
                transaction_id = %transaction_id,
                "record no longer exists, result discarded"
            );
        } else {
            warn!(
                worker = %self.name,
                transaction_id = %transaction_id,
                error = %err,
                "record store write failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{DispatchChannel, Topic};
    use crate::domain::TransactionInput;
    use crate::error::Result;
    use crate::store::MemoryRecordStore;
    use async_trait::async_trait;
    use std::time::Duration;

    struct Scripted(Value);

    #[async_trait]
    impl Analyzer for Scripted {
        async fn analyze(&self, _input: &TransactionInput) -> Result<Value> {
            Ok(self.0.clone())
        }
    }

    struct Failing;

    #[async_trait]
    impl Analyzer for Failing {
        async fn analyze(&self, _input: &TransactionInput) -> Result<Value> {
            Err(TxGuardError::analysis("failing", "rpc unreachable"))
        }
    }

    struct Panicking;

    #[async_trait]
    impl Analyzer for Panicking {
        async fn analyze(&self, _input: &TransactionInput) -> Result<Value> {
            panic!("policy bug");
        }
    }

    fn input() -> TransactionInput {
        TransactionInput {
            chain_id: 1,
            from_address: "0xfrom".into(),
            to_address: "0xto".into(),
            payload: "0x".into(),
            value: "1".into(),
            reason: None,
        }
    }

    fn store() -> Arc<MemoryRecordStore> {
        Arc::new(MemoryRecordStore::new(Duration::from_secs(10)))
    }

    #[tokio::test]
    async fn test_handle_writes_completed_result() {
        let store = store();
        let id = store.create(input()).await.unwrap();
        let runtime = WorkerRuntime::new(
            "w1",
            Arc::new(Scripted(json!({"risk_level": "low"}))),
            store.clone(),
        );

        assert_eq!(runtime.handle(&id).await, Some(ValidationStatus::Completed));

        let record = store.get(&id).await.unwrap();
        let entry = record.validation("w1").unwrap();
        assert_eq!(entry.status, ValidationStatus::Completed);
        assert_eq!(entry.result, Some(json!({"risk_level": "low"})));
    }

    #[tokio::test]
    async fn test_analysis_error_is_stored_as_data() {
        let store = store();
        let id = store.create(input()).await.unwrap();
        let runtime = WorkerRuntime::new("w1", Arc::new(Failing), store.clone());

        assert_eq!(runtime.handle(&id).await, Some(ValidationStatus::Error));

        let record = store.get(&id).await.unwrap();
        let result = record.validation("w1").unwrap().result.clone().unwrap();
        assert_eq!(result["error"], "rpc unreachable");
        assert_eq!(result["worker"], "w1");
    }

    #[tokio::test]
    async fn test_panicking_policy_becomes_error_result() {
        let store = store();
        let id = store.create(input()).await.unwrap();
        let runtime = WorkerRuntime::new("w1", Arc::new(Panicking), store.clone());

        assert_eq!(runtime.handle(&id).await, Some(ValidationStatus::Error));
        let record = store.get(&id).await.unwrap();
        assert_eq!(
            record.validation("w1").unwrap().status,
            ValidationStatus::Error
        );
    }

    #[tokio::test]
    async fn test_missing_record_is_ignored() {
        let runtime = WorkerRuntime::new("w1", Arc::new(Failing), store());
        assert_eq!(runtime.handle("gone").await, None);
    }

    #[tokio::test]
    async fn test_run_loop_reacts_to_dispatch_and_shutdown() {
        let store = store();
        let id = store.create(input()).await.unwrap();
        let dispatch = DispatchChannel::new(8);
        let (shutdown_tx, _) = broadcast::channel::<()>(1);

        let runtime = WorkerRuntime::new(
            "w1",
            Arc::new(Scripted(json!({"risk_level": "medium"}))),
            store.clone(),
        );
        let task = tokio::spawn(runtime.run(
            dispatch.subscribe(Topic::Workers),
            shutdown_tx.subscribe(),
        ));

        dispatch.publish(Topic::Workers, DispatchMessage::new(id.clone()));

        let mut reported = false;
        for _ in 0..50 {
            let record = store.get(&id).await.unwrap();
            if record
                .validation("w1")
                .is_some_and(|v| v.status.is_reported())
            {
                reported = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(reported);

        shutdown_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }
}
