//! Transaction Record Store
//!
//! Keyed, shared mutable state for one transaction's lifecycle and the
//! per-worker results written into it. Every component receives an explicit
//! `Arc<dyn RecordStore>` handle; there is no global instance.

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

use crate::domain::{RecordStatus, TransactionInput, TransactionRecord, ValidationStatus};
use crate::error::Result;

pub use memory::MemoryRecordStore;

/// Emitted once when a record transitions into `completed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionNotice {
    pub transaction_id: String,
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Allocate an id and write a pending record with an empty validations list.
    async fn create(&self, input: TransactionInput) -> Result<String>;

    /// Fails with `NotFound` for unknown ids and for expired records alike.
    async fn get(&self, transaction_id: &str) -> Result<TransactionRecord>;

    /// Atomic merge of one worker's entry: replace by name, else append.
    async fn upsert_validation(
        &self,
        transaction_id: &str,
        worker: &str,
        status: ValidationStatus,
        result: Option<Value>,
    ) -> Result<()>;

    /// Update top-level status and `updated_at`. `completed` is terminal.
    async fn set_status(&self, transaction_id: &str, status: RecordStatus) -> Result<()>;

    /// Completion notices for the archive writer.
    fn subscribe_completions(&self) -> broadcast::Receiver<CompletionNotice>;

    /// Release the backing store; later calls fail with `StoreUnavailable`.
    async fn close(&self);
}
