//! In-memory record store with absolute per-record expiry
//!
//! Records live in a sharded `DashMap`. Each mutation runs while holding the
//! entry's shard lock, so concurrent `upsert_validation` calls from different
//! workers on the same transaction serialize instead of losing updates.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use super::{CompletionNotice, RecordStore};
use crate::domain::{RecordStatus, TransactionInput, TransactionRecord, ValidationStatus};
use crate::error::{Result, TxGuardError};

const COMPLETION_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug)]
struct StoredRecord {
    record: TransactionRecord,
    /// Fixed at creation; mutations never extend it
    expires_at: Instant,
}

impl StoredRecord {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

pub struct MemoryRecordStore {
    records: DashMap<String, StoredRecord>,
    ttl: Duration,
    open: AtomicBool,
    completion_tx: broadcast::Sender<CompletionNotice>,
}

impl MemoryRecordStore {
    /// Open a store whose records expire `ttl` after creation.
    pub fn new(ttl: Duration) -> Self {
        let (completion_tx, _) = broadcast::channel(COMPLETION_CHANNEL_CAPACITY);
        info!(ttl_ms = ttl.as_millis() as u64, "record store opened");
        Self {
            records: DashMap::new(),
            ttl,
            open: AtomicBool::new(true),
            completion_tx,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Number of records that have not yet expired
    pub fn live_count(&self) -> usize {
        let now = Instant::now();
        self.records.iter().filter(|e| !e.is_expired(now)).count()
    }

    /// Drop every expired record. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.records.len();
        self.records.retain(|_, stored| !stored.is_expired(now));
        before.saturating_sub(self.records.len())
    }

    /// Periodically purge expired records until shutdown.
    pub fn spawn_sweeper(
        store: Arc<Self>,
        interval: Duration,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        let purged = store.purge_expired();
                        if purged > 0 {
                            debug!(purged, "purged expired transaction records");
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        debug!("record sweeper: shutdown signal received");
                        break;
                    }
                }
            }
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(TxGuardError::StoreUnavailable(
                "record store is closed".into(),
            ))
        }
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn create(&self, input: TransactionInput) -> Result<String> {
        self.ensure_open()?;

        let transaction_id = Uuid::new_v4().to_string();
        let stored = StoredRecord {
            record: TransactionRecord::new(transaction_id.clone(), input),
            expires_at: Instant::now() + self.ttl,
        };
        self.records.insert(transaction_id.clone(), stored);

        debug!(transaction_id = %transaction_id, "transaction record created");
        Ok(transaction_id)
    }

    async fn get(&self, transaction_id: &str) -> Result<TransactionRecord> {
        self.ensure_open()?;
        let now = Instant::now();

        match self.records.get(transaction_id) {
            None => return Err(TxGuardError::transaction_not_found(transaction_id)),
            Some(stored) if !stored.is_expired(now) => return Ok(stored.record.clone()),
            Some(_) => {}
        }

        // Expired: the read guard is released above, safe to take the write lock.
        self.records
            .remove_if(transaction_id, |_, stored| stored.is_expired(now));
        Err(TxGuardError::transaction_not_found(transaction_id))
    }

    async fn upsert_validation(
        &self,
        transaction_id: &str,
        worker: &str,
        status: ValidationStatus,
        result: Option<Value>,
    ) -> Result<()> {
        self.ensure_open()?;
        let now = Instant::now();

        match self.records.get_mut(transaction_id) {
            Some(mut stored) if !stored.is_expired(now) => {
                stored.record.upsert_validation(worker, status, result);
                debug!(
                    transaction_id = %transaction_id,
                    worker,
                    status = %status,
                    "validation upserted"
                );
                Ok(())
            }
            _ => Err(TxGuardError::transaction_not_found(transaction_id)),
        }
    }

    async fn set_status(&self, transaction_id: &str, status: RecordStatus) -> Result<()> {
        self.ensure_open()?;
        let now = Instant::now();

        let previous = match self.records.get_mut(transaction_id) {
            Some(mut stored) if !stored.is_expired(now) => {
                let previous = stored.record.status;
                if previous == RecordStatus::Completed && status != RecordStatus::Completed {
                    return Err(TxGuardError::Validation(format!(
                        "transaction {transaction_id} is completed; cannot move to {status}"
                    )));
                }
                stored.record.status = status;
                stored.record.updated_at = Some(Utc::now());
                previous
            }
            _ => return Err(TxGuardError::transaction_not_found(transaction_id)),
        };

        if status == RecordStatus::Completed && previous != RecordStatus::Completed {
            // No subscriber just means no archive is attached.
            let _ = self.completion_tx.send(CompletionNotice {
                transaction_id: transaction_id.to_string(),
            });
            debug!(transaction_id = %transaction_id, "completion notice emitted");
        }
        Ok(())
    }

    fn subscribe_completions(&self) -> broadcast::Receiver<CompletionNotice> {
        self.completion_tx.subscribe()
    }

    async fn close(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            let dropped = self.records.len();
            self.records.clear();
            info!(dropped, "record store closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn input() -> TransactionInput {
        TransactionInput {
            chain_id: 1,
            from_address: "0xfrom".into(),
            to_address: "0xto".into(),
            payload: "0xa9059cbb".into(),
            value: "42".into(),
            reason: Some("payroll".into()),
        }
    }

    #[tokio::test]
    async fn test_create_then_get_round_trip() {
        let store = MemoryRecordStore::new(Duration::from_secs(10));
        let id = store.create(input()).await.unwrap();

        let record = store.get(&id).await.unwrap();
        assert_eq!(record.transaction_id, id);
        assert_eq!(record.input, input());
        assert_eq!(record.status, RecordStatus::Pending);
        assert!(record.validations.is_empty());
        assert!(record.updated_at.is_none());
    }

    #[tokio::test]
    async fn test_get_unknown_is_not_found() {
        let store = MemoryRecordStore::new(Duration::from_secs(10));
        let err = store.get("missing").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_same_worker_upsert_is_last_write_wins() {
        let store = MemoryRecordStore::new(Duration::from_secs(10));
        let id = store.create(input()).await.unwrap();

        store
            .upsert_validation(&id, "w1", ValidationStatus::Processing, None)
            .await
            .unwrap();
        store
            .upsert_validation(
                &id,
                "w1",
                ValidationStatus::Completed,
                Some(json!({"risk_level": "low"})),
            )
            .await
            .unwrap();

        let record = store.get(&id).await.unwrap();
        assert_eq!(record.validations.len(), 1);
        assert_eq!(record.validations[0].status, ValidationStatus::Completed);
        assert_eq!(
            record.validations[0].result,
            Some(json!({"risk_level": "low"}))
        );
    }

    #[tokio::test]
    async fn test_concurrent_upserts_do_not_lose_updates() {
        let store = Arc::new(MemoryRecordStore::new(Duration::from_secs(10)));
        let id = store.create(input()).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..32 {
            let store = store.clone();
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                let name = format!("worker-{i}");
                store
                    .upsert_validation(&id, &name, ValidationStatus::Processing, None)
                    .await
                    .unwrap();
                store
                    .upsert_validation(
                        &id,
                        &name,
                        ValidationStatus::Completed,
                        Some(json!({"n": i})),
                    )
                    .await
                    .unwrap();
            }));
        }
        for handle in futures::future::join_all(handles).await {
            handle.unwrap();
        }

        let record = store.get(&id).await.unwrap();
        assert_eq!(record.validations.len(), 32);
        assert!(record
            .validations
            .iter()
            .all(|v| v.status == ValidationStatus::Completed));
    }

    #[tokio::test]
    async fn test_record_expires_after_ttl() {
        let store = MemoryRecordStore::new(Duration::from_millis(50));
        let id = store.create(input()).await.unwrap();
        assert!(store.get(&id).await.is_ok());

        tokio::time::sleep(Duration::from_millis(80)).await;

        assert!(store.get(&id).await.unwrap_err().is_not_found());
        let late = store
            .upsert_validation(&id, "w1", ValidationStatus::Completed, None)
            .await;
        assert!(late.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_mutations_do_not_extend_ttl() {
        let store = MemoryRecordStore::new(Duration::from_millis(100));
        let id = store.create(input()).await.unwrap();

        tokio::time::sleep(Duration::from_millis(60)).await;
        store
            .upsert_validation(&id, "w1", ValidationStatus::Processing, None)
            .await
            .unwrap();
        store.set_status(&id, RecordStatus::Processing).await.unwrap();

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(store.get(&id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_completion_notice_fires_once() {
        let store = MemoryRecordStore::new(Duration::from_secs(10));
        let mut notices = store.subscribe_completions();
        let id = store.create(input()).await.unwrap();

        store.set_status(&id, RecordStatus::Processing).await.unwrap();
        store.set_status(&id, RecordStatus::Completed).await.unwrap();
        store.set_status(&id, RecordStatus::Completed).await.unwrap();

        let notice = notices.recv().await.unwrap();
        assert_eq!(notice.transaction_id, id);
        assert!(matches!(
            notices.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));

        let record = store.get(&id).await.unwrap();
        assert_eq!(record.status, RecordStatus::Completed);
        assert!(record.updated_at.is_some());
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let store = MemoryRecordStore::new(Duration::from_millis(20));
        store.create(input()).await.unwrap();
        store.create(input()).await.unwrap();
        assert_eq!(store.live_count(), 2);

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(store.live_count(), 0);
        assert_eq!(store.purge_expired(), 2);
        assert_eq!(store.purge_expired(), 0);
    }

    #[tokio::test]
    async fn test_closed_store_is_unavailable() {
        let store = MemoryRecordStore::new(Duration::from_secs(10));
        let id = store.create(input()).await.unwrap();
        store.close().await;

        assert!(!store.is_open());
        assert!(matches!(
            store.create(input()).await,
            Err(TxGuardError::StoreUnavailable(_))
        ));
        assert!(matches!(
            store.get(&id).await,
            Err(TxGuardError::StoreUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_completed_is_terminal() {
        let store = MemoryRecordStore::new(Duration::from_secs(10));
        let mut completions = store.subscribe_completions();
        let id = store.create(input()).await.unwrap();

        store.set_status(&id, RecordStatus::Completed).await.unwrap();
        let err = store
            .set_status(&id, RecordStatus::Processing)
            .await
            .unwrap_err();
        assert!(matches!(err, TxGuardError::Validation(_)));

        // Re-completing is a no-op and emits nothing further
        store.set_status(&id, RecordStatus::Completed).await.unwrap();
        assert_eq!(completions.recv().await.unwrap().transaction_id, id);
        assert!(completions.try_recv().is_err());
        assert_eq!(store.get(&id).await.unwrap().status, RecordStatus::Completed);
    }
}
