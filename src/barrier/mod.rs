//! Completion Barrier
//!
//! Deadline-bounded wait until a convergence predicate over a record holds.
//! Detection latency is bounded by the poll interval.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::domain::TransactionRecord;
use crate::error::{Result, TxGuardError};
use crate::store::RecordStore;

pub struct CompletionBarrier {
    store: Arc<dyn RecordStore>,
    poll_interval: Duration,
}

impl CompletionBarrier {
    pub fn new(store: Arc<dyn RecordStore>, poll_interval: Duration) -> Self {
        Self {
            store,
            poll_interval,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Re-read the record every poll interval until `predicate` holds.
    ///
    /// A missing or expired record ends the wait at once with `Timeout`, so
    /// no stage outlives the record's TTL by more than one poll interval.
    pub async fn wait_for<P>(
        &self,
        transaction_id: &str,
        stage: &str,
        deadline: Duration,
        predicate: P,
    ) -> Result<TransactionRecord>
    where
        P: Fn(&TransactionRecord) -> bool,
    {
        let started = Instant::now();
        let expires_at = started + deadline;
        let mut ticker = time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            match self.store.get(transaction_id).await {
                Ok(record) if predicate(&record) => {
                    debug!(
                        transaction_id = %transaction_id,
                        stage = stage,
                        waited_ms = started.elapsed().as_millis() as u64,
                        "barrier satisfied"
                    );
                    return Ok(record);
                }
                Ok(_) => {}
                Err(e) if e.is_not_found() => {
                    warn!(
                        transaction_id = %transaction_id,
                        stage = stage,
                        "record expired before the barrier was satisfied"
                    );
                    return Err(timeout(stage, started));
                }
                Err(e) => return Err(e),
            }

            if Instant::now() >= expires_at {
                warn!(
                    transaction_id = %transaction_id,
                    stage = stage,
                    waited_ms = started.elapsed().as_millis() as u64,
                    "barrier deadline elapsed"
                );
                return Err(timeout(stage, started));
            }
        }
    }
}

fn timeout(stage: &str, started: Instant) -> TxGuardError {
    TxGuardError::Timeout {
        stage: stage.to_string(),
        waited_ms: started.elapsed().as_millis() as u64,
    }
}

/// Every registered worker has an entry in `completed` or `error`.
pub fn all_workers_reported(
    registered: &BTreeSet<String>,
) -> impl Fn(&TransactionRecord) -> bool + '_ {
    move |record: &TransactionRecord| {
        registered.iter().all(|name| {
            record
                .validation(name)
                .is_some_and(|entry| entry.status.is_reported())
        })
    }
}

/// The agent entry is in `completed` or `error`.
pub fn agent_reported() -> impl Fn(&TransactionRecord) -> bool {
    |record: &TransactionRecord| {
        record
            .agent_validation()
            .is_some_and(|entry| entry.status.is_reported())
    }
}
