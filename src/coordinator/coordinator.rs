//! Coordinator: per-transaction scatter-gather workflow
//!
//! `submit` is the only entrypoint. It never retries a stage and never
//! cleans up after a timeout: the record is left in whatever partial state
//! the workers reached and expires on its own.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::config::CoordinatorConfig;
use crate::barrier::{agent_reported, all_workers_reported, CompletionBarrier};
use crate::config::DeadlineBudget;
use crate::dispatch::{DispatchChannel, DispatchMessage, Topic};
use crate::domain::{
    AgentDecision, RecordStatus, TransactionInput, TransactionRecord, ValidationStatus,
    AGENT_ENTRY_NAME,
};
use crate::error::{Result, TxGuardError};
use crate::registry::WorkerRegistry;
use crate::store::RecordStore;

const WORKERS_STAGE: &str = "workers";
const AGENT_STAGE: &str = "agent";
const FINALIZE_STAGE: &str = "finalize";

/// What the caller gets back from a successful submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitOutcome {
    pub transaction_id: String,
    pub approved: bool,
    pub decision: AgentDecision,
}

#[derive(Clone)]
pub struct Coordinator {
    store: Arc<dyn RecordStore>,
    dispatch: DispatchChannel,
    registry: Arc<WorkerRegistry>,
    config: CoordinatorConfig,
}

impl Coordinator {
    pub fn new(
        store: Arc<dyn RecordStore>,
        dispatch: DispatchChannel,
        registry: Arc<WorkerRegistry>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            store,
            dispatch,
            registry,
            config,
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Run one transaction through every worker and the agent.
    ///
    /// Fails with `NoWorkersRegistered` before creating anything, with
    /// `Validation` for malformed input and with `Timeout` when either
    /// barrier stage runs out of time. A record that expires between
    /// stages surfaces as `Timeout` for the `finalize` stage.
    pub async fn submit(&self, input: TransactionInput) -> Result<SubmitOutcome> {
        let registered = self.registry.list()?;
        if registered.is_empty() {
            return Err(TxGuardError::NoWorkersRegistered);
        }
        input.validate()?;

        let started = Instant::now();
        let transaction_id = self.store.create(input).await?;
        info!(
            transaction_id = %transaction_id,
            workers = registered.len(),
            "transaction submitted"
        );

        self.finalize_status(&transaction_id, RecordStatus::Processing, started)
            .await?;

        let barrier = CompletionBarrier::new(self.store.clone(), self.config.poll_interval);

        self.dispatch
            .publish(Topic::Workers, DispatchMessage::new(transaction_id.clone()));
        barrier
            .wait_for(
                &transaction_id,
                WORKERS_STAGE,
                self.config.deadline,
                all_workers_reported(&registered),
            )
            .await?;
        debug!(
            transaction_id = %transaction_id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "all workers reported"
        );

        self.dispatch
            .publish(Topic::Agent, DispatchMessage::new(transaction_id.clone()));
        let record = barrier
            .wait_for(
                &transaction_id,
                AGENT_STAGE,
                self.agent_deadline(started),
                agent_reported(),
            )
            .await?;

        let decision = Self::read_decision(&record)?;

        self.finalize_status(&transaction_id, RecordStatus::Completed, started)
            .await?;

        info!(
            transaction_id = %transaction_id,
            approved = decision.approved,
            risk_level = %decision.risk_level,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "transaction decided"
        );

        Ok(SubmitOutcome {
            transaction_id,
            approved: decision.approved,
            decision,
        })
    }

    async fn finalize_status(
        &self,
        transaction_id: &str,
        status: RecordStatus,
        started: Instant,
    ) -> Result<()> {
        match self.store.set_status(transaction_id, status).await {
            Err(e) if e.is_not_found() => {
                warn!(
                    transaction_id = %transaction_id,
                    status = %status,
                    "record expired before its status could be set"
                );
                Err(TxGuardError::Timeout {
                    stage: FINALIZE_STAGE.to_string(),
                    waited_ms: started.elapsed().as_millis() as u64,
                })
            }
            other => other,
        }
    }

    fn agent_deadline(&self, started: Instant) -> Duration {
        match self.config.budget {
            DeadlineBudget::PerStage => self.config.deadline,
            DeadlineBudget::WholeTransaction => {
                self.config.deadline.saturating_sub(started.elapsed())
            }
        }
    }

    fn read_decision(record: &TransactionRecord) -> Result<AgentDecision> {
        let entry = record
            .agent_validation()
            .ok_or_else(|| TxGuardError::Internal("agent entry missing after barrier".into()))?;
        let result = entry.result.clone().unwrap_or_default();

        if entry.status == ValidationStatus::Error {
            let message = result
                .get("error")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown error")
                .to_string();
            warn!(transaction_id = %record.transaction_id, error = %message, "agent reported an error");
            return Err(TxGuardError::analysis(AGENT_ENTRY_NAME, message));
        }

        Ok(serde_json::from_value(result)?)
    }
}
