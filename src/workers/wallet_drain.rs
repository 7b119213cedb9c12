//! Balance-drain heuristic
//!
//! A transfer that moves (almost) the whole native balance of the source
//! wallet is the classic signature of a drainer contract.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::Analyzer;
use crate::domain::{RiskLevel, TransactionInput};
use crate::error::{Result, TxGuardError};

/// Where native balances come from (chain RPC, cache, fixture table)
#[async_trait]
pub trait BalanceSource: Send + Sync {
    /// `None` when the balance of `address` is unknown
    async fn native_balance(&self, chain_id: u64, address: &str) -> Result<Option<Decimal>>;
}

/// Balances known up front, keyed by lowercase address
#[derive(Debug, Default, Clone)]
pub struct StaticBalances {
    balances: HashMap<String, Decimal>,
}

impl StaticBalances {
    pub fn new(balances: &HashMap<String, Decimal>) -> Self {
        Self {
            balances: balances
                .iter()
                .map(|(addr, bal)| (addr.trim().to_ascii_lowercase(), *bal))
                .collect(),
        }
    }
}

#[async_trait]
impl BalanceSource for StaticBalances {
    async fn native_balance(&self, _chain_id: u64, address: &str) -> Result<Option<Decimal>> {
        Ok(self
            .balances
            .get(&address.trim().to_ascii_lowercase())
            .copied())
    }
}

pub struct WalletDrainAnalyzer {
    balances: Arc<dyn BalanceSource>,
    drain_ratio: Decimal,
}

impl WalletDrainAnalyzer {
    pub fn new(balances: Arc<dyn BalanceSource>, drain_ratio: Decimal) -> Self {
        Self {
            balances,
            drain_ratio,
        }
    }
}

#[async_trait]
impl Analyzer for WalletDrainAnalyzer {
    async fn analyze(&self, input: &TransactionInput) -> Result<Value> {
        let value = input
            .parsed_value()
            .map_err(|e| TxGuardError::analysis("wallet-drain", e.to_string()))?;

        let Some(balance) = self
            .balances
            .native_balance(input.chain_id, &input.from_address)
            .await?
        else {
            debug!(address = %input.from_address, "no known balance, drain check skipped");
            return Ok(json!({
                "status": "skipped",
                "risk_level": RiskLevel::Low,
                "message": format!("no known balance for {}", input.from_address),
            }));
        };

        let threshold = balance.checked_mul(self.drain_ratio).ok_or_else(|| {
            TxGuardError::analysis(
                "wallet-drain",
                format!("drain threshold overflows for balance {balance}"),
            )
        })?;

        if value > Decimal::ZERO && value > threshold {
            return Ok(json!({
                "status": "warning",
                "risk_level": RiskLevel::High,
                "reason": format!(
                    "possible wallet drain: transaction moves {value} of {balance} wei"
                ),
                "current_balance": balance.to_string(),
                "tx_value": value.to_string(),
            }));
        }

        Ok(json!({
            "status": "success",
            "risk_level": RiskLevel::Low,
            "message": "Analysis completed successfully",
        }))
    }
}
