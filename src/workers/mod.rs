//! Analysis workers ("sentinels")
//!
//! Each worker wraps one `Analyzer` policy in a `WorkerRuntime` loop that
//! listens on the workers topic and records its verdict in the store.

pub mod blacklist;
pub mod catalog;
pub mod fixed_delay;
pub mod runtime;
pub mod wallet_drain;

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::TransactionInput;
use crate::error::Result;

pub use blacklist::MaliciousAddressAnalyzer;
pub use catalog::{
    WorkerCatalog, MALICIOUS_ADDRESS_SENTINEL, SENTINEL_ONE, WALLET_DRAIN_SENTINEL,
};
pub use fixed_delay::FixedDelayAnalyzer;
pub use runtime::WorkerRuntime;
pub use wallet_drain::{BalanceSource, StaticBalances, WalletDrainAnalyzer};

/// One analysis policy run against a transaction's input.
///
/// The returned JSON object is stored verbatim as the worker's result. The
/// agent reads `risk_level` (`low` | `medium` | `high`) and `reason` from it.
#[async_trait]
pub trait Analyzer: Send + Sync + 'static {
    async fn analyze(&self, input: &TransactionInput) -> Result<Value>;
}
