//! Static worker catalog: worker name → analyzer constructor
//!
//! Every policy the binary can run is compiled in and listed here. The
//! engine builds only the names enabled in configuration.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use super::{
    Analyzer, FixedDelayAnalyzer, MaliciousAddressAnalyzer, StaticBalances, WalletDrainAnalyzer,
};
use crate::config::WorkersConfig;
use crate::domain::AGENT_ENTRY_NAME;
use crate::error::{Result, TxGuardError};

pub const MALICIOUS_ADDRESS_SENTINEL: &str = "malicious-address-sentinel";
pub const WALLET_DRAIN_SENTINEL: &str = "wallet-drain-sentinel";
pub const SENTINEL_ONE: &str = "sentinel-one";

type AnalyzerFactory = Arc<dyn Fn(&WorkersConfig) -> Arc<dyn Analyzer> + Send + Sync>;

#[derive(Clone)]
pub struct WorkerCatalog {
    factories: BTreeMap<String, AnalyzerFactory>,
}

impl WorkerCatalog {
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// The compiled-in policies
    pub fn builtin() -> Self {
        Self::empty()
            .with_factory(MALICIOUS_ADDRESS_SENTINEL, |cfg| {
                Arc::new(MaliciousAddressAnalyzer::new(&cfg.blacklist.addresses))
            })
            .with_factory(WALLET_DRAIN_SENTINEL, |cfg| {
                let balances = StaticBalances::new(&cfg.wallet_drain.balances);
                Arc::new(WalletDrainAnalyzer::new(
                    Arc::new(balances),
                    cfg.wallet_drain.drain_ratio,
                ))
            })
            .with_factory(SENTINEL_ONE, |cfg| {
                Arc::new(FixedDelayAnalyzer::new(Duration::from_millis(
                    cfg.fixed_delay.delay_ms,
                )))
            })
    }

    pub fn with_factory<F>(mut self, name: &str, factory: F) -> Self
    where
        F: Fn(&WorkersConfig) -> Arc<dyn Analyzer> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_string(), Arc::new(factory));
        self
    }

    /// Register a ready-made analyzer instance under `name`.
    pub fn with_analyzer(self, name: &str, analyzer: Arc<dyn Analyzer>) -> Self {
        self.with_factory(name, move |_| analyzer.clone())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Instantiate the enabled workers, in the order given.
    pub fn build(&self, config: &WorkersConfig) -> Result<Vec<(String, Arc<dyn Analyzer>)>> {
        let mut built: Vec<(String, Arc<dyn Analyzer>)> = Vec::with_capacity(config.enabled.len());
        for name in &config.enabled {
            if name == AGENT_ENTRY_NAME {
                return Err(TxGuardError::Validation(format!(
                    "worker name '{AGENT_ENTRY_NAME}' is reserved for the agent"
                )));
            }
            if built.iter().any(|(n, _)| n == name) {
                continue;
            }
            let factory = self
                .factories
                .get(name)
                .ok_or_else(|| TxGuardError::worker_not_found(name.clone()))?;
            built.push((name.clone(), factory(config)));
        }
        Ok(built)
    }
}

impl Default for WorkerCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}
