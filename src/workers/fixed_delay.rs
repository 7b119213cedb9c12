use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

use super::Analyzer;
use crate::domain::{RiskLevel, TransactionInput};
use crate::error::Result;

/// Placeholder policy: waits a fixed time, then reports success.
pub struct FixedDelayAnalyzer {
    delay: Duration,
}

impl FixedDelayAnalyzer {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl Analyzer for FixedDelayAnalyzer {
    async fn analyze(&self, _input: &TransactionInput) -> Result<Value> {
        tokio::time::sleep(self.delay).await;
        Ok(json!({
            "status": "success",
            "risk_level": RiskLevel::Low,
            "message": "Analysis completed successfully",
        }))
    }
}
