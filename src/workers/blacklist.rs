use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashSet;

use super::Analyzer;
use crate::domain::{RiskLevel, TransactionInput};
use crate::error::Result;

/// Flags transactions whose source or destination address is blacklisted
pub struct MaliciousAddressAnalyzer {
    blacklist: HashSet<String>,
}

impl MaliciousAddressAnalyzer {
    pub fn new<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            blacklist: addresses
                .into_iter()
                .map(|a| normalize(a.as_ref()))
                .filter(|a| !a.is_empty())
                .collect(),
        }
    }

    fn is_blacklisted(&self, address: &str) -> bool {
        self.blacklist.contains(&normalize(address))
    }
}

fn normalize(address: &str) -> String {
    address.trim().to_ascii_lowercase()
}

#[async_trait]
impl Analyzer for MaliciousAddressAnalyzer {
    async fn analyze(&self, input: &TransactionInput) -> Result<Value> {
        let matched: Vec<&str> = [input.from_address.as_str(), input.to_address.as_str()]
            .into_iter()
            .filter(|a| self.is_blacklisted(a))
            .collect();

        if matched.is_empty() {
            return Ok(json!({
                "is_malicious": false,
                "risk_level": RiskLevel::Low,
            }));
        }

        Ok(json!({
            "is_malicious": true,
            "risk_level": RiskLevel::High,
            "reason": format!("blacklisted address {}", matched.join(", ")),
            "matched": matched,
        }))
    }
}
