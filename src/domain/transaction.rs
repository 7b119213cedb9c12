//! Transaction records and per-worker validation entries

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

use crate::error::{Result, TxGuardError};

/// Name of the agent's own entry in a record's validations.
pub const AGENT_ENTRY_NAME: &str = "agent";

/// Immutable transaction input submitted by the gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionInput {
    #[serde(rename = "chainId", alias = "chain_id")]
    pub chain_id: u64,
    pub from_address: String,
    pub to_address: String,
    /// Hex-encoded call data
    #[serde(rename = "data", alias = "payload", default)]
    pub payload: String,
    /// Native value in wei, decimal or `0x`-prefixed hex
    #[serde(default = "default_value")]
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

fn default_value() -> String {
    "0".to_string()
}

impl TransactionInput {
    /// Parse `value` into wei. Fractional digits are discarded.
    pub fn parsed_value(&self) -> Result<Decimal> {
        parse_wei(&self.value)
    }

    pub fn validate(&self) -> Result<()> {
        if self.from_address.trim().is_empty() {
            return Err(TxGuardError::Validation("from_address is empty".into()));
        }
        if self.to_address.trim().is_empty() {
            return Err(TxGuardError::Validation("to_address is empty".into()));
        }
        self.parsed_value()?;
        Ok(())
    }
}

/// Parse a wei amount given as decimal (`"1500"`, `"1500.7"`) or hex (`"0x5dc"`).
pub fn parse_wei(raw: &str) -> Result<Decimal> {
    let raw = raw.trim();
    let integral = raw.split('.').next().unwrap_or_default();

    let parsed = if let Some(hex) = integral
        .strip_prefix("0x")
        .or_else(|| integral.strip_prefix("0X"))
    {
        u128::from_str_radix(hex, 16)
            .ok()
            .and_then(|v| Decimal::from_str(&v.to_string()).ok())
    } else if integral.is_empty() {
        Some(Decimal::ZERO)
    } else {
        Decimal::from_str(integral).ok()
    };

    match parsed {
        Some(v) if v >= Decimal::ZERO => Ok(v),
        _ => Err(TxGuardError::Validation(format!("invalid value: {raw}"))),
    }
}

/// Top-level lifecycle status of a transaction record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Pending,
    Processing,
    Completed,
    Error,
}

impl std::fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordStatus::Pending => write!(f, "pending"),
            RecordStatus::Processing => write!(f, "processing"),
            RecordStatus::Completed => write!(f, "completed"),
            RecordStatus::Error => write!(f, "error"),
        }
    }
}

/// Status of one worker's validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    Pending,
    Processing,
    Completed,
    Error,
}

impl ValidationStatus {
    /// Completed and errored workers have both reported.
    pub fn is_reported(&self) -> bool {
        matches!(self, ValidationStatus::Completed | ValidationStatus::Error)
    }
}

impl std::fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationStatus::Pending => write!(f, "pending"),
            ValidationStatus::Processing => write!(f, "processing"),
            ValidationStatus::Completed => write!(f, "completed"),
            ValidationStatus::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationEntry {
    pub name: String,
    pub status: ValidationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

/// One transaction's lifecycle state, as seen by workers, agent and archive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub transaction_id: String,
    #[serde(flatten)]
    pub input: TransactionInput,
    pub status: RecordStatus,
    pub validations: Vec<ValidationEntry>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl TransactionRecord {
    pub fn new(transaction_id: String, input: TransactionInput) -> Self {
        Self {
            transaction_id,
            input,
            status: RecordStatus::Pending,
            validations: Vec::new(),
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    pub fn validation(&self, name: &str) -> Option<&ValidationEntry> {
        self.validations.iter().find(|v| v.name == name)
    }

    /// Replace the entry for `name` in place, or append it.
    pub fn upsert_validation(
        &mut self,
        name: &str,
        status: ValidationStatus,
        result: Option<Value>,
    ) {
        match self.validations.iter_mut().find(|v| v.name == name) {
            Some(entry) => {
                entry.status = status;
                entry.result = result;
            }
            None => self.validations.push(ValidationEntry {
                name: name.to_string(),
                status,
                result,
            }),
        }
    }

    /// Validations written by workers, excluding the agent's entry.
    pub fn worker_validations(&self) -> impl Iterator<Item = &ValidationEntry> {
        self.validations
            .iter()
            .filter(|v| v.name != AGENT_ENTRY_NAME)
    }

    pub fn agent_validation(&self) -> Option<&ValidationEntry> {
        self.validation(AGENT_ENTRY_NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn input() -> TransactionInput {
        TransactionInput {
            chain_id: 1,
            from_address: "0xfrom".into(),
            to_address: "0xto".into(),
            payload: "0x".into(),
            value: "100".into(),
            reason: None,
        }
    }

    #[test]
    fn test_parse_wei() {
        assert_eq!(parse_wei("1500").unwrap(), dec!(1500));
        assert_eq!(parse_wei("1500.75").unwrap(), dec!(1500));
        assert_eq!(parse_wei("0x5dc").unwrap(), dec!(1500));
        assert_eq!(parse_wei("").unwrap(), Decimal::ZERO);
        assert!(parse_wei("0xzz").is_err());
        assert!(parse_wei("-5").is_err());
        assert!(parse_wei("abc").is_err());
    }

    #[test]
    fn test_upsert_replaces_in_place() {
        let mut record = TransactionRecord::new("tx".into(), input());
        record.upsert_validation("w1", ValidationStatus::Processing, None);
        record.upsert_validation("w2", ValidationStatus::Processing, None);
        record.upsert_validation(
            "w1",
            ValidationStatus::Completed,
            Some(json!({"risk_level": "low"})),
        );

        assert_eq!(record.validations.len(), 2);
        assert_eq!(record.validations[0].name, "w1");
        assert_eq!(record.validations[0].status, ValidationStatus::Completed);
        assert_eq!(record.validations[1].status, ValidationStatus::Processing);
    }

    #[test]
    fn test_worker_validations_skip_agent() {
        let mut record = TransactionRecord::new("tx".into(), input());
        record.upsert_validation("w1", ValidationStatus::Completed, None);
        record.upsert_validation(AGENT_ENTRY_NAME, ValidationStatus::Processing, None);

        let names: Vec<_> = record.worker_validations().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["w1"]);
        assert!(record.agent_validation().is_some());
    }

    #[test]
    fn test_record_wire_field_names() {
        let mut record = TransactionRecord::new("tx-1".into(), input());
        record.upsert_validation("w1", ValidationStatus::Error, None);
        let value = serde_json::to_value(&record).unwrap();

        assert_eq!(value["transaction_id"], "tx-1");
        assert_eq!(value["chainId"], 1);
        assert_eq!(value["from_address"], "0xfrom");
        assert_eq!(value["data"], "0x");
        assert_eq!(value["status"], "pending");
        assert_eq!(value["validations"][0]["status"], "error");
        assert!(value["validations"][0].get("result").is_none());

        let back: TransactionRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_input_accepts_snake_case_aliases() {
        let parsed: TransactionInput = serde_json::from_value(json!({
            "chain_id": 137,
            "from_address": "0xa",
            "to_address": "0xb",
            "payload": "0xdeadbeef"
        }))
        .unwrap();
        assert_eq!(parsed.chain_id, 137);
        assert_eq!(parsed.payload, "0xdeadbeef");
        assert_eq!(parsed.value, "0");
    }
}
