//! Risk levels, worker findings and the agent's verdict

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }

    /// Lenient parse; unknown labels carry no risk signal.
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "low" => Some(RiskLevel::Low),
            "medium" => Some(RiskLevel::Medium),
            "high" => Some(RiskLevel::High),
            _ => None,
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The parts of a worker result the agent looks at.
///
/// Worker results are free-form JSON; anything without a recognisable
/// `risk_level` simply contributes no risk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisFinding {
    pub risk_level: Option<RiskLevel>,
    pub reason: Option<String>,
    pub error: Option<String>,
}

impl AnalysisFinding {
    pub fn from_result(result: Option<&Value>) -> Self {
        let Some(obj) = result.and_then(Value::as_object) else {
            return Self::default();
        };

        let text = |key: &str| -> Option<String> {
            obj.get(key).and_then(|v| match v {
                Value::String(s) => Some(s.clone()),
                Value::Null => None,
                other => Some(other.to_string()),
            })
        };

        Self {
            risk_level: obj
                .get("risk_level")
                .and_then(Value::as_str)
                .and_then(RiskLevel::parse),
            reason: text("reason").or_else(|| text("message")),
            error: text("error"),
        }
    }
}

/// Final verdict written by the agent under its reserved entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentDecision {
    pub approved: bool,
    pub risk_level: RiskLevel,
    pub warnings: Vec<String>,
    /// Set when at least one worker failed to produce an analysis
    #[serde(default)]
    pub review_required: bool,
    pub decided_at: chrono::DateTime<chrono::Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_risk_level_parse() {
        assert_eq!(RiskLevel::parse("HIGH"), Some(RiskLevel::High));
        assert_eq!(RiskLevel::parse(" medium "), Some(RiskLevel::Medium));
        assert_eq!(RiskLevel::parse("critical"), None);
        assert!(RiskLevel::High > RiskLevel::Medium);
    }

    #[test]
    fn test_finding_from_result() {
        let finding = AnalysisFinding::from_result(Some(&json!({
            "risk_level": "high",
            "reason": "blacklisted"
        })));
        assert_eq!(finding.risk_level, Some(RiskLevel::High));
        assert_eq!(finding.reason.as_deref(), Some("blacklisted"));

        let finding = AnalysisFinding::from_result(Some(&json!({
            "status": "success",
            "message": "Analysis completed successfully"
        })));
        assert_eq!(finding.risk_level, None);
        assert_eq!(
            finding.reason.as_deref(),
            Some("Analysis completed successfully")
        );

        assert_eq!(AnalysisFinding::from_result(None), AnalysisFinding::default());
        assert_eq!(
            AnalysisFinding::from_result(Some(&json!("not an object"))),
            AnalysisFinding::default()
        );
    }
}
