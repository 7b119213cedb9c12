//! Aggregation rule turning worker results into the final verdict

use chrono::Utc;

use crate::domain::{
    AgentDecision, AnalysisFinding, RiskLevel, ValidationEntry, ValidationStatus,
    AGENT_ENTRY_NAME,
};

const NO_REASON: &str = "no reason given";

/// Fold worker entries, in collection order, into a decision.
///
/// - any `high` finding rejects, with one warning line per high worker
/// - `medium` findings add warning lines but keep the transaction approved
///   at risk level `low`
/// - workers that errored add a failure line and require manual review
pub fn decide<'a, I>(validations: I) -> AgentDecision
where
    I: IntoIterator<Item = &'a ValidationEntry>,
{
    let mut high_risk = false;
    let mut review_required = false;
    let mut warnings = Vec::new();

    for entry in validations {
        if entry.name == AGENT_ENTRY_NAME {
            continue;
        }
        let finding = AnalysisFinding::from_result(entry.result.as_ref());

        if entry.status == ValidationStatus::Error {
            review_required = true;
            let cause = finding
                .error
                .or(finding.reason)
                .unwrap_or_else(|| "unknown error".to_string());
            warnings.push(format!("Analysis failed in {}: {}", entry.name, cause));
            continue;
        }

        let reason = finding.reason.as_deref().unwrap_or(NO_REASON);
        match finding.risk_level {
            Some(RiskLevel::High) => {
                high_risk = true;
                warnings.push(format!("High risk detected by {}: {}", entry.name, reason));
            }
            Some(RiskLevel::Medium) => {
                warnings.push(format!("Warning from {}: {}", entry.name, reason));
            }
            Some(RiskLevel::Low) | None => {}
        }
    }

    AgentDecision {
        approved: !high_risk,
        // Medium findings only warn; the verdict level is high or low
        risk_level: if high_risk { RiskLevel::High } else { RiskLevel::Low },
        warnings,
        review_required,
        decided_at: Utc::now(),
    }
}
