use std::time::Duration;

use crate::config::{AnalysisConfig, DeadlineBudget};

/// Timing knobs for one coordinator instance
#[derive(Debug, Clone, Copy)]
pub struct CoordinatorConfig {
    /// Barrier deadline per stage, or for the whole transaction
    pub deadline: Duration,
    pub poll_interval: Duration,
    pub budget: DeadlineBudget,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self::from(&AnalysisConfig::default())
    }
}

impl From<&AnalysisConfig> for CoordinatorConfig {
    fn from(analysis: &AnalysisConfig) -> Self {
        Self {
            deadline: analysis.deadline(),
            poll_interval: analysis.poll_interval(),
            budget: analysis.deadline_budget,
        }
    }
}

impl CoordinatorConfig {
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_budget(mut self, budget: DeadlineBudget) -> Self {
        self.budget = budget;
        self
    }
}
