use thiserror::Error;

/// Main error type for the analysis coordinator
#[derive(Error, Debug)]
pub enum TxGuardError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Database errors (archive writer)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Record store errors
    #[error("{what} not found: {id}")]
    NotFound { what: &'static str, id: String },

    #[error("Record store unavailable: {0}")]
    StoreUnavailable(String),

    // Scatter-gather errors
    #[error("Timed out waiting for {stage} after {waited_ms}ms")]
    Timeout { stage: String, waited_ms: u64 },

    #[error("No workers registered; cannot dispatch")]
    NoWorkersRegistered,

    #[error("Analysis failed in {worker}: {message}")]
    WorkerAnalysis { worker: String, message: String },

    // Validation errors
    #[error("Validation failed: {0}")]
    Validation(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl TxGuardError {
    pub fn transaction_not_found(id: impl Into<String>) -> Self {
        TxGuardError::NotFound {
            what: "Transaction",
            id: id.into(),
        }
    }

    pub fn worker_not_found(name: impl Into<String>) -> Self {
        TxGuardError::NotFound {
            what: "Worker",
            id: name.into(),
        }
    }

    pub fn analysis(worker: impl Into<String>, message: impl Into<String>) -> Self {
        TxGuardError::WorkerAnalysis {
            worker: worker.into(),
            message: message.into(),
        }
    }

    /// Lookup failures and barrier timeouts both mean the transaction was lost
    /// to the deadline.
    pub fn is_not_found(&self) -> bool {
        matches!(self, TxGuardError::NotFound { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, TxGuardError::Timeout { .. })
    }

    /// Stable machine-readable label, used in NDJSON error replies
    pub fn kind(&self) -> &'static str {
        match self {
            TxGuardError::Config(_) => "config",
            TxGuardError::Database(_) => "database",
            TxGuardError::Serialization(_) => "serialization",
            TxGuardError::NotFound { .. } => "not_found",
            TxGuardError::StoreUnavailable(_) => "store_unavailable",
            TxGuardError::Timeout { .. } => "timeout",
            TxGuardError::NoWorkersRegistered => "no_workers_registered",
            TxGuardError::WorkerAnalysis { .. } => "analysis_failed",
            TxGuardError::Validation(_) => "validation",
            TxGuardError::Io(_) => "io",
            TxGuardError::Internal(_) | TxGuardError::Other(_) => "internal",
        }
    }
}

/// Result type alias for TxGuardError
pub type Result<T> = std::result::Result<T, TxGuardError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message() {
        let err = TxGuardError::transaction_not_found("abc");
        assert_eq!(err.to_string(), "Transaction not found: abc");
        assert!(err.is_not_found());
        assert!(!err.is_timeout());
    }

    #[test]
    fn test_timeout_message() {
        let err = TxGuardError::Timeout {
            stage: "workers".into(),
            waited_ms: 10_000,
        };
        assert_eq!(err.to_string(), "Timed out waiting for workers after 10000ms");
        assert!(err.is_timeout());
        assert_eq!(err.kind(), "timeout");
    }

    #[test]
    fn test_json_error_converts_to_serialization() {
        let err: TxGuardError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, TxGuardError::Serialization(_)));
    }
}
