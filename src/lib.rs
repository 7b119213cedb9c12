pub mod agent;
pub mod archive;
pub mod barrier;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod dispatch;
pub mod domain;
pub mod engine;
pub mod error;
pub mod registry;
pub mod store;
pub mod workers;

pub use agent::{decide, AgentRuntime};
pub use archive::{ArchiveListener, ArchiveWriter, JsonlArchiveWriter, PostgresArchiveWriter};
pub use barrier::{agent_reported, all_workers_reported, CompletionBarrier};
pub use config::AppConfig;
pub use coordinator::{Coordinator, CoordinatorConfig, SubmitOutcome};
pub use dispatch::{DispatchChannel, DispatchMessage, Topic};
pub use domain::{
    AgentDecision, RecordStatus, RiskLevel, TransactionInput, TransactionRecord, ValidationEntry,
    ValidationStatus,
};
pub use engine::{Engine, EngineBuilder};
pub use error::{Result, TxGuardError};
pub use registry::WorkerRegistry;
pub use store::{CompletionNotice, MemoryRecordStore, RecordStore};
pub use workers::{Analyzer, WorkerCatalog, WorkerRuntime};
