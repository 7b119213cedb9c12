//! Decision agent
//!
//! The last stage of the scatter-gather: aggregates every worker's result
//! into one approve/reject verdict.

pub mod decision;
pub mod runtime;

pub use decision::decide;
pub use runtime::AgentRuntime;
