//! Coordinator
//!
//! Sequences one transaction through create → dispatch → barrier →
//! dispatch → barrier → finalize. Each submission runs independently.

pub mod config;
pub mod coordinator;

pub use config::CoordinatorConfig;
pub use coordinator::{Coordinator, SubmitOutcome};
