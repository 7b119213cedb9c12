//! Worker Registry: the set of worker names expected to report per transaction
//!
//! Populated once at startup by the engine bootstrap; read by the coordinator
//! on every submission.

use std::collections::BTreeSet;
use std::sync::RwLock;
use tracing::info;

use crate::domain::AGENT_ENTRY_NAME;
use crate::error::{Result, TxGuardError};

#[derive(Debug, Default)]
pub struct WorkerRegistry {
    names: RwLock<BTreeSet<String>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_names<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let registry = Self::new();
        for name in names {
            registry.register(name)?;
        }
        Ok(registry)
    }

    /// Add a worker name. Registering the same name twice is a no-op.
    pub fn register(&self, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(TxGuardError::Validation("worker name is empty".into()));
        }
        if name == AGENT_ENTRY_NAME {
            return Err(TxGuardError::Validation(format!(
                "worker name '{AGENT_ENTRY_NAME}' is reserved for the agent"
            )));
        }

        let mut names = self
            .names
            .write()
            .map_err(|_| TxGuardError::Internal("worker registry lock poisoned".into()))?;
        if names.insert(name.clone()) {
            info!(worker = %name, "worker registered");
        }
        Ok(())
    }

    /// Snapshot of the registered names
    pub fn list(&self) -> Result<BTreeSet<String>> {
        self.names
            .read()
            .map(|names| names.clone())
            .map_err(|_| TxGuardError::Internal("worker registry lock poisoned".into()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names
            .read()
            .map(|names| names.contains(name))
            .unwrap_or(false)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn len(&self) -> usize {
        self.names.read().map(|names| names.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_list() {
        let registry = WorkerRegistry::new();
        assert!(registry.is_empty());

        registry.register("w2").unwrap();
        registry.register("w1").unwrap();
        registry.register("w1").unwrap();

        let names: Vec<_> = registry.list().unwrap().into_iter().collect();
        assert_eq!(names, vec!["w1", "w2"]);
        assert!(registry.contains("w1"));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_agent_name_is_reserved() {
        let registry = WorkerRegistry::new();
        assert!(matches!(
            registry.register(AGENT_ENTRY_NAME),
            Err(TxGuardError::Validation(_))
        ));
        assert!(registry.register("  ").is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_from_names() {
        let registry = WorkerRegistry::from_names(["a", "b"]).unwrap();
        assert_eq!(registry.len(), 2);
        assert!(WorkerRegistry::from_names(["a", AGENT_ENTRY_NAME]).is_err());
    }

    #[test]
    fn test_poisoned_lock_is_an_internal_error() {
        let registry = std::sync::Arc::new(WorkerRegistry::from_names(["w1"]).unwrap());

        let poisoner = registry.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.names.write().unwrap();
            panic!("poison the registry lock");
        })
        .join();

        assert!(matches!(registry.list(), Err(TxGuardError::Internal(_))));
    }
}
