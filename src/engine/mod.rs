//! Engine bootstrap
//!
//! Builds the record store, dispatch channel and worker registry, spawns
//! one runtime per enabled worker plus the agent, the expiry sweeper and
//! the archive listener. Every task shares one shutdown broadcast.

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::agent::AgentRuntime;
use crate::archive::{self, ArchiveListener, ArchiveWriter};
use crate::config::AppConfig;
use crate::coordinator::{Coordinator, CoordinatorConfig};
use crate::dispatch::{DispatchChannel, Topic};
use crate::error::Result;
use crate::registry::WorkerRegistry;
use crate::store::{MemoryRecordStore, RecordStore};
use crate::workers::{WorkerCatalog, WorkerRuntime};

pub struct EngineBuilder {
    config: AppConfig,
    catalog: WorkerCatalog,
    archive: Option<Arc<dyn ArchiveWriter>>,
    coordinator: CoordinatorConfig,
    record_ttl: Duration,
}

impl EngineBuilder {
    pub fn new(config: AppConfig) -> Self {
        let coordinator = CoordinatorConfig::from(&config.analysis);
        let record_ttl = config.analysis.deadline();
        Self {
            config,
            catalog: WorkerCatalog::builtin(),
            archive: None,
            coordinator,
            record_ttl,
        }
    }

    pub fn catalog(mut self, catalog: WorkerCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn archive_writer(mut self, writer: Arc<dyn ArchiveWriter>) -> Self {
        self.archive = Some(writer);
        self
    }

    /// Override barrier timing, e.g. for sub-second deadlines.
    pub fn coordinator_config(mut self, coordinator: CoordinatorConfig) -> Self {
        self.coordinator = coordinator;
        self
    }

    pub fn record_ttl(mut self, ttl: Duration) -> Self {
        self.record_ttl = ttl;
        self
    }

    /// Start with the archive writer chosen in configuration, unless one
    /// was set explicitly.
    pub async fn start(mut self) -> Result<Engine> {
        if self.archive.is_none() {
            self.archive = archive::build_writer(&self.config.archive).await?;
        }
        self.spawn()
    }

    /// Start without consulting archive configuration. Must run inside a
    /// tokio runtime.
    pub fn spawn(self) -> Result<Engine> {
        let workers = self.catalog.build(&self.config.workers)?;
        let registry = Arc::new(WorkerRegistry::from_names(
            workers.iter().map(|(name, _)| name.clone()),
        )?);
        if registry.is_empty() {
            warn!("no workers enabled; every submission will be rejected");
        }

        let store = Arc::new(MemoryRecordStore::new(self.record_ttl));
        let dyn_store: Arc<dyn RecordStore> = store.clone();
        let dispatch = DispatchChannel::new(self.config.dispatch.channel_capacity);
        let (shutdown_tx, _) = broadcast::channel::<()>(1);
        let mut tasks: Vec<JoinHandle<()>> = Vec::new();

        // Subscribe before spawning so nothing published after `spawn`
        // returns can be missed.
        for (name, analyzer) in workers {
            let runtime = WorkerRuntime::new(name, analyzer, dyn_store.clone());
            let dispatch_rx = dispatch.subscribe(Topic::Workers);
            tasks.push(tokio::spawn(runtime.run(dispatch_rx, shutdown_tx.subscribe())));
        }

        let agent = AgentRuntime::new(dyn_store.clone());
        tasks.push(tokio::spawn(
            agent.run(dispatch.subscribe(Topic::Agent), shutdown_tx.subscribe()),
        ));

        tasks.push(MemoryRecordStore::spawn_sweeper(
            store.clone(),
            self.config.analysis.sweep_interval(),
            shutdown_tx.subscribe(),
        ));

        if let Some(writer) = self.archive {
            let listener = ArchiveListener::new(dyn_store.clone(), writer);
            tasks.push(tokio::spawn(
                listener.run(store.subscribe_completions(), shutdown_tx.subscribe()),
            ));
        }

        let coordinator = Coordinator::new(
            dyn_store,
            dispatch.clone(),
            registry.clone(),
            self.coordinator,
        );

        info!(
            workers = registry.len(),
            tasks = tasks.len(),
            deadline_ms = self.coordinator.deadline.as_millis() as u64,
            "engine started"
        );

        Ok(Engine {
            store,
            dispatch,
            registry,
            coordinator,
            shutdown_tx,
            tasks,
        })
    }
}

/// A running scatter-gather pipeline
pub struct Engine {
    store: Arc<MemoryRecordStore>,
    dispatch: DispatchChannel,
    registry: Arc<WorkerRegistry>,
    coordinator: Coordinator,
    shutdown_tx: broadcast::Sender<()>,
    tasks: Vec<JoinHandle<()>>,
}

impl Engine {
    pub fn builder(config: AppConfig) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    /// Start from configuration with the built-in catalog.
    pub async fn start(config: AppConfig) -> Result<Self> {
        EngineBuilder::new(config).start().await
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    pub fn registry(&self) -> &Arc<WorkerRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<MemoryRecordStore> {
        &self.store
    }

    pub fn dispatch(&self) -> &DispatchChannel {
        &self.dispatch
    }

    /// Signal every task, wait for them, then close the store.
    pub async fn shutdown(self) {
        info!("engine shutting down");
        let _ = self.shutdown_tx.send(());

        for result in join_all(self.tasks).await {
            if let Err(e) = result {
                warn!(error = %e, "engine task ended abnormally");
            }
        }

        self.store.close().await;
        info!("engine stopped");
    }
}
