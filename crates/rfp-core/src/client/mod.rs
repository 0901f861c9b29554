//! Client façade: one pool, one scheduler, one transfer registry, one event bus.
//!
//! Metadata operations are scheduled without a group (they run on `Misc` or
//! `All` connections); downloads and uploads are scheduled in the `Transfer`
//! group and tracked in the registry under their task id.

mod ops;
mod transfer;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;

use crate::connection::{Connection, ConnectionContext, ConnectionStatus};
use crate::error::{Error, Result};
use crate::events::{ClientEvent, EventBus};
use crate::group::Group;
use crate::pool::{Worker, WorkerPool};
use crate::protocol::{ConnectConfig, ProtocolRegistry};
use crate::scheduler::{Scheduler, SchedulerStats};
use crate::transfer::TransferRegistry;

pub struct Client {
    protocols: ProtocolRegistry,
    scheduler: Scheduler<Worker>,
    registry: Arc<TransferRegistry>,
    bus: EventBus,
    pool: Mutex<Option<Arc<WorkerPool>>>,
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("protocols", &self.protocols)
            .field("stats", &self.scheduler.stats())
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl Client {
    /// A disconnected client with the built-in `local` protocol registered.
    pub fn new() -> Self {
        Self::with_protocols(ProtocolRegistry::with_builtin())
    }

    pub fn with_protocols(protocols: ProtocolRegistry) -> Self {
        let bus = EventBus::default();
        Self {
            protocols,
            scheduler: Scheduler::new(),
            registry: Arc::new(TransferRegistry::new(bus.clone())),
            bus,
            pool: Mutex::new(None),
        }
    }

    /// Adds or replaces a protocol. Takes effect on the next `connect`.
    pub fn register_protocol<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&ConnectConfig, ConnectionContext) -> anyhow::Result<Arc<dyn Connection>>
            + Send
            + Sync
            + 'static,
    {
        self.protocols.register(name, factory);
    }

    pub fn protocols(&self) -> &ProtocolRegistry {
        &self.protocols
    }

    fn pool_slot(&self) -> MutexGuard<'_, Option<Arc<WorkerPool>>> {
        self.pool.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn pool(&self) -> Result<Arc<WorkerPool>> {
        self.pool_slot().clone().ok_or(Error::NotConnected)
    }

    /// Builds and connects a pool for `config`, replacing any previous one.
    /// Tasks queued before (or during) a reconnect run on the new pool.
    pub async fn connect(&self, config: ConnectConfig) -> Result<()> {
        let protocol = config.endpoint.protocol().to_string();
        let factory = self
            .protocols
            .get(&protocol)
            .ok_or_else(|| Error::UnknownProtocol(protocol.clone()))?;

        let pool = WorkerPool::build(
            config.pool.size,
            config.pool.pooled_transfers,
            &self.bus,
            |ctx| factory(&config, ctx),
        )?;

        let previous = self.pool_slot().take();
        if let Some(previous) = previous {
            tracing::info!("reconnecting; tearing down previous pool");
            self.scheduler.unwire();
            previous.teardown().await;
        }

        if let Err(e) = pool.connect_all().await {
            pool.teardown().await;
            return Err(Error::Operation(e));
        }

        let pool = Arc::new(pool);
        self.scheduler.wire(pool.hooks());
        tracing::info!(
            endpoint = %config.endpoint,
            size = pool.len(),
            groups = ?pool.groups(),
            "connected"
        );
        *self.pool_slot() = Some(pool);
        Ok(())
    }

    /// Cancels queued tasks, aborts running ones and tears the pool down.
    /// Disconnecting a disconnected client is a no-op.
    pub async fn disconnect(&self) {
        let Some(pool) = self.pool_slot().take() else {
            return;
        };
        let cancelled = self.scheduler.delete_all_tasks();
        self.registry.request_abort_all();
        let busy = self.scheduler.busy_workers();
        for &index in &busy {
            if let Some(worker) = pool.connection(index) {
                if let Err(e) = worker.connection().abort().await {
                    tracing::warn!(worker = index, "abort on disconnect failed: {:#}", e);
                }
            }
        }
        self.scheduler.unwire();
        pool.teardown().await;
        tracing::info!(
            cancelled = cancelled.len(),
            aborted = busy.len(),
            "disconnected"
        );
    }

    pub fn is_connected(&self) -> bool {
        self.pool_slot().is_some()
    }

    pub(crate) fn ensure_connected(&self) -> Result<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(Error::NotConnected)
        }
    }

    /// Receives connection, progress and transfer events from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.bus.subscribe()
    }

    /// Status of connection `index`; `Busy` while it runs a task.
    pub fn connection_status(&self, index: usize) -> Option<ConnectionStatus> {
        let pool = self.pool().ok()?;
        let status = pool.status(index)?;
        if status == ConnectionStatus::Connected && self.scheduler.busy_workers().contains(&index) {
            return Some(ConnectionStatus::Busy);
        }
        Some(status)
    }

    /// Group labels of the current pool, in index order (empty when disconnected).
    pub fn groups(&self) -> Vec<Group> {
        self.pool().map(|pool| pool.groups()).unwrap_or_default()
    }

    pub fn stats(&self) -> SchedulerStats {
        self.scheduler.stats()
    }
}
