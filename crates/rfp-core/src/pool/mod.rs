//! Worker pool: a fixed, ordered set of labelled connections.
//!
//! Built once per connect. Each connection gets its group label from
//! [`compute_groups`] and an event [`Subscription`] that the pool owns and
//! detaches on teardown (or drop).

mod subscription;

use std::fmt;
use std::sync::Arc;

use anyhow::Context;
use tokio::task::JoinSet;

use crate::connection::{Connection, ConnectionContext, ConnectionStatus};
use crate::error::{Error, Result};
use crate::events::EventBus;
use crate::group::{accepts, compute_groups, Group};
use crate::scheduler::WorkerHooks;

pub use subscription::{ConnectionEvents, Subscription};

/// What the scheduler hands an operation: a connection plus its slot identity.
#[derive(Clone)]
pub struct Worker {
    index: usize,
    group: Group,
    connection: Arc<dyn Connection>,
}

impl Worker {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn group(&self) -> Group {
        self.group
    }

    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.connection
    }

    /// Whether this worker may run a task requiring `group`.
    pub fn accepts(&self, group: Option<Group>) -> bool {
        accepts(self.group, group)
    }
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("index", &self.index)
            .field("group", &self.group)
            .field("protocol", &self.connection.protocol())
            .finish()
    }
}

struct PoolSlot {
    worker: Worker,
    subscription: Subscription,
}

pub struct WorkerPool {
    slots: Vec<PoolSlot>,
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("groups", &self.groups())
            .finish()
    }
}

impl WorkerPool {
    /// Creates `size` connections through `factory`, labelled by
    /// `compute_groups(size, pooled_transfers)`. Nothing is connected yet.
    pub fn build<F>(size: usize, pooled_transfers: bool, bus: &EventBus, factory: F) -> Result<Self>
    where
        F: Fn(ConnectionContext) -> anyhow::Result<Arc<dyn Connection>>,
    {
        if size < 1 {
            return Err(Error::InvalidPoolSize(size));
        }
        let mut slots = Vec::with_capacity(size);
        for (index, group) in compute_groups(size, pooled_transfers).into_iter().enumerate() {
            let subscription = Subscription::attach(index, bus.clone());
            let connection = factory(ConnectionContext {
                index,
                group,
                events: subscription.events(),
            })
            .with_context(|| format!("create connection {}", index))?;
            slots.push(PoolSlot {
                worker: Worker {
                    index,
                    group,
                    connection,
                },
                subscription,
            });
        }
        tracing::debug!(size, pooled_transfers, "worker pool built");
        Ok(Self { slots })
    }

    /// Connects every connection concurrently. All attempts run to completion;
    /// the first failure (by index) is returned.
    pub async fn connect_all(&self) -> anyhow::Result<()> {
        let mut join_set = JoinSet::new();
        for slot in &self.slots {
            slot.subscription.set_status(ConnectionStatus::Connecting);
            let connection = Arc::clone(&slot.worker.connection);
            let events = slot.subscription.events();
            let index = slot.worker.index;
            join_set.spawn(async move {
                let result = connection.connect().await;
                match &result {
                    Ok(()) => events.connected(),
                    Err(_) => events.disconnected(),
                }
                (index, result)
            });
        }

        let mut failures = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            let (index, result) = joined.map_err(|e| anyhow::anyhow!("connect task join: {}", e))?;
            if let Err(e) = result {
                tracing::warn!(worker = index, "connect failed: {:#}", e);
                failures.push((index, e));
            }
        }
        failures.sort_by_key(|(index, _)| *index);
        match failures.into_iter().next() {
            Some((index, e)) => Err(e.context(format!("connect connection {}", index))),
            None => Ok(()),
        }
    }

    /// Disconnects every connection and detaches every subscription.
    /// Disconnect failures are logged, not returned.
    pub async fn teardown(&self) {
        let mut join_set = JoinSet::new();
        for slot in &self.slots {
            let connection = Arc::clone(&slot.worker.connection);
            let index = slot.worker.index;
            join_set.spawn(async move { (index, connection.disconnect().await) });
        }
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, Err(e))) => tracing::warn!(worker = index, "disconnect failed: {:#}", e),
                Ok((_, Ok(()))) => {}
                Err(e) => tracing::warn!("disconnect task join: {}", e),
            }
        }
        for slot in &self.slots {
            slot.subscription.set_status(ConnectionStatus::Disconnected);
            slot.subscription.detach();
        }
        tracing::info!(size = self.slots.len(), "worker pool torn down");
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// The worker at `index`, or `None` if out of range.
    pub fn connection(&self, index: usize) -> Option<Worker> {
        self.slots.get(index).map(|slot| slot.worker.clone())
    }

    /// Indices (ascending) of connections that accept `group`.
    pub fn eligible(&self, group: Option<Group>) -> Vec<usize> {
        self.slots
            .iter()
            .filter(|slot| slot.worker.accepts(group))
            .map(|slot| slot.worker.index)
            .collect()
    }

    pub fn groups(&self) -> Vec<Group> {
        self.slots.iter().map(|slot| slot.worker.group).collect()
    }

    /// Lifecycle status of connection `index` (never `Busy`; the scheduler owns that).
    pub fn status(&self, index: usize) -> Option<ConnectionStatus> {
        self.slots.get(index).map(|slot| slot.subscription.status())
    }

    /// Scheduler hooks resolving indices against this pool.
    pub fn hooks(self: &Arc<Self>) -> WorkerHooks<Worker> {
        let pool = Arc::clone(self);
        WorkerHooks::new(
            self.len(),
            move |index| pool.connection(index),
            |worker: &Worker, group| worker.accepts(group),
        )
    }
}
