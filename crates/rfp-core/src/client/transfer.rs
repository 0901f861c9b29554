//! Downloads, uploads and transfer aborts.
//!
//! A transfer is announced under a freshly allocated task id before its task
//! is queued, so `TransferEvent::Started` always precedes dispatch. The
//! scheduled operation owns the transfer's ticket and settles it, so the
//! transfer stays registered (and abortable) for as long as its task exists,
//! whether or not the caller is still waiting.
//!
//! Aborts target the task, not a remembered connection: the scheduler finds
//! and pauses the worker running the task under one lock, the connection is
//! aborted, and the worker is resumed. No queued task can slip onto it in
//! between and be aborted by mistake.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tokio::fs;

use crate::error::{Error, OperationAborted, Result};
use crate::group::Group;
use crate::pool::Worker;
use crate::scheduler::{Scheduler, TaskId};
use crate::transfer::{
    TransferDescriptor, TransferDirection, TransferEntry, TransferOutcome, TransferRegistry,
    TransferReport,
};

use super::Client;

impl Client {
    /// Copies `remote` to the local file `local` (created or truncated).
    pub async fn download(&self, remote: &str, local: impl AsRef<Path>) -> Result<TransferReport> {
        let descriptor = TransferDescriptor {
            id: self.scheduler.create_task_id(),
            direction: TransferDirection::Download,
            local_path: local.as_ref().to_path_buf(),
            remote_path: remote.to_string(),
            total_bytes: None,
        };
        self.transfer(descriptor, |worker, registry, descriptor| async move {
            let connection = worker.connection();
            let total = match connection.size(&descriptor.remote_path).await {
                Ok(total) => Some(total),
                Err(e) => {
                    tracing::debug!(transfer_id = %descriptor.id, "size unavailable: {:#}", e);
                    None
                }
            };
            let descriptor = registry.set_total(descriptor.id, total).unwrap_or(descriptor);
            let mut file = fs::File::create(&descriptor.local_path)
                .await
                .with_context(|| format!("create {}", descriptor.local_path.display()))?;
            connection.download(&descriptor, &mut file).await
        })
        .await
    }

    /// Copies the local file `local` to `remote`.
    pub async fn upload(&self, local: impl AsRef<Path>, remote: &str) -> Result<TransferReport> {
        let local_path = local.as_ref().to_path_buf();
        let total_bytes = fs::metadata(&local_path).await.ok().map(|meta| meta.len());
        let descriptor = TransferDescriptor {
            id: self.scheduler.create_task_id(),
            direction: TransferDirection::Upload,
            local_path,
            remote_path: remote.to_string(),
            total_bytes,
        };
        self.transfer(descriptor, |worker, _registry, descriptor| async move {
            let mut file = fs::File::open(&descriptor.local_path)
                .await
                .with_context(|| format!("open {}", descriptor.local_path.display()))?;
            worker.connection().upload(&descriptor, &mut file).await
        })
        .await
    }

    /// Announces `descriptor`, runs `body` on a transfer connection and settles
    /// the transfer with the outcome.
    async fn transfer<F, Fut>(&self, descriptor: TransferDescriptor, body: F) -> Result<TransferReport>
    where
        F: FnOnce(Worker, Arc<TransferRegistry>, TransferDescriptor) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = anyhow::Result<u64>> + Send + 'static,
    {
        self.ensure_connected()?;
        let id = descriptor.id;
        let ticket = self.registry.announce(descriptor.clone())?;
        let registry = Arc::clone(&self.registry);
        let handle = self.scheduler.schedule(
            move |worker: Worker| async move {
                let mut ticket = ticket;
                ticket.start();
                let index = worker.index();
                registry.assign(id, index);
                // Anything left on the connection belongs to earlier work; an
                // abort aimed at this transfer is either flagged already or
                // lands on the connection from here on.
                worker.connection().reset_abort();
                let result = if registry.abort_requested(id) {
                    Err(anyhow::Error::new(OperationAborted))
                } else {
                    body(worker, Arc::clone(&registry), descriptor).await
                };
                ticket.finish(match &result {
                    Ok(bytes) => TransferOutcome::Completed { bytes: *bytes },
                    Err(e) => TransferOutcome::from_operation(e),
                });
                result.map(|bytes| (bytes, index))
            },
            Some(Group::Transfer),
            Some(id),
        );

        let mut waiting = Waiting {
            client: self,
            id,
            done: false,
        };
        let result = handle.await;
        waiting.done = true;
        let (bytes, worker) = result?;
        Ok(TransferReport { id, bytes, worker })
    }

    /// Active transfers, oldest first.
    pub fn active_transfers(&self) -> Vec<TransferEntry> {
        self.registry.entries()
    }

    /// Stops transfer `id`. A queued transfer is cancelled; a running one is
    /// aborted on its connection, which is paused for the duration.
    pub async fn abort_transfer(&self, id: TaskId) -> Result<()> {
        if !self.registry.request_abort(id) {
            return Err(Error::UnknownTransfer(id));
        }
        if !self.scheduler.delete_tasks(&[id]).is_empty() {
            tracing::info!(transfer_id = %id, "queued transfer cancelled");
            return Ok(());
        }
        let Some(&(_, index)) = self.scheduler.pause_running(&[id]).first() else {
            // Its operation already returned and is settling.
            tracing::debug!(transfer_id = %id, "abort requested for a finished transfer");
            return Ok(());
        };
        abort_paused(&self.scheduler, self.worker(index), index).await?;
        tracing::info!(transfer_id = %id, worker = index, "transfer aborted");
        Ok(())
    }

    /// Cancels every queued task and aborts every running transfer.
    /// Returns the ids of the cancelled (never started) tasks.
    pub async fn abort_all(&self) -> Result<Vec<TaskId>> {
        let cancelled = self.scheduler.delete_all_tasks();
        let active = self.registry.request_abort_all();
        for (id, index) in self.scheduler.pause_running(&active) {
            match abort_paused(&self.scheduler, self.worker(index), index).await {
                Ok(()) => tracing::info!(transfer_id = %id, worker = index, "transfer aborted"),
                Err(e) => {
                    tracing::warn!(transfer_id = %id, worker = index, "abort failed: {:#}", e)
                }
            }
        }
        Ok(cancelled)
    }

    fn worker(&self, index: usize) -> Option<Worker> {
        self.pool().ok().and_then(|pool| pool.connection(index))
    }

    /// The caller of transfer `id` stopped waiting: cancel it if queued, abort
    /// it in the background if running. The operation still settles the transfer.
    fn abandon_transfer(&self, id: TaskId) {
        if !self.registry.request_abort(id) {
            return;
        }
        if !self.scheduler.delete_tasks(&[id]).is_empty() {
            tracing::info!(transfer_id = %id, "caller went away; queued transfer cancelled");
            return;
        }
        let Some(&(_, index)) = self.scheduler.pause_running(&[id]).first() else {
            return;
        };
        let worker = self.worker(index);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let scheduler = self.scheduler.clone();
                runtime.spawn(async move {
                    match abort_paused(&scheduler, worker, index).await {
                        Ok(()) => tracing::info!(
                            transfer_id = %id,
                            worker = index,
                            "caller went away; transfer aborted"
                        ),
                        Err(e) => {
                            tracing::warn!(transfer_id = %id, worker = index, "abort failed: {:#}", e)
                        }
                    }
                });
            }
            Err(_) => {
                tracing::warn!(transfer_id = %id, "no tokio runtime; transfer left running");
                self.scheduler.resume_workers(&[index]);
            }
        }
    }
}

/// abort -> resume on a worker already paused by `Scheduler::pause_running`.
async fn abort_paused(
    scheduler: &Scheduler<Worker>,
    worker: Option<Worker>,
    index: usize,
) -> Result<()> {
    let result = match worker {
        Some(worker) => worker.connection().abort().await.map_err(Error::Operation),
        None => Err(Error::NotConnected),
    };
    scheduler.resume_workers(&[index]);
    result
}

/// Armed while a caller awaits its transfer; dropping it early abandons the transfer.
struct Waiting<'a> {
    client: &'a Client,
    id: TaskId,
    done: bool,
}

impl Drop for Waiting<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.client.abandon_transfer(self.id);
        }
    }
}
