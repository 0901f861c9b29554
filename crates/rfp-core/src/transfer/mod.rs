//! Transfer registry: which transfers are active and which connection runs them.
//!
//! A transfer is announced before its task is scheduled (so subscribers see
//! `Started` first), gets its connection index once the scheduler hands the
//! operation a worker, and is settled exactly once. The ticket travels with
//! the scheduled operation, so the entry lives exactly as long as the task.
//! The settlement event is emitted before the entry is removed, under the
//! same lock, so an id is never missing from the registry while its transfer
//! is still live.
//!
//! The recorded worker is informational. Which connection actually runs a
//! task is the scheduler's business.

mod progress;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::{Error, OperationAborted, Result};
use crate::events::{ClientEvent, EventBus};
use crate::scheduler::TaskId;

pub use progress::TransferProgress;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDirection {
    Download,
    Upload,
}

/// What is being moved, and where. The id is the id of the carrying task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferDescriptor {
    pub id: TaskId,
    pub direction: TransferDirection,
    pub local_path: PathBuf,
    pub remote_path: String,
    /// Filled in once the size is known (remote `size` for downloads, file
    /// metadata for uploads).
    pub total_bytes: Option<u64>,
}

/// How a transfer ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    Completed { bytes: u64 },
    Failed { message: String },
    /// Removed from the queue before it started.
    Cancelled,
    /// Stopped on its connection by an abort request.
    Aborted,
    /// The operation vanished without a result (panic or runtime shutdown).
    Abandoned,
}

impl TransferOutcome {
    pub fn from_result(result: &Result<u64>) -> Self {
        match result {
            Ok(bytes) => TransferOutcome::Completed { bytes: *bytes },
            Err(e) => Self::from_error(e),
        }
    }

    pub fn from_error(error: &Error) -> Self {
        match error {
            Error::Cancelled(_) => TransferOutcome::Cancelled,
            Error::Abandoned(_) => TransferOutcome::Abandoned,
            Error::Operation(e) => Self::from_operation(e),
            e => TransferOutcome::Failed {
                message: format!("{:#}", e),
            },
        }
    }

    /// Outcome of a transfer whose operation returned `error`.
    pub fn from_operation(error: &anyhow::Error) -> Self {
        if error.downcast_ref::<OperationAborted>().is_some() {
            TransferOutcome::Aborted
        } else {
            TransferOutcome::Failed {
                message: format!("{:#}", error),
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TransferOutcome::Completed { .. })
    }
}

#[derive(Debug, Clone)]
pub enum TransferEvent {
    Started(TransferDescriptor),
    Finished {
        id: TaskId,
        outcome: TransferOutcome,
    },
}

/// Returned by `Client::download` / `Client::upload` on success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReport {
    pub id: TaskId,
    pub bytes: u64,
    /// Index of the connection that carried the transfer.
    pub worker: usize,
}

#[derive(Debug, Clone)]
pub struct TransferEntry {
    pub descriptor: TransferDescriptor,
    /// `None` until the scheduler hands the operation a connection.
    pub worker: Option<usize>,
    /// Set once an abort was requested; checked when the operation starts.
    pub abort_requested: bool,
}

#[derive(Debug)]
pub struct TransferRegistry {
    entries: Mutex<HashMap<TaskId, TransferEntry>>,
    bus: EventBus,
}

impl TransferRegistry {
    pub fn new(bus: EventBus) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            bus,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<TaskId, TransferEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a transfer as unassigned and emits `TransferEvent::Started`.
    pub fn announce(self: &Arc<Self>, descriptor: TransferDescriptor) -> Result<TransferTicket> {
        let id = descriptor.id;
        {
            let mut entries = self.lock();
            if entries.contains_key(&id) {
                return Err(Error::DuplicateTransfer(id));
            }
            entries.insert(
                id,
                TransferEntry {
                    descriptor: descriptor.clone(),
                    worker: None,
                    abort_requested: false,
                },
            );
            self.bus
                .emit(ClientEvent::Transfer(TransferEvent::Started(descriptor)));
        }
        tracing::debug!(transfer_id = %id, "transfer announced");
        Ok(TransferTicket {
            registry: Arc::clone(self),
            id,
            started: false,
            settled: false,
        })
    }

    /// Records the connection running `id`. Returns false if `id` is not active.
    pub fn assign(&self, id: TaskId, worker: usize) -> bool {
        match self.lock().get_mut(&id) {
            Some(entry) => {
                entry.worker = Some(worker);
                true
            }
            None => false,
        }
    }

    /// Records the total size of `id` and returns the updated descriptor.
    pub fn set_total(&self, id: TaskId, total_bytes: Option<u64>) -> Option<TransferDescriptor> {
        let mut entries = self.lock();
        let entry = entries.get_mut(&id)?;
        entry.descriptor.total_bytes = total_bytes;
        Some(entry.descriptor.clone())
    }

    /// Flags `id` for abort. Returns false if `id` is not active.
    pub fn request_abort(&self, id: TaskId) -> bool {
        match self.lock().get_mut(&id) {
            Some(entry) => {
                entry.abort_requested = true;
                true
            }
            None => false,
        }
    }

    /// Flags every active transfer for abort and returns their ids.
    pub fn request_abort_all(&self) -> Vec<TaskId> {
        let mut entries = self.lock();
        let mut ids: Vec<TaskId> = entries
            .values_mut()
            .map(|entry| {
                entry.abort_requested = true;
                entry.descriptor.id
            })
            .collect();
        ids.sort();
        ids
    }

    pub fn abort_requested(&self, id: TaskId) -> bool {
        self.lock().get(&id).is_some_and(|entry| entry.abort_requested)
    }

    /// `None` if `id` is not active; `Some(None)` while it waits for a connection.
    pub fn worker_of(&self, id: TaskId) -> Option<Option<usize>> {
        self.lock().get(&id).map(|entry| entry.worker)
    }

    pub fn get(&self, id: TaskId) -> Option<TransferEntry> {
        self.lock().get(&id).cloned()
    }

    /// Active transfer ids, oldest first.
    pub fn ids(&self) -> Vec<TaskId> {
        let mut ids: Vec<TaskId> = self.lock().keys().copied().collect();
        ids.sort();
        ids
    }

    /// Snapshot of every active transfer, oldest first.
    pub fn entries(&self) -> Vec<TransferEntry> {
        let mut entries: Vec<TransferEntry> = self.lock().values().cloned().collect();
        entries.sort_by_key(|entry| entry.descriptor.id);
        entries
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Emits `TransferEvent::Finished` and removes the entry. Returns false if
    /// `id` was not active (already settled).
    pub fn settle(&self, id: TaskId, outcome: TransferOutcome) -> bool {
        let mut entries = self.lock();
        if !entries.contains_key(&id) {
            return false;
        }
        tracing::debug!(transfer_id = %id, outcome = ?outcome, "transfer settled");
        self.bus
            .emit(ClientEvent::Transfer(TransferEvent::Finished { id, outcome }));
        entries.remove(&id);
        true
    }
}

/// Keeps a transfer registered until it is settled. Dropping an unfinished
/// ticket settles the transfer as `Cancelled` if its operation never started
/// and as `Abandoned` otherwise.
#[must_use = "dropping the ticket settles the transfer"]
#[derive(Debug)]
pub struct TransferTicket {
    registry: Arc<TransferRegistry>,
    id: TaskId,
    started: bool,
    settled: bool,
}

impl TransferTicket {
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Marks the operation as started on a connection.
    pub fn start(&mut self) {
        self.started = true;
    }

    pub fn finish(mut self, outcome: TransferOutcome) {
        self.registry.settle(self.id, outcome);
        self.settled = true;
    }
}

impl Drop for TransferTicket {
    fn drop(&mut self) {
        if !self.settled {
            let outcome = if self.started {
                TransferOutcome::Abandoned
            } else {
                TransferOutcome::Cancelled
            };
            self.registry.settle(self.id, outcome);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(id: u64) -> TransferDescriptor {
        TransferDescriptor {
            id: TaskId(id),
            direction: TransferDirection::Download,
            local_path: PathBuf::from("/tmp/out.bin"),
            remote_path: "/pub/out.bin".to_string(),
            total_bytes: None,
        }
    }

    #[tokio::test]
    async fn lifecycle_emits_started_then_finished() {
        let bus = EventBus::default();
        let mut events = bus.subscribe();
        let registry = Arc::new(TransferRegistry::new(bus));

        let ticket = registry.announce(descriptor(3)).unwrap();
        assert_eq!(registry.worker_of(TaskId(3)), Some(None));
        assert!(registry.assign(TaskId(3), 2));
        assert_eq!(registry.worker_of(TaskId(3)), Some(Some(2)));
        let updated = registry.set_total(TaskId(3), Some(42)).unwrap();
        assert_eq!(updated.total_bytes, Some(42));

        ticket.finish(TransferOutcome::Completed { bytes: 42 });
        assert_eq!(registry.worker_of(TaskId(3)), None);
        assert!(registry.is_empty());

        match events.recv().await.unwrap() {
            ClientEvent::Transfer(TransferEvent::Started(d)) => assert_eq!(d.id, TaskId(3)),
            other => panic!("expected Started, got {:?}", other),
        }
        match events.recv().await.unwrap() {
            ClientEvent::Transfer(TransferEvent::Finished { id, outcome }) => {
                assert_eq!(id, TaskId(3));
                assert_eq!(outcome, TransferOutcome::Completed { bytes: 42 });
            }
            other => panic!("expected Finished, got {:?}", other),
        }
    }

    #[test]
    fn duplicate_announce_is_rejected() {
        let registry = Arc::new(TransferRegistry::new(EventBus::default()));
        let _ticket = registry.announce(descriptor(1)).unwrap();
        assert!(matches!(
            registry.announce(descriptor(1)),
            Err(Error::DuplicateTransfer(TaskId(1)))
        ));
    }

    #[tokio::test]
    async fn dropped_ticket_settles_cancelled_or_abandoned() {
        let bus = EventBus::default();
        let mut events = bus.subscribe();
        let registry = Arc::new(TransferRegistry::new(bus));

        let queued = registry.announce(descriptor(8)).unwrap();
        let mut running = registry.announce(descriptor(9)).unwrap();
        running.start();
        assert_eq!(registry.ids(), vec![TaskId(8), TaskId(9)]);
        drop(queued);
        drop(running);
        assert!(registry.ids().is_empty());
        assert!(!registry.settle(TaskId(9), TransferOutcome::Cancelled));

        let mut finished = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let ClientEvent::Transfer(TransferEvent::Finished { id, outcome }) = event {
                finished.push((id, outcome));
            }
        }
        assert_eq!(
            finished,
            vec![
                (TaskId(8), TransferOutcome::Cancelled),
                (TaskId(9), TransferOutcome::Abandoned),
            ]
        );
    }

    #[test]
    fn abort_requests_stick_to_active_transfers() {
        let registry = Arc::new(TransferRegistry::new(EventBus::default()));
        let _a = registry.announce(descriptor(1)).unwrap();
        let _b = registry.announce(descriptor(2)).unwrap();

        assert!(!registry.abort_requested(TaskId(1)));
        assert!(registry.request_abort(TaskId(1)));
        assert!(registry.abort_requested(TaskId(1)));
        assert!(!registry.abort_requested(TaskId(2)));
        assert!(!registry.request_abort(TaskId(7)));

        assert_eq!(registry.request_abort_all(), vec![TaskId(1), TaskId(2)]);
        assert!(registry.abort_requested(TaskId(2)));
    }

    #[test]
    fn outcome_distinguishes_cancel_abort_and_failure() {
        assert_eq!(
            TransferOutcome::from_result(&Ok(5)),
            TransferOutcome::Completed { bytes: 5 }
        );
        assert_eq!(
            TransferOutcome::from_result(&Err(Error::Cancelled(TaskId(1)))),
            TransferOutcome::Cancelled
        );
        let aborted = anyhow::Error::new(crate::error::OperationAborted);
        assert_eq!(
            TransferOutcome::from_result(&Err(Error::Operation(aborted))),
            TransferOutcome::Aborted
        );
        assert!(matches!(
            TransferOutcome::from_result(&Err(Error::Operation(anyhow::anyhow!("boom")))),
            TransferOutcome::Failed { .. }
        ));
    }
}
