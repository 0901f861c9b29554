//! RAII guard that frees a worker slot when its task settles.

use super::{Scheduler, TaskId};

/// Releases the slot when dropped: on success, on error, and when the
/// operation panics or is dropped by runtime shutdown.
pub(super) struct SlotGuard<W: Clone + Send + 'static> {
    scheduler: Scheduler<W>,
    index: usize,
    generation: u64,
    id: TaskId,
}

impl<W: Clone + Send + 'static> SlotGuard<W> {
    pub(super) fn new(scheduler: Scheduler<W>, index: usize, generation: u64, id: TaskId) -> Self {
        Self {
            scheduler,
            index,
            generation,
            id,
        }
    }
}

impl<W: Clone + Send + 'static> Drop for SlotGuard<W> {
    fn drop(&mut self) {
        self.scheduler.release(self.index, self.generation, self.id);
    }
}
