//! Hooks through which the scheduler reaches the worker pool.

use crate::group::Group;

type GetWorker<W> = Box<dyn Fn(usize) -> Option<W> + Send + Sync>;
type WorkerFilter<W> = Box<dyn Fn(&W, Option<Group>) -> bool + Send + Sync>;

/// Resolves worker indices to worker handles and tests group eligibility.
///
/// Both callbacks run while the scheduler holds its queue lock, so they must
/// not call back into the scheduler.
pub struct WorkerHooks<W> {
    worker_count: usize,
    get_worker_instance: GetWorker<W>,
    worker_filter: WorkerFilter<W>,
}

impl<W> WorkerHooks<W> {
    pub fn new(
        worker_count: usize,
        get_worker_instance: impl Fn(usize) -> Option<W> + Send + Sync + 'static,
        worker_filter: impl Fn(&W, Option<Group>) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            worker_count,
            get_worker_instance: Box::new(get_worker_instance),
            worker_filter: Box::new(worker_filter),
        }
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub(super) fn get_worker_instance(&self, index: usize) -> Option<W> {
        (self.get_worker_instance)(index)
    }

    pub(super) fn worker_filter(&self, worker: &W, group: Option<Group>) -> bool {
        (self.worker_filter)(worker, group)
    }
}
