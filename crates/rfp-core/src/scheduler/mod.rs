//! Task scheduler: queues operations and hands each one a pooled worker.
//!
//! Every scheduled task waits in one FIFO queue. A dispatch pass walks the
//! queue in arrival order and starts each task on the lowest-indexed idle,
//! unpaused worker that the injected `worker_filter` accepts for the task's
//! group. Passes run after every enqueue, settlement, resume and (re)wire, so
//! a task is either running, still waiting for an eligible worker, or
//! cancelled.
//!
//! The scheduler knows nothing about the pool beyond [`WorkerHooks`]: it asks
//! for a worker by index and asks whether that worker accepts a group.

mod guard;
mod hooks;
mod job;

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;

use crate::group::Group;

use self::guard::SlotGuard;
use self::job::{Job, ScheduledJob};

pub use hooks::WorkerHooks;
pub use job::TaskHandle;

/// Identity of a scheduled task (and of the transfer it carries, if any).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Point-in-time counters for the queue and the worker slots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Worker slots in the current generation.
    pub workers: usize,
    /// Tasks waiting for a worker.
    pub pending: usize,
    /// Tasks currently holding a worker.
    pub running: usize,
    /// Slots paused for new dispatch (running or not).
    pub paused: usize,
}

/// Per-worker bookkeeping. A slot is idle when it holds no task and is not paused.
#[derive(Debug, Clone, Copy, Default)]
struct Slot {
    task: Option<TaskId>,
    paused: bool,
}

impl Slot {
    fn is_idle(&self) -> bool {
        self.task.is_none() && !self.paused
    }
}

struct PendingTask<W> {
    id: TaskId,
    group: Option<Group>,
    job: Box<dyn Job<W>>,
}

/// A task that a dispatch pass has bound to a worker; started after the lock is released.
struct Launch<W> {
    id: TaskId,
    index: usize,
    generation: u64,
    worker: W,
    job: Box<dyn Job<W>>,
}

struct State<W> {
    hooks: Option<WorkerHooks<W>>,
    /// Bumped on every (un)wire so releases from an old pool are ignored.
    generation: u64,
    slots: Vec<Slot>,
    pending: VecDeque<PendingTask<W>>,
}

impl<W> State<W> {
    /// Binds pending tasks to idle eligible workers, in arrival order.
    fn assign_idle(&mut self) -> Vec<Launch<W>> {
        let Some(hooks) = self.hooks.as_ref() else {
            return Vec::new();
        };
        let mut launches = Vec::new();
        let mut i = 0;
        while i < self.pending.len() {
            if !self.slots.iter().any(Slot::is_idle) {
                break;
            }
            let group = self.pending[i].group;
            let choice = self
                .slots
                .iter()
                .enumerate()
                .filter(|(_, slot)| slot.is_idle())
                .find_map(|(index, _)| {
                    hooks
                        .get_worker_instance(index)
                        .filter(|worker| hooks.worker_filter(worker, group))
                        .map(|worker| (index, worker))
                });
            let Some((index, worker)) = choice else {
                i += 1;
                continue;
            };
            if let Some(task) = self.pending.remove(i) {
                self.slots[index].task = Some(task.id);
                launches.push(Launch {
                    id: task.id,
                    index,
                    generation: self.generation,
                    worker,
                    job: task.job,
                });
            }
        }
        launches
    }
}

struct Inner<W> {
    next_id: AtomicU64,
    state: Mutex<State<W>>,
}

/// Grouped FIFO scheduler over a fixed set of workers.
///
/// Cloning yields another handle to the same queue. Dispatched operations are
/// spawned on the ambient tokio runtime.
pub struct Scheduler<W> {
    inner: Arc<Inner<W>>,
}

impl<W> Clone for Scheduler<W> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<W: Clone + Send + 'static> Default for Scheduler<W> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Clone + Send + 'static> Scheduler<W> {
    /// An unwired scheduler: tasks queue up until [`Scheduler::wire`] is called.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                next_id: AtomicU64::new(1),
                state: Mutex::new(State {
                    hooks: None,
                    generation: 0,
                    slots: Vec::new(),
                    pending: VecDeque::new(),
                }),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<W>> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocates the next task identity. Identities are never reused.
    pub fn create_task_id(&self) -> TaskId {
        TaskId(self.inner.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Enqueues `operation` and tries to dispatch immediately.
    ///
    /// `group = None` means any non-transfer worker. When `id` is `None` a fresh
    /// identity is allocated; a caller-supplied id also moves the allocator past it.
    pub fn schedule<T, F, Fut>(
        &self,
        operation: F,
        group: Option<Group>,
        id: Option<TaskId>,
    ) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: FnOnce(W) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let id = match id {
            Some(id) => {
                self.inner
                    .next_id
                    .fetch_max(id.0.saturating_add(1), Ordering::Relaxed);
                id
            }
            None => self.create_task_id(),
        };
        let (tx, rx) = oneshot::channel();
        let job: Box<dyn Job<W>> = Box::new(ScheduledJob::new(id, operation, tx));
        self.lock().pending.push_back(PendingTask { id, group, job });
        tracing::debug!(task_id = %id, group = ?group, "task queued");
        self.dispatch();
        TaskHandle::new(id, rx)
    }

    /// Cancels every pending task; running tasks are left alone.
    /// Returns the ids that were cancelled, in queue order.
    pub fn delete_all_tasks(&self) -> Vec<TaskId> {
        let drained: Vec<PendingTask<W>> = self.lock().pending.drain(..).collect();
        cancel_tasks(drained)
    }

    /// Cancels the pending tasks whose id is in `ids`; running ones are left alone.
    /// Returns the ids that were actually cancelled.
    pub fn delete_tasks(&self, ids: &[TaskId]) -> Vec<TaskId> {
        let removed: Vec<PendingTask<W>> = {
            let mut state = self.lock();
            let (removed, kept): (VecDeque<_>, VecDeque<_>) = state
                .pending
                .drain(..)
                .partition(|task| ids.contains(&task.id));
            state.pending = kept;
            removed.into_iter().collect()
        };
        cancel_tasks(removed)
    }

    /// Makes the given workers ineligible for new tasks. A task already running
    /// on them keeps running.
    pub fn pause_workers(&self, indices: &[usize]) {
        let mut state = self.lock();
        for &index in indices {
            match state.slots.get_mut(index) {
                Some(slot) => slot.paused = true,
                None => tracing::warn!(worker = index, "pause ignored: no such worker"),
            }
        }
    }

    /// Clears the pause flag on the given workers and dispatches.
    pub fn resume_workers(&self, indices: &[usize]) {
        {
            let mut state = self.lock();
            for &index in indices {
                match state.slots.get_mut(index) {
                    Some(slot) => slot.paused = false,
                    None => tracing::warn!(worker = index, "resume ignored: no such worker"),
                }
            }
        }
        self.dispatch();
    }

    /// Installs the pool hooks and starts a new worker generation (all slots
    /// idle and unpaused), then dispatches queued tasks.
    pub fn wire(&self, hooks: WorkerHooks<W>) {
        {
            let mut state = self.lock();
            state.generation += 1;
            state.slots = vec![Slot::default(); hooks.worker_count()];
            tracing::debug!(
                workers = hooks.worker_count(),
                generation = state.generation,
                "scheduler wired"
            );
            state.hooks = Some(hooks);
        }
        self.dispatch();
    }

    /// Removes the pool hooks. Queued tasks stay queued; tasks still running
    /// on the old pool release nothing when they settle.
    pub fn unwire(&self) {
        let mut state = self.lock();
        state.generation += 1;
        state.slots.clear();
        state.hooks = None;
    }

    pub fn stats(&self) -> SchedulerStats {
        let state = self.lock();
        SchedulerStats {
            workers: state.slots.len(),
            pending: state.pending.len(),
            running: state.slots.iter().filter(|s| s.task.is_some()).count(),
            paused: state.slots.iter().filter(|s| s.paused).count(),
        }
    }

    /// True while the task is queued (not yet dispatched nor cancelled).
    pub fn is_pending(&self, id: TaskId) -> bool {
        self.lock().pending.iter().any(|task| task.id == id)
    }

    /// Index of the worker currently running `id`, if it is running.
    pub fn running_worker(&self, id: TaskId) -> Option<usize> {
        self.lock().slots.iter().position(|s| s.task == Some(id))
    }

    /// Pauses the workers currently running any of `ids` and returns
    /// `(task, worker)` for each one found. Lookup and pause happen under one
    /// lock, so the returned worker still held that task when it was paused.
    pub fn pause_running(&self, ids: &[TaskId]) -> Vec<(TaskId, usize)> {
        let mut state = self.lock();
        let mut paused = Vec::new();
        for (index, slot) in state.slots.iter_mut().enumerate() {
            if let Some(task) = slot.task.filter(|task| ids.contains(task)) {
                slot.paused = true;
                paused.push((task, index));
            }
        }
        paused
    }

    /// Indices of workers currently running a task.
    pub fn busy_workers(&self) -> Vec<usize> {
        self.lock()
            .slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.task.is_some())
            .map(|(i, _)| i)
            .collect()
    }

    /// Assigns as many pending tasks as idle workers allow and starts them.
    fn dispatch(&self) {
        let launches = self.lock().assign_idle();
        for launch in launches {
            self.start(launch);
        }
    }

    fn start(&self, launch: Launch<W>) {
        let Launch {
            id,
            index,
            generation,
            worker,
            job,
        } = launch;
        tracing::debug!(task_id = %id, worker = index, "task dispatched");
        let guard = SlotGuard::new(self.clone(), index, generation, id);
        let operation = job.run(worker);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    let _slot = guard;
                    operation.await;
                });
            }
            Err(_) => {
                // Dropping the operation and guard abandons the task and frees the slot.
                tracing::warn!(task_id = %id, "no tokio runtime; task abandoned");
            }
        }
    }

    /// Frees `index` if it still holds `id` in `generation`, then dispatches.
    fn release(&self, index: usize, generation: u64, id: TaskId) {
        let freed = {
            let mut state = self.lock();
            if state.generation != generation {
                false
            } else {
                match state.slots.get_mut(index) {
                    Some(slot) if slot.task == Some(id) => {
                        slot.task = None;
                        true
                    }
                    _ => false,
                }
            }
        };
        if freed {
            tracing::debug!(task_id = %id, worker = index, "worker released");
            self.dispatch();
        }
    }
}

fn cancel_tasks<W>(tasks: Vec<PendingTask<W>>) -> Vec<TaskId> {
    tasks
        .into_iter()
        .map(|task| {
            tracing::debug!(task_id = %task.id, "pending task cancelled");
            task.job.cancel();
            task.id
        })
        .collect()
}
