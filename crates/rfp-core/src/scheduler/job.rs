//! Type-erased queued operations and the caller-side task handle.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::future::{BoxFuture, FutureExt};
use tokio::sync::oneshot;

use crate::error::{Error, Result};

use super::TaskId;

/// A queued operation: either run on a worker or cancelled, exactly once.
pub(super) trait Job<W>: Send {
    fn run(self: Box<Self>, worker: W) -> BoxFuture<'static, ()>;
    fn cancel(self: Box<Self>);
}

pub(super) struct ScheduledJob<F, T> {
    id: TaskId,
    operation: F,
    tx: oneshot::Sender<Result<T>>,
}

impl<F, T> ScheduledJob<F, T> {
    pub(super) fn new(id: TaskId, operation: F, tx: oneshot::Sender<Result<T>>) -> Self {
        Self { id, operation, tx }
    }
}

impl<W, F, Fut, T> Job<W> for ScheduledJob<F, T>
where
    T: Send + 'static,
    F: FnOnce(W) -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
{
    fn run(self: Box<Self>, worker: W) -> BoxFuture<'static, ()> {
        let ScheduledJob { id, operation, tx } = *self;
        let fut = operation(worker);
        async move {
            let result = fut.await.map_err(Error::Operation);
            if let Err(e) = &result {
                tracing::debug!(task_id = %id, "task failed: {:#}", e);
            }
            if tx.send(result).is_err() {
                tracing::debug!(task_id = %id, "task settled after its handle was dropped");
            }
        }
        .boxed()
    }

    fn cancel(self: Box<Self>) {
        let ScheduledJob { id, operation, tx } = *self;
        // Whatever the operation owns is released before the caller hears back.
        drop(operation);
        let _ = tx.send(Err(Error::Cancelled(id)));
    }
}

/// Resolves when the task settles: the operation's result, `Error::Cancelled`
/// if it was removed while pending, or `Error::Abandoned` if it never settled.
#[must_use = "a TaskHandle does nothing unless awaited"]
pub struct TaskHandle<T> {
    id: TaskId,
    rx: oneshot::Receiver<Result<T>>,
}

impl<T> TaskHandle<T> {
    pub(super) fn new(id: TaskId, rx: oneshot::Receiver<Result<T>>) -> Self {
        Self { id, rx }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }
}

impl<T> Unpin for TaskHandle<T> {}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let id = self.id;
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(Error::Abandoned(id))),
            Poll::Pending => Poll::Pending,
        }
    }
}
