//! Library error type.
//!
//! Configuration problems surface from `Client::connect`; everything a task
//! produces surfaces only through that task's handle. Strategy failures are
//! carried as `anyhow::Error` so callers can downcast (e.g. to
//! [`OperationAborted`]).

use thiserror::Error;

use crate::scheduler::TaskId;

#[derive(Debug, Error)]
pub enum Error {
    /// No connection strategy is registered under this protocol name.
    #[error("no protocol registered for '{0}'")]
    UnknownProtocol(String),

    /// Pool must hold at least one connection.
    #[error("invalid pool size {0}: at least one connection is required")]
    InvalidPoolSize(usize),

    /// The client has no connected pool.
    #[error("client is not connected")]
    NotConnected,

    /// The task was removed from the queue before it started.
    #[error("task {0} cancelled before it started")]
    Cancelled(TaskId),

    /// The task's operation was dropped (panic or runtime shutdown) without settling.
    #[error("task {0} ended without a result")]
    Abandoned(TaskId),

    /// A transfer with this id is already announced.
    #[error("transfer {0} is already registered")]
    DuplicateTransfer(TaskId),

    /// No active transfer with this id.
    #[error("no active transfer with id {0}")]
    UnknownTransfer(TaskId),

    /// The operation itself failed (protocol or I/O).
    #[error(transparent)]
    Operation(#[from] anyhow::Error),
}

impl Error {
    /// True for a pending task that was cancelled, as opposed to one that failed.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled(_))
    }

    /// True when the underlying operation was stopped by an abort request.
    pub fn is_aborted(&self) -> bool {
        match self {
            Error::Operation(e) => e.downcast_ref::<OperationAborted>().is_some(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Error returned by a running operation stopped through `Connection::abort`.
#[derive(Debug)]
pub struct OperationAborted;

impl std::fmt::Display for OperationAborted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "operation aborted")
    }
}

impl std::error::Error for OperationAborted {}
