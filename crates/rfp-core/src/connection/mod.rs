//! Connection strategy: one physical channel to the remote side.
//!
//! A strategy runs one operation at a time (the scheduler guarantees it is
//! never handed two), but `abort` and `disconnect` may be called while an
//! operation is in flight, so every method takes `&self`.

mod local;

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::group::Group;
use crate::pool::ConnectionEvents;
use crate::transfer::TransferDescriptor;

pub use local::LocalConnection;

/// Lifecycle status of a pooled connection. `Busy` is reported by the client
/// for connections that currently run a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Busy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
    Other,
}

/// One entry of a remote directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteEntry {
    pub name: String,
    pub kind: EntryKind,
    pub size: u64,
    /// Modification time in seconds since the Unix epoch, when known.
    pub modified: Option<u64>,
}

/// Handed to a strategy factory when the pool builds a connection.
#[derive(Debug, Clone)]
pub struct ConnectionContext {
    pub index: usize,
    pub group: Group,
    /// Where the connection reports connect/disconnect/progress.
    pub events: ConnectionEvents,
}

#[async_trait]
pub trait Connection: Send + Sync {
    /// Protocol name this strategy was registered under (for logs).
    fn protocol(&self) -> &str;

    async fn connect(&self) -> anyhow::Result<()>;

    async fn disconnect(&self) -> anyhow::Result<()>;

    /// Best-effort stop of whatever operation is running. The running
    /// operation should fail with [`crate::error::OperationAborted`]. A
    /// request that lands before the copy starts stays pending until
    /// [`Connection::reset_abort`].
    async fn abort(&self) -> anyhow::Result<()>;

    /// Drops an abort request left over from earlier work. Called when a
    /// transfer task starts on this connection; an abort that arrives after
    /// this call must stop the transfer even if its copy has not begun yet.
    fn reset_abort(&self) {}

    async fn size(&self, path: &str) -> anyhow::Result<u64>;

    async fn list(&self, path: &str) -> anyhow::Result<Vec<RemoteEntry>>;

    async fn rename(&self, from: &str, to: &str) -> anyhow::Result<()>;

    async fn remove(&self, path: &str) -> anyhow::Result<()>;

    async fn remove_dir(&self, path: &str) -> anyhow::Result<()>;

    async fn create_folder(&self, path: &str) -> anyhow::Result<()>;

    async fn create_empty_file(&self, path: &str) -> anyhow::Result<()>;

    async fn pwd(&self) -> anyhow::Result<String>;

    /// Sends a raw protocol command and returns the reply text.
    async fn send(&self, command: &str) -> anyhow::Result<String>;

    /// Copies `transfer.remote_path` into `sink`; returns bytes written.
    async fn download(
        &self,
        transfer: &TransferDescriptor,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> anyhow::Result<u64>;

    /// Copies `source` to `transfer.remote_path`; returns bytes written.
    async fn upload(
        &self,
        transfer: &TransferDescriptor,
        source: &mut (dyn AsyncRead + Unpin + Send),
    ) -> anyhow::Result<u64>;
}
