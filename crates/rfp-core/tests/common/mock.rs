//! Scriptable in-memory connection for client integration tests.
//!
//! Every call is appended to a shared journal as `"<index>:<op>[:<arg>]"`.
//! Transfers block until the test calls [`MockControl::release`] or the
//! connection is aborted. `abort` holds for a short while so tests can observe
//! what the scheduler does while an abort is in progress. `size` can be held
//! too, to park a transfer before its copy starts.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rfp_core::connection::{Connection, ConnectionContext, EntryKind, RemoteEntry};
use rfp_core::transfer::{TransferDescriptor, TransferProgress};
use rfp_core::{Client, ConnectConfig, Endpoint, OperationAborted};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const PROTOCOL: &str = "mock";

/// How long `abort` takes to return.
pub const ABORT_HOLD: Duration = Duration::from_millis(60);

const POLL: Duration = Duration::from_millis(2);

#[derive(Default)]
pub struct MockControl {
    journal: Mutex<Vec<String>>,
    released: AtomicBool,
    size_held: AtomicBool,
    fail_connect: Mutex<Option<usize>>,
}

impl MockControl {
    pub fn record(&self, entry: String) {
        self.journal.lock().unwrap().push(entry);
    }

    pub fn journal(&self) -> Vec<String> {
        self.journal.lock().unwrap().clone()
    }

    /// Position of the first journal entry equal to `entry`.
    pub fn position(&self, entry: &str) -> Option<usize> {
        self.journal().iter().position(|e| e == entry)
    }

    /// Lets every blocked transfer (and every later one) finish.
    pub fn release(&self) {
        self.released.store(true, Ordering::SeqCst);
    }

    /// Makes every `size` call wait until [`MockControl::release_size`].
    pub fn hold_size(&self) {
        self.size_held.store(true, Ordering::SeqCst);
    }

    pub fn release_size(&self) {
        self.size_held.store(false, Ordering::SeqCst);
    }

    pub fn fail_connect_on(&self, index: usize) {
        *self.fail_connect.lock().unwrap() = Some(index);
    }

    /// Polls until `entry` shows up in the journal.
    pub async fn wait_for(&self, entry: &str) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.position(entry).is_none() {
                tokio::time::sleep(POLL).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {:?}; journal: {:?}", entry, self.journal()));
    }
}

pub struct MockConnection {
    ctx: ConnectionContext,
    control: Arc<MockControl>,
    aborted: AtomicBool,
}

impl MockConnection {
    fn note(&self, op: &str) {
        self.control.record(format!("{}:{}", self.ctx.index, op));
    }

    async fn hold(&self, transfer: &TransferDescriptor) -> anyhow::Result<u64> {
        self.ctx.events.progress(
            transfer,
            TransferProgress {
                bytes_done: 0,
                total_bytes: transfer.total_bytes,
                elapsed_secs: 0.0,
            },
        );
        loop {
            if self.aborted.load(Ordering::SeqCst) {
                return Err(anyhow::Error::new(OperationAborted));
            }
            if self.control.released.load(Ordering::SeqCst) {
                return Ok(transfer.total_bytes.unwrap_or(0));
            }
            tokio::time::sleep(POLL).await;
        }
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn protocol(&self) -> &str {
        PROTOCOL
    }

    async fn connect(&self) -> anyhow::Result<()> {
        if *self.control.fail_connect.lock().unwrap() == Some(self.ctx.index) {
            anyhow::bail!("connection {} refused", self.ctx.index);
        }
        self.note("connect");
        self.ctx.events.connected();
        Ok(())
    }

    async fn disconnect(&self) -> anyhow::Result<()> {
        self.note("disconnect");
        self.ctx.events.disconnected();
        Ok(())
    }

    async fn abort(&self) -> anyhow::Result<()> {
        self.note("abort-begin");
        self.aborted.store(true, Ordering::SeqCst);
        tokio::time::sleep(ABORT_HOLD).await;
        self.note("abort-end");
        Ok(())
    }

    fn reset_abort(&self) {
        self.aborted.store(false, Ordering::SeqCst);
    }

    async fn size(&self, path: &str) -> anyhow::Result<u64> {
        self.note(&format!("size:{}", path));
        while self.control.size_held.load(Ordering::SeqCst) {
            tokio::time::sleep(POLL).await;
        }
        Ok(path.len() as u64)
    }

    async fn list(&self, path: &str) -> anyhow::Result<Vec<RemoteEntry>> {
        self.note(&format!("list:{}", path));
        Ok(vec![RemoteEntry {
            name: "readme.txt".to_string(),
            kind: EntryKind::File,
            size: 10,
            modified: None,
        }])
    }

    async fn rename(&self, from: &str, to: &str) -> anyhow::Result<()> {
        self.note(&format!("rename:{}>{}", from, to));
        Ok(())
    }

    async fn remove(&self, path: &str) -> anyhow::Result<()> {
        self.note(&format!("remove:{}", path));
        if path.contains("missing") {
            anyhow::bail!("550 {}: no such file", path);
        }
        Ok(())
    }

    async fn remove_dir(&self, path: &str) -> anyhow::Result<()> {
        self.note(&format!("rmdir:{}", path));
        Ok(())
    }

    async fn create_folder(&self, path: &str) -> anyhow::Result<()> {
        self.note(&format!("mkdir:{}", path));
        Ok(())
    }

    async fn create_empty_file(&self, path: &str) -> anyhow::Result<()> {
        self.note(&format!("touch:{}", path));
        Ok(())
    }

    async fn pwd(&self) -> anyhow::Result<String> {
        self.note("pwd");
        Ok("/home/mock".to_string())
    }

    async fn send(&self, command: &str) -> anyhow::Result<String> {
        self.note(&format!("send:{}", command));
        Ok(format!("200 {}", command))
    }

    async fn download(
        &self,
        transfer: &TransferDescriptor,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> anyhow::Result<u64> {
        self.note(&format!("download:{}", transfer.remote_path));
        let bytes = self.hold(transfer).await?;
        sink.write_all(&vec![b'x'; bytes as usize]).await?;
        sink.flush().await?;
        Ok(bytes)
    }

    async fn upload(
        &self,
        transfer: &TransferDescriptor,
        source: &mut (dyn AsyncRead + Unpin + Send),
    ) -> anyhow::Result<u64> {
        self.note(&format!("upload:{}", transfer.remote_path));
        self.hold(transfer).await?;
        let mut data = Vec::new();
        source.read_to_end(&mut data).await?;
        Ok(data.len() as u64)
    }
}

/// A client with the mock protocol registered, plus its control handle.
pub fn client() -> (Client, Arc<MockControl>) {
    let control = Arc::new(MockControl::default());
    let mut client = Client::new();
    let shared = Arc::clone(&control);
    client.register_protocol(PROTOCOL, move |_config: &ConnectConfig, ctx: ConnectionContext| {
        let connection: Arc<dyn Connection> = Arc::new(MockConnection {
            ctx,
            control: Arc::clone(&shared),
            aborted: AtomicBool::new(false),
        });
        Ok(connection)
    });
    (client, control)
}

pub fn config(size: usize, pooled_transfers: bool) -> ConnectConfig {
    ConnectConfig::new(Endpoint::Custom {
        name: PROTOCOL.to_string(),
        options: BTreeMap::new(),
    })
    .with_pool(size, pooled_transfers)
}

/// Waits until the client reports `count` active transfers.
pub async fn wait_for_transfers(client: &Client, count: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while client.active_transfers().len() != count {
            tokio::time::sleep(POLL).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {} active transfers", count));
}
