//! `local` strategy: a directory on this machine acts as the remote root.
//!
//! Remote paths are resolved under the root; `/` is the root itself and `..`
//! may not climb above it. Transfers copy in fixed-size chunks, report
//! progress after every chunk and check the abort token between chunks. The
//! token is only cleared by `reset_abort`, so an abort raised before a copy
//! starts fails that copy at its first chunk.

use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;

use crate::error::OperationAborted;
use crate::transfer::{TransferDescriptor, TransferProgress};

use super::{Connection, ConnectionContext, EntryKind, RemoteEntry};

/// Copy chunk size for downloads and uploads.
pub const CHUNK_SIZE: usize = 64 * 1024;

pub struct LocalConnection {
    root: PathBuf,
    ctx: ConnectionContext,
    connected: AtomicBool,
    abort: Arc<AtomicBool>,
}

impl LocalConnection {
    pub fn new(root: impl Into<PathBuf>, ctx: ConnectionContext) -> Self {
        Self {
            root: root.into(),
            ctx,
            connected: AtomicBool::new(false),
            abort: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn ensure_connected(&self) -> Result<()> {
        if !self.connected.load(Ordering::Acquire) {
            bail!("connection {} is not connected", self.ctx.index);
        }
        Ok(())
    }

    /// Maps a remote path onto the root. Rejects paths that climb above it.
    fn resolve(&self, remote: &str) -> Result<PathBuf> {
        let mut parts: Vec<&std::ffi::OsStr> = Vec::new();
        for component in Path::new(remote).components() {
            match component {
                Component::RootDir | Component::CurDir => {}
                Component::Normal(part) => parts.push(part),
                Component::ParentDir => {
                    if parts.pop().is_none() {
                        bail!("path escapes the root: {}", remote);
                    }
                }
                Component::Prefix(_) => bail!("unsupported path prefix: {}", remote),
            }
        }
        let mut path = self.root.clone();
        path.extend(parts);
        Ok(path)
    }

    fn check_abort(&self) -> Result<()> {
        if self.abort.load(Ordering::Relaxed) {
            return Err(anyhow::Error::new(OperationAborted));
        }
        Ok(())
    }

    /// Chunked copy shared by download and upload.
    async fn pump(
        &self,
        transfer: &TransferDescriptor,
        total_bytes: Option<u64>,
        reader: &mut (dyn AsyncRead + Unpin + Send),
        writer: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<u64> {
        let started = Instant::now();
        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut bytes_done = 0u64;
        loop {
            self.check_abort()?;
            let n = reader.read(&mut buf).await.context("read chunk")?;
            if n == 0 {
                break;
            }
            writer.write_all(&buf[..n]).await.context("write chunk")?;
            bytes_done += n as u64;
            self.ctx.events.progress(
                transfer,
                TransferProgress {
                    bytes_done,
                    total_bytes,
                    elapsed_secs: started.elapsed().as_secs_f64(),
                },
            );
        }
        writer.flush().await.context("flush")?;
        Ok(bytes_done)
    }
}

fn entry_kind(file_type: &std::fs::FileType) -> EntryKind {
    if file_type.is_symlink() {
        EntryKind::Symlink
    } else if file_type.is_dir() {
        EntryKind::Directory
    } else if file_type.is_file() {
        EntryKind::File
    } else {
        EntryKind::Other
    }
}

#[async_trait]
impl Connection for LocalConnection {
    fn protocol(&self) -> &str {
        "local"
    }

    async fn connect(&self) -> Result<()> {
        let meta = fs::metadata(&self.root)
            .await
            .with_context(|| format!("open root {}", self.root.display()))?;
        if !meta.is_dir() {
            bail!("root is not a directory: {}", self.root.display());
        }
        self.connected.store(true, Ordering::Release);
        self.ctx.events.connected();
        tracing::debug!(worker = self.ctx.index, root = %self.root.display(), "local connection open");
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.abort.store(true, Ordering::Relaxed);
        self.connected.store(false, Ordering::Release);
        self.ctx.events.disconnected();
        Ok(())
    }

    async fn abort(&self) -> Result<()> {
        self.abort.store(true, Ordering::Relaxed);
        Ok(())
    }

    fn reset_abort(&self) {
        self.abort.store(false, Ordering::Relaxed);
    }

    async fn size(&self, path: &str) -> Result<u64> {
        self.ensure_connected()?;
        let full = self.resolve(path)?;
        let meta = fs::metadata(&full)
            .await
            .with_context(|| format!("stat {}", path))?;
        if meta.is_dir() {
            bail!("not a file: {}", path);
        }
        Ok(meta.len())
    }

    async fn list(&self, path: &str) -> Result<Vec<RemoteEntry>> {
        self.ensure_connected()?;
        let full = self.resolve(path)?;
        let mut dir = fs::read_dir(&full)
            .await
            .with_context(|| format!("list {}", path))?;
        let mut entries = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let file_type = entry.file_type().await?;
            let meta = entry.metadata().await?;
            let modified = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs());
            entries.push(RemoteEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                kind: entry_kind(&file_type),
                size: if file_type.is_dir() { 0 } else { meta.len() },
                modified,
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        self.ensure_connected()?;
        let (src, dst) = (self.resolve(from)?, self.resolve(to)?);
        fs::rename(&src, &dst)
            .await
            .with_context(|| format!("rename {} -> {}", from, to))
    }

    async fn remove(&self, path: &str) -> Result<()> {
        self.ensure_connected()?;
        fs::remove_file(self.resolve(path)?)
            .await
            .with_context(|| format!("remove {}", path))
    }

    async fn remove_dir(&self, path: &str) -> Result<()> {
        self.ensure_connected()?;
        let full = self.resolve(path)?;
        if full == self.root {
            bail!("refusing to remove the root");
        }
        fs::remove_dir_all(&full)
            .await
            .with_context(|| format!("remove dir {}", path))
    }

    async fn create_folder(&self, path: &str) -> Result<()> {
        self.ensure_connected()?;
        fs::create_dir_all(self.resolve(path)?)
            .await
            .with_context(|| format!("create folder {}", path))
    }

    async fn create_empty_file(&self, path: &str) -> Result<()> {
        self.ensure_connected()?;
        fs::File::create(self.resolve(path)?)
            .await
            .with_context(|| format!("create file {}", path))?;
        Ok(())
    }

    async fn pwd(&self) -> Result<String> {
        self.ensure_connected()?;
        Ok("/".to_string())
    }

    async fn send(&self, command: &str) -> Result<String> {
        self.ensure_connected()?;
        if command.trim().eq_ignore_ascii_case("NOOP") {
            return Ok("200 NOOP ok".to_string());
        }
        bail!("unsupported command for local protocol: {}", command.trim())
    }

    async fn download(
        &self,
        transfer: &TransferDescriptor,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<u64> {
        self.ensure_connected()?;
        let full = self.resolve(&transfer.remote_path)?;
        let mut file = fs::File::open(&full)
            .await
            .with_context(|| format!("open {}", transfer.remote_path))?;
        let total = match transfer.total_bytes {
            Some(total) => Some(total),
            None => Some(file.metadata().await?.len()),
        };
        self.pump(transfer, total, &mut file, sink).await
    }

    async fn upload(
        &self,
        transfer: &TransferDescriptor,
        source: &mut (dyn AsyncRead + Unpin + Send),
    ) -> Result<u64> {
        self.ensure_connected()?;
        let full = self.resolve(&transfer.remote_path)?;
        let mut file = fs::File::create(&full)
            .await
            .with_context(|| format!("create {}", transfer.remote_path))?;
        self.pump(transfer, transfer.total_bytes, source, &mut file)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::Group;
    use crate::pool::ConnectionEvents;
    use crate::scheduler::TaskId;
    use crate::transfer::TransferDirection;

    fn local(root: &Path) -> LocalConnection {
        LocalConnection::new(
            root,
            ConnectionContext {
                index: 0,
                group: Group::All,
                events: ConnectionEvents::detached(0),
            },
        )
    }

    fn descriptor(remote: &str) -> TransferDescriptor {
        TransferDescriptor {
            id: TaskId(1),
            direction: TransferDirection::Download,
            local_path: PathBuf::from("unused"),
            remote_path: remote.to_string(),
            total_bytes: None,
        }
    }

    #[test]
    fn resolve_stays_under_root() {
        let conn = local(Path::new("/srv/data"));
        assert_eq!(conn.resolve("/").unwrap(), PathBuf::from("/srv/data"));
        assert_eq!(conn.resolve("a/./b").unwrap(), PathBuf::from("/srv/data/a/b"));
        assert_eq!(conn.resolve("/a/../b").unwrap(), PathBuf::from("/srv/data/b"));
        assert!(conn.resolve("../etc/passwd").is_err());
        assert!(conn.resolve("/a/../../x").is_err());
    }

    #[tokio::test]
    async fn operations_require_connect() {
        let dir = tempfile::tempdir().unwrap();
        let conn = local(dir.path());
        assert!(conn.pwd().await.is_err());
        conn.connect().await.unwrap();
        assert_eq!(conn.pwd().await.unwrap(), "/");
        conn.disconnect().await.unwrap();
        assert!(conn.list("/").await.is_err());
    }

    #[tokio::test]
    async fn connect_fails_for_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let conn = local(&dir.path().join("missing"));
        assert!(conn.connect().await.is_err());
    }

    #[tokio::test]
    async fn metadata_operations() {
        let dir = tempfile::tempdir().unwrap();
        let conn = local(dir.path());
        conn.connect().await.unwrap();

        conn.create_folder("/docs/old").await.unwrap();
        conn.create_empty_file("/docs/a.txt").await.unwrap();
        std::fs::write(dir.path().join("docs/b.txt"), b"hello").unwrap();

        let names: Vec<_> = conn
            .list("/docs")
            .await
            .unwrap()
            .into_iter()
            .map(|e| (e.name, e.kind))
            .collect();
        assert_eq!(
            names,
            vec![
                ("a.txt".to_string(), EntryKind::File),
                ("b.txt".to_string(), EntryKind::File),
                ("old".to_string(), EntryKind::Directory),
            ]
        );
        assert_eq!(conn.size("/docs/b.txt").await.unwrap(), 5);
        assert!(conn.size("/docs/old").await.is_err());

        conn.rename("/docs/b.txt", "/docs/c.txt").await.unwrap();
        assert!(dir.path().join("docs/c.txt").exists());
        conn.remove("/docs/c.txt").await.unwrap();
        conn.remove_dir("/docs/old").await.unwrap();
        assert!(!dir.path().join("docs/old").exists());
        assert!(conn.remove_dir("/").await.is_err());
    }

    #[tokio::test]
    async fn send_accepts_noop_only() {
        let dir = tempfile::tempdir().unwrap();
        let conn = local(dir.path());
        conn.connect().await.unwrap();
        assert!(conn.send("noop").await.unwrap().starts_with("200"));
        assert!(conn.send("SITE CHMOD 644 x").await.is_err());
    }

    #[tokio::test]
    async fn download_and_upload_copy_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let payload: Vec<u8> = (0..(CHUNK_SIZE * 2 + 17)).map(|i| (i % 251) as u8).collect();
        std::fs::write(dir.path().join("blob.bin"), &payload).unwrap();
        let conn = local(dir.path());
        conn.connect().await.unwrap();

        let mut sink = Vec::new();
        let n = conn.download(&descriptor("/blob.bin"), &mut sink).await.unwrap();
        assert_eq!(n, payload.len() as u64);
        assert_eq!(sink, payload);

        let mut source: &[u8] = &payload;
        let n = conn.upload(&descriptor("/copy.bin"), &mut source).await.unwrap();
        assert_eq!(n, payload.len() as u64);
        assert_eq!(std::fs::read(dir.path().join("copy.bin")).unwrap(), payload);
    }

    #[tokio::test]
    async fn abort_before_copy_starts_is_kept_until_reset() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("blob.bin"), [1u8; 4096]).unwrap();
        let conn = local(dir.path());
        conn.connect().await.unwrap();

        conn.abort().await.unwrap();
        let mut sink = Vec::new();
        let err = conn.download(&descriptor("/blob.bin"), &mut sink).await.unwrap_err();
        assert!(err.downcast_ref::<OperationAborted>().is_some());
        assert!(sink.is_empty());

        conn.reset_abort();
        let n = conn.download(&descriptor("/blob.bin"), &mut sink).await.unwrap();
        assert_eq!(n, 4096);
    }

    #[tokio::test]
    async fn aborted_copy_fails_with_marker() {
        let dir = tempfile::tempdir().unwrap();
        let conn = local(dir.path());
        conn.connect().await.unwrap();

        // Abort raised mid-copy: the source blocks after the first chunk.
        let (mut writer, mut reader) = tokio::io::duplex(CHUNK_SIZE);
        writer.write_all(&[7u8; 1024]).await.unwrap();
        let conn = Arc::new(conn);
        let upload = {
            let conn = Arc::clone(&conn);
            tokio::spawn(async move { conn.upload(&descriptor("/partial.bin"), &mut reader).await })
        };
        while !dir.path().join("partial.bin").exists() {
            tokio::task::yield_now().await;
        }
        conn.abort().await.unwrap();
        writer.write_all(&[8u8; 16]).await.unwrap();

        let err = upload.await.unwrap().unwrap_err();
        assert!(err.downcast_ref::<OperationAborted>().is_some());
    }
}
