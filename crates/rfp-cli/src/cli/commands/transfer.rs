//! `rfp get` / `rfp put` – concurrent downloads and uploads with progress.

use anyhow::{anyhow, bail, Result};
use rfp_core::{Client, TransferReport};
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinSet;

use super::progress::ProgressPrinter;

type TransferJoin = JoinSet<(String, rfp_core::Result<TransferReport>)>;

pub async fn run_get(client: Arc<Client>, remotes: &[String], dest: &Path) -> Result<()> {
    std::fs::create_dir_all(dest)?;
    let printer = ProgressPrinter::spawn(client.subscribe());
    let mut join_set = TransferJoin::new();
    for remote in remotes {
        let target = dest.join(remote_file_name(remote)?);
        let client = Arc::clone(&client);
        let remote = remote.clone();
        join_set.spawn(async move {
            let result = client.download(&remote, &target).await;
            (remote, result)
        });
    }
    let summary = collect(join_set).await;
    printer.finish().await;
    summary
}

pub async fn run_put(client: Arc<Client>, locals: &[std::path::PathBuf], dest: &str) -> Result<()> {
    let printer = ProgressPrinter::spawn(client.subscribe());
    let mut join_set = TransferJoin::new();
    for local in locals {
        let remote = remote_target(dest, local)?;
        let client = Arc::clone(&client);
        let local = local.clone();
        join_set.spawn(async move {
            let result = client.upload(&local, &remote).await;
            (local.display().to_string(), result)
        });
    }
    let summary = collect(join_set).await;
    printer.finish().await;
    summary
}

async fn collect(mut join_set: TransferJoin) -> Result<()> {
    let mut done = 0usize;
    let mut failed = 0usize;
    while let Some(joined) = join_set.join_next().await {
        let (name, result) = joined.map_err(|e| anyhow!("transfer task join: {}", e))?;
        match result {
            Ok(report) => {
                done += 1;
                println!(
                    "{}: {} bytes (transfer {}, connection {})",
                    name, report.bytes, report.id, report.worker
                );
            }
            Err(e) => {
                failed += 1;
                eprintln!("{}: failed: {:#}", name, e);
            }
        }
    }
    if failed > 0 {
        bail!("{} of {} transfers failed", failed, done + failed);
    }
    Ok(())
}

/// Last path segment of a remote path.
fn remote_file_name(remote: &str) -> Result<&str> {
    remote
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty() && *name != "..")
        .ok_or_else(|| anyhow!("no file name in remote path '{}'", remote))
}

/// `dir/<file name of local>`.
fn remote_target(dir: &str, local: &Path) -> Result<String> {
    let name = local
        .file_name()
        .ok_or_else(|| anyhow!("no file name in local path {}", local.display()))?;
    Ok(format!(
        "{}/{}",
        dir.trim_end_matches('/'),
        name.to_string_lossy()
    ))
}
