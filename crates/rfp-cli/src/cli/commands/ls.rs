//! `rfp ls` – list a remote directory.

use anyhow::Result;
use rfp_core::{Client, EntryKind, RemoteEntry};

pub async fn run_ls(client: &Client, path: &str, json: bool) -> Result<()> {
    let entries = client.list(path).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    if entries.is_empty() {
        println!("(empty)");
    }
    for entry in &entries {
        println!("{}", format_entry(entry));
    }
    Ok(())
}

fn format_entry(entry: &RemoteEntry) -> String {
    let kind = match entry.kind {
        EntryKind::Directory => 'd',
        EntryKind::Symlink => 'l',
        EntryKind::File => '-',
        EntryKind::Other => '?',
    };
    let size = match entry.kind {
        EntryKind::Directory => "-".to_string(),
        _ => entry.size.to_string(),
    };
    format!("{} {:>12} {}", kind, size, entry.name)
}
