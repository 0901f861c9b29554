//! Single-shot metadata commands: `mv`, `rm`, `mkdir`, `touch`, `pwd`, `size`.

use anyhow::Result;
use rfp_core::Client;

pub async fn run_mv(client: &Client, from: &str, to: &str) -> Result<()> {
    client.rename(from, to).await?;
    println!("Moved {} -> {}", from, to);
    Ok(())
}

pub async fn run_rm(client: &Client, path: &str, dir: bool) -> Result<()> {
    if dir {
        client.remove_dir(path).await?;
    } else {
        client.remove(path).await?;
    }
    println!("Removed {}", path);
    Ok(())
}

pub async fn run_mkdir(client: &Client, path: &str) -> Result<()> {
    client.create_folder(path).await?;
    println!("Created {}", path);
    Ok(())
}

pub async fn run_touch(client: &Client, path: &str) -> Result<()> {
    client.create_empty_file(path).await?;
    println!("Created {}", path);
    Ok(())
}

pub async fn run_pwd(client: &Client) -> Result<()> {
    println!("{}", client.pwd().await?);
    Ok(())
}

pub async fn run_size(client: &Client, path: &str) -> Result<()> {
    println!("{}", client.size(path).await?);
    Ok(())
}
