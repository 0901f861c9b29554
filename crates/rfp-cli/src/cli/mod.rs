//! CLI for the rfp pooled remote-file client.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use rfp_core::config;
use rfp_core::Client;
use std::path::PathBuf;
use std::sync::Arc;

use commands::{
    run_config, run_get, run_groups, run_ls, run_mkdir, run_mv, run_put, run_pwd, run_rm,
    run_size, run_touch,
};

/// Top-level CLI for rfp.
#[derive(Debug, Parser)]
#[command(name = "rfp")]
#[command(about = "rfp: remote file operations over a pool of connections", long_about = None)]
pub struct Cli {
    /// Profile from config.toml (defaults to `default_profile`).
    #[arg(long, global = true, value_name = "NAME")]
    pub profile: Option<String>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// List a remote directory.
    Ls {
        /// Remote directory.
        #[arg(default_value = "/")]
        path: String,
        /// Print entries as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Download one or more remote files (concurrently).
    Get {
        /// Remote file paths.
        #[arg(required = true)]
        remote: Vec<String>,
        /// Local directory to write into (default: current directory).
        #[arg(long, value_name = "DIR")]
        dest: Option<PathBuf>,
    },

    /// Upload one or more local files (concurrently).
    Put {
        /// Local file paths.
        #[arg(required = true)]
        local: Vec<PathBuf>,
        /// Remote directory to write into (default: `/`).
        #[arg(long, value_name = "DIR")]
        dest: Option<String>,
    },

    /// Move or rename a remote path.
    Mv { from: String, to: String },

    /// Remove a remote file, or a directory with `--dir`.
    Rm {
        path: String,
        #[arg(long)]
        dir: bool,
    },

    /// Create a remote directory (and missing parents).
    Mkdir { path: String },

    /// Create an empty remote file.
    Touch { path: String },

    /// Print the remote working directory.
    Pwd,

    /// Print the size of a remote file in bytes.
    Size { path: String },

    /// Show how a pool would be labelled (no connection is made).
    Groups {
        /// Pool size (default: from config).
        #[arg(long, value_name = "N")]
        size: Option<usize>,
        /// Label every connection `all` instead of reserving transfer connections.
        #[arg(long)]
        no_transfer_pool: bool,
    },

    /// Show the config file path and its contents.
    Config,
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Groups {
                size,
                no_transfer_pool,
            } => return run_groups(&cfg, size, no_transfer_pool),
            CliCommand::Config => return run_config(&cfg),
            _ => {}
        }

        let connect = cfg.profile(cli.profile.as_deref())?;
        let client = Arc::new(Client::new());
        client.connect(connect).await?;

        let result = match cli.command {
            CliCommand::Ls { path, json } => run_ls(&client, &path, json).await,
            CliCommand::Get { remote, dest } => match dest {
                Some(dir) => run_get(Arc::clone(&client), &remote, &dir).await,
                None => run_get(Arc::clone(&client), &remote, &std::env::current_dir()?).await,
            },
            CliCommand::Put { local, dest } => {
                run_put(Arc::clone(&client), &local, dest.as_deref().unwrap_or("/")).await
            }
            CliCommand::Mv { from, to } => run_mv(&client, &from, &to).await,
            CliCommand::Rm { path, dir } => run_rm(&client, &path, dir).await,
            CliCommand::Mkdir { path } => run_mkdir(&client, &path).await,
            CliCommand::Touch { path } => run_touch(&client, &path).await,
            CliCommand::Pwd => run_pwd(&client).await,
            CliCommand::Size { path } => run_size(&client, &path).await,
            CliCommand::Groups { .. } | CliCommand::Config => Ok(()),
        };

        client.disconnect().await;
        result
    }
}

#[cfg(test)]
mod tests;
