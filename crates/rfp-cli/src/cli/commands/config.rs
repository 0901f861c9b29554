//! `rfp config` – show where the config lives and what it holds.

use anyhow::Result;
use rfp_core::config::{self, RfpConfig};

pub fn run_config(cfg: &RfpConfig) -> Result<()> {
    println!("# {}", config::config_path()?.display());
    print!("{}", toml::to_string_pretty(cfg)?);
    Ok(())
}
