//! `rfp groups` – print the group label of each connection for a pool shape.

use anyhow::{bail, Result};
use rfp_core::config::RfpConfig;
use rfp_core::group::{compute_groups, Group};

pub fn run_groups(cfg: &RfpConfig, size: Option<usize>, no_transfer_pool: bool) -> Result<()> {
    let size = size.unwrap_or(cfg.pool.size);
    if size < 1 {
        bail!("pool size must be at least 1");
    }
    let pooled = cfg.pool.pooled_transfers && !no_transfer_pool;
    for line in group_lines(&compute_groups(size, pooled)) {
        println!("{}", line);
    }
    Ok(())
}

fn group_lines(groups: &[Group]) -> Vec<String> {
    groups
        .iter()
        .enumerate()
        .map(|(index, group)| format!("{:<4} {}", index, group))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_show_index_and_label() {
        let lines = group_lines(&compute_groups(3, true));
        assert_eq!(lines, vec!["0    misc", "1    transfer", "2    transfer"]);
    }
}
