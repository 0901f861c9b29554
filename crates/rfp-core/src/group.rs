//! Connection groups: which connections may run which kind of work.
//!
//! A pool with pooled transfers reserves connection 0 for metadata work
//! (`Misc`) and hands the rest to uploads/downloads (`Transfer`). A single
//! connection, or a pool with pooled transfers disabled, labels everything
//! `All`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Group label carried by a pooled connection, or required by a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Group {
    All,
    Misc,
    Transfer,
}

impl Group {
    pub fn as_str(self) -> &'static str {
        match self {
            Group::All => "all",
            Group::Misc => "misc",
            Group::Transfer => "transfer",
        }
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Labels for a pool of `pool_size` connections, in index order.
pub fn compute_groups(pool_size: usize, pooled_transfers: bool) -> Vec<Group> {
    if pool_size <= 1 || !pooled_transfers {
        return vec![Group::All; pool_size];
    }
    let mut groups = Vec::with_capacity(pool_size);
    groups.push(Group::Misc);
    groups.extend(std::iter::repeat(Group::Transfer).take(pool_size - 1));
    groups
}

/// Whether a connection labelled `label` may run a task requiring `requested`.
///
/// No requested group means "any non-transfer work": `All` or `Misc`.
/// Requesting `All` accepts every label.
pub fn accepts(label: Group, requested: Option<Group>) -> bool {
    match requested {
        None => matches!(label, Group::All | Group::Misc),
        Some(Group::All) => true,
        Some(wanted) => label == wanted || label == Group::All,
    }
}
