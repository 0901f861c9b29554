//! CLI command handlers, one file per command family.

mod config;
mod groups;
mod ls;
mod ops;
mod progress;
mod transfer;

pub use config::run_config;
pub use groups::run_groups;
pub use ls::run_ls;
pub use ops::{run_mkdir, run_mv, run_pwd, run_rm, run_size, run_touch};
pub use transfer::{run_get, run_put};
