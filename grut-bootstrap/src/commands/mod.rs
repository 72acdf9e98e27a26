//! Command handlers behind the two binaries.

pub mod bootstrap;
pub mod rebase;

pub use bootstrap::{BootstrapArgs, handle_bootstrap_command};
pub use rebase::{RebaseArgs, handle_rebase_command};
