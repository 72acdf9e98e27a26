//! Companion git helper: shows `<base>..HEAD`, then rebases it onto `<target>`.

use clap::Parser;
use grut_bootstrap::commands::{RebaseArgs, handle_rebase_command};
use std::process::exit;

fn main() {
    let args = RebaseArgs::parse();
    grut_bootstrap::init_logging(args.verbose);

    if let Err(err) = handle_rebase_command(&args) {
        eprintln!("❌ {err:#}");
        exit(grut_bootstrap::exit_code_for(&err));
    }
}
