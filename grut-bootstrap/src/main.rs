use clap::Parser;
use grut_bootstrap::commands::{BootstrapArgs, handle_bootstrap_command};
use std::process::exit;

fn main() {
    let args = BootstrapArgs::parse();
    grut_bootstrap::init_logging(args.verbose);

    if let Err(err) = handle_bootstrap_command(&args) {
        eprintln!();
        eprintln!("❌ {err:#}");
        exit(grut_bootstrap::exit_code_for(&err));
    }
}
