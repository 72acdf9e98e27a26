//! `grut-rebase` command: move the commits after `<base>` onto `<target>`.

use crate::bootstrap::{ProvisioningStep, StepCommand, SystemRunner, execute};
use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser, Clone)]
#[clap(
    name = "grut-rebase",
    version,
    about = "List <base>..HEAD, then rebase it onto <target>"
)]
pub struct RebaseArgs {
    /// Branch or commit the range is moved onto
    pub target: String,

    /// Commit the range currently starts after
    pub base: String,

    /// Repository to operate on (default: current directory)
    #[clap(short = 'C', long)]
    pub repo: Option<PathBuf>,

    /// Verbose logging
    #[clap(short, long)]
    pub verbose: bool,
}

/// Steps: list the range, then rebase it.
pub fn rebase_plan(target: &str, base: &str, repo: Option<&PathBuf>) -> Vec<ProvisioningStep> {
    let git = |args: &[&str]| {
        let cmd = StepCommand::new("git").args(args.iter().copied());
        match repo {
            Some(dir) => cmd.cwd(dir),
            None => cmd,
        }
    };

    let range = format!("{base}..HEAD");
    vec![
        ProvisioningStep::command(
            format!("Commits to move ({range})"),
            git(&["--no-pager", "log", "--oneline", range.as_str()]),
        ),
        ProvisioningStep::command(
            format!("Rebase onto {target}"),
            git(&["rebase", "--onto", target, base]),
        ),
    ]
}

/// Handle the rebase command.
pub fn handle_rebase_command(args: &RebaseArgs) -> Result<()> {
    let plan = rebase_plan(&args.target, &args.base, args.repo.as_ref());
    let outcome = execute(&plan, &mut SystemRunner);
    outcome.into_result()?;
    println!("✅ Rebased {}..HEAD onto {}", args.base, args.target);
    Ok(())
}
