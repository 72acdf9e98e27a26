//! `grut-bootstrap` command: provision the 3DGRUT environment.

use crate::bootstrap::{
    BootstrapReport, BootstrapRun, Collaborators, CondaManager, InheritedPaths, ProvisioningStep,
    StepAction, SystemProbe, SystemRunner, generate_report, parse_parameters, print_report,
    run_bootstrap,
};
use crate::settings::Settings;
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser, Clone)]
#[clap(
    name = "grut-bootstrap",
    version,
    about = "Provision the CUDA/PyTorch/Kaolin environment for 3DGRUT"
)]
pub struct BootstrapArgs {
    /// ENV_NAME [CUDA_VERSION] [WITH_GCC11]
    #[clap(num_args = 0..=3, value_name = "ARGS")]
    pub positional: Vec<String>,

    /// CUDA version when none is given positionally (11.8.0 or 12.8.1)
    #[clap(long, env = "CUDA_VERSION")]
    pub cuda_version: Option<String>,

    /// Use the gcc-11/g++-11 pair (same as the WITH_GCC11 token)
    #[clap(long)]
    pub with_gcc11: bool,

    /// Settings file (default: ~/.config/grut-bootstrap/config.toml)
    #[clap(short, long, env = "GRUT_BOOTSTRAP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Resolve and print the plan without creating or installing anything
    #[clap(long)]
    pub dry_run: bool,

    /// Write a TOML run report to this path
    #[clap(short, long)]
    pub report: Option<PathBuf>,

    /// Verbose logging
    #[clap(short, long)]
    pub verbose: bool,
}

/// Handle the bootstrap command.
pub fn handle_bootstrap_command(args: &BootstrapArgs) -> Result<()> {
    println!("🥾 3DGRUT environment bootstrap");
    println!();

    let settings = Settings::load(args.config.as_deref()).context("Failed to load settings")?;

    let mut params = parse_parameters(&args.positional, args.cuda_version.as_deref());
    params.use_alternate_compiler |= args.with_gcc11;

    let environments = CondaManager::from(&settings);
    let mut runner = SystemRunner;
    let run = run_bootstrap(
        &params,
        &settings,
        Collaborators {
            probe: &SystemProbe,
            environments: &environments,
            runner: &mut runner,
        },
        InheritedPaths::from_process(),
        args.dry_run,
    )?;

    let BootstrapRun {
        arch,
        toolchain,
        plan,
        outcome,
        ..
    } = run;

    let Some(outcome) = outcome else {
        print_plan(&plan);
        return Ok(());
    };

    let report = BootstrapReport::new(&params, &arch, &toolchain, &outcome);
    println!();
    print_report(&report);

    if let Some(path) = &args.report {
        let written = generate_report(&report, path).context("Failed to write bootstrap report")?;
        println!();
        println!("📄 Report written to: {}", written.display());
    }

    outcome.into_result()?;
    Ok(())
}

fn print_plan(plan: &[ProvisioningStep]) {
    println!();
    println!("📋 Provisioning plan ({} steps, dry run):", plan.len());
    for (i, step) in plan.iter().enumerate() {
        println!("  {:>2}. {}", i + 1, step.description);
        println!("      $ {}", step.action);
        if let StepAction::Command(cmd) = &step.action {
            for (key, value) in &cmd.env {
                println!("      {key}={value}");
            }
            if let Some(dir) = &cmd.cwd {
                println!("      (in {})", dir.display());
            }
        }
    }
}
