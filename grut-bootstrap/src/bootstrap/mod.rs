//! Environment bootstrap resolver.
//!
//! Turns the positional parameters into a validated toolchain and
//! architecture profile, then runs a fixed, linear provisioning plan:
//! - CUDA version -> arch profile lookup (rejects unknown versions first)
//! - Host compiler selection (alternate gcc-11 pair on request)
//! - Isolated environment create-if-absent
//! - Plan build and fail-fast execution
//! - Run report

pub mod arch;
pub mod environment;
pub mod executor;
pub mod params;
pub mod patch;
pub mod plan;
pub mod report;
pub mod toolchain;

pub use arch::{ArchProfile, CudaVersion, resolve_arch_profile};
pub use environment::{
    CondaManager, EnvironmentHandle, EnvironmentManager, ensure_isolated_environment,
};
pub use executor::{
    ExecutionOutcome, StepRecord, StepRunner, StepState, StepStatus, SystemRunner, execute,
};
pub use params::{BootstrapParameters, parse_parameters};
pub use plan::{
    InheritedPaths, PlanContext, ProvisioningStep, StepAction, StepCommand,
    build_provisioning_plan,
};
pub use report::{BootstrapReport, generate_report, print_report};
pub use toolchain::{CompilerProbe, SystemProbe, ToolchainSelection, resolve_toolchain};

use crate::error::BootstrapError;
use crate::settings::Settings;

/// External collaborators used by [`run_bootstrap`].
pub struct Collaborators<'a> {
    pub probe: &'a dyn CompilerProbe,
    pub environments: &'a dyn EnvironmentManager,
    pub runner: &'a mut dyn StepRunner,
}

/// Everything resolved for one run.
#[derive(Debug)]
pub struct BootstrapRun {
    pub arch: ArchProfile,
    pub toolchain: ToolchainSelection,
    pub environment: EnvironmentHandle,
    pub plan: Vec<ProvisioningStep>,
    /// `None` for dry runs.
    pub outcome: Option<ExecutionOutcome>,
}

/// Resolve and (unless `dry_run`) execute a bootstrap.
///
/// Resolver errors return before any mutating step. A failing step does not
/// return `Err`; it is reported through [`BootstrapRun::outcome`] so the
/// caller can still print and persist the report.
pub fn run_bootstrap(
    params: &BootstrapParameters,
    settings: &Settings,
    collaborators: Collaborators<'_>,
    inherited: InheritedPaths,
    dry_run: bool,
) -> Result<BootstrapRun, BootstrapError> {
    let arch = resolve_arch_profile(&params.cuda_version)?;
    println!(
        "🎯 CUDA {}: TORCH_CUDA_ARCH_LIST={} (CUDA_HOME={})",
        arch.cuda_version,
        arch.arch_list_value(),
        arch.cuda_home.display()
    );

    let toolchain = resolve_toolchain(params, &settings.compiler, collaborators.probe)?;
    if toolchain.exceeds(settings.compiler.max_major) {
        println!(
            "⚠️  Default compilers {} / {} report major {}, newer than {}. If the build fails, \
             install gcc-11 ('sudo apt-get install gcc-11 g++-11') and rerun with WITH_GCC11",
            toolchain.cc.display(),
            toolchain.cxx.display(),
            toolchain.major,
            settings.compiler.max_major
        );
    } else {
        println!(
            "🛠️  Using {} / {} (major {})",
            toolchain.cc.display(),
            toolchain.cxx.display(),
            toolchain.major
        );
    }

    let environment = if dry_run {
        EnvironmentHandle::planned(&params.environment_name)
    } else {
        ensure_isolated_environment(&params.environment_name, collaborators.environments)?
    };

    let ctx = PlanContext {
        environment: &environment,
        settings,
        inherited,
    };
    let plan = build_provisioning_plan(&toolchain, &arch, arch.cuda_version, &ctx);

    let outcome = if dry_run {
        None
    } else {
        Some(execute(&plan, collaborators.runner))
    };

    Ok(BootstrapRun {
        arch,
        toolchain,
        environment,
        plan,
        outcome,
    })
}
