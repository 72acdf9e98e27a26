//! Provisioning plan: the ordered external commands for one CUDA branch.
//!
//! Compile-time configuration (arch list, compilers, CUDA root) is attached
//! to the steps that build native code, as a per-command environment map.
//! Nothing here mutates the process environment.

use crate::bootstrap::arch::{ArchProfile, CudaVersion};
use crate::bootstrap::environment::{EnvironmentHandle, target_flag};
use crate::bootstrap::patch::SourcePatch;
use crate::bootstrap::toolchain::ToolchainSelection;
use crate::settings::Settings;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Kaolin source file whose dispatch call needs `.scalar_type()` on recent PyTorch.
pub const KAOLIN_PATCH_FILE: &str = "kaolin/csrc/render/spc/raytrace_cuda.cu";
pub const KAOLIN_PATCH_FIND: &str = "AT_DISPATCH_FLOATING_TYPES_AND_HALF(feats.type()";
pub const KAOLIN_PATCH_REPLACE: &str = "AT_DISPATCH_FLOATING_TYPES_AND_HALF(feats.scalar_type()";

const TORCH_INDEX_URL: &str = "https://download.pytorch.org/whl";

/// One external program invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepCommand {
    pub program: String,
    pub args: Vec<String>,
    /// Variables set on this child only.
    pub env: BTreeMap<String, String>,
    pub cwd: Option<PathBuf>,
    /// Skip the command when this path already exists.
    pub creates: Option<PathBuf>,
}

impl StepCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            cwd: None,
            creates: None,
        }
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn envs(mut self, env: &BTreeMap<String, String>) -> Self {
        self.env
            .extend(env.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    #[must_use]
    pub fn creates(mut self, path: impl Into<PathBuf>) -> Self {
        self.creates = Some(path.into());
        self
    }
}

fn shell_quote(arg: &str) -> String {
    if !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_=./:+,@%".contains(c))
    {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

impl fmt::Display for StepCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&shell_quote(&self.program))?;
        for arg in &self.args {
            write!(f, " {}", shell_quote(arg))?;
        }
        Ok(())
    }
}

/// What a step does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepAction {
    Command(StepCommand),
    Patch(SourcePatch),
}

impl fmt::Display for StepAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Command(cmd) => fmt::Display::fmt(cmd, f),
            Self::Patch(patch) => fmt::Display::fmt(patch, f),
        }
    }
}

/// One entry of the ordered plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProvisioningStep {
    pub description: String,
    pub action: StepAction,
    pub fatal_on_failure: bool,
}

impl ProvisioningStep {
    pub fn command(description: impl Into<String>, command: StepCommand) -> Self {
        Self {
            description: description.into(),
            action: StepAction::Command(command),
            fatal_on_failure: true,
        }
    }

    pub fn patch(description: impl Into<String>, patch: SourcePatch) -> Self {
        Self {
            description: description.into(),
            action: StepAction::Patch(patch),
            fatal_on_failure: true,
        }
    }
}

/// `PATH` / `LD_LIBRARY_PATH` as inherited from the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InheritedPaths {
    pub path: Option<String>,
    pub ld_library_path: Option<String>,
}

impl InheritedPaths {
    pub fn from_process() -> Self {
        Self {
            path: std::env::var("PATH").ok(),
            ld_library_path: std::env::var("LD_LIBRARY_PATH").ok(),
        }
    }
}

fn prepend(dir: &Path, rest: Option<&str>) -> String {
    match rest.filter(|r| !r.is_empty()) {
        Some(rest) => format!("{}:{rest}", dir.display()),
        None => dir.display().to_string(),
    }
}

/// Environment for native build steps.
pub fn build_environment(
    toolchain: &ToolchainSelection,
    arch: &ArchProfile,
    inherited: &InheritedPaths,
) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("TORCH_CUDA_ARCH_LIST".to_string(), arch.arch_list_value()),
        ("CC".to_string(), toolchain.cc.display().to_string()),
        ("CXX".to_string(), toolchain.cxx.display().to_string()),
        ("CUDA_HOME".to_string(), arch.cuda_home.display().to_string()),
        (
            "PATH".to_string(),
            prepend(&arch.cuda_home.join("bin"), inherited.path.as_deref()),
        ),
        (
            "LD_LIBRARY_PATH".to_string(),
            prepend(
                &arch.cuda_home.join("lib64"),
                inherited.ld_library_path.as_deref(),
            ),
        ),
    ])
}

/// Inputs the plan needs besides the resolved toolchain and arch profile.
#[derive(Debug, Clone)]
pub struct PlanContext<'a> {
    pub environment: &'a EnvironmentHandle,
    pub settings: &'a Settings,
    pub inherited: InheritedPaths,
}

impl PlanContext<'_> {
    /// `-n <name>`, or `-p <prefix>` for path-style environments.
    fn target_args(&self) -> [String; 2] {
        let name = &self.environment.name;
        [target_flag(name).to_string(), name.clone()]
    }

    fn conda(&self) -> StepCommand {
        StepCommand::new(&self.settings.conda)
    }

    /// Run `program` inside the environment.
    fn in_env(&self, program: &str) -> StepCommand {
        self.conda()
            .args(["run", "--no-capture-output"])
            .args(self.target_args())
            .args([program])
    }

    fn project_root(&self) -> &Path {
        &self.settings.project_root
    }

    fn kaolin_dir(&self) -> PathBuf {
        self.project_root().join(&self.settings.kaolin.checkout_dir)
    }
}

fn toolkit_steps(cuda: CudaVersion, ctx: &PlanContext<'_>) -> Vec<ProvisioningStep> {
    let [torch, vision, audio] = cuda.torch_pins();
    vec![
        ProvisioningStep::command(
            format!("Install CUDA {cuda} toolkit, cmake and ninja"),
            ctx.conda()
                .args(["install", "-y"])
                .args(ctx.target_args())
                .args(["cuda-toolkit", "cmake", "ninja", "-c"])
                .args([cuda.conda_channel()]),
        ),
        ProvisioningStep::command(
            format!("Install PyTorch for {}", cuda.torch_tag()),
            ctx.in_env("pip")
                .args(["install", torch, vision, audio, "--index-url"])
                .args([format!("{TORCH_INDEX_URL}/{}", cuda.torch_tag())]),
        ),
        ProvisioningStep::command(
            "Pin numpy below 2",
            ctx.in_env("pip")
                .args(["install", "--force-reinstall", "numpy<2"]),
        ),
    ]
}

fn kaolin_source_steps(
    ctx: &PlanContext<'_>,
    build_env: &BTreeMap<String, String>,
) -> Vec<ProvisioningStep> {
    let kaolin = &ctx.settings.kaolin;
    let dir = ctx.kaolin_dir();
    let dir_arg = dir.display().to_string();

    vec![
        ProvisioningStep::command(
            "Clone Kaolin",
            StepCommand::new("git")
                .args(["clone", "--recursive", kaolin.repository.as_str(), dir_arg.as_str()])
                .creates(&dir),
        ),
        ProvisioningStep::command(
            format!("Check out Kaolin {}", kaolin.revision),
            StepCommand::new("git")
                .args(["-C", dir_arg.as_str(), "checkout", kaolin.revision.as_str()]),
        ),
        ProvisioningStep::command(
            "Sync Kaolin submodules",
            StepCommand::new("git").args([
                "-C",
                dir_arg.as_str(),
                "submodule",
                "update",
                "--init",
                "--recursive",
            ]),
        ),
        ProvisioningStep::patch(
            "Patch Kaolin for current PyTorch scalar types",
            SourcePatch::new(
                dir.join(KAOLIN_PATCH_FILE),
                KAOLIN_PATCH_FIND,
                KAOLIN_PATCH_REPLACE,
            ),
        ),
        ProvisioningStep::command(
            "Install Kaolin build requirements",
            ctx.in_env("pip")
                .args([
                    "install",
                    "-r",
                    "tools/build_requirements.txt",
                    "-r",
                    "tools/viz_requirements.txt",
                    "-r",
                    "tools/requirements.txt",
                ])
                .cwd(&dir),
        ),
        ProvisioningStep::command(
            "Build and install Kaolin",
            ctx.in_env("python")
                .args(["setup.py", "develop"])
                .envs(build_env)
                .env("IGNORE_TORCH_VER", "1")
                .cwd(&dir),
        ),
    ]
}

/// Prebuilt Kaolin matching the pinned torch build.
fn kaolin_wheel_step(ctx: &PlanContext<'_>) -> ProvisioningStep {
    let kaolin = &ctx.settings.kaolin;
    ProvisioningStep::command(
        format!("Install prebuilt Kaolin {}", kaolin.wheel_version),
        ctx.in_env("pip").args([
            "install".to_string(),
            format!("kaolin=={}", kaolin.wheel_version),
            "-f".to_string(),
            kaolin.wheel_index.clone(),
        ]),
    )
}

fn project_steps(
    ctx: &PlanContext<'_>,
    build_env: &BTreeMap<String, String>,
) -> Vec<ProvisioningStep> {
    let root = ctx.project_root();
    vec![
        ProvisioningStep::command(
            "Sync git submodules",
            StepCommand::new("git")
                .args(["submodule", "update", "--init", "--recursive"])
                .cwd(root),
        ),
        ProvisioningStep::command(
            "Install project requirements",
            ctx.in_env("pip")
                .args(["install", "-r", "requirements.txt"])
                .cwd(root),
        ),
        ProvisioningStep::command(
            "Install project in editable mode",
            ctx.in_env("pip")
                .args(["install", "-e", "."])
                .envs(build_env)
                .cwd(root),
        ),
    ]
}

/// Build the ordered plan for `cuda_version`.
pub fn build_provisioning_plan(
    toolchain: &ToolchainSelection,
    arch: &ArchProfile,
    cuda_version: CudaVersion,
    ctx: &PlanContext<'_>,
) -> Vec<ProvisioningStep> {
    let build_env = build_environment(toolchain, arch, &ctx.inherited);
    let mut plan = Vec::new();

    if toolchain.alternate {
        plan.push(ProvisioningStep::command(
            "Persist alternate compilers in the environment",
            ctx.conda()
                .args(["env", "config", "vars", "set"])
                .args(ctx.target_args())
                .args([
                    format!("CC={}", toolchain.cc.display()),
                    format!("CXX={}", toolchain.cxx.display()),
                ]),
        ));
    }

    plan.extend(toolkit_steps(cuda_version, ctx));

    match cuda_version {
        CudaVersion::Cuda118 => plan.push(kaolin_wheel_step(ctx)),
        CudaVersion::Cuda1281 => plan.extend(kaolin_source_steps(ctx, &build_env)),
    }

    plan.extend(project_steps(ctx, &build_env));
    plan
}
