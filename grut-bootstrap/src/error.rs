//! Error taxonomy for the bootstrap resolver.
//!
//! Every variant is fatal to the run. The binaries map them to a process
//! exit status through [`BootstrapError::exit_code`].

use snafu::Snafu;
use std::path::PathBuf;

/// Errors raised while resolving or executing a bootstrap.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum BootstrapError {
    #[snafu(display(
        "Unsupported CUDA version: {version}, available options are {supported}"
    ))]
    UnsupportedCudaVersion { version: String, supported: String },

    #[snafu(display(
        "{name} could not be found. Perhaps you need to run 'sudo apt-get install gcc-11 g++-11'?"
    ))]
    CompilerUnavailable { name: String },

    #[snafu(display(
        "{} version {major} is still higher than {max}, selecting the alternate compiler failed",
        compiler.display()
    ))]
    CompilerVersionTooNew {
        compiler: PathBuf,
        major: u64,
        max: u64,
    },

    #[snafu(display("Could not determine the version of {}: {reason}", compiler.display()))]
    CompilerVersionUnreadable { compiler: PathBuf, reason: String },

    #[snafu(display("Failed to query environments with {program}"))]
    EnvironmentQuery {
        program: String,
        source: std::io::Error,
    },

    #[snafu(display("Failed to parse environment listing from {program}"))]
    EnvironmentListing {
        program: String,
        source: serde_json::Error,
    },

    #[snafu(display("Failed to create environment '{name}'"))]
    EnvironmentCreate {
        name: String,
        source: std::io::Error,
    },

    #[snafu(display("Step {index} ({description}) failed: {source}"))]
    StepExecutionFailed {
        index: usize,
        description: String,
        source: StepError,
    },

    #[snafu(display("Failed to read settings from {}", path.display()))]
    SettingsRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Failed to parse settings in {}", path.display()))]
    SettingsParse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl BootstrapError {
    /// Process exit status for this error.
    ///
    /// Step failures propagate the failing tool's own status when it has one.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::StepExecutionFailed {
                source: StepError::ExitStatus { code: Some(code), .. },
                ..
            } if *code != 0 => *code,
            _ => 1,
        }
    }
}

/// Why a single provisioning step did not complete.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StepError {
    #[snafu(display("failed to launch {program}: {source}"))]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[snafu(display(
        "{program} exited with {}",
        code.map_or_else(
            || "no status (terminated by signal)".to_string(),
            |c| format!("status {c}"),
        )
    ))]
    ExitStatus { program: String, code: Option<i32> },

    #[snafu(display("failed to patch {}: {source}", file.display()))]
    PatchIo {
        file: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display(
        "patch not applicable to {}: neither '{find}' nor '{replace}' is present",
        file.display()
    ))]
    PatchNotApplicable {
        file: PathBuf,
        find: String,
        replace: String,
    },
}
