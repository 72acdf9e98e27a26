//! # grut-bootstrap
//!
//! Resolves and runs the environment bootstrap for 3DGRUT: CUDA toolkit,
//! pinned PyTorch, the Kaolin source build and the project install, in a
//! conda environment, with a host compiler nvcc accepts.
//!
//! The resolver is synchronous and fail-fast; see [`bootstrap`].

pub mod bootstrap;
pub mod commands;
pub mod error;
pub mod settings;

pub use error::{BootstrapError, StepError};
pub use settings::Settings;

/// Initialise logging for the binaries.
///
/// `RUST_LOG` wins; otherwise `verbose` selects `debug` over `warn`.
pub fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp(None)
        .try_init();
}

/// Exit status for a failed command.
///
/// Uses the bootstrap error's own code when there is one in the chain.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<BootstrapError>())
        .map_or(1, BootstrapError::exit_code)
}
