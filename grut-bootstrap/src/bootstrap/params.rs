//! Positional parameter parsing.

use serde::Serialize;

/// Environment name used when none is given.
pub const DEFAULT_ENVIRONMENT: &str = "3dgrut";

/// CUDA version used when none is given.
pub const DEFAULT_CUDA_VERSION: &str = "12.8.1";

/// Literal token that requests the alternate (gcc-11) compiler pair.
pub const ALTERNATE_COMPILER_TOKEN: &str = "WITH_GCC11";

/// User-supplied bootstrap inputs, fixed for the whole run.
///
/// `cuda_version` is kept verbatim; it is validated by
/// [`resolve_arch_profile`](super::arch::resolve_arch_profile).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BootstrapParameters {
    pub environment_name: String,
    pub cuda_version: String,
    pub use_alternate_compiler: bool,
}

impl Default for BootstrapParameters {
    fn default() -> Self {
        Self {
            environment_name: DEFAULT_ENVIRONMENT.to_string(),
            cuda_version: DEFAULT_CUDA_VERSION.to_string(),
            use_alternate_compiler: false,
        }
    }
}

/// Build parameters from positional tokens.
///
/// The first token names the environment. Any later `WITH_GCC11` token
/// selects the alternate compiler; the first other later token is the CUDA
/// version. `cuda_fallback` (e.g. from `$CUDA_VERSION`) applies when no
/// positional version is given. Extra tokens are ignored. Never fails.
pub fn parse_parameters<S: AsRef<str>>(
    args: &[S],
    cuda_fallback: Option<&str>,
) -> BootstrapParameters {
    let mut params = BootstrapParameters::default();
    let mut tokens = args.iter().map(|arg| arg.as_ref().trim());

    if let Some(name) = tokens.next().filter(|name| !name.is_empty()) {
        params.environment_name = name.to_string();
    }

    let mut positional_cuda = None;
    for token in tokens {
        if token == ALTERNATE_COMPILER_TOKEN {
            params.use_alternate_compiler = true;
        } else if positional_cuda.is_none() && !token.is_empty() {
            positional_cuda = Some(token);
        }
    }

    if let Some(version) = positional_cuda.or(cuda_fallback.filter(|v| !v.trim().is_empty())) {
        params.cuda_version = version.trim().to_string();
    }

    params
}
