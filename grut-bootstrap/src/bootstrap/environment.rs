//! Isolated (conda) environment management.

use crate::error::{
    BootstrapError, EnvironmentCreateSnafu, EnvironmentListingSnafu, EnvironmentQuerySnafu,
};
use crate::settings::Settings;
use serde::{Deserialize, Serialize};
use snafu::ResultExt;
use std::path::{Path, PathBuf};
use tracing::info;

/// The environment the plan installs into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvironmentHandle {
    pub name: String,
    /// Location on disk, when the manager reports one.
    pub prefix: Option<PathBuf>,
    /// True only when this run created it.
    pub created: bool,
}

impl EnvironmentHandle {
    /// Handle for an environment that has not been looked up (dry runs).
    pub fn planned(name: &str) -> Self {
        Self {
            name: name.to_string(),
            prefix: None,
            created: false,
        }
    }
}

/// Create/lookup seam over the environment manager.
pub trait EnvironmentManager {
    /// Prefix of the named environment, if it exists.
    fn find(&self, name: &str) -> Result<Option<PathBuf>, BootstrapError>;

    fn create(&self, name: &str) -> Result<(), BootstrapError>;
}

/// Reuse the named environment or create it.
///
/// Repeated calls with the same name create at most once.
pub fn ensure_isolated_environment(
    name: &str,
    manager: &dyn EnvironmentManager,
) -> Result<EnvironmentHandle, BootstrapError> {
    if let Some(prefix) = manager.find(name)? {
        println!(
            "ℹ️  Environment '{}' already exists at {}, skipping creation",
            name,
            prefix.display()
        );
        info!(environment = name, prefix = %prefix.display(), "reusing environment");
        return Ok(EnvironmentHandle {
            name: name.to_string(),
            prefix: Some(prefix),
            created: false,
        });
    }

    println!("🔧 Environment '{name}' not found, creating it...");
    manager.create(name)?;
    let prefix = manager.find(name)?;
    info!(environment = name, "created environment");

    Ok(EnvironmentHandle {
        name: name.to_string(),
        prefix,
        created: true,
    })
}

/// `conda env list --json` payload.
#[derive(Debug, Deserialize)]
struct CondaEnvList {
    envs: Vec<PathBuf>,
}

/// Conda-backed manager.
#[derive(Debug, Clone)]
pub struct CondaManager {
    pub conda: String,
    pub python_version: String,
}

impl From<&Settings> for CondaManager {
    fn from(settings: &Settings) -> Self {
        Self {
            conda: settings.conda.clone(),
            python_version: settings.python_version.clone(),
        }
    }
}

/// Conda selector flag: `-p` for a prefix path, `-n` for a named environment.
pub fn target_flag(name: &str) -> &'static str {
    if Path::new(name).is_absolute() {
        "-p"
    } else {
        "-n"
    }
}

/// Match an environment name (or an explicit prefix path) against a listing.
fn find_in_listing(listing: &str, name: &str) -> Result<Option<PathBuf>, serde_json::Error> {
    let list: CondaEnvList = serde_json::from_str(listing)?;
    let as_path = Path::new(name);
    Ok(list.envs.into_iter().find(|prefix| {
        if as_path.is_absolute() {
            prefix == as_path
        } else {
            // named environments live in <root>/envs/<name>
            prefix.file_name().is_some_and(|f| f == name)
                && prefix
                    .parent()
                    .and_then(Path::file_name)
                    .is_some_and(|p| p == "envs")
        }
    }))
}

impl EnvironmentManager for CondaManager {
    fn find(&self, name: &str) -> Result<Option<PathBuf>, BootstrapError> {
        let listing = duct::cmd(&self.conda, ["env", "list", "--json"])
            .stderr_null()
            .read()
            .context(EnvironmentQuerySnafu {
                program: self.conda.as_str(),
            })?;
        find_in_listing(&listing, name).context(EnvironmentListingSnafu {
            program: self.conda.as_str(),
        })
    }

    fn create(&self, name: &str) -> Result<(), BootstrapError> {
        let python = format!("python={}", self.python_version);
        duct::cmd(&self.conda, ["create", target_flag(name), name, "-y", python.as_str()])
            .run()
            .context(EnvironmentCreateSnafu { name })?;
        Ok(())
    }
}
