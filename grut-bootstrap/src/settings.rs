//! Optional TOML settings for the bootstrap.
//!
//! Every field has a default, so a missing file (or a partial one) is fine.
//! Default location is `~/.config/grut-bootstrap/config.toml`.

use crate::error::{BootstrapError, SettingsParseSnafu, SettingsReadSnafu};
use serde::{Deserialize, Serialize};
use snafu::ResultExt;
use std::path::{Path, PathBuf};

/// Top-level settings file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Environment manager executable.
    pub conda: String,
    /// Python version for freshly created environments.
    pub python_version: String,
    /// Checkout the provisioning commands run in.
    pub project_root: PathBuf,
    pub compiler: CompilerSettings,
    pub kaolin: KaolinSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            conda: "conda".to_string(),
            python_version: "3.11".to_string(),
            project_root: PathBuf::from("."),
            compiler: CompilerSettings::default(),
            kaolin: KaolinSettings::default(),
        }
    }
}

/// Host compiler names and the newest major version nvcc accepts.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct CompilerSettings {
    pub default_cc: String,
    pub default_cxx: String,
    pub alternate_cc: String,
    pub alternate_cxx: String,
    pub max_major: u64,
}

impl Default for CompilerSettings {
    fn default() -> Self {
        Self {
            default_cc: "gcc".to_string(),
            default_cxx: "g++".to_string(),
            alternate_cc: "gcc-11".to_string(),
            alternate_cxx: "g++-11".to_string(),
            max_major: 11,
        }
    }
}

/// Kaolin pins: a source build for CUDA 12.8.1, a prebuilt wheel for 11.8.0.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct KaolinSettings {
    pub repository: String,
    pub revision: String,
    /// Relative to `project_root`.
    pub checkout_dir: PathBuf,
    pub wheel_version: String,
    /// `pip -f` page listing wheels built against torch 2.1.2/cu118.
    pub wheel_index: String,
}

impl Default for KaolinSettings {
    fn default() -> Self {
        Self {
            repository: "https://github.com/NVIDIAGameWorks/kaolin.git".to_string(),
            revision: "v0.17.0".to_string(),
            checkout_dir: PathBuf::from("thirdparty/kaolin"),
            wheel_version: "0.17.0".to_string(),
            wheel_index: "https://nvidia-kaolin.s3.us-east-2.amazonaws.com/torch-2.1.2_cu118.html"
                .to_string(),
        }
    }
}

impl Settings {
    /// Default settings path under the user config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("grut-bootstrap").join("config.toml"))
    }

    /// Load settings.
    ///
    /// An explicit path must exist; the default path may be absent.
    pub fn load(explicit: Option<&Path>) -> Result<Self, BootstrapError> {
        match explicit {
            Some(path) => Self::from_file(&expand_path(path)),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    fn from_file(path: &Path) -> Result<Self, BootstrapError> {
        let content = std::fs::read_to_string(path).context(SettingsReadSnafu { path })?;
        tracing::debug!(path = %path.display(), "loaded settings");
        toml::from_str(&content).context(SettingsParseSnafu { path })
    }
}

/// Expand a leading `~` to the home directory.
pub fn expand_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    PathBuf::from(shellexpand::tilde(raw.as_ref()).as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "conda = \"mamba\"\n\n[compiler]\nalternate_cc = \"gcc-10\"\nalternate_cxx = \"g++-10\""
        )
        .unwrap();

        let settings = Settings::load(Some(file.path())).unwrap();
        assert_eq!(settings.conda, "mamba");
        assert_eq!(settings.compiler.alternate_cc, "gcc-10");
        assert_eq!(settings.compiler.max_major, 11);
        assert_eq!(settings.python_version, "3.11");
        assert_eq!(settings.kaolin, KaolinSettings::default());
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Settings::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(err, BootstrapError::SettingsRead { .. }));
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "conda = [").unwrap();
        let err = Settings::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, BootstrapError::SettingsParse { .. }));
    }

    #[test]
    fn test_expand_path_non_tilde() {
        assert_eq!(
            expand_path(Path::new("/tmp/config.toml")),
            PathBuf::from("/tmp/config.toml")
        );
    }
}
