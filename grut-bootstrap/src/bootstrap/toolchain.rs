//! Host compiler selection for CUDA builds.
//!
//! nvcc for the supported toolkits rejects host GCC newer than 11. With the
//! alternate compiler requested that limit is enforced; on the default path
//! it is only reported.

use crate::bootstrap::params::BootstrapParameters;
use crate::error::{
    BootstrapError, CompilerUnavailableSnafu, CompilerVersionTooNewSnafu,
    CompilerVersionUnreadableSnafu,
};
use crate::settings::CompilerSettings;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Resolved C/C++ compiler pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolchainSelection {
    pub cc: PathBuf,
    pub cxx: PathBuf,
    /// Highest major version across `cc` and `cxx`.
    pub major: u64,
    /// Whether the alternate pair was requested.
    pub alternate: bool,
}

impl ToolchainSelection {
    pub fn exceeds(&self, max_major: u64) -> bool {
        self.major > max_major
    }
}

/// Looks compilers up on the search path and reads their versions.
pub trait CompilerProbe {
    fn locate(&self, name: &str) -> Option<PathBuf>;

    /// Raw output of the compiler's version query.
    fn version_output(&self, compiler: &Path) -> std::io::Result<String>;
}

/// Probe backed by `PATH` and the compiler itself.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProbe;

impl CompilerProbe for SystemProbe {
    fn locate(&self, name: &str) -> Option<PathBuf> {
        which::which(name).ok()
    }

    fn version_output(&self, compiler: &Path) -> std::io::Result<String> {
        // -dumpfullversion gives x.y.z on GCC >= 7; older ones fall through to -dumpversion
        duct::cmd(compiler, ["-dumpfullversion", "-dumpversion"])
            .stderr_null()
            .read()
    }
}

/// Extract a version from compiler output.
///
/// Handles `11`, `11.4`, `11.4.0` and `gcc (Ubuntu 11.4.0-1ubuntu1) 11.4.0`.
pub fn extract_version(output: &str) -> Option<semver::Version> {
    let re = regex::Regex::new(r"(\d+)(?:\.(\d+))?(?:\.(\d+))?").ok()?;
    let cap = re.captures(output)?;
    let part = |i: usize| {
        cap.get(i)
            .map_or(Some(0), |m| m.as_str().parse::<u64>().ok())
    };
    Some(semver::Version::new(part(1)?, part(2)?, part(3)?))
}

fn locate(probe: &dyn CompilerProbe, name: &str) -> Result<PathBuf, BootstrapError> {
    let path = probe
        .locate(name)
        .ok_or_else(|| CompilerUnavailableSnafu { name }.build())?;
    debug!(compiler = name, path = %path.display(), "located compiler");
    Ok(path)
}

fn major_version(probe: &dyn CompilerProbe, compiler: &Path) -> Result<u64, BootstrapError> {
    let output = probe.version_output(compiler).map_err(|e| {
        CompilerVersionUnreadableSnafu {
            compiler,
            reason: e.to_string(),
        }
        .build()
    })?;

    extract_version(&output)
        .map(|v| v.major)
        .ok_or_else(|| {
            CompilerVersionUnreadableSnafu {
                compiler,
                reason: format!("unrecognised version output '{}'", output.trim()),
            }
            .build()
        })
}

/// Select the host compiler pair for this run.
pub fn resolve_toolchain(
    params: &BootstrapParameters,
    compilers: &CompilerSettings,
    probe: &dyn CompilerProbe,
) -> Result<ToolchainSelection, BootstrapError> {
    let (cc_name, cxx_name) = if params.use_alternate_compiler {
        (&compilers.alternate_cc, &compilers.alternate_cxx)
    } else {
        (&compilers.default_cc, &compilers.default_cxx)
    };

    let cc = locate(probe, cc_name)?;
    let cxx = locate(probe, cxx_name)?;
    let cc_major = major_version(probe, &cc)?;
    let cxx_major = major_version(probe, &cxx)?;
    // the newer of the pair decides
    let (newest, major) = if cxx_major > cc_major {
        (&cxx, cxx_major)
    } else {
        (&cc, cc_major)
    };

    if major > compilers.max_major {
        if params.use_alternate_compiler {
            return CompilerVersionTooNewSnafu {
                compiler: newest.as_path(),
                major,
                max: compilers.max_major,
            }
            .fail();
        }
        warn!(
            compiler = %newest.display(),
            major,
            max = compilers.max_major,
            "default compiler is newer than nvcc supports; consider the WITH_GCC11 path"
        );
    }

    Ok(ToolchainSelection {
        cc,
        cxx,
        major,
        alternate: params.use_alternate_compiler,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Probe over a fixed name -> (path, version output) table.
    struct FakeProbe(HashMap<&'static str, &'static str>);

    impl FakeProbe {
        fn new(entries: &[(&'static str, &'static str)]) -> Self {
            Self(entries.iter().copied().collect())
        }
    }

    impl CompilerProbe for FakeProbe {
        fn locate(&self, name: &str) -> Option<PathBuf> {
            self.0
                .contains_key(name)
                .then(|| PathBuf::from("/usr/bin").join(name))
        }

        fn version_output(&self, compiler: &Path) -> std::io::Result<String> {
            let name = compiler.file_name().unwrap().to_str().unwrap();
            self.0
                .get(name)
                .map(|v| (*v).to_string())
                .ok_or_else(|| std::io::Error::from(std::io::ErrorKind::NotFound))
        }
    }

    fn params(alternate: bool) -> BootstrapParameters {
        BootstrapParameters {
            use_alternate_compiler: alternate,
            ..BootstrapParameters::default()
        }
    }

    #[test]
    fn test_extract_version() {
        assert_eq!(extract_version("11").unwrap().major, 11);
        assert_eq!(extract_version("11.4.0\n").unwrap(), semver::Version::new(11, 4, 0));
        assert_eq!(extract_version("9.4").unwrap(), semver::Version::new(9, 4, 0));
        assert_eq!(
            extract_version("gcc (Ubuntu 13.2.0-4ubuntu3) 13.2.0").unwrap().major,
            13
        );
        assert!(extract_version("no digits here").is_none());
    }

    #[test]
    fn test_default_compiler_selected() {
        let probe = FakeProbe::new(&[("gcc", "10.5.0"), ("g++", "10.5.0")]);
        let tc = resolve_toolchain(&params(false), &CompilerSettings::default(), &probe).unwrap();
        assert_eq!(tc.cc, PathBuf::from("/usr/bin/gcc"));
        assert_eq!(tc.cxx, PathBuf::from("/usr/bin/g++"));
        assert_eq!(tc.major, 10);
        assert!(!tc.alternate);
    }

    #[test]
    fn test_default_compiler_too_new_is_advisory() {
        let probe = FakeProbe::new(&[("gcc", "13.2.0"), ("g++", "13.2.0")]);
        let tc = resolve_toolchain(&params(false), &CompilerSettings::default(), &probe).unwrap();
        assert_eq!(tc.major, 13);
        assert!(tc.exceeds(11));
    }

    #[test]
    fn test_alternate_compiler_missing() {
        let probe = FakeProbe::new(&[("gcc", "13.2.0"), ("g++", "13.2.0")]);
        let err =
            resolve_toolchain(&params(true), &CompilerSettings::default(), &probe).unwrap_err();
        match err {
            BootstrapError::CompilerUnavailable { name } => assert_eq!(name, "gcc-11"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_alternate_cxx_missing() {
        let probe = FakeProbe::new(&[("gcc-11", "11.4.0")]);
        let err =
            resolve_toolchain(&params(true), &CompilerSettings::default(), &probe).unwrap_err();
        assert!(matches!(err, BootstrapError::CompilerUnavailable { name } if name == "g++-11"));
    }

    #[test]
    fn test_alternate_compiler_too_new_is_fatal() {
        // gcc-11 that is really a newer compiler behind the name
        let probe = FakeProbe::new(&[("gcc-11", "12.3.0"), ("g++-11", "12.3.0")]);
        let err =
            resolve_toolchain(&params(true), &CompilerSettings::default(), &probe).unwrap_err();
        match err {
            BootstrapError::CompilerVersionTooNew { major, max, .. } => {
                assert_eq!(major, 12);
                assert_eq!(max, 11);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_alternate_cxx_too_new_is_fatal() {
        let probe = FakeProbe::new(&[("gcc-11", "11.4.0"), ("g++-11", "13.1.0")]);
        let err =
            resolve_toolchain(&params(true), &CompilerSettings::default(), &probe).unwrap_err();
        match err {
            BootstrapError::CompilerVersionTooNew { compiler, major, .. } => {
                assert_eq!(compiler, PathBuf::from("/usr/bin/g++-11"));
                assert_eq!(major, 13);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_default_cxx_newer_than_cc_is_reported() {
        let probe = FakeProbe::new(&[("gcc", "10.5.0"), ("g++", "12.2.0")]);
        let tc = resolve_toolchain(&params(false), &CompilerSettings::default(), &probe).unwrap();
        assert_eq!(tc.major, 12);
        assert!(tc.exceeds(11));
    }

    #[test]
    fn test_alternate_compiler_selected() {
        let probe = FakeProbe::new(&[("gcc-11", "11"), ("g++-11", "11")]);
        let tc = resolve_toolchain(&params(true), &CompilerSettings::default(), &probe).unwrap();
        assert_eq!(tc.cc, PathBuf::from("/usr/bin/gcc-11"));
        assert!(tc.alternate);
        assert!(!tc.exceeds(11));
    }

    #[test]
    fn test_unreadable_version() {
        let probe = FakeProbe::new(&[("gcc", "garbage"), ("g++", "garbage")]);
        let err =
            resolve_toolchain(&params(false), &CompilerSettings::default(), &probe).unwrap_err();
        assert!(matches!(err, BootstrapError::CompilerVersionUnreadable { .. }));
    }
}
