//! CUDA version table: supported versions and their architecture profiles.
//!
//! Every per-version lookup is an exhaustive `match` on [`CudaVersion`], so a
//! new version is one enum variant plus one arm in each table.

use crate::error::{BootstrapError, UnsupportedCudaVersionSnafu};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// CUDA toolkit versions the bootstrap knows how to provision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CudaVersion {
    /// 11.8 supports compute capability up to 9.0
    Cuda118,
    /// 12.8 adds compute capability 10.0 and 12.0
    Cuda1281,
}

impl CudaVersion {
    pub const ALL: [Self; 2] = [Self::Cuda118, Self::Cuda1281];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cuda118 => "11.8.0",
            Self::Cuda1281 => "12.8.1",
        }
    }

    /// Parse an exact version string.
    pub fn parse(version: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.as_str() == version.trim())
    }

    /// Comma-separated list for error messages.
    pub fn supported_list() -> String {
        Self::ALL
            .iter()
            .map(|v| v.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Conda channel carrying this toolkit.
    pub fn conda_channel(self) -> String {
        format!("nvidia/label/cuda-{}", self.as_str())
    }

    /// Wheel index tag used by the PyTorch index (`cu118`, `cu128`).
    pub fn torch_tag(self) -> &'static str {
        match self {
            Self::Cuda118 => "cu118",
            Self::Cuda1281 => "cu128",
        }
    }

    /// Pinned `torch`, `torchvision`, `torchaudio` versions.
    pub fn torch_pins(self) -> [&'static str; 3] {
        match self {
            Self::Cuda118 => ["torch==2.1.2", "torchvision==0.16.2", "torchaudio==2.1.2"],
            Self::Cuda1281 => ["torch==2.7.0", "torchvision==0.22.0", "torchaudio==2.7.0"],
        }
    }

    fn cuda_home(self) -> &'static str {
        match self {
            Self::Cuda118 => "/usr/local/cuda-11.8",
            Self::Cuda1281 => "/usr/local/cuda-12.8",
        }
    }

    fn arch_list(self) -> &'static [&'static str] {
        match self {
            Self::Cuda118 => &["7.0", "7.5", "8.0", "8.6", "9.0"],
            Self::Cuda1281 => &["7.5", "8.0", "8.6", "9.0", "10.0", "12.0"],
        }
    }
}

impl fmt::Display for CudaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Toolkit location and target compute capabilities for one CUDA version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchProfile {
    pub cuda_version: CudaVersion,
    pub cuda_home: PathBuf,
    pub arch_list: Vec<&'static str>,
}

impl ArchProfile {
    /// `TORCH_CUDA_ARCH_LIST` value, e.g. `7.0;7.5;8.0;8.6;9.0`.
    pub fn arch_list_value(&self) -> String {
        self.arch_list.join(";")
    }
}

impl From<CudaVersion> for ArchProfile {
    fn from(cuda_version: CudaVersion) -> Self {
        Self {
            cuda_version,
            cuda_home: PathBuf::from(cuda_version.cuda_home()),
            arch_list: cuda_version.arch_list().to_vec(),
        }
    }
}

/// Look up the architecture profile for a CUDA version string.
pub fn resolve_arch_profile(cuda_version: &str) -> Result<ArchProfile, BootstrapError> {
    let version = CudaVersion::parse(cuda_version).ok_or_else(|| {
        UnsupportedCudaVersionSnafu {
            version: cuda_version,
            supported: CudaVersion::supported_list(),
        }
        .build()
    })?;
    Ok(ArchProfile::from(version))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cuda_11_8_profile() {
        let profile = resolve_arch_profile("11.8.0").unwrap();
        assert_eq!(profile.arch_list_value(), "7.0;7.5;8.0;8.6;9.0");
        assert_eq!(profile.cuda_home, PathBuf::from("/usr/local/cuda-11.8"));
        assert_eq!(profile.cuda_version, CudaVersion::Cuda118);
    }

    #[test]
    fn test_cuda_12_8_profile() {
        let profile = resolve_arch_profile("12.8.1").unwrap();
        assert_eq!(profile.arch_list_value(), "7.5;8.0;8.6;9.0;10.0;12.0");
        assert_eq!(profile.cuda_home, PathBuf::from("/usr/local/cuda-12.8"));
    }

    #[test]
    fn test_unsupported_versions_rejected() {
        for version in ["99.0.0", "12.8", "11.8", "", "12.8.1-rc", "WITH_GCC11"] {
            let err = resolve_arch_profile(version).unwrap_err();
            match err {
                BootstrapError::UnsupportedCudaVersion { version: v, supported } => {
                    assert_eq!(v, version);
                    assert_eq!(supported, "11.8.0, 12.8.1");
                }
                other => panic!("unexpected error: {other}"),
            }
        }
    }

    #[test]
    fn test_every_version_has_a_consistent_profile() {
        for version in CudaVersion::ALL {
            assert_eq!(CudaVersion::parse(version.as_str()), Some(version));

            let profile = ArchProfile::from(version);
            let major_minor: String = version
                .as_str()
                .rsplitn(2, '.')
                .nth(1)
                .unwrap()
                .to_string();
            assert!(profile.cuda_home.ends_with(format!("cuda-{major_minor}")));
            assert!(!profile.arch_list.is_empty());
            assert!(version.torch_tag().starts_with("cu"));
        }
    }

    #[test]
    fn test_arch_lists_are_ascending() {
        for version in CudaVersion::ALL {
            let caps: Vec<f32> = ArchProfile::from(version)
                .arch_list
                .iter()
                .map(|c| c.parse().unwrap())
                .collect();
            assert!(caps.windows(2).all(|w| w[0] < w[1]));
        }
    }
}
