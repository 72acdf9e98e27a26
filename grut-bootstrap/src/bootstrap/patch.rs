//! Fixed textual substitution applied to third-party sources.

use crate::error::{PatchIoSnafu, PatchNotApplicableSnafu, StepError};
use serde::Serialize;
use snafu::ResultExt;
use std::fmt;
use std::path::PathBuf;

/// Replace every occurrence of `find` with `replace` in `file`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourcePatch {
    pub file: PathBuf,
    pub find: String,
    pub replace: String,
}

/// What applying a patch did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOutcome {
    Applied { replacements: usize },
    AlreadyApplied,
}

impl SourcePatch {
    pub fn new(
        file: impl Into<PathBuf>,
        find: impl Into<String>,
        replace: impl Into<String>,
    ) -> Self {
        Self {
            file: file.into(),
            find: find.into(),
            replace: replace.into(),
        }
    }

    /// Apply in place. Re-applying is a no-op.
    pub fn apply(&self) -> Result<PatchOutcome, StepError> {
        let content = std::fs::read_to_string(&self.file).context(PatchIoSnafu {
            file: self.file.as_path(),
        })?;

        let replacements = content.matches(self.find.as_str()).count();
        if replacements == 0 {
            if content.contains(self.replace.as_str()) {
                return Ok(PatchOutcome::AlreadyApplied);
            }
            return PatchNotApplicableSnafu {
                file: self.file.as_path(),
                find: self.find.as_str(),
                replace: self.replace.as_str(),
            }
            .fail();
        }

        let patched = content.replace(self.find.as_str(), &self.replace);
        std::fs::write(&self.file, patched).context(PatchIoSnafu {
            file: self.file.as_path(),
        })?;
        Ok(PatchOutcome::Applied { replacements })
    }
}

impl fmt::Display for SourcePatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "patch {}: '{}' -> '{}'",
            self.file.display(),
            self.find,
            self.replace
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_source(dir: &tempfile::TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("raytrace_cuda.cu");
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_apply_then_reapply() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_source(
            &dir,
            "AT_DISPATCH_FLOATING_TYPES_AND_HALF(feats.type(), ...);\nx.type();\n",
        );
        let patch = SourcePatch::new(&file, ".type()", ".scalar_type()");

        assert_eq!(patch.apply().unwrap(), PatchOutcome::Applied { replacements: 2 });
        let patched = std::fs::read_to_string(&file).unwrap();
        assert!(patched.contains("feats.scalar_type()"));
        assert!(!patched.contains(".type()"));

        assert_eq!(patch.apply().unwrap(), PatchOutcome::AlreadyApplied);
        assert_eq!(std::fs::read_to_string(&file).unwrap(), patched);
    }

    #[test]
    fn test_not_applicable() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_source(&dir, "int main() {}\n");
        let err = SourcePatch::new(&file, ".type()", ".scalar_type()")
            .apply()
            .unwrap_err();
        assert!(matches!(err, StepError::PatchNotApplicable { .. }));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = SourcePatch::new(dir.path().join("absent.cu"), "a", "b")
            .apply()
            .unwrap_err();
        assert!(matches!(err, StepError::PatchIo { .. }));
    }
}
