//! Sequential, fail-fast plan execution.
//!
//! Steps run strictly in order. The first failing fatal step stops the run;
//! completed steps are not rolled back.

use crate::bootstrap::patch::PatchOutcome;
use crate::bootstrap::plan::{ProvisioningStep, StepAction, StepCommand};
use crate::error::{BootstrapError, ExitStatusSnafu, SpawnSnafu, StepError};
use serde::Serialize;
use snafu::ResultExt;
use tracing::{info, warn};

/// Result of a single step that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepStatus {
    Completed,
    Skipped { reason: String },
}

/// Runs one step.
pub trait StepRunner {
    fn run(&mut self, step: &ProvisioningStep) -> Result<StepStatus, StepError>;
}

/// Runs commands as child processes with inherited stdio.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl SystemRunner {
    fn run_command(cmd: &StepCommand) -> Result<StepStatus, StepError> {
        if let Some(marker) = cmd.creates.as_ref().filter(|p| p.exists()) {
            return Ok(StepStatus::Skipped {
                reason: format!("{} already exists", marker.display()),
            });
        }

        let mut expr = duct::cmd(&cmd.program, &cmd.args).unchecked();
        for (key, value) in &cmd.env {
            expr = expr.env(key, value);
        }
        if let Some(dir) = &cmd.cwd {
            expr = expr.dir(dir);
        }

        let output = expr.run().context(SpawnSnafu {
            program: cmd.program.as_str(),
        })?;
        if !output.status.success() {
            return ExitStatusSnafu {
                program: cmd.program.as_str(),
                code: output.status.code(),
            }
            .fail();
        }
        Ok(StepStatus::Completed)
    }
}

impl StepRunner for SystemRunner {
    fn run(&mut self, step: &ProvisioningStep) -> Result<StepStatus, StepError> {
        match &step.action {
            StepAction::Command(cmd) => Self::run_command(cmd),
            StepAction::Patch(patch) => match patch.apply()? {
                PatchOutcome::Applied { .. } => Ok(StepStatus::Completed),
                PatchOutcome::AlreadyApplied => Ok(StepStatus::Skipped {
                    reason: "patch already applied".to_string(),
                }),
            },
        }
    }
}

/// Where a step ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    Completed,
    Skipped,
    Failed,
    NotRun,
}

/// Per-step record (1-based index).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    pub index: usize,
    pub description: String,
    pub state: StepState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Overall result of [`execute`].
#[derive(Debug)]
pub enum ExecutionOutcome {
    Success {
        steps: Vec<StepRecord>,
    },
    /// `index` is 1-based.
    FailedAt {
        index: usize,
        error: StepError,
        steps: Vec<StepRecord>,
    },
}

impl ExecutionOutcome {
    pub fn steps(&self) -> &[StepRecord] {
        match self {
            Self::Success { steps } | Self::FailedAt { steps, .. } => steps,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Convert into the error taxonomy.
    pub fn into_result(self) -> Result<(), BootstrapError> {
        match self {
            Self::Success { .. } => Ok(()),
            Self::FailedAt { index, error, steps } => {
                let description = steps
                    .get(index - 1)
                    .map(|s| s.description.clone())
                    .unwrap_or_default();
                Err(BootstrapError::StepExecutionFailed {
                    index,
                    description,
                    source: error,
                })
            }
        }
    }
}

/// Run `plan` in order, stopping at the first fatal failure.
pub fn execute(plan: &[ProvisioningStep], runner: &mut dyn StepRunner) -> ExecutionOutcome {
    let total = plan.len();
    let mut steps: Vec<StepRecord> = plan
        .iter()
        .enumerate()
        .map(|(i, step)| StepRecord {
            index: i + 1,
            description: step.description.clone(),
            state: StepState::NotRun,
            detail: None,
        })
        .collect();

    for (i, step) in plan.iter().enumerate() {
        let index = i + 1;
        println!("🔧 [{index}/{total}] {}", step.description);
        info!(step = index, total, action = %step.action, "running step");

        match runner.run(step) {
            Ok(StepStatus::Completed) => {
                steps[i].state = StepState::Completed;
                println!("  ✅ done");
            }
            Ok(StepStatus::Skipped { reason }) => {
                println!("  ⏭️  skipped: {reason}");
                steps[i].state = StepState::Skipped;
                steps[i].detail = Some(reason);
            }
            Err(error) => {
                eprintln!("  ❌ {error}");
                steps[i].state = StepState::Failed;
                steps[i].detail = Some(error.to_string());
                if step.fatal_on_failure {
                    return ExecutionOutcome::FailedAt {
                        index,
                        error,
                        steps,
                    };
                }
                warn!(step = index, %error, "non-fatal step failed, continuing");
            }
        }
    }

    ExecutionOutcome::Success { steps }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::patch::SourcePatch;

    /// Records which steps ran; fails the step whose index is in `fail_on`.
    struct ScriptedRunner {
        fail_on: Option<usize>,
        ran: Vec<String>,
    }

    impl ScriptedRunner {
        fn new(fail_on: Option<usize>) -> Self {
            Self { fail_on, ran: Vec::new() }
        }
    }

    impl StepRunner for ScriptedRunner {
        fn run(&mut self, step: &ProvisioningStep) -> Result<StepStatus, StepError> {
            self.ran.push(step.description.clone());
            if self.fail_on == Some(self.ran.len()) {
                return Err(StepError::ExitStatus {
                    program: "tool".to_string(),
                    code: Some(7),
                });
            }
            Ok(StepStatus::Completed)
        }
    }

    fn plan(n: usize) -> Vec<ProvisioningStep> {
        (1..=n)
            .map(|i| ProvisioningStep::command(format!("step {i}"), StepCommand::new("true")))
            .collect()
    }

    #[test]
    fn test_all_steps_succeed() {
        let mut runner = ScriptedRunner::new(None);
        let outcome = execute(&plan(5), &mut runner);
        assert!(outcome.is_success());
        assert_eq!(runner.ran.len(), 5);
        assert!(outcome.steps().iter().all(|s| s.state == StepState::Completed));
    }

    #[test]
    fn test_stops_at_first_failure() {
        let mut runner = ScriptedRunner::new(Some(3));
        let outcome = execute(&plan(5), &mut runner);

        assert_eq!(runner.ran, vec!["step 1", "step 2", "step 3"]);
        let states: Vec<StepState> = outcome.steps().iter().map(|s| s.state).collect();
        assert_eq!(
            states,
            vec![
                StepState::Completed,
                StepState::Completed,
                StepState::Failed,
                StepState::NotRun,
                StepState::NotRun,
            ]
        );
        match &outcome {
            ExecutionOutcome::FailedAt { index, error, .. } => {
                assert_eq!(*index, 3);
                assert!(matches!(error, StepError::ExitStatus { code: Some(7), .. }));
            }
            ExecutionOutcome::Success { .. } => panic!("expected failure"),
        }

        let err = outcome.into_result().unwrap_err();
        assert_eq!(err.exit_code(), 7);
        match err {
            BootstrapError::StepExecutionFailed {
                index, description, ..
            } => {
                assert_eq!(index, 3);
                assert_eq!(description, "step 3");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_non_fatal_failure_continues() {
        let mut steps = plan(3);
        steps[1].fatal_on_failure = false;
        let mut runner = ScriptedRunner::new(Some(2));
        let outcome = execute(&steps, &mut runner);
        assert!(outcome.is_success());
        assert_eq!(runner.ran.len(), 3);
        assert_eq!(outcome.steps()[1].state, StepState::Failed);
    }

    #[test]
    fn test_empty_plan_succeeds() {
        let mut runner = ScriptedRunner::new(None);
        assert!(execute(&[], &mut runner).is_success());
    }

    #[test]
    fn test_system_runner_skips_when_marker_exists() {
        let dir = tempfile::tempdir().unwrap();
        let step = ProvisioningStep::command(
            "clone",
            StepCommand::new("definitely-not-a-real-program-xyz").creates(dir.path()),
        );
        let status = SystemRunner.run(&step).unwrap();
        assert!(matches!(status, StepStatus::Skipped { .. }));
    }

    #[test]
    fn test_system_runner_reports_missing_program() {
        let step = ProvisioningStep::command(
            "missing",
            StepCommand::new("definitely-not-a-real-program-xyz"),
        );
        let err = SystemRunner.run(&step).unwrap_err();
        assert!(matches!(err, StepError::Spawn { .. }));
    }

    #[test]
    fn test_system_runner_applies_patch() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("src.cu");
        std::fs::write(&file, "t.type()").unwrap();
        let patch = SourcePatch::new(&file, ".type()", ".scalar_type()");
        let step = ProvisioningStep::patch("patch", patch);

        assert_eq!(SystemRunner.run(&step).unwrap(), StepStatus::Completed);
        assert!(matches!(
            SystemRunner.run(&step).unwrap(),
            StepStatus::Skipped { .. }
        ));
    }
}
