//! Run report: human summary on stdout, optional TOML file.

use crate::bootstrap::arch::ArchProfile;
use crate::bootstrap::executor::{ExecutionOutcome, StepRecord, StepState};
use crate::bootstrap::params::BootstrapParameters;
use crate::bootstrap::toolchain::ToolchainSelection;
use crate::settings::expand_path;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Everything worth keeping about one bootstrap run.
#[derive(Debug, Serialize)]
pub struct BootstrapReport {
    pub timestamp: String,
    pub outcome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<usize>,
    pub cuda_home: PathBuf,
    pub arch_list: String,
    pub parameters: BootstrapParameters,
    pub toolchain: ToolchainSelection,
    pub steps: Vec<StepRecord>,
}

impl BootstrapReport {
    pub fn new(
        parameters: &BootstrapParameters,
        arch: &ArchProfile,
        toolchain: &ToolchainSelection,
        outcome: &ExecutionOutcome,
    ) -> Self {
        let failed_step = match outcome {
            ExecutionOutcome::FailedAt { index, .. } => Some(*index),
            ExecutionOutcome::Success { .. } => None,
        };
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            outcome: if failed_step.is_some() { "failed" } else { "success" }.to_string(),
            failed_step,
            cuda_home: arch.cuda_home.clone(),
            arch_list: arch.arch_list_value(),
            parameters: parameters.clone(),
            toolchain: toolchain.clone(),
            steps: outcome.steps().to_vec(),
        }
    }
}

/// Serialize the report as TOML.
pub fn serialize_report(report: &BootstrapReport) -> Result<String> {
    toml::to_string(report).context("Failed to serialize bootstrap report")
}

/// Write the report to `output_path` (`~` is expanded).
pub fn generate_report(report: &BootstrapReport, output_path: &Path) -> Result<PathBuf> {
    let content = serialize_report(report)?;
    let final_path = expand_path(output_path);

    if let Some(parent) = final_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create parent directory: {}", parent.display()))?;
    }

    fs::write(&final_path, content)
        .with_context(|| format!("Failed to write report to {}", final_path.display()))?;

    Ok(final_path)
}

/// Print the report in human-readable form.
pub fn print_report(report: &BootstrapReport) {
    println!("🥾 3DGRUT Bootstrap Report");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Generated:   {}", report.timestamp);
    println!("Environment: {}", report.parameters.environment_name);
    println!("CUDA:        {} ({})", report.parameters.cuda_version, report.cuda_home.display());
    println!("Arch list:   {}", report.arch_list);
    println!(
        "Compilers:   {} / {} (major {})",
        report.toolchain.cc.display(),
        report.toolchain.cxx.display(),
        report.toolchain.major
    );
    println!();

    println!("📦 Steps:");
    for step in &report.steps {
        let status = match step.state {
            StepState::Completed => "✅",
            StepState::Skipped => "⏭️ ",
            StepState::Failed => "❌",
            StepState::NotRun => "  ",
        };
        print!("  {} {:>2}. {}", status, step.index, step.description);
        match &step.detail {
            Some(detail) => println!(" ({detail})"),
            None => println!(),
        }
    }

    println!();
    match report.failed_step {
        None => println!("✅ Setup completed successfully!"),
        Some(index) => println!("⚠️  Bootstrap stopped at step {index}; re-run after fixing it"),
    }
}
