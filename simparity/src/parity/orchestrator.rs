// src/parity/orchestrator.rs
//
// Run orchestrator: one simulator variant end to end.
//
// Steps per variant:
// 1. Preflight (executable exists)
// 2. Reset the live workspace (and seed the debug subtree for debug runs)
// 3. Launch `<launcher> -np <N> <exe>` in the test directory
// 4. Validate exit code + success marker
// 5. Commit the workspace to the variant's backup
//
// Run failures come back as `VariantOutcome::Failed`; only unexpected
// filesystem errors are returned as `Err`.

use anyhow::{Context, Result};
use serde::Serialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use super::failure::{build_hint, HarnessFailure};
use super::runner::{CommandRunner, RunResult, RunnerError};
use super::workspace::{BackupWorkspace, OutputWorkspace, Variant};

/// Literal the simulator prints on a clean shutdown.
pub const DEFAULT_SUCCESS_MARKER: &str = "Normal Termination!";

/// How much of stdout to keep when the success marker is missing.
pub const OUTPUT_TAIL_CHARS: usize = 500;

/// Everything needed to launch one simulator variant. Immutable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunConfiguration {
    /// Which build this is.
    pub variant: Variant,
    /// Path to the simulator executable.
    pub executable: PathBuf,
    /// Parallel launcher (e.g. `mpirun`). Inserted into the shell command as is.
    pub launcher: String,
    /// Process count passed as `-np`.
    pub processes: u32,
    /// Directory the simulator runs in (parent of `output/`).
    pub working_directory: PathBuf,
    /// Wall-clock budget for the run.
    pub timeout: Duration,
}

impl RunConfiguration {
    /// The shell command line for this run.
    ///
    /// The executable is made absolute against the current directory and
    /// quoted when the shell would otherwise split it.
    pub fn command_line(&self) -> Result<String> {
        let executable = if self.executable.is_absolute() {
            self.executable.clone()
        } else {
            env::current_dir()
                .context("Failed to resolve current directory")?
                .join(&self.executable)
        };
        Ok(format!(
            "{} -np {} {}",
            self.launcher,
            self.processes,
            shell_quote(&executable.to_string_lossy())
        ))
    }
}

/// Quote `arg` for `sh` if it contains anything beyond a safe charset.
pub fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '.' | '_' | '-' | '+' | ':' | ',' | '='));
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

/// A variant that ran cleanly and was archived.
#[derive(Debug, Clone)]
pub struct VariantRun {
    pub result: RunResult,
    pub backup: BackupWorkspace,
}

/// Result of orchestrating one variant.
#[derive(Debug, Clone)]
pub enum VariantOutcome {
    Completed(VariantRun),
    Failed(HarnessFailure),
}

/// Drives single-variant runs through a `CommandRunner`.
#[derive(Debug)]
pub struct RunOrchestrator<R> {
    runner: R,
    success_marker: String,
}

impl<R: CommandRunner> RunOrchestrator<R> {
    pub fn new(runner: R) -> Self {
        Self {
            runner,
            success_marker: DEFAULT_SUCCESS_MARKER.to_string(),
        }
    }

    /// Override the literal that marks a clean simulator exit.
    pub fn with_success_marker(mut self, marker: impl Into<String>) -> Self {
        self.success_marker = marker.into();
        self
    }

    /// Verify the executable exists before anything is touched.
    pub fn preflight(&self, config: &RunConfiguration) -> Result<(), HarnessFailure> {
        if config.executable.is_file() {
            Ok(())
        } else {
            Err(HarnessFailure::ExecutableMissing {
                variant: config.variant,
                path: config.executable.clone(),
                hint: build_hint(config.variant),
            })
        }
    }

    /// Run one variant end to end and archive its outputs on success.
    ///
    /// `debug_categories` non-empty marks a debug run: the
    /// `debug/<category>/` subtree is created before launch.
    pub fn execute_variant(
        &self,
        config: &RunConfiguration,
        workspace: &OutputWorkspace,
        backup_path: &Path,
        debug_categories: &[String],
    ) -> Result<VariantOutcome> {
        if let Err(failure) = self.preflight(config) {
            return Ok(VariantOutcome::Failed(failure));
        }

        workspace.reset()?;
        if !debug_categories.is_empty() {
            workspace.seed_debug_tree(debug_categories)?;
        }

        let command = config.command_line()?;
        info!(
            variant = config.variant.as_str(),
            command = %command,
            cwd = %config.working_directory.display(),
            "running"
        );

        let result = match self
            .runner
            .run(&command, &config.working_directory, config.timeout)
        {
            Ok(result) => result,
            Err(RunnerError::TimeoutExceeded { timeout }) => {
                warn!(variant = config.variant.as_str(), ?timeout, "run timed out");
                return Ok(VariantOutcome::Failed(HarnessFailure::Timeout {
                    variant: config.variant,
                    timeout_secs: timeout.as_secs_f64(),
                }));
            }
            Err(err) => {
                warn!(variant = config.variant.as_str(), error = %err, "run could not start");
                return Ok(VariantOutcome::Failed(HarnessFailure::SpawnFailed {
                    variant: config.variant,
                    message: err.to_string(),
                }));
            }
        };

        if let Some(failure) = self.check_result(config.variant, &result) {
            return Ok(VariantOutcome::Failed(failure));
        }
        info!(
            variant = config.variant.as_str(),
            elapsed_ms = result.elapsed_ms,
            "completed successfully"
        );

        let backup = workspace.commit_to(backup_path, config.variant)?;
        Ok(VariantOutcome::Completed(VariantRun { result, backup }))
    }

    /// Map a finished run onto a failure, or `None` if it succeeded.
    pub fn check_result(&self, variant: Variant, result: &RunResult) -> Option<HarnessFailure> {
        if result.exit_code != Some(0) {
            return Some(HarnessFailure::NonZeroExit {
                variant,
                exit_code: result.exit_code,
                stderr: result.stderr.clone(),
            });
        }
        if !result.is_success(&self.success_marker) {
            return Some(HarnessFailure::MissingSuccessMarker {
                variant,
                marker: self.success_marker.clone(),
                stdout_tail: result.stdout_tail(OUTPUT_TAIL_CHARS).to_string(),
            });
        }
        None
    }
}
