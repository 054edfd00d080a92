// src/parity/failure.rs
//
// Structured harness failures: everything that aborts a comparison before
// any artifact is checked. Artifact-level mismatches are verdicts, not
// failures, and never abort the run.

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

use super::workspace::Variant;

/// A failure that aborts the two-run comparison.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "failure", rename_all = "snake_case")]
pub enum HarnessFailure {
    /// Preflight: an executable does not exist.
    #[error("{variant} executable not found: {}", .path.display())]
    ExecutableMissing {
        variant: Variant,
        path: PathBuf,
        hint: String,
    },
    /// The simulator exited non-zero (or was killed by a signal).
    #[error("{variant} mode FAILED (exit code {})", exit_code_label(.exit_code))]
    NonZeroExit {
        variant: Variant,
        exit_code: Option<i32>,
        stderr: String,
    },
    /// Exit 0 but the success marker never appeared in stdout.
    #[error("{variant} mode did not complete successfully (no {marker:?} in output)")]
    MissingSuccessMarker {
        variant: Variant,
        marker: String,
        stdout_tail: String,
    },
    /// The simulator exceeded its time budget and was killed.
    #[error("{variant} mode timed out after {timeout_secs}s")]
    Timeout { variant: Variant, timeout_secs: f64 },
    /// The process could not be started or waited on.
    #[error("{variant} mode could not be run: {message}")]
    SpawnFailed { variant: Variant, message: String },
    /// The debug run wrote nothing into the instrumented categories.
    #[error("No debug files created in {}", .categories.join(", "))]
    InstrumentationInert { categories: Vec<String> },
}

impl HarnessFailure {
    /// Captured process output worth showing the operator, if any.
    pub fn details(&self) -> Option<&str> {
        match self {
            HarnessFailure::NonZeroExit { stderr, .. } if !stderr.trim().is_empty() => {
                Some(stderr.as_str())
            }
            HarnessFailure::MissingSuccessMarker { stdout_tail, .. }
                if !stdout_tail.trim().is_empty() =>
            {
                Some(stdout_tail.as_str())
            }
            _ => None,
        }
    }

    /// Remediation hint, if any.
    pub fn hint(&self) -> Option<&str> {
        match self {
            HarnessFailure::ExecutableMissing { hint, .. } => Some(hint.as_str()),
            HarnessFailure::InstrumentationInert { .. } => {
                Some("Check that the debug build enables the DEBUG_* flags")
            }
            _ => None,
        }
    }

    /// The variant that failed, if the failure belongs to one run.
    pub fn variant(&self) -> Option<Variant> {
        match self {
            HarnessFailure::ExecutableMissing { variant, .. }
            | HarnessFailure::NonZeroExit { variant, .. }
            | HarnessFailure::MissingSuccessMarker { variant, .. }
            | HarnessFailure::Timeout { variant, .. }
            | HarnessFailure::SpawnFailed { variant, .. } => Some(*variant),
            HarnessFailure::InstrumentationInert { .. } => Some(Variant::Debug),
        }
    }
}

fn exit_code_label(exit_code: &Option<i32>) -> String {
    match exit_code {
        Some(code) => code.to_string(),
        None => "none: killed by signal".to_string(),
    }
}

/// Default build hint for a missing executable.
pub fn build_hint(variant: Variant) -> String {
    match variant {
        Variant::Regular => "Run: make clean && make".to_string(),
        Variant::Debug => "Run: make clean && make debug".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let missing = HarnessFailure::ExecutableMissing {
            variant: Variant::Regular,
            path: PathBuf::from("funwave-work/funwave"),
            hint: build_hint(Variant::Regular),
        };
        assert_eq!(
            missing.to_string(),
            "Regular executable not found: funwave-work/funwave"
        );
        assert_eq!(missing.hint(), Some("Run: make clean && make"));

        let exit = HarnessFailure::NonZeroExit {
            variant: Variant::Debug,
            exit_code: Some(139),
            stderr: "segfault".to_string(),
        };
        assert_eq!(exit.to_string(), "Debug mode FAILED (exit code 139)");
        assert_eq!(exit.details(), Some("segfault"));

        let signalled = HarnessFailure::NonZeroExit {
            variant: Variant::Debug,
            exit_code: None,
            stderr: String::new(),
        };
        assert!(signalled.to_string().contains("killed by signal"));
        assert_eq!(signalled.details(), None);
    }

    #[test]
    fn test_inert_failure_names_categories() {
        let inert = HarnessFailure::InstrumentationInert {
            categories: vec!["state".to_string(), "derivatives".to_string()],
        };
        assert_eq!(
            inert.to_string(),
            "No debug files created in state, derivatives"
        );
        assert_eq!(inert.variant(), Some(Variant::Debug));
    }

    #[test]
    fn test_serializes_with_tag() {
        let failure = HarnessFailure::Timeout {
            variant: Variant::Regular,
            timeout_secs: 60.0,
        };
        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["failure"], "timeout");
        assert_eq!(json["variant"], "regular");
    }
}
