// src/parity/mod.rs
//
// Regular-vs-debug parity harness.
//
// This module provides:
// - CommandRunner / ShellRunner: timeout-bounded process execution
// - OutputWorkspace / BackupWorkspace: the on-disk output lifecycle
// - RunOrchestrator: one simulator variant end to end
// - ArtifactClassifier + compare: per-artifact verdicts
// - ComparisonDriver: both variants, instrumentation check, backup comparison
// - ComparisonReport: console / JSON rendering of the outcome
//
// Design principle: instrumentation must never change simulation results, so
// every regular artifact is held against its debug counterpart.

pub mod classify;
pub mod compare;
pub mod driver;
pub mod failure;
pub mod orchestrator;
pub mod provenance;
pub mod report;
pub mod runner;
pub mod workspace;

pub use classify::{ArtifactClassifier, ComparisonMode, NameRule};
pub use compare::{ComparisonVerdict, VerdictKind, DEFAULT_TOLERANCE};
pub use driver::{compare_backups, ComparisonDriver, DebugCategories};
pub use failure::HarnessFailure;
pub use orchestrator::{RunConfiguration, RunOrchestrator};
pub use report::ComparisonReport;
pub use runner::{CommandRunner, RunResult, RunnerError, ShellRunner};
pub use workspace::{BackupWorkspace, TestLayout, Variant};
