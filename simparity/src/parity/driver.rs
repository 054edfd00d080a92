// src/parity/driver.rs
//
// Comparison driver: the full regular-vs-debug workflow.
//
// 1. Preflight both executables
// 2. Regular variant end to end
// 3. Debug variant end to end (never attempted if 2 failed)
// 4. Instrumentation check on the debug backup
// 5. Pairwise comparison of the two backups
//
// Harness failures short-circuit into an aborted report; artifact
// mismatches are collected and never stop the comparison.

use anyhow::Result;
use serde_json::json;
use std::collections::BTreeSet;
use tracing::{info, warn};

use super::classify::ArtifactClassifier;
use super::compare::{compare, ComparisonVerdict, DEFAULT_TOLERANCE};
use super::failure::HarnessFailure;
use super::orchestrator::{RunConfiguration, RunOrchestrator, VariantOutcome, VariantRun};
use super::report::ComparisonReport;
use super::runner::CommandRunner;
use super::workspace::{BackupWorkspace, OutputWorkspace, TestLayout};
use crate::telemetry::TelemetrySink;

/// Every instrumentation category the debug build may write into.
pub fn default_debug_categories() -> Vec<String> {
    [
        "state",
        "derivatives",
        "reconstruction",
        "wavespeeds",
        "fluxes",
        "interface",
        "rk_stages",
        "sources",
        "dispersion",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Categories that must contain at least one artifact after a debug run.
pub fn default_required_categories() -> Vec<String> {
    ["state", "derivatives", "reconstruction"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Debug subtree layout plus the instrumentation-check policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugCategories {
    /// Directories created under `output/debug/` before the debug run.
    pub all: Vec<String>,
    /// Subset checked for artifacts after the debug run.
    pub required: Vec<String>,
    /// Extension a file must carry to count as a debug artifact.
    /// `None` counts every file.
    pub artifact_extension: Option<String>,
}

impl Default for DebugCategories {
    fn default() -> Self {
        Self {
            all: default_debug_categories(),
            required: default_required_categories(),
            artifact_extension: Some("txt".to_string()),
        }
    }
}

/// Runs both variants and compares their archived outputs.
pub struct ComparisonDriver<R> {
    orchestrator: RunOrchestrator<R>,
    classifier: ArtifactClassifier,
    tolerance: f64,
    telemetry: TelemetrySink,
}

impl<R: CommandRunner> ComparisonDriver<R> {
    pub fn new(orchestrator: RunOrchestrator<R>) -> Self {
        Self {
            orchestrator,
            classifier: ArtifactClassifier::default(),
            tolerance: DEFAULT_TOLERANCE,
            telemetry: TelemetrySink::default(),
        }
    }

    pub fn with_classifier(mut self, classifier: ArtifactClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_telemetry(mut self, telemetry: TelemetrySink) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Run regular then debug, check instrumentation, and compare backups.
    ///
    /// Returns `Err` only for unexpected filesystem errors; every expected
    /// failure is carried in the report.
    pub fn run_full_comparison(
        &mut self,
        regular: &RunConfiguration,
        debug: &RunConfiguration,
        categories: &DebugCategories,
    ) -> Result<ComparisonReport> {
        for config in [regular, debug] {
            if let Err(failure) = self.orchestrator.preflight(config) {
                return Ok(self.abort(failure));
            }
        }

        info!("Step 1: Running REGULAR mode");
        let regular_run = match self.run_variant(regular, &[])? {
            VariantOutcome::Completed(run) => run,
            VariantOutcome::Failed(failure) => return Ok(self.abort(failure)),
        };

        info!("Step 2: Running DEBUG mode");
        let debug_run = match self.run_variant(debug, &categories.all)? {
            VariantOutcome::Completed(run) => run,
            VariantOutcome::Failed(failure) => return Ok(self.abort(failure)),
        };

        info!("Step 3: Checking debug instrumentation");
        let debug_artifacts = debug_run
            .backup
            .count_debug_artifacts(&categories.required, categories.artifact_extension.as_deref())?;
        info!(debug_artifacts, "debug artifacts found");
        if debug_artifacts == 0 {
            return Ok(self.abort(HarnessFailure::InstrumentationInert {
                categories: categories.required.clone(),
            }));
        }

        info!("Step 4: Comparing outputs");
        let mut report = compare_backups(
            &regular_run.backup,
            &debug_run.backup,
            &self.classifier,
            self.tolerance,
        )?;
        report.debug_artifacts = debug_artifacts;

        for verdict in &report.verdicts {
            self.telemetry.event("verdict", json!(verdict));
        }
        self.finish(&report);
        Ok(report)
    }

    fn run_variant(
        &mut self,
        config: &RunConfiguration,
        debug_categories: &[String],
    ) -> Result<VariantOutcome> {
        let layout = TestLayout::new(&config.working_directory);
        let workspace = OutputWorkspace::new(layout.output_dir());
        let backup_path = layout.backup_dir(config.variant);

        self.telemetry.event(
            "variant_started",
            json!({
                "variant": config.variant,
                "executable": config.executable,
                "processes": config.processes,
            }),
        );

        let outcome = self
            .orchestrator
            .execute_variant(config, &workspace, &backup_path, debug_categories)?;

        match &outcome {
            VariantOutcome::Completed(VariantRun { result, backup }) => {
                self.telemetry.event(
                    "variant_completed",
                    json!({
                        "variant": config.variant,
                        "elapsed_ms": result.elapsed_ms,
                        "backup": backup.path(),
                    }),
                );
            }
            VariantOutcome::Failed(failure) => {
                self.telemetry.event(
                    "variant_failed",
                    json!({ "variant": config.variant, "error": failure }),
                );
            }
        }
        Ok(outcome)
    }

    fn abort(&mut self, failure: HarnessFailure) -> ComparisonReport {
        warn!(failure = %failure, "comparison aborted");
        let report = ComparisonReport::aborted(failure, self.tolerance);
        self.finish(&report);
        report
    }

    fn finish(&mut self, report: &ComparisonReport) {
        self.telemetry.event(
            "report",
            json!({
                "passed": report.passed,
                "comparisons": report.verdicts.len(),
                "failing": report.failing_verdicts().count(),
                "debug_artifacts": report.debug_artifacts,
            }),
        );
        self.telemetry.flush();
    }
}

/// Compare every top-level artifact of two backups.
///
/// Regular-backup files are paired by name with the debug backup. Files
/// present only in the debug backup are reported as missing on the regular
/// side. Debug-named files are skipped on both sides. Verdicts are sorted by
/// artifact name.
pub fn compare_backups(
    regular: &BackupWorkspace,
    debug: &BackupWorkspace,
    classifier: &ArtifactClassifier,
    tolerance: f64,
) -> Result<ComparisonReport> {
    let regular_names: Vec<String> = regular
        .top_level_files()?
        .into_iter()
        .filter(|name| !classifier.is_excluded(name))
        .collect();
    let regular_set: BTreeSet<&str> = regular_names.iter().map(String::as_str).collect();

    let mut verdicts = Vec::with_capacity(regular_names.len());
    for name in &regular_names {
        let mode = classifier.classify(name);
        let verdict = compare(
            &regular.path().join(name),
            &debug.path().join(name),
            mode,
            tolerance,
        )?;
        if !verdict.matched {
            warn!(artifact = %name, diagnostic = %verdict.diagnostic, "artifact mismatch");
        }
        verdicts.push(verdict);
    }

    for name in debug.top_level_files()? {
        if classifier.is_excluded(&name) || regular_set.contains(name.as_str()) {
            continue;
        }
        warn!(artifact = %name, "artifact only present in debug output");
        verdicts.push(ComparisonVerdict::missing(
            &name,
            classifier.classify(&name),
            &regular.path().join(&name),
        ));
    }

    verdicts.sort_by(|a, b| a.artifact.cmp(&b.artifact));
    if verdicts.is_empty() {
        warn!(backup = %regular.path().display(), "no artifacts to compare");
    }

    Ok(ComparisonReport::from_verdicts(
        verdicts,
        regular_names.len(),
        tolerance,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_categories() {
        let categories = DebugCategories::default();
        assert_eq!(categories.all.len(), 9);
        assert!(categories
            .required
            .iter()
            .all(|r| categories.all.contains(r)));
        assert_eq!(categories.artifact_extension.as_deref(), Some("txt"));
    }
}
