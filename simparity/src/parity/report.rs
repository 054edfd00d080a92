// src/parity/report.rs
//
// Comparison report: the harness's final output. Rendered as a console
// report or serialized as JSON on stdout; never written to disk.

use serde::Serialize;
use std::io::{self, Write};

use super::compare::{format_sci, ComparisonVerdict, VerdictKind};
use super::failure::HarnessFailure;

const RULE_HEAVY: &str =
    "══════════════════════════════════════════════════════════════════════";
const RULE_LIGHT: &str =
    "──────────────────────────────────────────────────────────────────────";

/// Outcome of a full regular-vs-debug comparison.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonReport {
    /// True iff no run failed and every verdict matched.
    pub passed: bool,
    /// Failure that aborted the comparison before any artifact was checked.
    pub failure: Option<HarnessFailure>,
    /// One verdict per compared artifact, sorted by name.
    pub verdicts: Vec<ComparisonVerdict>,
    /// Debug artifacts found in the required categories.
    pub debug_artifacts: usize,
    /// Regular-backup files enumerated for comparison.
    pub regular_artifacts: usize,
    /// Numeric tolerance in effect.
    pub tolerance: f64,
}

impl ComparisonReport {
    /// A report for a comparison that never reached the artifact stage.
    pub fn aborted(failure: HarnessFailure, tolerance: f64) -> Self {
        Self {
            passed: false,
            failure: Some(failure),
            verdicts: Vec::new(),
            debug_artifacts: 0,
            regular_artifacts: 0,
            tolerance,
        }
    }

    /// A report built from a completed set of verdicts.
    pub fn from_verdicts(
        verdicts: Vec<ComparisonVerdict>,
        regular_artifacts: usize,
        tolerance: f64,
    ) -> Self {
        let passed = verdicts.iter().all(|v| v.matched);
        Self {
            passed,
            failure: None,
            verdicts,
            debug_artifacts: 0,
            regular_artifacts,
            tolerance,
        }
    }

    /// Verdicts that did not match.
    pub fn failing_verdicts(&self) -> impl Iterator<Item = &ComparisonVerdict> {
        self.verdicts.iter().filter(|v| !v.matched)
    }

    /// Number of numeric comparisons performed.
    pub fn numeric_comparisons(&self) -> usize {
        self.verdicts
            .iter()
            .filter(|v| v.max_abs_diff.is_some())
            .count()
    }

    /// Process exit code for this report.
    pub fn exit_code(&self) -> i32 {
        if self.passed {
            0
        } else {
            1
        }
    }
}

/// Status marker printed in front of a verdict.
fn status_icon(verdict: &ComparisonVerdict) -> &'static str {
    match (verdict.matched, verdict.kind) {
        (true, _) => "✓",
        (false, VerdictKind::Unparseable) => "⚠",
        (false, _) => "✗",
    }
}

/// Print the run header (requirement and tolerance).
pub fn write_header<W: Write>(out: &mut W, tolerance: f64) -> io::Result<()> {
    writeln!(out, "{}", RULE_HEAVY)?;
    writeln!(out, "CRITICAL TEST: Regular vs Debug Mode Comparison")?;
    writeln!(out, "{}", RULE_HEAVY)?;
    writeln!(out)?;
    writeln!(
        out,
        "Requirement: Debug instrumentation must NOT affect simulation results"
    )?;
    writeln!(out, "Tolerance: <= {} (near machine precision)", format_sci(tolerance))?;
    writeln!(out)?;
    Ok(())
}

/// Render the full console report.
pub fn write_report<W: Write>(out: &mut W, report: &ComparisonReport) -> io::Result<()> {
    if !report.verdicts.is_empty() || report.failure.is_none() {
        writeln!(out, "Comparing simulation outputs...")?;
        writeln!(out, "{}", RULE_LIGHT)?;
        for verdict in &report.verdicts {
            writeln!(
                out,
                "{} {:<20} {}",
                status_icon(verdict),
                verdict.artifact,
                verdict.diagnostic
            )?;
        }
        writeln!(out)?;
    }

    writeln!(out, "{}", RULE_HEAVY)?;
    writeln!(out, "SUMMARY")?;
    writeln!(out, "{}", RULE_HEAVY)?;

    if let Some(failure) = &report.failure {
        writeln!(out, "✗ FAIL: {}", failure)?;
        if let Some(details) = failure.details() {
            writeln!(out)?;
            for line in details.trim_end().lines() {
                writeln!(out, "  | {}", line)?;
            }
        }
        if let Some(hint) = failure.hint() {
            writeln!(out)?;
            writeln!(out, "  {}", hint)?;
        }
        return Ok(());
    }

    if report.passed {
        writeln!(
            out,
            "✓ PASS: Debug instrumentation does NOT affect simulation results"
        )?;
        writeln!(out)?;
        writeln!(
            out,
            "All simulation outputs are identical between regular and debug modes"
        )?;
        writeln!(
            out,
            "(difference <= {}, essentially machine precision)",
            format_sci(report.tolerance)
        )?;
        writeln!(out)?;
        write_counts(out, report)?;
        return Ok(());
    }

    writeln!(out, "✗ FAIL: Debug instrumentation AFFECTS simulation results")?;
    writeln!(out)?;
    writeln!(
        out,
        "This is a critical failure. Debug instrumentation must not change"
    )?;
    writeln!(out, "the simulation outputs. Check for:")?;
    writeln!(out, "  - Unintended side effects in debug code")?;
    writeln!(out, "  - Missing conditional compilation directives")?;
    writeln!(out, "  - Incorrect variable usage")?;
    writeln!(out)?;
    write_counts(out, report)?;
    writeln!(out)?;
    writeln!(out, "Failed comparisons:")?;
    for verdict in report.failing_verdicts() {
        writeln!(out, "  - {}: {}", verdict.artifact, verdict.diagnostic)?;
    }
    Ok(())
}

fn write_counts<W: Write>(out: &mut W, report: &ComparisonReport) -> io::Result<()> {
    writeln!(out, "Debug files created: {}", report.debug_artifacts)?;
    writeln!(out, "Regular outputs: {}", report.regular_artifacts)?;
    writeln!(out, "Comparisons: {}", report.verdicts.len())?;
    Ok(())
}

/// Serialize the report as pretty JSON.
pub fn write_json<W: Write>(out: &mut W, report: &ComparisonReport) -> io::Result<()> {
    serde_json::to_writer_pretty(&mut *out, report)?;
    writeln!(out)?;
    Ok(())
}
