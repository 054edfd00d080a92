// tests/backup_comparison_tests.rs
//
// compare_backups on hand-built backup directories.

use std::fs;
use std::path::Path;

use simparity::parity::{
    compare_backups, ArtifactClassifier, BackupWorkspace, ComparisonMode, NameRule, Variant,
    VerdictKind, DEFAULT_TOLERANCE,
};
use tempfile::TempDir;

struct Backups {
    _temp: TempDir,
    regular: BackupWorkspace,
    debug: BackupWorkspace,
}

fn backups() -> Backups {
    let temp = tempfile::tempdir().unwrap();
    let regular = temp.path().join("output_regular_backup");
    let debug = temp.path().join("output_debug_backup");
    fs::create_dir_all(&regular).unwrap();
    fs::create_dir_all(debug.join("debug/state")).unwrap();
    fs::write(debug.join("debug/state/eta_step_0001.txt"), "0.0\n").unwrap();

    Backups {
        regular: BackupWorkspace::open(Variant::Regular, regular),
        debug: BackupWorkspace::open(Variant::Debug, debug),
        _temp: temp,
    }
}

fn write(dir: &Path, name: &str, contents: impl AsRef<[u8]>) {
    fs::write(dir.join(name), contents).unwrap();
}

#[test]
fn identical_numeric_output_passes_with_zero_difference() {
    let b = backups();
    write(b.regular.path(), "eta_00001.out", "1.0 2.0\n3.0 4.0\n");
    write(b.debug.path(), "eta_00001.out", "1.0 2.0\n3.0 4.0\n");

    let report = compare_backups(
        &b.regular,
        &b.debug,
        &ArtifactClassifier::default(),
        DEFAULT_TOLERANCE,
    )
    .unwrap();

    assert!(report.passed);
    assert_eq!(report.verdicts.len(), 1);
    let verdict = &report.verdicts[0];
    assert_eq!(verdict.mode, ComparisonMode::Numeric);
    assert_eq!(verdict.max_abs_diff, Some(0.0));
    assert!(verdict.diagnostic.contains("0.00e+00"), "{}", verdict.diagnostic);
}

#[test]
fn perturbed_numeric_output_fails() {
    let b = backups();
    write(b.regular.path(), "eta_00001.out", "1.0 2.0\n3.0 4.0\n");
    write(b.debug.path(), "eta_00001.out", "1.0 2.0\n3.0 4.1\n");

    let report = compare_backups(
        &b.regular,
        &b.debug,
        &ArtifactClassifier::default(),
        DEFAULT_TOLERANCE,
    )
    .unwrap();

    assert!(!report.passed);
    let verdict = &report.verdicts[0];
    assert_eq!(verdict.kind, VerdictKind::ToleranceExceeded);
    let diff = verdict.max_abs_diff.unwrap();
    assert!((diff - 0.1).abs() < 1e-9, "diff = {diff}");
    assert!(verdict.diagnostic.contains("1.00e-01"), "{}", verdict.diagnostic);
}

#[test]
fn binary_output_compared_exactly() {
    let b = backups();
    write(b.regular.path(), "forcing.bin", [1u8, 2]);
    write(b.debug.path(), "forcing.bin", [1u8, 3]);

    let report = compare_backups(
        &b.regular,
        &b.debug,
        &ArtifactClassifier::default(),
        DEFAULT_TOLERANCE,
    )
    .unwrap();

    assert!(!report.passed);
    let verdict = &report.verdicts[0];
    assert_eq!(verdict.mode, ComparisonMode::Exact);
    assert_eq!(verdict.kind, VerdictKind::BytesDiffer);
    assert!(verdict.diagnostic.contains("files differ"));
    assert_eq!(verdict.max_abs_diff, None);
}

#[test]
fn missing_counterparts_reported_on_both_sides() {
    let b = backups();
    write(b.regular.path(), "eta_00001", "1.0\n");
    write(b.regular.path(), "u_00001", "0.5\n");
    write(b.debug.path(), "u_00001", "0.5\n");
    write(b.debug.path(), "v_00001", "0.0\n");

    let report = compare_backups(
        &b.regular,
        &b.debug,
        &ArtifactClassifier::default(),
        DEFAULT_TOLERANCE,
    )
    .unwrap();

    assert!(!report.passed);
    assert_eq!(report.regular_artifacts, 2);
    let names: Vec<_> = report.verdicts.iter().map(|v| v.artifact.as_str()).collect();
    assert_eq!(names, vec!["eta_00001", "u_00001", "v_00001"]);
    assert_eq!(report.verdicts[0].kind, VerdictKind::MissingFile);
    assert!(report.verdicts[1].matched);
    assert_eq!(report.verdicts[2].kind, VerdictKind::MissingFile);
    assert!(report.verdicts[2]
        .diagnostic
        .contains("output_regular_backup"));
}

#[test]
fn unparseable_artifact_does_not_stop_comparison() {
    let b = backups();
    write(b.regular.path(), "eta_00001", "1.0 2.0\n3.0\n");
    write(b.debug.path(), "eta_00001", "1.0 2.0\n3.0\n");
    write(b.regular.path(), "mask_00001", "1 1\n");
    write(b.debug.path(), "mask_00001", "1 1\n");

    let report = compare_backups(
        &b.regular,
        &b.debug,
        &ArtifactClassifier::default(),
        DEFAULT_TOLERANCE,
    )
    .unwrap();

    assert!(!report.passed);
    assert_eq!(report.verdicts.len(), 2);
    assert_eq!(report.verdicts[0].kind, VerdictKind::Unparseable);
    assert_eq!(report.verdicts[1].kind, VerdictKind::WithinTolerance);
}

#[test]
fn debug_named_files_and_directories_are_skipped() {
    let b = backups();
    write(b.regular.path(), "eta_00001", "1.0\n");
    write(b.debug.path(), "eta_00001", "1.0\n");
    write(b.debug.path(), "debug_summary.log", "instrumentation on\n");
    fs::create_dir_all(b.regular.path().join("station")).unwrap();

    let report = compare_backups(
        &b.regular,
        &b.debug,
        &ArtifactClassifier::default(),
        DEFAULT_TOLERANCE,
    )
    .unwrap();

    assert!(report.passed, "{report:?}");
    assert_eq!(report.verdicts.len(), 1);
    assert_eq!(report.regular_artifacts, 1);
}

#[test]
fn custom_rules_and_tolerance() {
    let b = backups();
    write(b.regular.path(), "depth.dat", "10.0 10.0\n");
    write(b.debug.path(), "depth.dat", "10.0 10.000001\n");

    let classifier = ArtifactClassifier::new(vec![NameRule::Suffix(".dat".to_string())], vec![]);

    let strict = compare_backups(&b.regular, &b.debug, &classifier, DEFAULT_TOLERANCE).unwrap();
    assert!(!strict.passed);

    let loose = compare_backups(&b.regular, &b.debug, &classifier, 1e-3).unwrap();
    assert!(loose.passed);
    assert_eq!(loose.tolerance, 1e-3);
}
