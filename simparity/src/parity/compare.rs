// src/parity/compare.rs
//
// Artifact comparator: exact byte equality or numeric closeness of two
// whitespace-separated float tables.
//
// Numeric tables follow numpy `loadtxt` conventions: blank lines and `#`
// comments are skipped, rows must be rectangular, a single row or single
// column collapses to a 1-D shape, and a lone value is zero-dimensional.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::Path;
use thiserror::Error;

use super::classify::ComparisonMode;

/// Default numeric tolerance: just above accumulated double round-off for a
/// short deterministic run.
pub const DEFAULT_TOLERANCE: f64 = 1e-14;

// =============================================================================
// Verdicts
// =============================================================================

/// Classification of a single artifact comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictKind {
    ExactMatch,
    BytesDiffer,
    WithinTolerance,
    ToleranceExceeded,
    ShapeMismatch,
    MissingFile,
    Unparseable,
}

/// Result of comparing one artifact pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonVerdict {
    /// Artifact file name.
    pub artifact: String,
    /// Mode the pair was compared in.
    pub mode: ComparisonMode,
    /// Whether the pair is considered equivalent.
    pub matched: bool,
    /// What happened.
    pub kind: VerdictKind,
    /// Maximum absolute elementwise difference (numeric comparisons only).
    pub max_abs_diff: Option<f64>,
    /// Human-readable diagnostic.
    pub diagnostic: String,
}

impl ComparisonVerdict {
    fn new(artifact: &str, mode: ComparisonMode, kind: VerdictKind, diagnostic: String) -> Self {
        let matched = matches!(kind, VerdictKind::ExactMatch | VerdictKind::WithinTolerance);
        Self {
            artifact: artifact.to_string(),
            mode,
            matched,
            kind,
            max_abs_diff: None,
            diagnostic,
        }
    }

    /// A verdict for an artifact present on only one side.
    pub fn missing(artifact: &str, mode: ComparisonMode, missing_path: &Path) -> Self {
        Self::new(
            artifact,
            mode,
            VerdictKind::MissingFile,
            format!("missing file: {}", missing_path.display()),
        )
    }

    fn with_max_abs_diff(mut self, max_abs_diff: f64) -> Self {
        self.max_abs_diff = Some(max_abs_diff);
        self
    }
}

// =============================================================================
// Numeric tables
// =============================================================================

/// Shape of a parsed table, numpy style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TableShape {
    /// Exactly one value: `()`.
    Scalar,
    OneD(usize),
    TwoD(usize, usize),
}

impl fmt::Display for TableShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableShape::Scalar => write!(f, "()"),
            TableShape::OneD(n) => write!(f, "({},)", n),
            TableShape::TwoD(rows, cols) => write!(f, "({}, {})", rows, cols),
        }
    }
}

/// A rectangular table of floats in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct NumericTable {
    pub shape: TableShape,
    pub values: Vec<f64>,
}

/// Errors parsing a numeric table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("content is not valid UTF-8")]
    NotText,
    #[error("line {line}: could not convert {token:?} to float")]
    InvalidNumber { line: usize, token: String },
    #[error("line {line}: expected {expected} columns, found {found}")]
    Ragged {
        line: usize,
        expected: usize,
        found: usize,
    },
}

impl NumericTable {
    /// Parse a whitespace-separated float table.
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let mut values = Vec::new();
        let mut rows = 0usize;
        let mut cols: Option<usize> = None;

        for (idx, raw_line) in text.lines().enumerate() {
            let line = match raw_line.find('#') {
                Some(pos) => &raw_line[..pos],
                None => raw_line,
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let mut found = 0usize;
            for token in line.split_whitespace() {
                let value = token.parse::<f64>().map_err(|_| ParseError::InvalidNumber {
                    line: idx + 1,
                    token: token.to_string(),
                })?;
                values.push(value);
                found += 1;
            }

            match cols {
                None => cols = Some(found),
                Some(expected) if expected != found => {
                    return Err(ParseError::Ragged {
                        line: idx + 1,
                        expected,
                        found,
                    });
                }
                Some(_) => {}
            }
            rows += 1;
        }

        let cols = cols.unwrap_or(0);
        let shape = if values.len() == 1 {
            TableShape::Scalar
        } else if rows <= 1 {
            TableShape::OneD(cols)
        } else if cols == 1 {
            TableShape::OneD(rows)
        } else {
            TableShape::TwoD(rows, cols)
        };

        Ok(Self { shape, values })
    }

    /// Parse raw file bytes.
    pub fn parse_bytes(bytes: &[u8]) -> Result<Self, ParseError> {
        let text = std::str::from_utf8(bytes).map_err(|_| ParseError::NotText)?;
        Self::parse(text)
    }
}

/// Exact maximum absolute elementwise difference.
///
/// NaN in the same slot on both sides compares equal; NaN against a number
/// is an infinite difference. Slices must have equal length.
pub fn max_abs_difference(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b).fold(0.0_f64, |max, (&x, &y)| {
        let diff = match (x.is_nan(), y.is_nan()) {
            (true, true) => 0.0,
            (true, false) | (false, true) => f64::INFINITY,
            (false, false) if x == y => 0.0,
            (false, false) => (x - y).abs(),
        };
        if diff > max {
            diff
        } else {
            max
        }
    })
}

/// Format like C/Python `%.2e` (`1.00e-01`, `0.00e+00`).
pub fn format_sci(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }

    let raw = format!("{:.2e}", value);
    match raw.split_once('e') {
        Some((mantissa, exponent)) => {
            let exp: i32 = exponent.parse().unwrap_or(0);
            let sign = if exp < 0 { '-' } else { '+' };
            format!("{}e{}{:02}", mantissa, sign, exp.abs())
        }
        None => raw,
    }
}

// =============================================================================
// Comparison
// =============================================================================

/// Compare `path_a` against `path_b` in `mode`.
///
/// A missing file yields a `MissingFile` verdict and unparseable numeric
/// content an `Unparseable` verdict. Only I/O failures on existing files are
/// returned as errors.
pub fn compare(
    path_a: &Path,
    path_b: &Path,
    mode: ComparisonMode,
    tolerance: f64,
) -> Result<ComparisonVerdict> {
    let artifact = path_a
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path_a.display().to_string());

    for path in [path_a, path_b] {
        if !path.is_file() {
            return Ok(ComparisonVerdict::missing(&artifact, mode, path));
        }
    }

    let bytes_a = fs::read(path_a).with_context(|| format!("Failed to read {}", path_a.display()))?;
    let bytes_b = fs::read(path_b).with_context(|| format!("Failed to read {}", path_b.display()))?;

    Ok(match mode {
        ComparisonMode::Exact => compare_exact(&artifact, &bytes_a, &bytes_b),
        ComparisonMode::Numeric => compare_numeric(&artifact, &bytes_a, &bytes_b, tolerance),
    })
}

/// Byte-for-byte comparison of two buffers.
pub fn compare_exact(artifact: &str, a: &[u8], b: &[u8]) -> ComparisonVerdict {
    if a == b {
        return ComparisonVerdict::new(
            artifact,
            ComparisonMode::Exact,
            VerdictKind::ExactMatch,
            "Exact binary match".to_string(),
        );
    }

    let first_difference = a
        .iter()
        .zip(b)
        .position(|(x, y)| x != y)
        .unwrap_or_else(|| a.len().min(b.len()));

    ComparisonVerdict::new(
        artifact,
        ComparisonMode::Exact,
        VerdictKind::BytesDiffer,
        format!(
            "files differ ({} vs {} bytes, first difference at byte {})",
            a.len(),
            b.len(),
            first_difference
        ),
    )
}

/// Numeric comparison of two table buffers.
pub fn compare_numeric(artifact: &str, a: &[u8], b: &[u8], tolerance: f64) -> ComparisonVerdict {
    let table_a = match NumericTable::parse_bytes(a) {
        Ok(table) => table,
        Err(e) => return unparseable(artifact, "first", &e),
    };
    let table_b = match NumericTable::parse_bytes(b) {
        Ok(table) => table,
        Err(e) => return unparseable(artifact, "second", &e),
    };

    if table_a.shape != table_b.shape {
        return ComparisonVerdict::new(
            artifact,
            ComparisonMode::Numeric,
            VerdictKind::ShapeMismatch,
            format!("Shape mismatch: {} vs {}", table_a.shape, table_b.shape),
        );
    }

    let max_diff = max_abs_difference(&table_a.values, &table_b.values);

    let (kind, diagnostic) = if max_diff > tolerance {
        (
            VerdictKind::ToleranceExceeded,
            format!(
                "Max difference: {} > {}",
                format_sci(max_diff),
                format_sci(tolerance)
            ),
        )
    } else {
        (
            VerdictKind::WithinTolerance,
            format!("Max difference: {}", format_sci(max_diff)),
        )
    };

    ComparisonVerdict::new(artifact, ComparisonMode::Numeric, kind, diagnostic)
        .with_max_abs_diff(max_diff)
}

fn unparseable(artifact: &str, side: &str, error: &ParseError) -> ComparisonVerdict {
    ComparisonVerdict::new(
        artifact,
        ComparisonMode::Numeric,
        VerdictKind::Unparseable,
        format!("unparseable ({} file): {}", side, error),
    )
}
