// src/parity/classify.rs
//
// Artifact classification: maps an output file name to a comparison mode.
//
// The policy is plain data (a list of name rules plus excluded fragments) so
// it can come from the harness config instead of inline string checks.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How two artifacts are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonMode {
    /// Byte-for-byte equality.
    Exact,
    /// Parsed float tables compared within a tolerance.
    Numeric,
}

impl fmt::Display for ComparisonMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComparisonMode::Exact => write!(f, "exact"),
            ComparisonMode::Numeric => write!(f, "numeric"),
        }
    }
}

/// A file-name rule selecting numeric comparison.
///
/// YAML form:
/// ```yaml
/// numeric_rules:
///   - suffix: ".out"
///   - prefix: "eta_"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameRule {
    Suffix(String),
    Prefix(String),
}

impl NameRule {
    /// The suffix or prefix text. An empty pattern matches nothing.
    pub fn pattern(&self) -> &str {
        match self {
            NameRule::Suffix(text) | NameRule::Prefix(text) => text,
        }
    }

    pub fn matches(&self, name: &str) -> bool {
        if self.pattern().is_empty() {
            return false;
        }
        match self {
            NameRule::Suffix(suffix) => name.ends_with(suffix.as_str()),
            NameRule::Prefix(prefix) => name.starts_with(prefix.as_str()),
        }
    }
}

/// Numeric rules for the simulator's tabular outputs: `*.out` plus the
/// physical-field prefixes (surface elevation, velocities, wet/dry mask).
pub fn default_numeric_rules() -> Vec<NameRule> {
    vec![
        NameRule::Suffix(".out".to_string()),
        NameRule::Prefix("eta_".to_string()),
        NameRule::Prefix("u_".to_string()),
        NameRule::Prefix("v_".to_string()),
        NameRule::Prefix("mask_".to_string()),
    ]
}

/// Name fragments that exclude a top-level file from the comparison.
pub fn default_excluded_fragments() -> Vec<String> {
    vec!["debug".to_string()]
}

/// Classifies artifacts by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactClassifier {
    numeric_rules: Vec<NameRule>,
    excluded_fragments: Vec<String>,
}

impl Default for ArtifactClassifier {
    fn default() -> Self {
        Self::new(default_numeric_rules(), default_excluded_fragments())
    }
}

impl ArtifactClassifier {
    pub fn new(numeric_rules: Vec<NameRule>, excluded_fragments: Vec<String>) -> Self {
        Self {
            numeric_rules,
            excluded_fragments,
        }
    }

    /// Mode for `name`: numeric when any rule matches, exact otherwise.
    pub fn classify(&self, name: &str) -> ComparisonMode {
        if self.numeric_rules.iter().any(|rule| rule.matches(name)) {
            ComparisonMode::Numeric
        } else {
            ComparisonMode::Exact
        }
    }

    /// Whether `name` refers to debug output and has no regular counterpart.
    pub fn is_excluded(&self, name: &str) -> bool {
        self.excluded_fragments
            .iter()
            .any(|fragment| !fragment.is_empty() && name.contains(fragment.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rules_select_numeric_mode() {
        let classifier = ArtifactClassifier::default();
        for name in [
            "eta_00001",
            "u_00003",
            "v_00010",
            "mask_00001",
            "time_dt.out",
            "eta_00001.out",
        ] {
            assert_eq!(classifier.classify(name), ComparisonMode::Numeric, "{name}");
        }
    }

    #[test]
    fn test_other_names_use_exact_mode() {
        let classifier = ArtifactClassifier::default();
        for name in ["forcing.bin", "LOG.txt", "output.out.bak", "meta_u_00001"] {
            assert_eq!(classifier.classify(name), ComparisonMode::Exact, "{name}");
        }
    }

    #[test]
    fn test_debug_names_are_excluded() {
        let classifier = ArtifactClassifier::default();
        assert!(classifier.is_excluded("debug_summary.out"));
        assert!(classifier.is_excluded("eta_debug_00001"));
        assert!(!classifier.is_excluded("eta_00001"));
    }

    #[test]
    fn test_empty_patterns_match_nothing() {
        let classifier = ArtifactClassifier::new(
            vec![NameRule::Suffix(String::new()), NameRule::Prefix(String::new())],
            vec![String::new()],
        );
        assert_eq!(classifier.classify("eta_00001.out"), ComparisonMode::Exact);
        assert!(!classifier.is_excluded("eta_00001.out"));
    }

    #[test]
    fn test_custom_rules() {
        let classifier = ArtifactClassifier::new(
            vec![NameRule::Suffix(".dat".to_string())],
            vec!["trace".to_string()],
        );
        assert_eq!(classifier.classify("depth.dat"), ComparisonMode::Numeric);
        assert_eq!(classifier.classify("eta_00001"), ComparisonMode::Exact);
        assert!(classifier.is_excluded("trace_01.dat"));
        assert!(!classifier.is_excluded("debug_01.dat"));
    }

    #[test]
    fn test_rules_parse_from_yaml() {
        let yaml = r#"
- suffix: ".out"
- prefix: "eta_"
"#;
        let rules: Vec<NameRule> = serde_yaml::from_str(yaml).expect("Should parse");
        assert_eq!(
            rules,
            vec![
                NameRule::Suffix(".out".to_string()),
                NameRule::Prefix("eta_".to_string()),
            ]
        );
    }
}
