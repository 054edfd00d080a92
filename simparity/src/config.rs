// src/config.rs
//
// Harness configuration.
//
// Layering (lowest to highest precedence):
// 1. Built-in defaults for the FUNWAVE regular-wave case
// 2. Optional YAML file (`--config harness.yaml`)
// 3. SIMPARITY_* environment overrides
// 4. CLI flags (applied by main)
//
// Example:
// ```yaml
// test_dir: test_regular_wave_1d_flat
// regular_exe: funwave-work/funwave--mpif90-parallel-single
// processes: 4
// tolerance: 1.0e-14
// numeric_rules:
//   - suffix: ".out"
//   - prefix: "eta_"
// ```

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::parity::classify::{default_excluded_fragments, default_numeric_rules};
use crate::parity::driver::{default_debug_categories, default_required_categories};
use crate::parity::orchestrator::DEFAULT_SUCCESS_MARKER;
use crate::parity::{
    ArtifactClassifier, DebugCategories, NameRule, RunConfiguration, TestLayout, Variant,
    DEFAULT_TOLERANCE,
};

/// Everything the harness needs to run one comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HarnessConfig {
    /// Test case directory; the simulator runs here and writes `output/`.
    #[serde(default = "default_test_dir")]
    pub test_dir: PathBuf,
    /// Regular (uninstrumented) build.
    #[serde(default = "default_regular_exe")]
    pub regular_exe: PathBuf,
    /// Debug (instrumented) build.
    #[serde(default = "default_debug_exe")]
    pub debug_exe: PathBuf,
    /// Parallel launcher command.
    #[serde(default = "default_launcher")]
    pub launcher: String,
    /// Process count passed as `-np`.
    #[serde(default = "default_processes")]
    pub processes: u32,
    /// Wall-clock budget per variant, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Maximum allowed absolute difference for numeric artifacts (inclusive).
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    /// Literal that must appear in stdout of a successful run.
    #[serde(default = "default_success_marker")]
    pub success_marker: String,
    /// Subdirectories created under `output/debug/` for the debug run.
    #[serde(default = "default_debug_categories")]
    pub debug_categories: Vec<String>,
    /// Categories that must hold at least one artifact after the debug run.
    #[serde(default = "default_required_categories")]
    pub required_categories: Vec<String>,
    /// Extension counted as a debug artifact; `null` counts any file.
    #[serde(default = "default_debug_artifact_extension")]
    pub debug_artifact_extension: Option<String>,
    /// Name rules that select numeric comparison.
    #[serde(default = "default_numeric_rules")]
    pub numeric_rules: Vec<NameRule>,
    /// Name fragments that exclude a top-level file from comparison.
    #[serde(default = "default_excluded_fragments")]
    pub excluded_name_fragments: Vec<String>,
}

fn default_test_dir() -> PathBuf {
    PathBuf::from("test_regular_wave_1d_flat")
}

fn default_regular_exe() -> PathBuf {
    PathBuf::from("funwave-work/funwave--mpif90-parallel-single")
}

fn default_debug_exe() -> PathBuf {
    PathBuf::from("funwave-work/funwave-DEBUG_DERIVATIVES-DEBUG_RECONSTRUCTION--mpif90-parallel-single")
}

fn default_launcher() -> String {
    "mpirun".to_string()
}

fn default_processes() -> u32 {
    4
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_tolerance() -> f64 {
    DEFAULT_TOLERANCE
}

fn default_success_marker() -> String {
    DEFAULT_SUCCESS_MARKER.to_string()
}

fn default_debug_artifact_extension() -> Option<String> {
    Some("txt".to_string())
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            test_dir: default_test_dir(),
            regular_exe: default_regular_exe(),
            debug_exe: default_debug_exe(),
            launcher: default_launcher(),
            processes: default_processes(),
            timeout_secs: default_timeout_secs(),
            tolerance: default_tolerance(),
            success_marker: default_success_marker(),
            debug_categories: default_debug_categories(),
            required_categories: default_required_categories(),
            debug_artifact_extension: default_debug_artifact_extension(),
            numeric_rules: default_numeric_rules(),
            excluded_name_fragments: default_excluded_fragments(),
        }
    }
}

/// Configuration load / validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config YAML: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Config validation error in '{field}': {message}")]
    Validation { field: String, message: String },
}

fn invalid(field: &str, message: &str) -> ConfigError {
    ConfigError::Validation {
        field: field.to_string(),
        message: message.to_string(),
    }
}

impl HarnessConfig {
    /// Load a config from a YAML file. Missing fields take their defaults.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            source: e,
        })?;
        Self::from_yaml_str(&contents)
    }

    /// Parse a config from a YAML string.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        // An empty document means "all defaults".
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: HarnessConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.processes == 0 {
            return Err(invalid("processes", "processes must be >= 1"));
        }
        if self.timeout_secs == 0 {
            return Err(invalid("timeout_secs", "timeout_secs must be >= 1"));
        }
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(invalid("tolerance", "tolerance must be a finite value >= 0"));
        }
        if self.launcher.trim().is_empty() {
            return Err(invalid("launcher", "launcher cannot be empty"));
        }
        if self.success_marker.is_empty() {
            return Err(invalid("success_marker", "success_marker cannot be empty"));
        }
        if self.debug_categories.is_empty() {
            return Err(invalid("debug_categories", "debug_categories cannot be empty"));
        }
        if self.debug_categories.iter().any(|c| c.trim().is_empty() || c.contains('/')) {
            return Err(invalid(
                "debug_categories",
                "category names must be non-empty single path components",
            ));
        }
        for (i, fragment) in self.excluded_name_fragments.iter().enumerate() {
            if fragment.trim().is_empty() {
                return Err(ConfigError::Validation {
                    field: format!("excluded_name_fragments[{}]", i),
                    message: "excluded name fragments cannot be empty".to_string(),
                });
            }
        }
        for (i, rule) in self.numeric_rules.iter().enumerate() {
            if rule.pattern().is_empty() {
                return Err(ConfigError::Validation {
                    field: format!("numeric_rules[{}]", i),
                    message: "numeric rule suffix/prefix cannot be empty".to_string(),
                });
            }
        }
        for (i, required) in self.required_categories.iter().enumerate() {
            if !self.debug_categories.contains(required) {
                return Err(ConfigError::Validation {
                    field: format!("required_categories[{}]", i),
                    message: format!("'{}' is not listed in debug_categories", required),
                });
            }
        }
        Ok(())
    }

    /// Apply SIMPARITY_* overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup.
    ///
    /// Values that fail to parse are logged and ignored.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("SIMPARITY_TOLERANCE") {
            match raw.trim().parse::<f64>() {
                Ok(v) if v.is_finite() && v >= 0.0 => {
                    self.tolerance = v;
                    info!(tolerance = v, "SIMPARITY_TOLERANCE overrode config");
                }
                _ => warn!(
                    value = %raw,
                    tolerance = self.tolerance,
                    "could not parse SIMPARITY_TOLERANCE as a non-negative float; keeping current"
                ),
            }
        }

        if let Some(raw) = lookup("SIMPARITY_TIMEOUT_SECS") {
            match raw.trim().parse::<u64>() {
                Ok(v) if v > 0 => {
                    self.timeout_secs = v;
                    info!(timeout_secs = v, "SIMPARITY_TIMEOUT_SECS overrode config");
                }
                _ => warn!(
                    value = %raw,
                    timeout_secs = self.timeout_secs,
                    "could not parse SIMPARITY_TIMEOUT_SECS as a positive integer; keeping current"
                ),
            }
        }

        if let Some(raw) = lookup("SIMPARITY_PROCESSES") {
            match raw.trim().parse::<u32>() {
                Ok(v) if v > 0 => {
                    self.processes = v;
                    info!(processes = v, "SIMPARITY_PROCESSES overrode config");
                }
                _ => warn!(
                    value = %raw,
                    processes = self.processes,
                    "could not parse SIMPARITY_PROCESSES as a positive integer; keeping current"
                ),
            }
        }

        if let Some(raw) = lookup("SIMPARITY_LAUNCHER") {
            if raw.trim().is_empty() {
                warn!(launcher = %self.launcher, "SIMPARITY_LAUNCHER is empty; keeping current");
            } else {
                info!(launcher = %raw, "SIMPARITY_LAUNCHER overrode config");
                self.launcher = raw;
            }
        }
    }

    /// Layout rooted at the test directory.
    pub fn layout(&self) -> TestLayout {
        TestLayout::new(&self.test_dir)
    }

    /// Launch parameters for one variant.
    pub fn run_configuration(&self, variant: Variant) -> RunConfiguration {
        let executable = match variant {
            Variant::Regular => self.regular_exe.clone(),
            Variant::Debug => self.debug_exe.clone(),
        };
        RunConfiguration {
            variant,
            executable,
            launcher: self.launcher.clone(),
            processes: self.processes,
            working_directory: self.test_dir.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }

    pub fn classifier(&self) -> ArtifactClassifier {
        ArtifactClassifier::new(
            self.numeric_rules.clone(),
            self.excluded_name_fragments.clone(),
        )
    }

    pub fn categories(&self) -> DebugCategories {
        DebugCategories {
            all: self.debug_categories.clone(),
            required: self.required_categories.clone(),
            artifact_extension: self.debug_artifact_extension.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parity::ComparisonMode;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_match_funwave_layout() {
        let config = HarnessConfig::default();
        config.validate().unwrap();
        assert_eq!(config.test_dir, PathBuf::from("test_regular_wave_1d_flat"));
        assert_eq!(config.launcher, "mpirun");
        assert_eq!(config.processes, 4);
        assert_eq!(config.timeout_secs, 60);
        assert_eq!(config.tolerance, 1e-14);
        assert_eq!(config.success_marker, "Normal Termination!");
        assert_eq!(config.debug_categories.len(), 9);
        assert_eq!(
            config.layout().backup_dir(Variant::Debug),
            PathBuf::from("test_regular_wave_1d_flat/output_debug_backup")
        );
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
test_dir: cases/flat
processes: 2
tolerance: 1.0e-10
numeric_rules:
  - suffix: ".dat"
"#;
        let config = HarnessConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.test_dir, PathBuf::from("cases/flat"));
        assert_eq!(config.processes, 2);
        assert_eq!(config.tolerance, 1e-10);
        assert_eq!(config.launcher, "mpirun");

        let classifier = config.classifier();
        assert_eq!(classifier.classify("depth.dat"), ComparisonMode::Numeric);
        assert_eq!(classifier.classify("eta_00001"), ComparisonMode::Exact);
    }

    #[test]
    fn test_empty_yaml_is_default() {
        let config = HarnessConfig::from_yaml_str("  \n").unwrap();
        assert_eq!(config, HarnessConfig::default());
    }

    #[test]
    fn test_yaml_with_empty_exclusion_rejected() {
        let err = HarnessConfig::from_yaml_str("excluded_name_fragments: [\"\"]\n").unwrap_err();
        assert!(
            matches!(&err, ConfigError::Validation { field, .. } if field == "excluded_name_fragments[0]"),
            "{err:?}"
        );

        let err = HarnessConfig::from_yaml_str("numeric_rules:\n  - prefix: \"\"\n").unwrap_err();
        assert!(
            matches!(&err, ConfigError::Validation { field, .. } if field == "numeric_rules[0]"),
            "{err:?}"
        );
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = HarnessConfig::from_yaml_str("tolerence: 1.0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_validation_rules() {
        let cases: Vec<(&str, Box<dyn Fn(&mut HarnessConfig)>)> = vec![
            ("processes", Box::new(|c: &mut HarnessConfig| c.processes = 0)),
            ("timeout_secs", Box::new(|c: &mut HarnessConfig| c.timeout_secs = 0)),
            ("tolerance", Box::new(|c: &mut HarnessConfig| c.tolerance = -1.0)),
            ("tolerance", Box::new(|c: &mut HarnessConfig| c.tolerance = f64::NAN)),
            ("launcher", Box::new(|c: &mut HarnessConfig| c.launcher = " ".to_string())),
            ("success_marker", Box::new(|c: &mut HarnessConfig| c.success_marker.clear())),
            ("debug_categories", Box::new(|c: &mut HarnessConfig| c.debug_categories.clear())),
            (
                "required_categories[0]",
                Box::new(|c: &mut HarnessConfig| c.required_categories = vec!["bogus".to_string()]),
            ),
            (
                "excluded_name_fragments[0]",
                Box::new(|c: &mut HarnessConfig| c.excluded_name_fragments = vec![String::new()]),
            ),
            (
                "excluded_name_fragments[1]",
                Box::new(|c: &mut HarnessConfig| c.excluded_name_fragments.push("  ".to_string())),
            ),
            (
                "numeric_rules[0]",
                Box::new(|c: &mut HarnessConfig| c.numeric_rules[0] = NameRule::Suffix(String::new())),
            ),
            (
                "numeric_rules[1]",
                Box::new(|c: &mut HarnessConfig| c.numeric_rules[1] = NameRule::Prefix(String::new())),
            ),
        ];

        for (field, mutate) in cases {
            let mut config = HarnessConfig::default();
            mutate(&mut config);
            match config.validate() {
                Err(ConfigError::Validation { field: got, .. }) => assert_eq!(got, field),
                other => panic!("expected validation error on {field}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_env_overrides() {
        let mut config = HarnessConfig::default();
        config.apply_overrides_from(lookup(&[
            ("SIMPARITY_TOLERANCE", "1e-12"),
            ("SIMPARITY_TIMEOUT_SECS", "120"),
            ("SIMPARITY_PROCESSES", "8"),
            ("SIMPARITY_LAUNCHER", "srun"),
        ]));
        assert_eq!(config.tolerance, 1e-12);
        assert_eq!(config.timeout_secs, 120);
        assert_eq!(config.processes, 8);
        assert_eq!(config.launcher, "srun");
    }

    #[test]
    fn test_bad_env_overrides_keep_previous_values() {
        let mut config = HarnessConfig::default();
        config.apply_overrides_from(lookup(&[
            ("SIMPARITY_TOLERANCE", "tiny"),
            ("SIMPARITY_TIMEOUT_SECS", "0"),
            ("SIMPARITY_PROCESSES", "-3"),
            ("SIMPARITY_LAUNCHER", ""),
        ]));
        assert_eq!(config, HarnessConfig::default());
    }

    #[test]
    fn test_run_configuration_per_variant() {
        let config = HarnessConfig::default();
        let debug = config.run_configuration(Variant::Debug);
        assert_eq!(debug.variant, Variant::Debug);
        assert_eq!(debug.executable, config.debug_exe);
        assert_eq!(debug.working_directory, config.test_dir);
        assert_eq!(debug.timeout, Duration::from_secs(60));

        let categories = config.categories();
        assert_eq!(categories.required, default_required_categories());
    }

    #[test]
    fn test_from_yaml_file_missing() {
        let err = HarnessConfig::from_yaml_file("/nonexistent/harness.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(err.to_string().contains("/nonexistent/harness.yaml"));
    }
}
