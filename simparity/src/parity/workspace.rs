// src/parity/workspace.rs
//
// Filesystem layout and workspace mutation for one test directory.
//
// Layout (relative to the test directory):
// - output/                      live workspace, recreated before every run
// - output/debug/<category>/     debug-run-only subtree
// - output_regular_backup/       archive of the last successful regular run
// - output_debug_backup/         archive of the last successful debug run
//
// All teardown/copy operations go through `OutputWorkspace` so the run
// ordering (teardown before run, commit before the next teardown) has a
// single chokepoint.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Name of the live output directory inside the test directory.
pub const OUTPUT_DIR_NAME: &str = "output";

/// Name of the debug-artifact subtree inside a workspace.
pub const DEBUG_SUBTREE: &str = "debug";

/// Which simulator build a run belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    /// The uninstrumented build.
    Regular,
    /// The build with debug instrumentation compiled in.
    Debug,
}

impl Variant {
    /// Stable lowercase name (used in logs and telemetry).
    pub fn as_str(&self) -> &'static str {
        match self {
            Variant::Regular => "regular",
            Variant::Debug => "debug",
        }
    }

    /// Directory name of this variant's backup.
    pub fn backup_dir_name(&self) -> &'static str {
        match self {
            Variant::Regular => "output_regular_backup",
            Variant::Debug => "output_debug_backup",
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Regular => write!(f, "Regular"),
            Variant::Debug => write!(f, "Debug"),
        }
    }
}

/// Paths derived from a test directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestLayout {
    test_dir: PathBuf,
}

impl TestLayout {
    pub fn new(test_dir: impl Into<PathBuf>) -> Self {
        Self {
            test_dir: test_dir.into(),
        }
    }

    /// The test directory (also the simulator's working directory).
    pub fn test_dir(&self) -> &Path {
        &self.test_dir
    }

    /// The live output directory.
    pub fn output_dir(&self) -> PathBuf {
        self.test_dir.join(OUTPUT_DIR_NAME)
    }

    /// The backup directory for `variant`.
    pub fn backup_dir(&self, variant: Variant) -> PathBuf {
        self.test_dir.join(variant.backup_dir_name())
    }
}

/// The live output directory a simulator writes into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputWorkspace {
    root: PathBuf,
}

impl OutputWorkspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Remove the workspace (if present) and recreate it empty.
    pub fn reset(&self) -> Result<()> {
        if self.root.exists() {
            fs::remove_dir_all(&self.root)
                .with_context(|| format!("Failed to remove {}", self.root.display()))?;
            debug!(path = %self.root.display(), "removed stale workspace");
        }
        fs::create_dir_all(&self.root)
            .with_context(|| format!("Failed to create {}", self.root.display()))?;
        Ok(())
    }

    /// Create `debug/<category>/` for every category.
    ///
    /// The instrumented simulator does not create these itself.
    pub fn seed_debug_tree(&self, categories: &[String]) -> Result<()> {
        let debug_root = self.root.join(DEBUG_SUBTREE);
        for category in categories {
            let dir = debug_root.join(category);
            fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        debug!(categories = categories.len(), "seeded debug subtree");
        Ok(())
    }

    /// Copy the workspace into `backup`, replacing any prior contents there.
    pub fn commit_to(&self, backup: &Path, variant: Variant) -> Result<BackupWorkspace> {
        if backup.exists() {
            fs::remove_dir_all(backup)
                .with_context(|| format!("Failed to remove old backup {}", backup.display()))?;
        }
        let files = copy_dir_recursive(&self.root, backup)?;
        info!(
            variant = variant.as_str(),
            files,
            backup = %backup.display(),
            "backed up outputs"
        );
        Ok(BackupWorkspace::open(variant, backup))
    }
}

/// A persistent copy of one variant's workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupWorkspace {
    variant: Variant,
    root: PathBuf,
}

impl BackupWorkspace {
    /// Refer to an existing backup directory.
    pub fn open(variant: Variant, root: impl Into<PathBuf>) -> Self {
        Self {
            variant,
            root: root.into(),
        }
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Names of regular files directly inside the backup, sorted.
    pub fn top_level_files(&self) -> Result<Vec<String>> {
        let entries = fs::read_dir(&self.root)
            .with_context(|| format!("Failed to list {}", self.root.display()))?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.with_context(|| format!("Failed to list {}", self.root.display()))?;
            if !entry.path().is_file() {
                continue;
            }
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    /// Count debug artifacts in `debug/<category>/` for the given categories.
    ///
    /// Only direct children are counted. With `extension` set, only files with
    /// that extension count. Missing category directories count as empty.
    pub fn count_debug_artifacts(
        &self,
        categories: &[String],
        extension: Option<&str>,
    ) -> Result<usize> {
        let debug_root = self.root.join(DEBUG_SUBTREE);
        let mut count = 0;

        for category in categories {
            let dir = debug_root.join(category);
            if !dir.is_dir() {
                continue;
            }
            let entries =
                fs::read_dir(&dir).with_context(|| format!("Failed to list {}", dir.display()))?;
            for entry in entries {
                let path = entry
                    .with_context(|| format!("Failed to list {}", dir.display()))?
                    .path();
                if path.is_file() && has_extension(&path, extension) {
                    count += 1;
                }
            }
        }

        Ok(count)
    }
}

fn has_extension(path: &Path, extension: Option<&str>) -> bool {
    match extension {
        None => true,
        Some(ext) => path.extension().is_some_and(|e| e == ext),
    }
}

/// Recursively copy `src` into `dst` (created if missing). Returns files copied.
fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<u64> {
    fs::create_dir_all(dst).with_context(|| format!("Failed to create {}", dst.display()))?;

    let mut copied = 0;
    let entries = fs::read_dir(src).with_context(|| format!("Failed to list {}", src.display()))?;
    for entry in entries {
        let entry = entry.with_context(|| format!("Failed to list {}", src.display()))?;
        let from = entry.path();
        let to = dst.join(entry.file_name());

        if from.is_dir() {
            copied += copy_dir_recursive(&from, &to)?;
        } else {
            fs::copy(&from, &to).with_context(|| {
                format!("Failed to copy {} to {}", from.display(), to.display())
            })?;
            copied += 1;
        }
    }
    Ok(copied)
}
