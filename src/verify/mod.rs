//! Verification of an assembled tree against the expected file list.
//!
//! The actual set is every non-directory entry under the root. The expected
//! set is built by matching each active pattern against the actual set:
//!
//! - a literal path that is absent is reported missing;
//! - a wildcard pattern that matches nothing is reported missing as written;
//! - anything matched by no pattern is unexpected.
//!
//! Only an empty [`VerificationDiff`] passes.

pub mod filelist;
pub mod predicate;

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

use glob::{MatchOptions, Pattern};
use serde::Serialize;
use tracing::info;
use walkdir::WalkDir;

use crate::config::BuildConfig;
use crate::error::{BundleError, Result};
use crate::install::has_wildcard;

pub use filelist::{ExpectedFileEntry, ExpectedFileList};
pub use predicate::Predicate;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Paths (relative, `/`-separated) that differ between expectation and reality.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerificationDiff {
    pub missing: BTreeSet<String>,
    pub unexpected: BTreeSet<String>,
}

impl VerificationDiff {
    pub fn is_empty(&self) -> bool {
        self.missing.is_empty() && self.unexpected.is_empty()
    }
}

impl fmt::Display for VerificationDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.missing.is_empty() {
            writeln!(f, "The following files are missing:")?;
            for path in &self.missing {
                writeln!(f, "  {path}")?;
            }
        }
        if !self.unexpected.is_empty() {
            writeln!(f, "The following files are unexpected:")?;
            for path in &self.unexpected {
                writeln!(f, "  {path}")?;
            }
        }
        Ok(())
    }
}

/// Compares assembled trees against an expected file list for one build
/// configuration.
#[derive(Debug, Clone, Copy)]
pub struct ManifestVerifier<'a> {
    config: &'a BuildConfig,
}

impl<'a> ManifestVerifier<'a> {
    pub fn new(config: &'a BuildConfig) -> Self {
        Self { config }
    }

    /// Compute the diff between `actual_root` and the active entries of `list`.
    pub fn verify(&self, actual_root: &Path, list: &ExpectedFileList) -> Result<VerificationDiff> {
        let actual = collect_actual_files(actual_root)?;
        let patterns = list.active_patterns(self.config);
        diff_against_patterns(&actual, &patterns)
    }

    /// Like [`ManifestVerifier::verify`], but a non-empty diff is an error
    /// carrying the full report and how to fix it.
    pub fn ensure_verified(&self, actual_root: &Path, list: &ExpectedFileList) -> Result<()> {
        let diff = self.verify(actual_root, list)?;
        if diff.is_empty() {
            info!(root = %actual_root.display(), "file list verified");
            return Ok(());
        }

        let report = format!(
            "SDK verification failed:\n\n{diff}\n{}",
            remediation_hint(&list.source, actual_root)
        );
        Err(BundleError::VerificationMismatch { diff, report })
    }
}

/// How to regenerate or re-check the expected file list.
pub fn remediation_hint(list_path: &Path, root: &Path) -> String {
    format!(
        "Add/remove files from {list} to fix.\n\n\
         Run:\n    sdk-builder verify {list} {root}\nto test.",
        list = list_path.display(),
        root = root.display()
    )
}

/// Every regular file or symlink under `root`, relative and `/`-separated.
pub fn collect_actual_files(root: &Path) -> Result<BTreeSet<String>> {
    let mut out = BTreeSet::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            BundleError::Io {
                op: "walking",
                path,
                source: e
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("filesystem loop")),
            }
        })?;
        if entry.file_type().is_dir() {
            continue;
        }
        let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
        out.insert(rel.to_string_lossy().replace('\\', "/"));
    }
    Ok(out)
}

/// Diff an actual file set against expected patterns.
pub fn diff_against_patterns(
    actual: &BTreeSet<String>,
    patterns: &[String],
) -> Result<VerificationDiff> {
    let mut expected = BTreeSet::new();
    let mut diff = VerificationDiff::default();

    for raw in patterns {
        if !has_wildcard(raw) {
            if actual.contains(raw) {
                expected.insert(raw.clone());
            } else {
                diff.missing.insert(raw.clone());
            }
            continue;
        }

        let pattern = Pattern::new(raw).map_err(|e| BundleError::InvalidPattern {
            pattern: raw.clone(),
            message: e.to_string(),
        })?;
        let mut matched_any = false;
        for path in actual {
            if pattern.matches_with(path, MATCH_OPTIONS) {
                matched_any = true;
                expected.insert(path.clone());
            }
        }
        if !matched_any {
            diff.missing.insert(raw.clone());
        }
    }

    diff.unexpected = actual.difference(&expected).cloned().collect();
    Ok(diff)
}
