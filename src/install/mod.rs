//! Declarative install specifications and their resolution into file mappings.
//!
//! An [`InstallSpec`] names a source (possibly a glob) relative to a source
//! root and a destination relative to a destination root. A destination
//! ending in `/` (or an empty destination) is a directory: each source keeps
//! its basename. Anything else is an exact file name and may only receive a
//! single source.
//!
//! [`resolve`] only reads the filesystem to expand globs. Copying happens in
//! [`crate::executor::files::apply_mappings`].

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use serde::Deserialize;
use tracing::warn;

use crate::error::{BundleError, IoContext, Result};

/// One source pattern and where it should land.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "RawInstallSpec")]
pub struct InstallSpec {
    pub source_pattern: String,
    pub dest_pattern: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawInstallSpec {
    src: String,
    dst: Option<String>,
}

impl From<RawInstallSpec> for InstallSpec {
    fn from(raw: RawInstallSpec) -> Self {
        match raw.dst {
            Some(dst) => InstallSpec::new(raw.src, dst),
            None => InstallSpec::same(raw.src),
        }
    }
}

impl InstallSpec {
    pub fn new(source_pattern: impl Into<String>, dest_pattern: impl Into<String>) -> Self {
        Self {
            source_pattern: source_pattern.into(),
            dest_pattern: dest_pattern.into(),
        }
    }

    /// Install a file at the same relative path it has in the source tree.
    pub fn same(path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            source_pattern: path.clone(),
            dest_pattern: path,
        }
    }

    /// Destination is a directory; sources keep their basename.
    pub fn dest_is_dir(&self) -> bool {
        self.dest_pattern.is_empty() || self.dest_pattern.ends_with('/')
    }

    pub fn has_wildcard(&self) -> bool {
        has_wildcard(&self.source_pattern)
    }
}

/// A concrete copy operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMapping {
    pub source: PathBuf,
    pub dest: PathBuf,
}

pub(crate) fn has_wildcard(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}

/// Resolve `specs` into concrete mappings, preserving spec order.
///
/// Within one spec, glob matches are ordered by path.
pub fn resolve(
    specs: &[InstallSpec],
    source_root: &Path,
    dest_root: &Path,
) -> Result<Vec<FileMapping>> {
    let mut mappings = Vec::new();

    for spec in specs {
        check_dest_pattern(&spec.dest_pattern)?;
        let sources = expand_source(spec, source_root)?;

        if sources.len() > 1 && !spec.dest_is_dir() {
            return Err(BundleError::MappingAmbiguity {
                pattern: spec.source_pattern.clone(),
                dest: spec.dest_pattern.clone(),
                matches: sources.len(),
            });
        }

        for source in sources {
            let dest = if spec.dest_is_dir() {
                let basename = source.file_name().ok_or_else(|| BundleError::InvalidPattern {
                    pattern: spec.source_pattern.clone(),
                    message: "source has no file name".into(),
                })?;
                dest_root.join(&spec.dest_pattern).join(basename)
            } else {
                dest_root.join(&spec.dest_pattern)
            };
            mappings.push(FileMapping { source, dest });
        }
    }

    report_overlaps(&mappings);
    Ok(mappings)
}

fn expand_source(spec: &InstallSpec, source_root: &Path) -> Result<Vec<PathBuf>> {
    let joined = source_root.join(&spec.source_pattern);
    if !spec.has_wildcard() {
        // Literal paths are checked when the mapping is applied.
        return Ok(vec![joined]);
    }

    let pattern = joined.to_string_lossy().into_owned();
    let paths = glob::glob(&pattern).map_err(|e| BundleError::InvalidPattern {
        pattern: spec.source_pattern.clone(),
        message: e.to_string(),
    })?;

    let mut sources = Vec::new();
    for entry in paths {
        match entry {
            Ok(path) => sources.push(path),
            Err(e) => {
                let path = e.path().to_path_buf();
                return Err(e.into_error()).io_context("expanding source pattern at", &path);
            }
        }
    }
    sources.sort();

    if sources.is_empty() {
        return Err(BundleError::NoSourceMatch {
            pattern: spec.source_pattern.clone(),
            root: source_root.to_path_buf(),
        });
    }
    Ok(sources)
}

/// Destinations must stay under the destination root.
fn check_dest_pattern(dest: &str) -> Result<()> {
    let candidate = Path::new(dest);
    let escapes = candidate.components().any(|c| {
        matches!(
            c,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    });
    if escapes {
        return Err(BundleError::UnsafeDestination {
            dest: dest.to_string(),
        });
    }
    Ok(())
}

/// Warn about destinations written by more than one distinct source.
/// Returns how many such collisions were found.
fn report_overlaps(mappings: &[FileMapping]) -> usize {
    let mut seen: HashMap<&Path, &Path> = HashMap::new();
    let mut overlaps = 0;
    for mapping in mappings {
        if let Some(previous) = seen.insert(&mapping.dest, &mapping.source) {
            if previous != mapping.source.as_path() {
                overlaps += 1;
                warn!(
                    dest = %mapping.dest.display(),
                    first = %previous.display(),
                    second = %mapping.source.display(),
                    "two sources map to the same destination; the later one wins"
                );
            }
        }
    }
    overlaps
}
