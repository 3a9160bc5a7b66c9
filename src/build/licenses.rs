//! Aggregated license notice for the assembled bundle.
//!
//! Walks the tree for files named exactly `LICENSE`, `COPYING` or
//! `COPYRIGHT`, adds any explicitly listed extra files (for licenses that
//! live under other names), and concatenates them in path order into a
//! single notice document. License bodies are copied byte for byte.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;
use walkdir::WalkDir;

use crate::error::{BundleError, IoContext, Result};
use crate::executor::files::write_file;

/// File names collected without being listed.
pub const LICENSE_MARKERS: &[&str] = &["LICENSE", "COPYING", "COPYRIGHT"];

/// Default notice file name, relative to the bundle root.
pub const DEFAULT_NOTICE_NAME: &str = "NOTICE";

const SECTION_RULE: &str =
    "================================================================================";

/// Collects license files under a root and writes the aggregated notice.
#[derive(Debug, Clone, Default)]
pub struct NoticeGenerator {
    extra_files: Vec<PathBuf>,
}

impl NoticeGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add files (relative to the walked root) that the marker names miss.
    pub fn with_extra_files<I, P>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.extra_files.extend(files.into_iter().map(Into::into));
        self
    }

    /// License files under `root` plus the extras, sorted and deduplicated.
    ///
    /// `output` is never collected, so regenerating the notice in place
    /// does not fold the previous notice into the new one.
    pub fn collect(&self, root: &Path, output: &Path) -> Result<Vec<PathBuf>> {
        let mut found = BTreeSet::new();

        for entry in WalkDir::new(root).follow_links(false) {
            let entry = entry.map_err(|e| BundleError::Io {
                op: "walking",
                path: e.path().unwrap_or(root).to_path_buf(),
                source: e
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("filesystem loop")),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if LICENSE_MARKERS.contains(&name.as_ref()) && entry.path() != output {
                found.insert(entry.path().to_path_buf());
            }
        }

        for extra in &self.extra_files {
            let path = root.join(extra);
            if !path.is_file() {
                return Err(BundleError::Io {
                    op: "reading extra license file",
                    path,
                    source: std::io::Error::from(std::io::ErrorKind::NotFound),
                });
            }
            found.insert(path);
        }

        Ok(found.into_iter().collect())
    }

    /// Write the notice for `root` to `output` (relative paths are taken
    /// from `root`). Returns the number of license files included.
    pub fn generate(&self, root: &Path, output: &Path) -> Result<usize> {
        let output = if output.is_absolute() {
            output.to_path_buf()
        } else {
            root.join(output)
        };

        let files = self.collect(root, &output)?;
        let mut notice: Vec<u8> = Vec::new();
        for path in &files {
            let rel = path.strip_prefix(root).unwrap_or(path);
            let bytes = fs::read(path).io_context("reading license file", path)?;
            let header = format!(
                "{SECTION_RULE}\n{}\n{SECTION_RULE}\n\n",
                rel.to_string_lossy()
            );
            notice.extend_from_slice(header.as_bytes());
            notice.extend_from_slice(&bytes);
            if !notice.ends_with(b"\n") {
                notice.push(b'\n');
            }
            notice.push(b'\n');
        }

        write_file(&output, &notice)?;
        info!(
            output = %output.display(),
            licenses = files.len(),
            "wrote aggregated notice"
        );
        Ok(files.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tree() -> TempDir {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("toolchain/newlib")).unwrap();
        fs::create_dir_all(root.join("ports/zlib")).unwrap();
        fs::write(root.join("LICENSE"), "top license\n").unwrap();
        fs::write(root.join("toolchain/newlib/LICENSE"), "newlib license").unwrap();
        fs::write(root.join("ports/zlib/license.txt"), "zlib license\n").unwrap();
        temp
    }

    #[test]
    fn only_exact_marker_names_are_collected() {
        let temp = tree();
        let root = temp.path();

        let files = NoticeGenerator::new()
            .collect(root, &root.join(DEFAULT_NOTICE_NAME))
            .unwrap();
        assert_eq!(
            files,
            vec![root.join("LICENSE"), root.join("toolchain/newlib/LICENSE")]
        );
    }

    #[test]
    fn extra_files_are_included_when_listed() {
        let temp = tree();
        let root = temp.path();

        let count = NoticeGenerator::new()
            .with_extra_files(["ports/zlib/license.txt"])
            .generate(root, Path::new(DEFAULT_NOTICE_NAME))
            .unwrap();
        assert_eq!(count, 3);

        let notice = fs::read_to_string(root.join("NOTICE")).unwrap();
        let top = notice.find("top license").unwrap();
        let zlib = notice.find("zlib license").unwrap();
        let newlib = notice.find("newlib license").unwrap();
        assert!(top < zlib && zlib < newlib, "sections must follow path order");
        assert!(notice.contains("\nports/zlib/license.txt\n"));
    }

    #[test]
    fn missing_extra_file_is_fatal() {
        let temp = tree();
        let err = NoticeGenerator::new()
            .with_extra_files(["jpeg/README"])
            .generate(temp.path(), Path::new("NOTICE"))
            .unwrap_err();
        assert!(err.to_string().contains("jpeg/README"));
    }

    #[test]
    fn regenerating_does_not_collect_previous_notice() {
        let temp = tree();
        let root = temp.path();
        let generator = NoticeGenerator::new();

        generator.generate(root, Path::new("COPYING")).unwrap();
        let first = fs::read_to_string(root.join("COPYING")).unwrap();
        generator.generate(root, Path::new("COPYING")).unwrap();
        let second = fs::read_to_string(root.join("COPYING")).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn non_utf8_license_bytes_are_kept() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        let latin1 = b"Copyright (c) J\xf6rg\n";
        fs::write(root.join("COPYING"), latin1).unwrap();

        NoticeGenerator::new()
            .generate(root, Path::new(DEFAULT_NOTICE_NAME))
            .unwrap();

        let notice = fs::read(root.join("NOTICE")).unwrap();
        assert!(notice.windows(latin1.len()).any(|w| w == latin1));
        assert!(notice.starts_with(SECTION_RULE.as_bytes()));
    }
}
