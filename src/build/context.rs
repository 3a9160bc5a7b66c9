//! Paths derived from the build configuration.

use std::path::{Path, PathBuf};

use crate::config::{BuildConfig, Toolchain};
use crate::error::Result;

/// Top-level subdirectories every bundle starts with.
pub const BUNDLE_SUBDIRS: &[&str] = &["include", "toolchain", "tools"];

/// Where a run writes its bundle, archive and lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleLayout {
    /// Output directory holding the bundle dir and the archive.
    pub out_dir: PathBuf,
    /// `<prefix>_<version>`; also the top-level directory inside the archive.
    pub bundle_name: String,
    pub bundle_dir: PathBuf,
    /// Bundle dir of the preceding version, removed when clobbering.
    pub previous_bundle_dir: Option<PathBuf>,
    pub archive_path: PathBuf,
    platform_arch: String,
}

impl BundleLayout {
    pub fn new(out_dir: &Path, prefix: &str, config: &BuildConfig) -> Result<Self> {
        let version = config.numeric_version()?;
        let bundle_name = format!("{prefix}_{}", config.version.trim());
        let previous_bundle_dir = version
            .checked_sub(1)
            .map(|prev| out_dir.join(format!("{prefix}_{prev}")));
        let archive_name = format!("{prefix}_{}.tar.zst", config.platform);

        Ok(Self {
            out_dir: out_dir.to_path_buf(),
            bundle_dir: out_dir.join(&bundle_name),
            bundle_name,
            previous_bundle_dir,
            archive_path: out_dir.join(archive_name),
            platform_arch: format!("{}_{}", config.platform, config.arch),
        })
    }

    /// `<platform>_<arch>_<toolchain>`
    pub fn toolchain_dir_name(&self, toolchain: Toolchain) -> String {
        format!("{}_{}", self.platform_arch, toolchain)
    }

    /// `toolchain/<platform>_<arch>_<toolchain>` under the bundle dir.
    pub fn toolchain_dir(&self, toolchain: Toolchain) -> PathBuf {
        self.bundle_dir
            .join("toolchain")
            .join(self.toolchain_dir_name(toolchain))
    }

    pub fn archive_name(&self) -> String {
        self.archive_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Manifest snippet written next to the archive.
    pub fn manifest_snippet_path(&self) -> PathBuf {
        self.out_dir.join(format!("{}.json", self.archive_name()))
    }

    /// Lock file guarding the bundle dir against concurrent runs.
    pub fn lock_path(&self) -> PathBuf {
        self.out_dir.join(format!(".{}.lock", self.bundle_name))
    }

    /// Scratch space for toolchain extraction.
    pub fn scratch_dir(&self) -> PathBuf {
        self.out_dir.join(format!(".{}-tmp", self.bundle_name))
    }
}
