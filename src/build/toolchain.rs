//! Populating `toolchain/<platform>_<arch>_<name>/` from prebuilt toolchains.
//!
//! A prebuilt toolchain is either an already-extracted directory or a
//! `.tar.zst` archive. Archives are unpacked into scratch space first and
//! the requested subdirectory is moved into place.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::config::Toolchain;
use crate::error::{BundleError, Result};
use crate::executor::directories::remove_dir_if_exists;
use crate::executor::files::{copy_dir_recursive, move_dir};
use crate::release::archive::extract_tar_zst;

/// Where one toolchain comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolchainSource {
    pub toolchain: Toolchain,
    /// Directory or `.tar.zst` archive.
    pub source: PathBuf,
    /// Subdirectory of the source that becomes the toolchain dir.
    pub strip_prefix: Option<PathBuf>,
}

impl ToolchainSource {
    fn is_archive(&self) -> bool {
        self.source
            .to_str()
            .is_some_and(|s| s.ends_with(".tar.zst") || s.ends_with(".tzst"))
    }
}

/// Replace `dest` with the contents of `source`.
pub fn populate_toolchain(source: &ToolchainSource, dest: &Path, scratch: &Path) -> Result<()> {
    info!(
        toolchain = %source.toolchain,
        from = %source.source.display(),
        to = %dest.display(),
        "populating toolchain"
    );
    remove_dir_if_exists(dest)?;

    if source.source.is_dir() {
        let root = match &source.strip_prefix {
            Some(prefix) => source.source.join(prefix),
            None => source.source.clone(),
        };
        require_dir(&root)?;
        return copy_dir_recursive(&root, dest);
    }

    if source.source.is_file() && source.is_archive() {
        let unpack_dir = scratch.join(source.toolchain.as_str());
        remove_dir_if_exists(&unpack_dir)?;
        extract_tar_zst(&source.source, &unpack_dir)?;

        let root = match &source.strip_prefix {
            Some(prefix) => unpack_dir.join(prefix),
            None => unpack_dir.clone(),
        };
        require_dir(&root)?;
        move_dir(&root, dest)?;
        remove_dir_if_exists(&unpack_dir)?;
        return Ok(());
    }

    Err(BundleError::Config(format!(
        "toolchain '{}' source '{}' is neither a directory nor a .tar.zst archive",
        source.toolchain,
        source.source.display()
    )))
}

fn require_dir(path: &Path) -> Result<()> {
    if fs::metadata(path).map(|m| m.is_dir()).unwrap_or(false) {
        return Ok(());
    }
    Err(BundleError::Io {
        op: "locating toolchain directory",
        path: path.to_path_buf(),
        source: std::io::Error::from(std::io::ErrorKind::NotFound),
    })
}
