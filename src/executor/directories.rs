//! Directory lifecycle helpers: clobbering and scaffolding the bundle tree.

use std::fs;
use std::path::Path;

use tracing::info;

use crate::error::{IoContext, Result};

/// Create each subdirectory of `root`, and `root` itself.
pub fn scaffold(root: &Path, subdirs: &[&str]) -> Result<()> {
    fs::create_dir_all(root).io_context("creating directory", root)?;
    for dir in subdirs {
        let path = root.join(dir);
        fs::create_dir_all(&path).io_context("creating directory", &path)?;
    }
    Ok(())
}

/// Remove a directory tree if it exists. Returns whether anything was removed.
pub fn remove_dir_if_exists(path: &Path) -> Result<bool> {
    if !path.exists() && !path.is_symlink() {
        return Ok(false);
    }
    info!(path = %path.display(), "removing");
    if path.is_dir() && !path.is_symlink() {
        fs::remove_dir_all(path).io_context("removing", path)?;
    } else {
        fs::remove_file(path).io_context("removing", path)?;
    }
    Ok(true)
}

/// Create `root/dirname`, removing it first when `clobber` is set.
pub fn make_dir_or_clobber(
    root: &Path,
    dirname: &str,
    clobber: bool,
) -> Result<std::path::PathBuf> {
    let path = root.join(dirname);
    if clobber {
        remove_dir_if_exists(&path)?;
    }
    fs::create_dir_all(&path).io_context("creating directory", &path)?;
    Ok(path)
}
