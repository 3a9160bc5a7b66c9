//! File operations against the bundle tree: applying mappings, writing
//! generated files, copying and moving whole trees.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use tracing::debug;

use crate::error::{IoContext, Result};
use crate::install::FileMapping;
use crate::interrupt;

/// Apply every mapping in order.
///
/// Returns the number of files copied. Checks for an operator interrupt
/// before each copy.
pub fn apply_mappings(mappings: &[FileMapping]) -> Result<usize> {
    for mapping in mappings {
        interrupt::check()?;
        apply_mapping(mapping)?;
    }
    Ok(mappings.len())
}

/// Copy one file, creating parent directories and keeping permission bits.
///
/// An existing destination is replaced, so applying the same mapping twice
/// leaves the same tree.
pub fn apply_mapping(mapping: &FileMapping) -> Result<()> {
    let FileMapping { source, dest } = mapping;

    let metadata = fs::metadata(source).io_context("reading source file", source)?;
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).io_context("creating directory", parent)?;
    }
    if dest.is_symlink() || dest.exists() {
        fs::remove_file(dest).io_context("replacing existing file", dest)?;
    }

    debug!(from = %source.display(), to = %dest.display(), "copy");
    fs::copy(source, dest).io_context("copying", source)?;
    fs::set_permissions(dest, fs::Permissions::from_mode(metadata.permissions().mode()))
        .io_context("setting permissions on", dest)?;
    Ok(())
}

/// Write a generated file, creating parents as needed.
pub fn write_file(path: &Path, content: impl AsRef<[u8]>) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).io_context("creating directory", parent)?;
    }
    fs::write(path, content).io_context("writing", path)?;
    Ok(())
}

/// Recursively copy a directory, preserving symlinks.
pub fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst).io_context("creating directory", dst)?;

    for entry in fs::read_dir(src).io_context("reading directory", src)? {
        let entry = entry.io_context("reading directory", src)?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());
        let file_type = entry.file_type().io_context("inspecting", &src_path)?;

        if file_type.is_symlink() {
            let target = fs::read_link(&src_path).io_context("reading symlink", &src_path)?;
            if dst_path.exists() || dst_path.is_symlink() {
                fs::remove_file(&dst_path).io_context("replacing existing file", &dst_path)?;
            }
            std::os::unix::fs::symlink(&target, &dst_path)
                .io_context("creating symlink", &dst_path)?;
        } else if file_type.is_dir() {
            copy_dir_recursive(&src_path, &dst_path)?;
        } else {
            fs::copy(&src_path, &dst_path).io_context("copying", &src_path)?;
        }
    }

    Ok(())
}

/// Move a directory by renaming, falling back to copy and delete across
/// filesystems.
pub fn move_dir(src: &Path, dst: &Path) -> Result<()> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).io_context("creating directory", parent)?;
    }
    if fs::rename(src, dst).is_ok() {
        return Ok(());
    }
    copy_dir_recursive(src, dst)?;
    fs::remove_dir_all(src).io_context("removing", src)?;
    Ok(())
}
