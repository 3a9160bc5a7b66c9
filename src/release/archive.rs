//! Deterministic `.tar.zst` archives of bundle trees.
//!
//! Entries are sorted by relative path and carry zeroed mtime, uid and gid,
//! so archiving the same tree twice yields byte-identical output.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use tar::Builder as TarBuilder;
use tracing::info;
use walkdir::WalkDir;

use crate::error::{BundleError, IoContext, Result};
use crate::interrupt;

const ZSTD_LEVEL: i32 = 19;

/// Packs a directory tree into a single distributable file.
pub trait Archiver {
    /// Archive `src_dir` so that its contents appear under `top_level/`.
    /// Returns the path written.
    fn archive(&self, src_dir: &Path, top_level: &str, out_path: &Path) -> Result<PathBuf>;
}

/// tar + zstd with normalised headers.
#[derive(Debug, Clone, Copy)]
pub struct TarZstArchiver {
    pub level: i32,
}

impl Default for TarZstArchiver {
    fn default() -> Self {
        Self { level: ZSTD_LEVEL }
    }
}

impl Archiver for TarZstArchiver {
    fn archive(&self, src_dir: &Path, top_level: &str, out_path: &Path) -> Result<PathBuf> {
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent).io_context("creating archive directory", parent)?;
        }
        let tmp = out_path.with_extension(format!("tmp-{}", std::process::id()));

        let written = write_tar_zst(src_dir, top_level, &tmp, self.level);
        if let Err(err) = written {
            let _ = fs::remove_file(&tmp);
            return Err(err);
        }
        fs::rename(&tmp, out_path).io_context("moving archive into place", out_path)?;

        info!(
            archive = %out_path.display(),
            source = %src_dir.display(),
            "archived bundle"
        );
        Ok(out_path.to_path_buf())
    }
}

fn write_tar_zst(src_dir: &Path, top_level: &str, out_path: &Path, level: i32) -> Result<()> {
    let out = File::create(out_path).io_context("creating archive", out_path)?;
    let encoder =
        zstd::stream::Encoder::new(out, level).io_context("starting zstd stream", out_path)?;
    let mut builder = TarBuilder::new(encoder);

    let mut entries: Vec<(String, PathBuf)> = Vec::new();
    for ent in WalkDir::new(src_dir).follow_links(false) {
        let ent = ent.map_err(|e| BundleError::Io {
            op: "walking",
            path: e.path().unwrap_or(src_dir).to_path_buf(),
            source: e
                .into_io_error()
                .unwrap_or_else(|| io::Error::other("filesystem loop")),
        })?;
        let rel = ent
            .path()
            .strip_prefix(src_dir)
            .unwrap_or(ent.path())
            .to_string_lossy()
            .replace('\\', "/");
        let name = if rel.is_empty() {
            top_level.to_string()
        } else {
            format!("{top_level}/{rel}")
        };
        entries.push((name, ent.path().to_path_buf()));
    }
    entries.sort();

    for (name, path) in entries {
        interrupt::check()?;
        append_entry(&mut builder, &name, &path).io_context("adding archive entry", &path)?;
    }

    let encoder = builder
        .into_inner()
        .io_context("finalizing tar stream", out_path)?;
    encoder.finish().io_context("finalizing zstd stream", out_path)?;
    Ok(())
}

fn append_entry<W: io::Write>(
    builder: &mut TarBuilder<W>,
    name: &str,
    path: &Path,
) -> io::Result<()> {
    let md = fs::symlink_metadata(path)?;
    let mut header = tar::Header::new_gnu();
    header.set_mtime(0);
    header.set_uid(0);
    header.set_gid(0);
    header.set_mode(mode_of(&md));

    if md.is_dir() {
        header.set_entry_type(tar::EntryType::Directory);
        header.set_size(0);
        header.set_cksum();
        return builder.append_data(&mut header, name, io::empty());
    }

    if md.file_type().is_symlink() {
        let target = fs::read_link(path)?;
        header.set_entry_type(tar::EntryType::Symlink);
        header.set_size(0);
        header.set_link_name(&target)?;
        header.set_cksum();
        return builder.append_data(&mut header, name, io::empty());
    }

    let mut file = File::open(path)?;
    header.set_entry_type(tar::EntryType::Regular);
    header.set_size(md.len());
    header.set_cksum();
    builder.append_data(&mut header, name, &mut file)
}

#[cfg(unix)]
fn mode_of(md: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    md.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn mode_of(md: &fs::Metadata) -> u32 {
    if md.is_dir() {
        0o755
    } else {
        0o644
    }
}

/// Unpack a `.tar.zst` into `dest_dir`, replacing whatever was there.
pub fn extract_tar_zst(archive: &Path, dest_dir: &Path) -> Result<()> {
    if dest_dir.exists() {
        fs::remove_dir_all(dest_dir).io_context("removing extraction directory", dest_dir)?;
    }
    fs::create_dir_all(dest_dir).io_context("creating extraction directory", dest_dir)?;

    let file = File::open(archive).io_context("opening archive", archive)?;
    let decoder = zstd::stream::Decoder::new(file).io_context("starting zstd stream", archive)?;
    let mut tar = tar::Archive::new(decoder);
    tar.set_preserve_permissions(true);
    tar.unpack(dest_dir).io_context("unpacking archive", archive)?;
    Ok(())
}
