//! Publishing archives and manifest snippets to a storage location.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{BundleError, IoContext, Result};

/// Uploads release artefacts. Remote backends implement this outside the crate.
pub trait Publisher {
    /// Store `file` under `name`, returning the location it was written to.
    fn publish(&self, file: &Path, name: &str) -> Result<String>;
}

/// Publishes by copying into a local directory, typically a mounted bucket.
#[derive(Debug, Clone)]
pub struct DirectoryPublisher {
    root: PathBuf,
}

impl DirectoryPublisher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Publisher for DirectoryPublisher {
    fn publish(&self, file: &Path, name: &str) -> Result<String> {
        if name.is_empty() || name.split('/').any(|part| part.is_empty() || part == "..") {
            return Err(BundleError::UnsafeDestination {
                dest: name.to_string(),
            });
        }

        let dest = self.root.join(name);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).io_context("creating publish directory", parent)?;
        }
        let tmp = dest.with_extension(format!("tmp-{}", std::process::id()));
        fs::copy(file, &tmp).io_context("copying release file", file)?;
        fs::rename(&tmp, &dest).io_context("moving published file into place", &dest)?;

        info!(file = %file.display(), dest = %dest.display(), "published");
        Ok(dest.display().to_string())
    }
}
