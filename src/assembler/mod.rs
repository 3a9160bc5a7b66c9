//! Bundle tree lifecycle.
//!
//! [`DirectoryAssembler`] owns one bundle directory and moves it through
//!
//! ```text
//! Clean -> Scaffolded -> Populated -> Verified -> Archived -> Published
//! ```
//!
//! Any error moves it to [`AssemblyState::Failed`], which accepts no further
//! operations. Nothing is rolled back: a failed run leaves whatever it had
//! written, and a later run with clobbering enabled starts over.

pub mod steps;

use std::fmt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::{info, warn};

use crate::build::context::{BundleLayout, BUNDLE_SUBDIRS};
use crate::config::BuildConfig;
use crate::error::{BundleError, IoContext, Result};
use crate::executor::directories::{make_dir_or_clobber, remove_dir_if_exists, scaffold};
use crate::interrupt;
use crate::release::archive::Archiver;
use crate::release::publish::Publisher;
use crate::verify::{ExpectedFileList, ManifestVerifier};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblyState {
    Clean,
    Scaffolded,
    Populated,
    Verified,
    Archived,
    Published,
    Failed,
}

impl AssemblyState {
    pub fn as_str(self) -> &'static str {
        match self {
            AssemblyState::Clean => "clean",
            AssemblyState::Scaffolded => "scaffolded",
            AssemblyState::Populated => "populated",
            AssemblyState::Verified => "verified",
            AssemblyState::Archived => "archived",
            AssemblyState::Published => "published",
            AssemblyState::Failed => "failed",
        }
    }
}

impl fmt::Display for AssemblyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a step sees of the run.
#[derive(Debug, Clone, Copy)]
pub struct StepContext<'a> {
    pub config: &'a BuildConfig,
    pub layout: &'a BundleLayout,
}

impl StepContext<'_> {
    pub fn bundle_dir(&self) -> &Path {
        &self.layout.bundle_dir
    }
}

/// A named unit of population work.
///
/// Steps must be idempotent under overwrite: running one twice against the
/// same tree leaves the same files.
pub trait AssemblyStep {
    /// Name for logging and error reports.
    fn name(&self) -> &str;

    /// Whether the step applies to this run at all.
    fn enabled(&self, _config: &BuildConfig) -> bool {
        true
    }

    fn run(&self, ctx: &StepContext<'_>) -> Result<()>;
}

/// Exclusive lock on a bundle dir, released when dropped.
///
/// The lock file is left on disk; unlinking it while held would let a
/// second run lock a fresh file at the same path.
#[derive(Debug)]
struct BundleLock {
    _file: File,
}

impl BundleLock {
    fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).io_context("creating directory", parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)
            .io_context("opening lock file", path)?;
        if file.try_lock_exclusive().is_err() {
            return Err(BundleError::Locked {
                lock: path.to_path_buf(),
            });
        }
        Ok(Self { _file: file })
    }
}

/// Drives one bundle directory from empty to published.
#[derive(Debug)]
pub struct DirectoryAssembler<'a> {
    config: &'a BuildConfig,
    layout: BundleLayout,
    state: AssemblyState,
    lock: Option<BundleLock>,
    archive: Option<PathBuf>,
}

impl<'a> DirectoryAssembler<'a> {
    pub fn new(config: &'a BuildConfig, layout: BundleLayout) -> Self {
        Self {
            config,
            layout,
            state: AssemblyState::Clean,
            lock: None,
            archive: None,
        }
    }

    pub fn state(&self) -> AssemblyState {
        self.state
    }

    pub fn layout(&self) -> &BundleLayout {
        &self.layout
    }

    /// The archive written by [`DirectoryAssembler::archive`].
    pub fn archive_path(&self) -> Option<&Path> {
        self.archive.as_deref()
    }

    fn expect_state(&self, expected: AssemblyState) -> Result<()> {
        if self.state != expected {
            return Err(BundleError::InvalidState {
                expected: expected.as_str(),
                actual: self.state.as_str(),
            });
        }
        Ok(())
    }

    fn settle<T>(&mut self, result: Result<T>, next: AssemblyState) -> Result<T> {
        match result {
            Ok(value) => {
                self.state = next;
                Ok(value)
            }
            Err(err) => {
                warn!(state = %self.state, error = %err, "assembly failed");
                self.state = AssemblyState::Failed;
                Err(err)
            }
        }
    }

    /// Take the bundle lock, clobber if configured, and create the skeleton.
    pub fn scaffold(&mut self) -> Result<()> {
        self.expect_state(AssemblyState::Clean)?;
        let result = self.scaffold_inner();
        self.settle(result, AssemblyState::Scaffolded)
    }

    fn scaffold_inner(&mut self) -> Result<()> {
        if self.lock.is_none() {
            self.lock = Some(BundleLock::acquire(&self.layout.lock_path())?);
        }
        interrupt::check()?;

        let clobber = self.config.clobber;
        if clobber {
            if let Some(previous) = &self.layout.previous_bundle_dir {
                remove_dir_if_exists(previous)?;
            }
        }
        let bundle_dir =
            make_dir_or_clobber(&self.layout.out_dir, &self.layout.bundle_name, clobber)?;
        scaffold(&bundle_dir, BUNDLE_SUBDIRS)?;
        info!(bundle = %bundle_dir.display(), clobber, "scaffolded bundle");
        Ok(())
    }

    /// Run `steps` in order, stopping at the first failure.
    pub fn populate(&mut self, steps: &[Box<dyn AssemblyStep + '_>]) -> Result<()> {
        self.expect_state(AssemblyState::Scaffolded)?;
        let result = self.populate_inner(steps);
        self.settle(result, AssemblyState::Populated)
    }

    fn populate_inner(&self, steps: &[Box<dyn AssemblyStep + '_>]) -> Result<()> {
        let ctx = StepContext {
            config: self.config,
            layout: &self.layout,
        };
        for step in steps {
            interrupt::check()?;
            if !step.enabled(self.config) {
                info!(step = step.name(), "skipping step");
                continue;
            }
            info!(step = step.name(), "running step");
            step.run(&ctx).map_err(|e| e.in_step(step.name()))?;
        }
        Ok(())
    }

    /// Compare the tree with `list`; any drift fails the run.
    pub fn verify(&mut self, list: &ExpectedFileList) -> Result<()> {
        self.expect_state(AssemblyState::Populated)?;
        let result = interrupt::check().and_then(|()| {
            ManifestVerifier::new(self.config).ensure_verified(&self.layout.bundle_dir, list)
        });
        self.settle(result, AssemblyState::Verified)
    }

    /// Pack the verified tree into the layout's archive path.
    pub fn archive(&mut self, archiver: &dyn Archiver) -> Result<PathBuf> {
        self.expect_state(AssemblyState::Verified)?;
        let result = interrupt::check().and_then(|()| {
            archiver.archive(
                &self.layout.bundle_dir,
                &self.layout.bundle_name,
                &self.layout.archive_path,
            )
        });
        let path = self.settle(result, AssemblyState::Archived)?;
        self.archive = Some(path.clone());
        Ok(path)
    }

    /// Hand each `(file, name)` to `publisher`, returning where they landed.
    pub fn publish(
        &mut self,
        publisher: &dyn Publisher,
        files: &[(PathBuf, String)],
    ) -> Result<Vec<String>> {
        self.expect_state(AssemblyState::Archived)?;
        let result: Result<Vec<String>> =
            files.iter().try_fold(Vec::new(), |mut out, (file, name)| {
                interrupt::check()?;
                out.push(publisher.publish(file, name)?);
                Ok(out)
            });
        self.settle(result, AssemblyState::Published)
    }
}
