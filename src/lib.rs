//! Assembles versioned SDK bundles.
//!
//! A bundle is one directory per target platform holding headers,
//! toolchains, tools, text files and an aggregated license notice. Building
//! one means:
//!
//! - **Install mapping** - [`install::resolve`] turns declarative
//!   [`install::InstallSpec`]s into concrete copy operations
//! - **Assembly** - [`assembler::DirectoryAssembler`] clobbers, scaffolds and
//!   populates the tree through named steps, failing fast
//! - **Verification** - [`verify::ManifestVerifier`] diffs the tree against a
//!   conditional expected-file list
//! - **Release** - [`release::ReleaseManifestBuilder`] hashes the archive and
//!   describes it for a package index
//! - **Notice** - [`build::licenses::NoticeGenerator`] concatenates license files
//!
//! ```text
//! sdk.toml ──► SdkDefinition ──► pipeline::run_pipeline
//!                                   │
//!     scaffold ─► populate ─► verify ─► archive ─► manifest ─► publish
//!                   │
//!     toolchains, text, declared install/hook steps, notice
//! ```

pub mod assembler;
pub mod build;
pub mod config;
pub mod error;
pub mod executor;
pub mod install;
pub mod interrupt;
pub mod pipeline;
pub mod preflight;
pub mod release;
pub mod verify;

pub use config::file::SdkDefinition;
pub use config::{BuildConfig, Platform, Toolchain};
pub use error::{BundleError, Result};
pub use pipeline::{run_pipeline, PipelineOutcome};
