//! Error taxonomy for bundle assembly, verification and release.
//!
//! Every failure the pipeline can report is a [`BundleError`]. Library code
//! returns these up the call chain; only the binary decides how to exit.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::verify::VerificationDiff;

/// Failures raised while assembling, verifying, archiving or publishing a bundle.
#[derive(Debug, Error)]
pub enum BundleError {
    /// A multi-match glob was mapped onto a single named destination file.
    #[error(
        "source pattern '{pattern}' matched {matches} files but destination '{dest}' \
         does not end in '/'"
    )]
    MappingAmbiguity {
        pattern: String,
        dest: String,
        matches: usize,
    },

    /// A wildcard source pattern expanded to nothing.
    #[error("wildcard pattern '{pattern}' matched no files under '{}'", .root.display())]
    NoSourceMatch { pattern: String, root: PathBuf },

    /// A source or expected-file pattern could not be compiled.
    #[error("invalid pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    /// A destination pattern would escape the destination root.
    #[error("destination '{dest}' must be relative and must not contain '..'")]
    UnsafeDestination { dest: String },

    /// The assembled tree does not match the expected file list.
    #[error("{report}")]
    VerificationMismatch {
        diff: VerificationDiff,
        report: String,
    },

    /// A delegated program exited unsuccessfully.
    #[error("external tool '{program}' failed with {status}{}", format_output(.output))]
    ExternalToolFailure {
        program: String,
        status: String,
        output: String,
    },

    /// A filesystem operation failed.
    #[error("{op} '{}'", .path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The expected file list could not be parsed.
    #[error("{}:{line}: {message}", .path.display())]
    FileList {
        path: PathBuf,
        line: usize,
        message: String,
    },

    /// The build configuration or pipeline definition is invalid.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// An assembler operation was requested out of order.
    #[error("assembler is in state {actual}, expected {expected}")]
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },

    /// Another run holds the bundle lock.
    #[error("bundle directory is locked by another run: '{}'", .lock.display())]
    Locked { lock: PathBuf },

    /// The operator interrupted the run.
    #[error("interrupted")]
    Interrupted,

    /// A named assembly step failed.
    #[error("step '{step}' failed")]
    Step {
        step: String,
        #[source]
        source: Box<BundleError>,
    },
}

impl BundleError {
    /// Wrap `self` with the name of the step it was raised in.
    pub fn in_step(self, step: &str) -> Self {
        match self {
            // Interrupts and nested step errors already carry enough context.
            BundleError::Interrupted | BundleError::Step { .. } => self,
            other => BundleError::Step {
                step: step.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// The innermost error, looking through step wrappers.
    pub fn root_cause(&self) -> &BundleError {
        match self {
            BundleError::Step { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// True when this is a file-list drift rather than a tooling failure.
    pub fn is_verification_failure(&self) -> bool {
        matches!(self.root_cause(), BundleError::VerificationMismatch { .. })
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self.root_cause(), BundleError::Interrupted)
    }
}

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, BundleError>;

/// Attach an operation and path to `std::io` results.
pub trait IoContext<T> {
    fn io_context(self, op: &'static str, path: &Path) -> Result<T>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn io_context(self, op: &'static str, path: &Path) -> Result<T> {
        self.map_err(|source| BundleError::Io {
            op,
            path: path.to_path_buf(),
            source,
        })
    }
}

fn format_output(output: &str) -> String {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(":\n{trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_wrapping_is_not_nested() {
        let err = BundleError::Config("bad".into())
            .in_step("headers")
            .in_step("outer");
        match &err {
            BundleError::Step { step, .. } => assert_eq!(step, "headers"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(err.root_cause(), BundleError::Config(_)));
    }

    #[test]
    fn interrupt_is_never_wrapped() {
        let err = BundleError::Interrupted.in_step("toolchains");
        assert!(matches!(err, BundleError::Interrupted));
        assert!(err.is_interrupted());
    }

    #[test]
    fn verification_failure_is_detected_through_steps() {
        let err = BundleError::VerificationMismatch {
            diff: VerificationDiff::default(),
            report: "drift".into(),
        }
        .in_step("verify");
        assert!(err.is_verification_failure());
        assert!(!BundleError::Interrupted.is_verification_failure());
    }

    #[test]
    fn io_context_names_operation_and_path() {
        let res: io::Result<()> = Err(io::Error::new(io::ErrorKind::NotFound, "gone"));
        let err = res.io_context("copying", Path::new("/tmp/x")).unwrap_err();
        assert_eq!(err.to_string(), "copying '/tmp/x'");
    }

    #[test]
    fn tool_failure_includes_trimmed_output() {
        let err = BundleError::ExternalToolFailure {
            program: "make".into(),
            status: "exit status: 2".into(),
            output: "  boom \n".into(),
        };
        assert_eq!(
            err.to_string(),
            "external tool 'make' failed with exit status: 2:\nboom"
        );
    }
}
