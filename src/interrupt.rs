//! Operator interrupt handling.
//!
//! SIGINT only raises a flag. The assembler polls it between steps and
//! between file copies and aborts with [`BundleError::Interrupted`]; whatever
//! was already written stays on disk.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{BundleError, Result};

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Install the Ctrl-C handler. Call once from the binary.
pub fn install_handler() -> Result<()> {
    ctrlc::set_handler(request)
        .map_err(|e| BundleError::Config(format!("failed to set signal handler: {e}")))
}

pub fn interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

/// Fail with [`BundleError::Interrupted`] once an interrupt has been seen.
pub fn check() -> Result<()> {
    if interrupted() {
        return Err(BundleError::Interrupted);
    }
    Ok(())
}

/// Raise the flag without a signal.
pub fn request() {
    INTERRUPTED.store(true, Ordering::SeqCst);
}
